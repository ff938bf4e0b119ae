//! Operator-driven re-drive of residual failures.

use std::fmt::Display;

use async_trait::async_trait;

/// Yes/no decision source for recovery rounds.
pub trait OperatorPrompt: Send + Sync {
    /// Asks `question`; `true` approves another round.
    fn confirm(&self, question: &str) -> bool;
}

/// Answers every prompt the same way.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl OperatorPrompt for FixedAnswer {
    fn confirm(&self, question: &str) -> bool {
        log::info!("{question} {}", if self.0 { "y" } else { "n" });
        self.0
    }
}

/// Returns `true` only for an explicit `y` or `yes`.
#[must_use]
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Which failure set a recovery loop works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Catalog items that could not be turned into tasks.
    CatalogItems,
    /// Assets that exhausted their download attempts.
    Downloads,
}

impl FailureKind {
    /// Question put to the operator.
    #[must_use]
    pub const fn question(self) -> &'static str {
        match self {
            Self::CatalogItems => "Retry processing these items? (y/n)",
            Self::Downloads => "Retry downloading these assets? (y/n)",
        }
    }

    const fn noun(self) -> &'static str {
        match self {
            Self::CatalogItems => "item(s) could not be processed",
            Self::Downloads => "asset(s) failed to download",
        }
    }
}

/// Re-attempts exactly the given failures and returns what is still failing.
#[async_trait]
pub trait RecoveryRound<T: Send>: Send {
    async fn retry(&mut self, failed: Vec<T>) -> Vec<T>;

    /// Returns `false` once further rounds cannot make progress (e.g. the run
    /// was cancelled).
    fn can_continue(&self) -> bool {
        true
    }
}

/// States of a recovery loop.
#[derive(Debug, PartialEq, Eq)]
pub enum RecoveryState<T> {
    /// Failures gathered; decide whether anything is left.
    Collecting(Vec<T>),
    /// Waiting for the operator to approve a round.
    AwaitingOperatorDecision(Vec<T>),
    /// Re-driving the failures.
    Retrying(Vec<T>),
    /// Finished with the residual failures.
    Done(RecoveryOutcome<T>),
}

/// Final result of a recovery loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOutcome<T> {
    /// Failures still unresolved; untouched when the operator declined.
    pub residual: Vec<T>,
    /// Rounds that were run.
    pub rounds: usize,
    /// Whether the loop ended because the operator declined.
    pub declined: bool,
}

/// Drives the recovery state machine for one failure set.
pub struct RecoveryLoop<'p, P: OperatorPrompt + ?Sized> {
    kind: FailureKind,
    prompt: &'p P,
    max_rounds: Option<usize>,
}

impl<'p, P: OperatorPrompt + ?Sized> RecoveryLoop<'p, P> {
    #[must_use]
    pub const fn new(kind: FailureKind, prompt: &'p P) -> Self {
        Self {
            kind,
            prompt,
            max_rounds: None,
        }
    }

    /// Caps the number of rounds; `None` leaves it to the operator.
    #[must_use]
    pub const fn with_max_rounds(mut self, max_rounds: Option<usize>) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    fn rounds_left(&self, rounds: usize) -> bool {
        self.max_rounds.is_none_or(|max| rounds < max)
    }

    /// Advances one state. `rounds` counts the rounds started so far.
    pub async fn step<T, R>(
        &self,
        state: RecoveryState<T>,
        round: &mut R,
        rounds: &mut usize,
    ) -> RecoveryState<T>
    where
        T: Display + Send,
        R: RecoveryRound<T> + ?Sized,
    {
        match state {
            RecoveryState::Collecting(failed) if failed.is_empty() => {
                RecoveryState::Done(RecoveryOutcome {
                    residual: failed,
                    rounds: *rounds,
                    declined: false,
                })
            }
            RecoveryState::Collecting(failed)
                if !round.can_continue() || !self.rounds_left(*rounds) =>
            {
                log::warn!("No further recovery rounds; {} failure(s) remain", failed.len());
                RecoveryState::Done(RecoveryOutcome {
                    residual: failed,
                    rounds: *rounds,
                    declined: false,
                })
            }
            RecoveryState::Collecting(failed) => RecoveryState::AwaitingOperatorDecision(failed),
            RecoveryState::AwaitingOperatorDecision(failed) => {
                let listed: Vec<String> = failed.iter().map(ToString::to_string).collect();
                log::warn!("{} {}: {}", failed.len(), self.kind.noun(), listed.join(", "));
                if self.prompt.confirm(self.kind.question()) {
                    RecoveryState::Retrying(failed)
                } else {
                    log::info!("Leaving {} failure(s) unresolved", failed.len());
                    RecoveryState::Done(RecoveryOutcome {
                        residual: failed,
                        rounds: *rounds,
                        declined: true,
                    })
                }
            }
            RecoveryState::Retrying(failed) => {
                *rounds += 1;
                log::info!("Recovery round {rounds}: {} failure(s)", failed.len());
                RecoveryState::Collecting(round.retry(failed).await)
            }
            done @ RecoveryState::Done(_) => done,
        }
    }

    /// Runs rounds until the operator declines or nothing is left failing.
    pub async fn run<T, R>(&self, failed: Vec<T>, round: &mut R) -> RecoveryOutcome<T>
    where
        T: Display + Send,
        R: RecoveryRound<T> + ?Sized,
    {
        let mut rounds = 0;
        let mut state = RecoveryState::Collecting(failed);
        loop {
            state = self.step(state, round, &mut rounds).await;
            if let RecoveryState::Done(outcome) = state {
                return outcome;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays scripted answers, then declines.
    struct Scripted {
        answers: Mutex<VecDeque<bool>>,
        asked: Mutex<usize>,
    }

    impl Scripted {
        fn new(answers: &[bool]) -> Self {
            Self {
                answers: Mutex::new(answers.iter().copied().collect()),
                asked: Mutex::new(0),
            }
        }
    }

    impl OperatorPrompt for Scripted {
        fn confirm(&self, _question: &str) -> bool {
            *self.asked.lock().unwrap() += 1;
            self.answers.lock().unwrap().pop_front().unwrap_or(false)
        }
    }

    /// Resolves everything on the `succeed_on`-th round.
    struct Flaky {
        round: usize,
        succeed_on: usize,
        seen: Vec<Vec<u32>>,
    }

    #[async_trait]
    impl RecoveryRound<u32> for Flaky {
        async fn retry(&mut self, failed: Vec<u32>) -> Vec<u32> {
            self.round += 1;
            self.seen.push(failed.clone());
            if self.round >= self.succeed_on {
                Vec::new()
            } else {
                failed
            }
        }
    }

    fn flaky(succeed_on: usize) -> Flaky {
        Flaky {
            round: 0,
            succeed_on,
            seen: Vec::new(),
        }
    }

    #[test]
    fn only_yes_is_affirmative() {
        assert!(is_affirmative("y"));
        assert!(is_affirmative(" YES\n"));
        assert!(!is_affirmative(""));
        assert!(!is_affirmative("n"));
        assert!(!is_affirmative("sure"));
    }

    #[tokio::test]
    async fn converges_after_two_approved_rounds() {
        let prompt = Scripted::new(&[true, true]);
        let mut round = flaky(2);

        let outcome = RecoveryLoop::new(FailureKind::Downloads, &prompt)
            .run(vec![3, 5], &mut round)
            .await;

        assert!(outcome.residual.is_empty());
        assert_eq!(outcome.rounds, 2);
        assert!(!outcome.declined);
        assert_eq!(round.seen, vec![vec![3, 5], vec![3, 5]]);
        assert_eq!(*prompt.asked.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn decline_leaves_failures_unchanged() {
        let prompt = Scripted::new(&[false]);
        let mut round = flaky(1);

        let outcome = RecoveryLoop::new(FailureKind::CatalogItems, &prompt)
            .run(vec![9, 1], &mut round)
            .await;

        assert_eq!(outcome.residual, vec![9, 1]);
        assert_eq!(outcome.rounds, 0);
        assert!(outcome.declined);
        assert!(round.seen.is_empty());
    }

    #[tokio::test]
    async fn round_cap_stops_auto_approval() {
        let prompt = FixedAnswer(true);
        let mut round = flaky(usize::MAX);

        let outcome = RecoveryLoop::new(FailureKind::Downloads, &prompt)
            .with_max_rounds(Some(3))
            .run(vec![4], &mut round)
            .await;

        assert_eq!(outcome.residual, vec![4]);
        assert_eq!(outcome.rounds, 3);
        assert!(!outcome.declined);
    }

    #[tokio::test]
    async fn nothing_failed_means_no_prompt() {
        let prompt = Scripted::new(&[true]);
        let outcome = RecoveryLoop::new(FailureKind::Downloads, &prompt)
            .run(Vec::<u32>::new(), &mut flaky(1))
            .await;
        assert_eq!(outcome.rounds, 0);
        assert_eq!(*prompt.asked.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn steps_through_every_state() {
        let prompt = FixedAnswer(true);
        let machine = RecoveryLoop::new(FailureKind::Downloads, &prompt);
        let mut round = flaky(1);
        let mut rounds = 0;

        let state = machine.step(RecoveryState::Collecting(vec![1]), &mut round, &mut rounds).await;
        assert_eq!(state, RecoveryState::AwaitingOperatorDecision(vec![1]));
        let state = machine.step(state, &mut round, &mut rounds).await;
        assert_eq!(state, RecoveryState::Retrying(vec![1]));
        let state = machine.step(state, &mut round, &mut rounds).await;
        assert_eq!(state, RecoveryState::Collecting(vec![]));
        let state = machine.step(state, &mut round, &mut rounds).await;
        assert!(matches!(state, RecoveryState::Done(RecoveryOutcome { rounds: 1, .. })));
    }
}
