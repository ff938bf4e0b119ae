use clap::Parser;
use console::style;
use env_logger::Env;
use illust_dl::Error;
use illust_dl::cli::{self, Args};

/// Exit status after an interrupted run (128 + SIGINT).
const EXIT_INTERRUPTED: i32 = 130;
/// Exit status for setup failures: bad config, session or author.
const EXIT_FATAL: i32 = 2;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    match cli::run(args).await {
        Ok(()) => {}
        Err(Error::Cancelled) => {
            eprintln!("{} run was cancelled", style("interrupted:").yellow().bold());
            std::process::exit(EXIT_INTERRUPTED);
        }
        Err(e) => {
            eprintln!("{} {e}", style("error:").red().bold());
            std::process::exit(if e.is_fatal() { EXIT_FATAL } else { 1 });
        }
    }
}
