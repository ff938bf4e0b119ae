//! Filesystem-safe naming.

/// Name used when nothing printable survives sanitization.
pub const UNTITLED: &str = "Untitled";

/// Characters rejected by at least one mainstream filesystem.
const RESERVED: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Maps arbitrary text to a name that is safe as a single path component.
///
/// - Replaces `< > : " / \ | ? *` with `_`
/// - Removes ASCII control characters
/// - Trims leading/trailing whitespace and dots
/// - Falls back to [`UNTITLED`] when the result is empty
#[must_use]
pub fn sanitize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_ascii_control())
        .map(|c| if RESERVED.contains(&c) { '_' } else { c })
        .collect();

    let trimmed = cleaned.trim_matches(|c: char| c.is_whitespace() || c == '.');

    if trimmed.is_empty() {
        UNTITLED.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_reserved_characters() {
        assert_eq!(sanitize("a/b\\c:d*e?f\"g<h>i|j"), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn strips_control_characters() {
        assert_eq!(sanitize("tab\tnew\nline\x7f"), "tabnewline");
    }

    #[test]
    fn trims_dots_and_spaces() {
        assert_eq!(sanitize("  ..  title  ..  "), "title");
        assert_eq!(sanitize(". .x. ."), "x");
    }

    #[test]
    fn empty_result_is_untitled() {
        assert_eq!(sanitize(""), UNTITLED);
        assert_eq!(sanitize(" ... "), UNTITLED);
        assert_eq!(sanitize("\x01\x02"), UNTITLED);
    }

    #[test]
    fn keeps_unicode_titles() {
        assert_eq!(sanitize("夏の空 ☀"), "夏の空 ☀");
    }

    #[test]
    fn control_removal_can_expose_trimmable_edges() {
        assert_eq!(sanitize("\x00 name \x00"), "name");
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn sanitize_is_idempotent(s in any::<String>()) {
                let once = sanitize(&s);
                prop_assert_eq!(sanitize(&once), once);
            }

            #[test]
            fn sanitize_has_no_reserved_characters(s in any::<String>()) {
                let out = sanitize(&s);
                prop_assert!(!out.chars().any(|c| RESERVED.contains(&c) || c.is_ascii_control()));
            }

            #[test]
            fn sanitize_never_empty(s in any::<String>()) {
                prop_assert!(!sanitize(&s).is_empty());
            }
        }
    }
}
