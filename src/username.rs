//! Username validation
//!
//! A display name is accepted when, after trimming surrounding whitespace,
//! it has 1 to 25 characters (code points, not bytes) drawn from: any
//! character in a Unicode Letter (L*) or Number (N*) general category,
//! `_`, `-` and the ASCII space.

use unicode_general_category::{get_general_category, GeneralCategory};

use crate::error::UsernameError;

/// Maximum username length in characters
pub const MAX_USERNAME_LENGTH: usize = 25;

/// Validate a proposed display name
///
/// Returns the trimmed name on success. Duplicate names are not checked.
pub fn validate_username(raw: &str) -> Result<String, UsernameError> {
    let name = raw.trim();

    let len = name.chars().count();
    if len == 0 {
        return Err(UsernameError::Empty);
    }
    if len > MAX_USERNAME_LENGTH {
        return Err(UsernameError::TooLong {
            len,
            max: MAX_USERNAME_LENGTH,
        });
    }

    if let Some(bad) = name.chars().find(|&ch| !is_allowed(ch)) {
        return Err(UsernameError::InvalidChar(bad));
    }

    Ok(name.to_string())
}

/// Boolean form of [`validate_username`]
pub fn is_valid_username(raw: &str) -> bool {
    validate_username(raw).is_ok()
}

/// Letters and numbers by general category, not by the broader
/// Alphabetic property (which also covers symbols and combining marks)
fn is_allowed(ch: char) -> bool {
    if matches!(ch, '_' | '-' | ' ') {
        return true;
    }
    matches!(
        get_general_category(ch),
        GeneralCategory::UppercaseLetter
            | GeneralCategory::LowercaseLetter
            | GeneralCategory::TitlecaseLetter
            | GeneralCategory::ModifierLetter
            | GeneralCategory::OtherLetter
            | GeneralCategory::DecimalNumber
            | GeneralCategory::LetterNumber
            | GeneralCategory::OtherNumber
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_simple_name() {
        assert!(is_valid_username("Alice_42"));
        assert_eq!(validate_username("  Alice_42 \t").unwrap(), "Alice_42");
    }

    #[test]
    fn test_rejects_too_long() {
        let name = "a".repeat(26);
        assert_eq!(
            validate_username(&name),
            Err(UsernameError::TooLong { len: 26, max: 25 })
        );
        assert!(is_valid_username(&"a".repeat(25)));
    }

    #[test]
    fn test_rejects_empty() {
        assert_eq!(validate_username(""), Err(UsernameError::Empty));
        assert_eq!(validate_username("   "), Err(UsernameError::Empty));
    }

    #[test]
    fn test_rejects_disallowed_character() {
        assert_eq!(
            validate_username("bad!name"),
            Err(UsernameError::InvalidChar('!'))
        );
        assert!(!is_valid_username("tab\tinside"));
        assert!(!is_valid_username("dot.name"));
    }

    #[test]
    fn test_accepts_unicode_letters_counted_by_char() {
        // 25 characters but far more than 25 bytes
        let name = format!("{}{}", "é".repeat(12), "日".repeat(13));
        assert_eq!(name.chars().count(), 25);
        assert!(name.len() > 25);
        assert!(is_valid_username(&name));
    }

    #[test]
    fn test_accepts_unicode_digits_space_and_hyphen() {
        assert!(is_valid_username("Ωmega-٣ user"));
        assert!(is_valid_username("ユーザー_1"));
    }

    #[test]
    fn test_rejects_alphabetic_symbols_and_marks() {
        // Circled letter is a symbol (So), not a letter
        assert_eq!(
            validate_username("\u{24B6}lice"),
            Err(UsernameError::InvalidChar('\u{24B6}'))
        );
        // Combining marks (Mn, Mc) are Alphabetic but not letters
        assert_eq!(
            validate_username("a\u{0345}b"),
            Err(UsernameError::InvalidChar('\u{0345}'))
        );
        assert!(!is_valid_username("a\u{093F}"));
    }

    #[test]
    fn test_accepts_letter_and_number_categories() {
        // Lt, Lm, Nl and No
        assert!(is_valid_username("\u{01C5}ay"));
        assert!(is_valid_username("x\u{02B0}"));
        assert!(is_valid_username("\u{2163}"));
        assert!(is_valid_username("\u{00BD} pint"));
    }

    #[test]
    fn test_rejects_symbols_and_emoji() {
        assert!(!is_valid_username("smile😀"));
        assert!(!is_valid_username("a/b"));
        assert!(!is_valid_username("zero\u{200B}width"));
    }
}
