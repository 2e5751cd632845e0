//! Input validation rules shared by the store and the HTTP layer.
//!
//! Every check returns a [`ValidationError`] naming the offending field so
//! that callers can surface it verbatim as a 400 response.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::constants::{
    MAX_EMAIL_LEN, MAX_PASSWORD_LEN, MAX_PERSON_NAME_LEN, MAX_SUBMISSION_NAME_LEN, MAX_TAG_LEN,
    MIN_PASSWORD_LEN, PASSWORD_SPECIALS, TEMP_FILE_MARKER,
};
use crate::error::ValidationError;

/// Trim and lowercase an email address for storage and comparison.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::Missing { field: "email" });
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(ValidationError::TooLong {
            field: "email",
            max: MAX_EMAIL_LEN,
        });
    }
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::Email);
    };
    if local.is_empty()
        || domain.contains('@')
        || !domain.contains('.')
        || domain.starts_with('.')
        || domain.ends_with('.')
        || email.chars().any(char::is_whitespace)
    {
        return Err(ValidationError::Email);
    }
    Ok(())
}

/// Required, at most 32 characters.
pub fn validate_person_name(field: &'static str, value: &str) -> Result<(), ValidationError> {
    validate_text(field, value, MAX_PERSON_NAME_LEN)
}

/// Required, at most 128 characters.
pub fn validate_submission_name(name: &str) -> Result<(), ValidationError> {
    validate_text("name", name, MAX_SUBMISSION_NAME_LEN)
}

fn validate_text(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Missing { field });
    }
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

/// Length in [8, 64]; at least one lowercase, uppercase, digit and special
/// character; nothing outside alphanumerics and the special class.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(ValidationError::Password("too short"));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(ValidationError::Password("too long"));
    }

    let is_special = |c: char| PASSWORD_SPECIALS.contains(c);
    if password
        .chars()
        .any(|c| !(c.is_ascii_alphanumeric() || is_special(c)))
    {
        return Err(ValidationError::Password("contains a disallowed character"));
    }
    if !password.chars().any(|c| c.is_ascii_lowercase()) {
        return Err(ValidationError::Password("needs a lowercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::Password("needs an uppercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ValidationError::Password("needs a digit"));
    }
    if !password.chars().any(is_special) {
        return Err(ValidationError::Password("needs a special character"));
    }
    Ok(())
}

/// Normalize a submission-relative file path.
///
/// Backslashes become forward slashes, `.` and empty segments are dropped,
/// and any `..` segment or control character is rejected, as is a segment
/// carrying the store's temp-file marker.
pub fn normalize_path(path: &str) -> Result<String, ValidationError> {
    let invalid = || ValidationError::Path(path.to_string());

    if path.chars().any(char::is_control) {
        return Err(invalid());
    }

    let unified = path.replace('\\', "/");
    let mut segments = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => continue,
            ".." => return Err(invalid()),
            s if s.contains(TEMP_FILE_MARKER) => return Err(invalid()),
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        return Err(invalid());
    }
    Ok(segments.join("/"))
}

/// Whether two normalized paths cannot live in the same tree: they are
/// equal, or one names a directory holding the other.
pub fn paths_overlap(a: &str, b: &str) -> bool {
    let nested = |outer: &str, inner: &str| {
        inner.len() > outer.len() && inner.starts_with(outer) && inner.as_bytes()[outer.len()] == b'/'
    };
    a == b || nested(a, b) || nested(b, a)
}

/// Category tags: 1..=32 characters of lowercase alphanumerics or `-_.+#`.
pub fn validate_tag(tag: &str) -> Result<(), ValidationError> {
    let ok = !tag.is_empty()
        && tag.len() <= MAX_TAG_LEN
        && tag
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "-_.+#".contains(c));
    if ok {
        Ok(())
    } else {
        Err(ValidationError::Tag(tag.to_string()))
    }
}

/// `0 <= start <= end`.
pub fn validate_line_range(start: i64, end: i64) -> Result<(), ValidationError> {
    if start < 0 || end < 0 || start > end {
        return Err(ValidationError::LineRange { start, end });
    }
    Ok(())
}

/// Decode a standard base64 field from the wire.
pub fn decode_base64(field: &'static str, value: &str) -> Result<Vec<u8>, ValidationError> {
    STANDARD
        .decode(value.trim())
        .map_err(|_| ValidationError::Base64(field))
}

pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_boundaries() {
        assert!(validate_password("aB3$efgh").is_ok());
        assert!(validate_password("aB3$efg").is_err());
        let long = format!("aB3$ {}", "x".repeat(60));
        assert!(validate_password(&long).is_err());
        assert!(validate_password(&format!("aB3${}", "x".repeat(60))).is_ok());
        assert!(validate_password(&format!("aB3${}", "x".repeat(61))).is_err());
    }

    #[test]
    fn test_password_classes() {
        assert_eq!(
            validate_password("ab3$efgh"),
            Err(ValidationError::Password("needs an uppercase letter"))
        );
        assert_eq!(
            validate_password("AB3$EFGH"),
            Err(ValidationError::Password("needs a lowercase letter"))
        );
        assert_eq!(
            validate_password("aBc$efgh"),
            Err(ValidationError::Password("needs a digit"))
        );
        assert_eq!(
            validate_password("aB3defgh"),
            Err(ValidationError::Password("needs a special character"))
        );
        assert_eq!(
            validate_password("aB3$efgh\u{e9}"),
            Err(ValidationError::Password("contains a disallowed character"))
        );
    }

    #[test]
    fn test_email() {
        assert!(validate_email("ada@example.org").is_ok());
        assert!(validate_email("").is_err());
        assert!(validate_email("ada.example.org").is_err());
        assert!(validate_email("ada@localhost").is_err());
        assert!(validate_email("a b@example.org").is_err());
        assert_eq!(normalize_email("  Ada@Example.ORG "), "ada@example.org");
    }

    #[test]
    fn test_names() {
        assert!(validate_person_name("firstName", "Ada").is_ok());
        assert!(validate_person_name("firstName", " ").is_err());
        assert!(validate_person_name("lastName", &"x".repeat(33)).is_err());
        assert!(validate_submission_name(&"x".repeat(128)).is_ok());
        assert!(validate_submission_name(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("main.c").unwrap(), "main.c");
        assert_eq!(normalize_path("./src//lib\\util.c").unwrap(), "src/lib/util.c");
        assert_eq!(normalize_path("/abs/path.c").unwrap(), "abs/path.c");
        assert!(normalize_path("../etc/passwd").is_err());
        assert!(normalize_path("src/../main.c").is_err());
        assert!(normalize_path("").is_err());
        assert!(normalize_path("./").is_err());
        assert!(normalize_path("a\u{0}b").is_err());
    }

    #[test]
    fn test_normalize_path_rejects_temp_marker() {
        assert!(normalize_path("notes.quire-tmp-1").is_err());
        assert!(normalize_path("src/main.c.quire-tmp-0123456789abcdef0123456789abcdef").is_err());
        assert!(normalize_path("a.quire-tmp-x/b.c").is_err());
        assert_eq!(normalize_path("quire-tmp.txt").unwrap(), "quire-tmp.txt");
    }

    #[test]
    fn test_paths_overlap() {
        assert!(paths_overlap("src", "src"));
        assert!(paths_overlap("src", "src/main.c"));
        assert!(paths_overlap("src/lib/util.c", "src"));
        assert!(!paths_overlap("src", "src.c"));
        assert!(!paths_overlap("src/main.c", "src/main.cpp"));
        assert!(!paths_overlap("lib/src", "src"));
    }

    #[test]
    fn test_tags() {
        assert!(validate_tag("c++").is_ok());
        assert!(validate_tag("machine-learning").is_ok());
        assert!(validate_tag("").is_err());
        assert!(validate_tag("Upper").is_err());
        assert!(validate_tag("has space").is_err());
    }

    #[test]
    fn test_line_range() {
        assert!(validate_line_range(1, 1).is_ok());
        assert!(validate_line_range(0, 10).is_ok());
        assert!(validate_line_range(3, 2).is_err());
        assert!(validate_line_range(-1, 2).is_err());
    }

    #[test]
    fn test_base64() {
        assert_eq!(decode_base64("body", &encode_base64(b"lgtm")).unwrap(), b"lgtm");
        assert_eq!(
            decode_base64("body", "***"),
            Err(ValidationError::Base64("body"))
        );
    }
}
