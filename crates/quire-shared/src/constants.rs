/// Application name
pub const APP_NAME: &str = "Quire";

/// Group number of this journal within the federation, unless overridden
pub const DEFAULT_GROUP_NUMBER: u32 = 13;

/// Maximum length of a first or last name
pub const MAX_PERSON_NAME_LEN: usize = 32;

/// Maximum length of a submission name
pub const MAX_SUBMISSION_NAME_LEN: usize = 128;

/// Maximum length of an email address
pub const MAX_EMAIL_LEN: usize = 254;

/// Maximum length of a category tag
pub const MAX_TAG_LEN: usize = 32;

/// Password length bounds (inclusive)
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 64;

/// Characters accepted as the "special" class of the password policy
pub const PASSWORD_SPECIALS: &str = "!@#$%^&*()-_=+[]{};:,.<>?/|~";

/// Maximum size of a single uploaded file body in bytes (50 MiB)
pub const MAX_FILE_SIZE: usize = 50 * 1024 * 1024;

/// Header carrying a peer journal's long-lived bearer token
pub const SECURITY_TOKEN_HEADER: &str = "X-FOREIGNJOURNAL-SECURITY-TOKEN";

/// Optional header naming the group a peer claims to be
pub const PEER_GROUP_HEADER: &str = "X-FOREIGNJOURNAL-GROUP";

/// Body projected for deleted comments: base64("[deleted]")
pub const DELETED_COMMENT_BODY: &str = "W2RlbGV0ZWRd";

/// Name projected for soft-deleted users
pub const DELETED_USER_NAME: &str = "[deleted]";

/// Directory (under a submission) holding sidecars and metadata
pub const DATA_DIR_NAME: &str = ".data";

/// Directory (under the FS root) receiving subtrees with no relational row
pub const QUARANTINE_DIR_NAME: &str = ".quarantine";

/// Infix of in-flight temporary files written next to their target
pub const TEMP_FILE_MARKER: &str = ".quire-tmp-";

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    #[test]
    fn deleted_sentinel_decodes() {
        let raw = STANDARD.decode(DELETED_COMMENT_BODY).unwrap();
        assert_eq!(raw, b"[deleted]");
    }
}
