use thiserror::Error;

/// Field-level input validation failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    Missing { field: &'static str },

    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("Invalid email address")]
    Email,

    #[error("Password rejected: {0}")]
    Password(&'static str),

    #[error("Invalid file path '{0}'")]
    Path(String),

    #[error("Invalid category tag '{0}'")]
    Tag(String),

    #[error("Invalid line range {start}..={end}")]
    LineRange { start: i64, end: i64 },

    #[error("Invalid global user id '{0}'")]
    GlobalUserId(String),

    #[error("{0} is not valid base64")]
    Base64(&'static str),

    #[error("Unknown user type code {0}")]
    UserType(u8),

    #[error("Malformed archive: {0}")]
    Archive(String),
}
