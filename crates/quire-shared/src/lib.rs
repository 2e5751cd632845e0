// Domain vocabulary shared by the journal store and the HTTP server.

pub mod constants;
pub mod error;
pub mod identity;
pub mod types;
pub mod validation;

pub use error::ValidationError;
pub use identity::{mint_global_user_id, GlobalUserId};
pub use types::{ApprovalStatus, Capabilities, Capability, SubmissionState, UserRole};
