use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Length of a hyphenated UUID string.
const UUID_LEN: usize = 36;

/// A federation-wide user identity of the form `<group-number><uuid>`.
///
/// The group number prefix identifies the journal that minted the ID, so
/// users imported from peer journals keep their origin. Internal joins use
/// the full string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GlobalUserId(String);

impl GlobalUserId {
    /// Parse and validate an ID received at the edge.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        let s = s.trim();
        let invalid = || ValidationError::GlobalUserId(s.to_string());

        if s.len() <= UUID_LEN || !s.is_ascii() {
            return Err(invalid());
        }
        let (prefix, suffix) = s.split_at(s.len() - UUID_LEN);
        if !prefix.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        prefix.parse::<u32>().map_err(|_| invalid())?;
        Uuid::parse_str(suffix).map_err(|_| invalid())?;

        Ok(Self(s.to_string()))
    }

    /// Group number of the journal that minted this ID.
    pub fn group_number(&self) -> u32 {
        // Validated in `parse` / `mint_global_user_id`.
        self.0[..self.0.len() - UUID_LEN].parse().unwrap_or_default()
    }

    /// Whether this ID was minted by the journal with the given group number.
    pub fn is_local(&self, group_number: u32) -> bool {
        self.group_number() == group_number
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GlobalUserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for GlobalUserId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<GlobalUserId> for String {
    fn from(id: GlobalUserId) -> Self {
        id.0
    }
}

impl std::str::FromStr for GlobalUserId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Mint a new globally unique user ID: `concat(decimal(group), uuidv4())`.
pub fn mint_global_user_id(group_number: u32) -> GlobalUserId {
    GlobalUserId(format!("{}{}", group_number, Uuid::new_v4()))
}
