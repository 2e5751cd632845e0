use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// A single permission a user may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Publisher,
    Reviewer,
    Editor,
}

impl Capability {
    const ALL: [Capability; 3] = [Self::Publisher, Self::Reviewer, Self::Editor];

    fn bit(self) -> u8 {
        match self {
            Self::Publisher => 0b001,
            Self::Reviewer => 0b010,
            Self::Editor => 0b100,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Publisher => "publisher",
            Self::Reviewer => "reviewer",
            Self::Editor => "editor",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of capabilities held by a user, persisted as a bitmask.
///
/// Serializes as a list such as `["publisher", "reviewer"]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Vec<Capability>", into = "Vec<Capability>")]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Capabilities = Capabilities(0);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0b111)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub fn with(mut self, capability: Capability) -> Self {
        self.0 |= capability.bit();
        self
    }

    pub fn union(self, other: Capabilities) -> Self {
        Self(self.0 | other.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.into_iter().filter(|c| self.contains(*c))
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Self::NONE, Self::with)
    }
}

impl From<Vec<Capability>> for Capabilities {
    fn from(list: Vec<Capability>) -> Self {
        list.into_iter().collect()
    }
}

impl From<Capabilities> for Vec<Capability> {
    fn from(caps: Capabilities) -> Self {
        caps.iter().collect()
    }
}

/// Legacy integer user-type codes used by older clients and peer journals.
///
/// The codes conflate combinations of capabilities; new code should work
/// with [`Capabilities`] and only convert at the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UserRole {
    None = 0,
    Publisher = 1,
    Reviewer = 2,
    PublisherReviewer = 3,
    Editor = 4,
}

impl UserRole {
    pub fn from_code(code: u8) -> Result<Self, ValidationError> {
        match code {
            0 => Ok(Self::None),
            1 => Ok(Self::Publisher),
            2 => Ok(Self::Reviewer),
            3 => Ok(Self::PublisherReviewer),
            4 => Ok(Self::Editor),
            other => Err(ValidationError::UserType(other)),
        }
    }

    pub fn capabilities(self) -> Capabilities {
        match self {
            Self::None => Capabilities::NONE,
            Self::Publisher => Capabilities::NONE.with(Capability::Publisher),
            Self::Reviewer => Capabilities::NONE.with(Capability::Reviewer),
            Self::PublisherReviewer => Capabilities::NONE
                .with(Capability::Publisher)
                .with(Capability::Reviewer),
            Self::Editor => Capabilities::NONE.with(Capability::Editor),
        }
    }
}

// ---------------------------------------------------------------------------
// Approval
// ---------------------------------------------------------------------------

/// Tri-state approval flag of a submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Unset,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unset" => Some(Self::Unset),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Terminal value requested by an editor decision.
    pub fn from_decision(approved: bool) -> Self {
        if approved {
            Self::Approved
        } else {
            Self::Rejected
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Unset)
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review lifecycle of a submission. Never persisted; always derived from
/// the approval flag and the reviewer/review counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubmissionState {
    Draft,
    ReviewPending,
    ReviewComplete,
    Approved,
    Rejected,
}

impl SubmissionState {
    pub fn derive(approval: ApprovalStatus, reviewers: usize, reviews: usize) -> Self {
        match approval {
            ApprovalStatus::Approved => Self::Approved,
            ApprovalStatus::Rejected => Self::Rejected,
            ApprovalStatus::Unset if reviewers == 0 => Self::Draft,
            ApprovalStatus::Unset if reviews >= reviewers => Self::ReviewComplete,
            ApprovalStatus::Unset => Self::ReviewPending,
        }
    }

    /// Whether an editor decision is legal from this state.
    pub fn accepts_decision(&self) -> bool {
        matches!(self, Self::ReviewComplete)
    }
}
