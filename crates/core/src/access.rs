//! Access decision rules (GRANT/DENY for physical entry).
//!
//! The rules are pure: the engine loads the user and memberships, then asks
//! [`evaluate_entry`] for a verdict. Reasons are stable strings because
//! access controllers display and log them verbatim.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::membership::MembershipStatus;

pub const REASON_GRANTED: &str = "Access granted";
pub const REASON_USER_NOT_FOUND: &str = "User not found";
pub const REASON_NO_ACTIVE_MEMBERSHIP: &str = "No active membership";
pub const REASON_OUTSTANDING_DEBT: &str = "Outstanding debt";
pub const REASON_MEMBERSHIP_LOOKUP_FAILED: &str = "Error fetching memberships";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    In,
    Out,
}

impl Direction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Out => "out",
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(Self::In),
            "out" => Ok(Self::Out),
            other => Err(format!("unknown direction '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Granted,
    Denied,
}

impl Decision {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "granted" => Ok(Self::Granted),
            "denied" => Ok(Self::Denied),
            other => Err(format!("unknown decision '{other}'")),
        }
    }
}

/// A decision together with the reason persisted alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub decision: Decision,
    pub reason: &'static str,
}

impl Verdict {
    pub const fn granted() -> Self {
        Self {
            decision: Decision::Granted,
            reason: REASON_GRANTED,
        }
    }

    pub const fn denied(reason: &'static str) -> Self {
        Self {
            decision: Decision::Denied,
            reason,
        }
    }
}

/// The two membership fields that influence entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MembershipSnapshot {
    pub status: MembershipStatus,
    pub outstanding_balance_cents: i64,
}

/// Evaluate an inbound entry against the user's memberships.
///
/// Requires at least one active membership, and denies if any active
/// membership carries a positive balance.
pub fn evaluate_entry(memberships: &[MembershipSnapshot]) -> Verdict {
    let mut active = memberships
        .iter()
        .filter(|m| m.status == MembershipStatus::Active)
        .peekable();

    if active.peek().is_none() {
        return Verdict::denied(REASON_NO_ACTIVE_MEMBERSHIP);
    }

    if active.any(|m| m.outstanding_balance_cents > 0) {
        return Verdict::denied(REASON_OUTSTANDING_DEBT);
    }

    Verdict::granted()
}
