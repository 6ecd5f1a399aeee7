use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// What the data subject is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DsrRequestType {
    Export,
    Delete,
    Rectify,
}

impl DsrRequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DsrRequestType::Export => "export",
            DsrRequestType::Delete => "delete",
            DsrRequestType::Rectify => "rectify",
        }
    }

    /// Description is optional only for exports.
    pub fn requires_description(&self) -> bool {
        !matches!(self, DsrRequestType::Export)
    }
}

impl FromStr for DsrRequestType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "export" => Ok(DsrRequestType::Export),
            "delete" => Ok(DsrRequestType::Delete),
            "rectify" => Ok(DsrRequestType::Rectify),
            other => Err(format!("unknown request type: {other}")),
        }
    }
}

impl fmt::Display for DsrRequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request lifecycle. Transitions are monotonic along
/// pending -> in_progress -> {completed, rejected, cancelled}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DsrStatus {
    Pending,
    InProgress,
    Completed,
    Rejected,
    Cancelled,
}

impl DsrStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DsrStatus::Pending => "pending",
            DsrStatus::InProgress => "in_progress",
            DsrStatus::Completed => "completed",
            DsrStatus::Rejected => "rejected",
            DsrStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DsrStatus::Completed | DsrStatus::Rejected | DsrStatus::Cancelled
        )
    }

    /// Whether moving to `next` keeps the lifecycle monotonic.
    pub fn can_transition_to(&self, next: DsrStatus) -> bool {
        match self {
            DsrStatus::Pending => {
                matches!(next, DsrStatus::InProgress | DsrStatus::Cancelled)
            }
            DsrStatus::InProgress => next.is_terminal(),
            // Terminal states never move.
            _ => false,
        }
    }
}

impl FromStr for DsrStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DsrStatus::Pending),
            "in_progress" => Ok(DsrStatus::InProgress),
            "completed" => Ok(DsrStatus::Completed),
            "rejected" => Ok(DsrStatus::Rejected),
            "cancelled" => Ok(DsrStatus::Cancelled),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

impl fmt::Display for DsrStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DsrPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl DsrPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            DsrPriority::Low => "low",
            DsrPriority::Normal => "normal",
            DsrPriority::High => "high",
            DsrPriority::Urgent => "urgent",
        }
    }
}

impl FromStr for DsrPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(DsrPriority::Low),
            "normal" => Ok(DsrPriority::Normal),
            "high" => Ok(DsrPriority::High),
            "urgent" => Ok(DsrPriority::Urgent),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

impl fmt::Display for DsrPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted data-subject-rights request. Rows are never physically
/// deleted; they are retained for compliance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DsrRequest {
    pub id: Uuid,
    pub request_type: DsrRequestType,
    pub email: String,
    pub full_name: String,
    pub status: DsrStatus,
    pub priority: DsrPriority,
    pub description: Option<String>,
    pub data_types: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
    pub rejected_reason: Option<String>,
}

/// Fields required to create a request (status starts at pending).
#[derive(Debug, Clone)]
pub struct NewDsrRequest {
    pub request_type: DsrRequestType,
    pub email: String,
    pub full_name: String,
    pub priority: DsrPriority,
    pub description: Option<String>,
    pub data_types: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_are_monotonic() {
        assert!(DsrStatus::Pending.can_transition_to(DsrStatus::InProgress));
        assert!(DsrStatus::Pending.can_transition_to(DsrStatus::Cancelled));
        assert!(DsrStatus::InProgress.can_transition_to(DsrStatus::Completed));
        assert!(DsrStatus::InProgress.can_transition_to(DsrStatus::Rejected));
        assert!(DsrStatus::InProgress.can_transition_to(DsrStatus::Cancelled));

        // No backward or out-of-order moves.
        assert!(!DsrStatus::Pending.can_transition_to(DsrStatus::Completed));
        assert!(!DsrStatus::InProgress.can_transition_to(DsrStatus::Pending));
        assert!(!DsrStatus::Completed.can_transition_to(DsrStatus::InProgress));
        assert!(!DsrStatus::Rejected.can_transition_to(DsrStatus::Completed));
        assert!(!DsrStatus::Cancelled.can_transition_to(DsrStatus::Pending));
    }

    #[test]
    fn enum_string_round_trips() {
        for t in [
            DsrRequestType::Export,
            DsrRequestType::Delete,
            DsrRequestType::Rectify,
        ] {
            assert_eq!(t.as_str().parse::<DsrRequestType>().unwrap(), t);
        }
        for s in [
            DsrStatus::Pending,
            DsrStatus::InProgress,
            DsrStatus::Completed,
            DsrStatus::Rejected,
            DsrStatus::Cancelled,
        ] {
            assert_eq!(s.as_str().parse::<DsrStatus>().unwrap(), s);
        }
        assert!("unknown".parse::<DsrStatus>().is_err());
    }

    #[test]
    fn description_required_per_type() {
        assert!(!DsrRequestType::Export.requires_description());
        assert!(DsrRequestType::Delete.requires_description());
        assert!(DsrRequestType::Rectify.requires_description());
    }
}
