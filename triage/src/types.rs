//! Data model shared by the pipeline, the stores and the front ends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Department id written onto a complaint when triage is exhausted.
pub const SENTINEL_DEPARTMENT_ID: &str = "ERROR";

/// Version tag carried by the sentinel result.
pub const SENTINEL_VERSION: &str = "error";

/// Lifecycle status of a complaint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ComplaintStatus {
    /// Submitted, not yet picked up
    #[default]
    Pending,
    /// An officer is working on it
    InProgress,
    /// Closed
    Resolved,
    /// Raised above the assigned officer
    Escalated,
}

impl ComplaintStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Escalated => "escalated",
        }
    }

    /// Whether a complaint in this status may move to `next`.
    ///
    /// Re-applying the current status is always accepted. `Resolved` is terminal.
    pub fn can_transition_to(&self, next: ComplaintStatus) -> bool {
        use ComplaintStatus::*;

        if *self == next {
            return true;
        }

        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Escalated)
                | (InProgress, Resolved)
                | (InProgress, Escalated)
                | (Escalated, InProgress)
                | (Escalated, Resolved)
        )
    }
}

impl std::fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ComplaintStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "in_progress" | "in-progress" => Ok(Self::InProgress),
            "resolved" => Ok(Self::Resolved),
            "escalated" => Ok(Self::Escalated),
            other => Err(format!("unknown complaint status: {other}")),
        }
    }
}

/// Citizen-facing complaint category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum ComplaintCategory {
    Infrastructure,
    PublicServices,
    Administration,
    Sanitation,
    #[default]
    Others,
}

impl ComplaintCategory {
    pub const ALL: [ComplaintCategory; 5] = [
        Self::Infrastructure,
        Self::PublicServices,
        Self::Administration,
        Self::Sanitation,
        Self::Others,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Infrastructure => "infrastructure",
            Self::PublicServices => "public_services",
            Self::Administration => "administration",
            Self::Sanitation => "sanitation",
            Self::Others => "others",
        }
    }

    /// Lenient lookup used for oracle output; unknown values map to `Others`.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .unwrap_or(Self::Others)
    }
}

impl std::str::FromStr for ComplaintCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| format!("unknown complaint category: {s}"))
    }
}

/// Role of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Citizen,
    Officer,
    Admin,
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "citizen" => Ok(Self::Citizen),
            "officer" => Ok(Self::Officer),
            "admin" => Ok(Self::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// The current authenticated identity, as handed over by the auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user identifier (the citizen id on complaints they own)
    pub user_id: String,
    /// Role of the user
    pub role: UserRole,
    /// Department of an officer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_id: Option<String>,
}

impl Identity {
    pub fn citizen(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: UserRole::Citizen,
            department_id: None,
        }
    }

    pub fn officer(user_id: impl Into<String>, department_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: UserRole::Officer,
            department_id: Some(department_id.into()),
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: UserRole::Admin,
            department_id: None,
        }
    }
}

/// Fields a citizen supplies when filing a complaint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewComplaint {
    pub citizen_id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    #[serde(default)]
    pub category: ComplaintCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// A stored complaint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Complaint {
    /// Opaque identifier generated at creation
    pub id: String,
    /// Owner of the complaint
    pub citizen_id: String,
    pub title: String,
    pub description: String,
    /// Free-text location
    pub location: String,
    pub category: ComplaintCategory,
    pub status: ComplaintStatus,
    /// Set once triage completes
    pub department_id: Option<String>,
    /// Officer holding the complaint, if any was eligible
    pub assigned_to: Option<String>,
    /// Latest triage outcome (or the failure sentinel)
    pub ai_analysis: Option<TriageResult>,
    /// Attachment URL from the object store
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    pub resolution_eta: Option<DateTime<Utc>>,
}

impl Complaint {
    /// Build a fresh `pending` complaint with a new identifier.
    pub fn new(new: NewComplaint) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            citizen_id: new.citizen_id,
            title: new.title,
            description: new.description,
            location: new.location,
            category: new.category,
            status: ComplaintStatus::Pending,
            department_id: None,
            assigned_to: None,
            ai_analysis: None,
            image_url: new.image_url,
            created_at: now,
            last_updated: now,
            resolution_eta: None,
        }
    }

    /// Immutable view handed to the oracle.
    pub fn snapshot(&self) -> ComplaintSnapshot {
        ComplaintSnapshot {
            title: self.title.clone(),
            description: self.description.clone(),
            location: self.location.clone(),
            category: self.category,
        }
    }

    /// Whether triage has written its outcome (success or sentinel).
    pub fn is_triaged(&self) -> bool {
        self.ai_analysis.is_some()
    }
}

/// What the oracle sees of a complaint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplaintSnapshot {
    pub title: String,
    pub description: String,
    pub location: String,
    pub category: ComplaintCategory,
}

/// Structured outcome of triaging one complaint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct TriageResult {
    pub id: String,
    pub complaint_id: String,
    /// Resolved department, or [`SENTINEL_DEPARTMENT_ID`]
    pub department_id: String,
    /// Normalized to [0, 1]
    pub priority_score: f64,
    /// Rationale text
    pub analysis_text: String,
    pub officer_recommendation: String,
    pub category_prediction: ComplaintCategory,
    /// Oracle model tag, or [`SENTINEL_VERSION`]
    pub version: String,
    pub created_at: DateTime<Utc>,
}

impl TriageResult {
    /// The degraded result attached after every attempt failed.
    pub fn sentinel(complaint_id: impl Into<String>, attempts: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            complaint_id: complaint_id.into(),
            department_id: SENTINEL_DEPARTMENT_ID.to_string(),
            priority_score: 0.0,
            analysis_text: format!(
                "Error during AI analysis after {attempts} attempts. Please try again later."
            ),
            officer_recommendation: "Unable to generate recommendation due to error.".to_string(),
            category_prediction: ComplaintCategory::Others,
            version: SENTINEL_VERSION.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn is_sentinel(&self) -> bool {
        self.department_id == SENTINEL_DEPARTMENT_ID
    }
}

/// An officer as seen by the assignment engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Officer {
    pub id: String,
    pub name: String,
    pub department_id: String,
    /// Complaints currently held, in assignment order
    #[serde(default)]
    pub active_complaints: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

impl Officer {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        department_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            department_id: department_id.into(),
            active_complaints: Vec::new(),
            last_updated: Utc::now(),
        }
    }

    pub fn with_active(mut self, complaint_ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.active_complaints = complaint_ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn active_count(&self) -> usize {
        self.active_complaints.len()
    }
}
