//! Store trait and the types that cross it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Complaint, ComplaintStatus, Officer, TriageResult};

/// Errors that can occur when talking to a store.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Duplicate id: {0}")]
    Duplicate(String),
}

/// Partial update of a complaint. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComplaintUpdate {
    pub status: Option<ComplaintStatus>,
    pub department_id: Option<String>,
    pub assigned_to: Option<String>,
    pub ai_analysis: Option<TriageResult>,
    pub image_url: Option<String>,
    pub resolution_eta: Option<DateTime<Utc>>,
    /// Remove the current assignee. Takes precedence over `assigned_to`.
    #[serde(default)]
    pub clear_assignee: bool,
}

impl ComplaintUpdate {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.department_id.is_none()
            && self.assigned_to.is_none()
            && self.ai_analysis.is_none()
            && self.image_url.is_none()
            && self.resolution_eta.is_none()
            && !self.clear_assignee
    }

    /// Apply to an in-memory complaint and bump `last_updated`.
    pub fn apply_to(&self, complaint: &mut Complaint) {
        if let Some(status) = self.status {
            complaint.status = status;
        }
        if let Some(department_id) = &self.department_id {
            complaint.department_id = Some(department_id.clone());
        }
        if self.clear_assignee {
            complaint.assigned_to = None;
        } else if let Some(assigned_to) = &self.assigned_to {
            complaint.assigned_to = Some(assigned_to.clone());
        }
        if let Some(analysis) = &self.ai_analysis {
            complaint.ai_analysis = Some(analysis.clone());
        }
        if let Some(image_url) = &self.image_url {
            complaint.image_url = Some(image_url.clone());
        }
        if let Some(eta) = self.resolution_eta {
            complaint.resolution_eta = Some(eta);
        }
        complaint.last_updated = Utc::now();
    }
}

/// Maximum complaints returned by one listing.
pub const DEFAULT_LIST_LIMIT: usize = 1000;

/// Listing filter. Every set field must match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplaintFilter {
    pub citizen_id: Option<String>,
    pub department_id: Option<String>,
    pub status: Option<ComplaintStatus>,
    pub limit: usize,
    /// Order by creation time descending instead of ascending
    #[serde(default)]
    pub newest_first: bool,
}

impl Default for ComplaintFilter {
    fn default() -> Self {
        Self {
            citizen_id: None,
            department_id: None,
            status: None,
            limit: DEFAULT_LIST_LIMIT,
            newest_first: false,
        }
    }
}

impl ComplaintFilter {
    pub fn with_status(mut self, status: ComplaintStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_department(mut self, department_id: impl Into<String>) -> Self {
        self.department_id = Some(department_id.into());
        self
    }

    pub fn with_citizen(mut self, citizen_id: impl Into<String>) -> Self {
        self.citizen_id = Some(citizen_id.into());
        self
    }

    pub fn recent(mut self, limit: usize) -> Self {
        self.newest_first = true;
        self.limit = limit;
        self
    }

    pub fn matches(&self, complaint: &Complaint) -> bool {
        self.citizen_id
            .as_ref()
            .map_or(true, |c| *c == complaint.citizen_id)
            && self
                .department_id
                .as_ref()
                .map_or(true, |d| complaint.department_id.as_ref() == Some(d))
            && self.status.map_or(true, |s| s == complaint.status)
    }
}

/// Precondition on an officer slot claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotGuard {
    /// Append regardless of the current count
    Unchecked,
    /// Append only if the officer still holds exactly this many complaints
    ExpectedCount(usize),
}

/// Persistence operations used by the pipeline.
///
/// Implementations must be safe to share across concurrently running
/// submissions.
#[async_trait]
pub trait TriageStore: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    async fn insert_complaint(&self, complaint: &Complaint) -> Result<(), StoreError>;

    async fn find_complaint(&self, id: &str) -> Result<Option<Complaint>, StoreError>;

    /// Complaints matching `filter`, oldest first unless `newest_first` is set.
    async fn find_complaints(&self, filter: &ComplaintFilter) -> Result<Vec<Complaint>, StoreError>;

    /// Number of complaints matching `filter`, ignoring its limit.
    async fn count_complaints(&self, filter: &ComplaintFilter) -> Result<u64, StoreError>;

    /// Apply a patch. Returns whether a complaint with `id` existed.
    async fn update_complaint(&self, id: &str, update: &ComplaintUpdate) -> Result<bool, StoreError>;

    /// Append a triage outcome to the audit trail.
    async fn record_analysis(&self, result: &TriageResult) -> Result<(), StoreError>;

    /// Officers of a department, in natural store order.
    async fn find_officers(&self, department_id: &str) -> Result<Vec<Officer>, StoreError>;

    /// Append `complaint_id` to the officer's active set.
    ///
    /// Returns `false` if the officer is gone or the guard no longer holds.
    async fn claim_officer_slot(
        &self,
        officer_id: &str,
        complaint_id: &str,
        guard: SlotGuard,
    ) -> Result<bool, StoreError>;

    /// Remove `complaint_id` from the officer's active set.
    async fn release_officer_slot(
        &self,
        officer_id: &str,
        complaint_id: &str,
    ) -> Result<bool, StoreError>;
}
