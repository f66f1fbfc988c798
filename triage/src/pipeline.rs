//! TriagePipeline - main entry point for complaint handling.
//!
//! Persists a complaint first, then drives the oracle and parser through the
//! retry controller, resolves the department, assigns an officer and writes
//! the outcome back. Only the initial insert can fail a submission; later
//! failures degrade the stored complaint instead of losing it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::assignment::{AssignedOfficer, AssignmentEngine};
use crate::backend::traits::OracleBackend;
use crate::config::{ParserConfig, ResponseFormat, TriageConfig};
use crate::directory::DepartmentDirectory;
use crate::oracle::OracleClient;
use crate::parser::{JsonResponseParser, LabeledLineParser, ParseContext, ResponseParser};
use crate::retry::{AttemptError, RetryController, RetryOutcome, RetryPolicy, Sleeper, TokioSleeper};
use crate::store::{ComplaintFilter, ComplaintUpdate, StoreError, TriageStore};
use crate::types::{
    Complaint, ComplaintStatus, Identity, NewComplaint, TriageResult, UserRole,
};

/// Errors from the lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Complaint not found: {0}")]
    NotFound(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Cannot move complaint from {from} to {to}")]
    InvalidTransition {
        from: ComplaintStatus,
        to: ComplaintStatus,
    },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Officer/admin change to a complaint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: Option<ComplaintStatus>,
    pub resolution_eta: Option<DateTime<Utc>>,
}

/// What one triage run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageReport {
    pub complaint_id: String,
    pub result: TriageResult,
    pub assigned: Option<AssignedOfficer>,
    pub attempts: u32,
}

impl TriageReport {
    pub fn is_sentinel(&self) -> bool {
        self.result.is_sentinel()
    }
}

/// Complaints shown on a citizen's dashboard.
pub const RECENT_COMPLAINTS: usize = 5;

/// A citizen's complaint counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitizenStats {
    pub total_complaints: u64,
    /// Pending or in progress
    pub active_complaints: u64,
    pub resolved_complaints: u64,
    /// Newest first
    pub recent_complaints: Vec<Complaint>,
}

/// Complaint triage pipeline.
pub struct TriagePipeline {
    store: Arc<dyn TriageStore>,
    oracle: OracleClient,
    parser: Arc<dyn ResponseParser>,
    directory: Arc<DepartmentDirectory>,
    retry: RetryController,
    assignment: AssignmentEngine,
}

impl TriagePipeline {
    /// Build a pipeline sleeping on the tokio timer between attempts.
    pub fn new(
        store: Arc<dyn TriageStore>,
        backend: Arc<dyn OracleBackend>,
        config: TriageConfig,
    ) -> Self {
        Self::with_sleeper(store, backend, config, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(
        store: Arc<dyn TriageStore>,
        backend: Arc<dyn OracleBackend>,
        config: TriageConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        let TriageConfig {
            oracle,
            retry,
            assignment,
            parser,
            directory,
        } = config;

        Self {
            oracle: OracleClient::new(backend, &directory, oracle),
            parser: parser_for(&parser),
            retry: RetryController::new(RetryPolicy::from(&retry), sleeper),
            assignment: AssignmentEngine::new(assignment),
            directory: Arc::new(directory),
            store,
        }
    }

    /// Swap the response parser.
    pub fn with_parser(mut self, parser: Arc<dyn ResponseParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn directory(&self) -> &DepartmentDirectory {
        &self.directory
    }

    pub fn store(&self) -> &Arc<dyn TriageStore> {
        &self.store
    }

    /// Whether the oracle backend answers its health probe.
    pub async fn oracle_available(&self) -> bool {
        self.oracle.is_available().await
    }

    /// Persist a new complaint, triage it and return the stored record.
    pub async fn submit(&self, new: NewComplaint) -> Result<Complaint, PipelineError> {
        let mut complaint = Complaint::new(new);
        self.store.insert_complaint(&complaint).await?;

        info!(
            complaint_id = %complaint.id,
            citizen_id = %complaint.citizen_id,
            "Complaint created"
        );

        let report = self.triage(&complaint).await;
        outcome_update(&report).apply_to(&mut complaint);

        match self.store.find_complaint(&complaint.id).await {
            Ok(Some(stored)) => Ok(stored),
            Ok(None) => Ok(complaint),
            Err(e) => {
                warn!(complaint_id = %complaint.id, error = %e, "Re-read after triage failed");
                Ok(complaint)
            }
        }
    }

    /// Triage an already persisted complaint on a background task.
    pub fn spawn_triage(self: &Arc<Self>, complaint: Complaint) -> JoinHandle<TriageReport> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move { pipeline.triage(&complaint).await })
    }

    /// Run triage for a persisted complaint and write the outcome onto it.
    ///
    /// Never fails: exhaustion yields the sentinel result and store errors
    /// after the insert are logged and absorbed.
    pub async fn triage(&self, complaint: &Complaint) -> TriageReport {
        let snapshot = complaint.snapshot();
        let ctx = ParseContext {
            complaint_id: &complaint.id,
            version: self.oracle.version(),
            directory: &self.directory,
        };
        let oracle = &self.oracle;
        let parser = &self.parser;

        let outcome = self
            .retry
            .run("triage", |attempt| {
                let snapshot = &snapshot;
                async move {
                    debug!(complaint_id = %ctx.complaint_id, attempt = attempt, "Classifying complaint");
                    let raw = oracle.classify(snapshot).await?;
                    let result = parser.parse(&raw, &ctx)?;
                    Ok::<_, AttemptError>(result)
                }
            })
            .await;

        let attempts = outcome.attempts();
        let result = match outcome {
            RetryOutcome::Done { value, attempts } => {
                info!(
                    complaint_id = %complaint.id,
                    department_id = %value.department_id,
                    priority = value.priority_score,
                    attempts = attempts,
                    "Triage completed"
                );
                if let Err(e) = self.store.record_analysis(&value).await {
                    warn!(complaint_id = %complaint.id, error = %e, "Failed to record analysis");
                }
                value
            }
            RetryOutcome::Exhausted {
                last_error,
                attempts,
            } => {
                error!(
                    complaint_id = %complaint.id,
                    attempts = attempts,
                    error = %last_error,
                    "All triage attempts failed"
                );
                TriageResult::sentinel(&complaint.id, attempts)
            }
        };

        // A previously routed complaint keeps its routing when a re-run fails
        if result.is_sentinel() && complaint.department_id.is_some() {
            warn!(
                complaint_id = %complaint.id,
                department_id = ?complaint.department_id,
                "Keeping previous triage outcome"
            );
            return TriageReport {
                complaint_id: complaint.id.clone(),
                result,
                assigned: None,
                attempts,
            };
        }

        let reroute = !result.is_sentinel() && complaint.status != ComplaintStatus::Resolved;
        let previous = complaint.assigned_to.as_deref().filter(|_| reroute);
        if let Some(officer_id) = previous {
            self.release_slot(officer_id, &complaint.id).await;
        }

        let assigned = if reroute {
            self.assign(&complaint.id, &result.department_id).await
        } else {
            None
        };

        let report = TriageReport {
            complaint_id: complaint.id.clone(),
            result,
            assigned,
            attempts,
        };

        let mut update = outcome_update(&report);
        update.clear_assignee = previous.is_some() && report.assigned.is_none();

        match self.store.update_complaint(&complaint.id, &update).await {
            Ok(true) => {}
            Ok(false) => warn!(complaint_id = %complaint.id, "Complaint vanished before triage update"),
            Err(e) => warn!(complaint_id = %complaint.id, error = %e, "Failed to store triage outcome"),
        }

        report
    }

    async fn assign(&self, complaint_id: &str, department_id: &str) -> Option<AssignedOfficer> {
        match self
            .assignment
            .assign(self.store.as_ref(), department_id, complaint_id)
            .await
        {
            Ok(Some(officer)) => {
                info!(
                    complaint_id = %complaint_id,
                    department_id = %department_id,
                    officer_id = %officer.officer_id,
                    "Officer assigned"
                );
                Some(officer)
            }
            Ok(None) => {
                info!(
                    complaint_id = %complaint_id,
                    department_id = %department_id,
                    "No eligible officer, complaint left unassigned"
                );
                None
            }
            Err(e) => {
                warn!(complaint_id = %complaint_id, error = %e, "Officer assignment failed");
                None
            }
        }
    }

    async fn release_slot(&self, officer_id: &str, complaint_id: &str) {
        match self.store.release_officer_slot(officer_id, complaint_id).await {
            Ok(_) => debug!(officer_id = %officer_id, complaint_id = %complaint_id, "Officer slot released"),
            Err(e) => warn!(officer_id = %officer_id, error = %e, "Failed to release officer slot"),
        }
    }

    /// Run triage again for a stored complaint. Admins only.
    ///
    /// The previous officer's slot is released before a new one is claimed.
    pub async fn retriage(
        &self,
        identity: &Identity,
        complaint_id: &str,
    ) -> Result<TriageReport, PipelineError> {
        if identity.role != UserRole::Admin {
            return Err(PipelineError::Forbidden(
                "Only admins can re-run triage".to_string(),
            ));
        }

        let complaint = self.load(complaint_id).await?;
        if complaint.status == ComplaintStatus::Resolved {
            return Err(PipelineError::InvalidRequest(
                "Resolved complaints cannot be re-triaged".to_string(),
            ));
        }

        Ok(self.triage(&complaint).await)
    }

    /// Dashboard counts and the most recent complaints of a citizen.
    pub async fn citizen_stats(&self, identity: &Identity) -> Result<CitizenStats, PipelineError> {
        if identity.role != UserRole::Citizen {
            return Err(PipelineError::Forbidden(
                "Statistics are only available to citizens".to_string(),
            ));
        }

        let mine = ComplaintFilter::default().with_citizen(identity.user_id.as_str());
        let total = self.store.count_complaints(&mine).await?;
        let mut active = 0;
        for status in [ComplaintStatus::Pending, ComplaintStatus::InProgress] {
            active += self
                .store
                .count_complaints(&mine.clone().with_status(status))
                .await?;
        }
        let resolved = self
            .store
            .count_complaints(&mine.clone().with_status(ComplaintStatus::Resolved))
            .await?;
        let recent = self
            .store
            .find_complaints(&mine.recent(RECENT_COMPLAINTS))
            .await?;

        debug!(user_id = %identity.user_id, total, active, resolved, "Citizen stats");

        Ok(CitizenStats {
            total_complaints: total,
            active_complaints: active,
            resolved_complaints: resolved,
            recent_complaints: recent,
        })
    }

    /// Fetch one complaint. Citizens may only read their own.
    pub async fn get_complaint(
        &self,
        identity: &Identity,
        complaint_id: &str,
    ) -> Result<Complaint, PipelineError> {
        let complaint = self.load(complaint_id).await?;

        if identity.role == UserRole::Citizen && complaint.citizen_id != identity.user_id {
            return Err(PipelineError::Forbidden(
                "Not authorized to view this complaint".to_string(),
            ));
        }

        Ok(complaint)
    }

    /// List complaints, scoped by role.
    ///
    /// Citizens only see their own complaints and officers only their
    /// department's; the caller's department filter is overridden for them.
    pub async fn list_complaints(
        &self,
        identity: &Identity,
        mut filter: ComplaintFilter,
    ) -> Result<Vec<Complaint>, PipelineError> {
        match identity.role {
            UserRole::Citizen => filter.citizen_id = Some(identity.user_id.clone()),
            UserRole::Officer => {
                if let Some(department_id) = &identity.department_id {
                    filter.department_id = Some(department_id.clone());
                }
            }
            UserRole::Admin => {}
        }

        Ok(self.store.find_complaints(&filter).await?)
    }

    /// Change status and/or resolution ETA. Officers and admins only.
    ///
    /// Resolving a complaint frees its officer's slot.
    pub async fn update_status(
        &self,
        identity: &Identity,
        complaint_id: &str,
        update: StatusUpdate,
    ) -> Result<Complaint, PipelineError> {
        if identity.role == UserRole::Citizen {
            return Err(PipelineError::Forbidden(
                "Only officers and admins can update complaints".to_string(),
            ));
        }
        if update.status.is_none() && update.resolution_eta.is_none() {
            return Err(PipelineError::InvalidRequest(
                "Nothing to update".to_string(),
            ));
        }

        let mut complaint = self.load(complaint_id).await?;

        if let Some(next) = update.status {
            if !complaint.status.can_transition_to(next) {
                return Err(PipelineError::InvalidTransition {
                    from: complaint.status,
                    to: next,
                });
            }
        }

        let patch = ComplaintUpdate {
            status: update.status,
            resolution_eta: update.resolution_eta,
            ..Default::default()
        };
        if !self.store.update_complaint(complaint_id, &patch).await? {
            return Err(PipelineError::NotFound(complaint_id.to_string()));
        }

        let resolving = update.status == Some(ComplaintStatus::Resolved)
            && complaint.status != ComplaintStatus::Resolved;
        if resolving {
            if let Some(officer_id) = &complaint.assigned_to {
                self.release_slot(officer_id, complaint_id).await;
            }
        }

        info!(
            complaint_id = %complaint_id,
            user_id = %identity.user_id,
            status = update.status.map(|s| s.as_str()).unwrap_or("unchanged"),
            "Complaint updated"
        );

        patch.apply_to(&mut complaint);
        match self.store.find_complaint(complaint_id).await? {
            Some(stored) => Ok(stored),
            None => Ok(complaint),
        }
    }

    /// Attach an uploaded image URL. Only the owning citizen may do this.
    pub async fn attach_image(
        &self,
        identity: &Identity,
        complaint_id: &str,
        image_url: &str,
    ) -> Result<Complaint, PipelineError> {
        if identity.role != UserRole::Citizen {
            return Err(PipelineError::Forbidden(
                "Only citizens can attach images".to_string(),
            ));
        }

        let mut complaint = self.load(complaint_id).await?;
        if complaint.citizen_id != identity.user_id {
            return Err(PipelineError::Forbidden(
                "Not authorized to update this complaint".to_string(),
            ));
        }

        let patch = ComplaintUpdate {
            image_url: Some(image_url.to_string()),
            ..Default::default()
        };
        if !self.store.update_complaint(complaint_id, &patch).await? {
            return Err(PipelineError::NotFound(complaint_id.to_string()));
        }

        patch.apply_to(&mut complaint);
        Ok(complaint)
    }

    async fn load(&self, complaint_id: &str) -> Result<Complaint, PipelineError> {
        self.store
            .find_complaint(complaint_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(complaint_id.to_string()))
    }
}

/// Patch carrying a triage outcome onto the complaint.
///
/// The sentinel leaves department and assignee unset.
fn outcome_update(report: &TriageReport) -> ComplaintUpdate {
    let department_id = (!report.result.is_sentinel()).then(|| report.result.department_id.clone());

    ComplaintUpdate {
        department_id,
        assigned_to: report.assigned.as_ref().map(|a| a.officer_id.clone()),
        ai_analysis: Some(report.result.clone()),
        ..Default::default()
    }
}

fn parser_for(config: &ParserConfig) -> Arc<dyn ResponseParser> {
    match config.format {
        ResponseFormat::Labeled => Arc::new(LabeledLineParser::new(config.min_sections)),
        ResponseFormat::Json => Arc::new(JsonResponseParser),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::retry::RecordingSleeper;
    use crate::store::MemoryStore;
    use crate::types::ComplaintCategory;

    const ROADS_ANSWER: &str = "Department: Roads and Bridges Department\nPriority: 8\n\
        Category: infrastructure\nAnalysis: Pothole on a busy road.\nOfficer: Executive Engineer";

    fn pipeline(store: Arc<MemoryStore>, answer: &str) -> TriagePipeline {
        TriagePipeline::with_sleeper(
            store,
            Arc::new(MockBackend::new("mock-llama").with_response(answer)),
            TriageConfig::default(),
            Arc::new(RecordingSleeper::new()),
        )
    }

    fn new_complaint(citizen: &str) -> NewComplaint {
        NewComplaint {
            citizen_id: citizen.to_string(),
            title: "Pothole".to_string(),
            description: "Deep pothole".to_string(),
            location: "Main St".to_string(),
            category: ComplaintCategory::Infrastructure,
            image_url: None,
        }
    }

    #[test]
    fn test_sentinel_update_leaves_department_unset() {
        let report = TriageReport {
            complaint_id: "c1".to_string(),
            result: TriageResult::sentinel("c1", 3),
            assigned: None,
            attempts: 3,
        };
        let update = outcome_update(&report);

        assert!(update.department_id.is_none());
        assert!(update.assigned_to.is_none());
        assert!(update.ai_analysis.unwrap().is_sentinel());
    }

    #[tokio::test]
    async fn test_submit_records_analysis() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(store.clone(), ROADS_ANSWER);

        let complaint = pipeline.submit(new_complaint("ana")).await.unwrap();

        assert_eq!(complaint.department_id.as_deref(), Some("ROADS_001"));
        assert_eq!(complaint.ai_analysis.as_ref().unwrap().version, "mock-llama");
        assert_eq!(store.analyses().await.len(), 1);
    }

    #[tokio::test]
    async fn test_submit_fails_only_on_insert() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(store.clone(), ROADS_ANSWER);

        store.set_fail_inserts(true);
        assert!(matches!(
            pipeline.submit(new_complaint("ana")).await,
            Err(PipelineError::Store(_))
        ));

        store.set_fail_inserts(false);
        store.set_fail_writes(true);
        let complaint = pipeline.submit(new_complaint("ana")).await.unwrap();
        // Outcome could not be written; the complaint is still there, untriaged
        assert_eq!(complaint.status, ComplaintStatus::Pending);
        assert!(complaint.ai_analysis.is_none());
    }

    #[tokio::test]
    async fn test_citizen_access() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(store, ROADS_ANSWER);
        let complaint = pipeline.submit(new_complaint("ana")).await.unwrap();

        assert!(pipeline
            .get_complaint(&Identity::citizen("ana"), &complaint.id)
            .await
            .is_ok());
        assert!(matches!(
            pipeline.get_complaint(&Identity::citizen("bo"), &complaint.id).await,
            Err(PipelineError::Forbidden(_))
        ));
        assert!(matches!(
            pipeline.get_complaint(&Identity::admin("root"), "missing").await,
            Err(PipelineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_status_rules() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(store, ROADS_ANSWER);
        let complaint = pipeline.submit(new_complaint("ana")).await.unwrap();
        let officer = Identity::officer("o1", "ROADS_001");

        let to = |status| StatusUpdate {
            status: Some(status),
            resolution_eta: None,
        };

        assert!(matches!(
            pipeline
                .update_status(&Identity::citizen("ana"), &complaint.id, to(ComplaintStatus::InProgress))
                .await,
            Err(PipelineError::Forbidden(_))
        ));
        assert!(matches!(
            pipeline
                .update_status(&officer, &complaint.id, to(ComplaintStatus::Resolved))
                .await,
            Err(PipelineError::InvalidTransition { .. })
        ));
        assert!(matches!(
            pipeline
                .update_status(&officer, &complaint.id, StatusUpdate::default())
                .await,
            Err(PipelineError::InvalidRequest(_))
        ));

        let updated = pipeline
            .update_status(&officer, &complaint.id, to(ComplaintStatus::InProgress))
            .await
            .unwrap();
        assert_eq!(updated.status, ComplaintStatus::InProgress);
    }

    #[tokio::test]
    async fn test_attach_image_owner_only() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(store, ROADS_ANSWER);
        let complaint = pipeline.submit(new_complaint("ana")).await.unwrap();
        let url = "https://cdn.example.org/complaints/pothole.jpg";

        assert!(matches!(
            pipeline.attach_image(&Identity::citizen("bo"), &complaint.id, url).await,
            Err(PipelineError::Forbidden(_))
        ));
        assert!(matches!(
            pipeline.attach_image(&Identity::admin("root"), &complaint.id, url).await,
            Err(PipelineError::Forbidden(_))
        ));

        let updated = pipeline
            .attach_image(&Identity::citizen("ana"), &complaint.id, url)
            .await
            .unwrap();
        assert_eq!(updated.image_url.as_deref(), Some(url));
    }
}
