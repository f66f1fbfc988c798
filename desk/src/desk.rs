//! Desk wiring: pipeline, store and the commands run against them.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use complaint_triage::{
    ComplaintFilter, Identity, MemoryStore, NewComplaint, Officer, StatusUpdate, TriagePipeline,
    TriageStore, UserRole,
};

use crate::config::Command;
use crate::db::MongoTriageStore;
use crate::types::{DeskError, Result};

/// Store the desk runs on.
#[derive(Clone)]
pub enum Backing {
    Mongo(Arc<MongoTriageStore>),
    /// Dev mode without a database; state lives for one command
    Memory(Arc<MemoryStore>),
}

impl Backing {
    pub fn store(&self) -> Arc<dyn TriageStore> {
        match self {
            Self::Mongo(store) => store.clone() as Arc<dyn TriageStore>,
            Self::Memory(store) => store.clone() as Arc<dyn TriageStore>,
        }
    }

    async fn add_officer(&self, officer: &Officer) -> Result<()> {
        match self {
            Self::Mongo(store) => store.add_officer(officer).await,
            Self::Memory(store) => {
                store.add_officer(officer.clone()).await;
                Ok(())
            }
        }
    }
}

/// A ready-to-use desk.
pub struct Desk {
    pipeline: Arc<TriagePipeline>,
    backing: Backing,
}

impl Desk {
    pub fn new(pipeline: Arc<TriagePipeline>, backing: Backing) -> Self {
        Self { pipeline, backing }
    }

    pub fn pipeline(&self) -> &Arc<TriagePipeline> {
        &self.pipeline
    }

    /// Run one command as `identity`, returning its JSON output.
    pub async fn execute(&self, identity: &Identity, command: Command) -> Result<Value> {
        match command {
            Command::Submit {
                title,
                description,
                location,
                category,
                image_url,
            } => {
                require_role(identity, &[UserRole::Citizen, UserRole::Admin])?;
                let complaint = self
                    .pipeline
                    .submit(NewComplaint {
                        citizen_id: identity.user_id.clone(),
                        title,
                        description,
                        location,
                        category,
                        image_url,
                    })
                    .await?;
                Ok(serde_json::to_value(complaint)?)
            }

            Command::Show { id } => {
                let complaint = self.pipeline.get_complaint(identity, &id).await?;
                Ok(serde_json::to_value(complaint)?)
            }

            Command::List {
                status,
                department,
                limit,
            } => {
                let filter = ComplaintFilter {
                    citizen_id: None,
                    department_id: department,
                    status,
                    limit,
                    ..Default::default()
                };
                let complaints = self.pipeline.list_complaints(identity, filter).await?;
                Ok(serde_json::to_value(complaints)?)
            }

            Command::Status { id, status, eta } => {
                let complaint = self
                    .pipeline
                    .update_status(
                        identity,
                        &id,
                        StatusUpdate {
                            status,
                            resolution_eta: eta,
                        },
                    )
                    .await?;
                Ok(serde_json::to_value(complaint)?)
            }

            Command::Stats => {
                let stats = self.pipeline.citizen_stats(identity).await?;
                Ok(serde_json::to_value(stats)?)
            }

            Command::AttachImage { id, url } => {
                let complaint = self.pipeline.attach_image(identity, &id, &url).await?;
                Ok(json!({ "id": complaint.id, "image_url": complaint.image_url }))
            }

            Command::Retriage { id } => {
                let report = self.pipeline.retriage(identity, &id).await?;
                if report.is_sentinel() {
                    warn!(complaint_id = %id, "Re-triage exhausted its attempts");
                }
                Ok(serde_json::to_value(report)?)
            }

            Command::AddOfficer {
                id,
                name,
                department,
            } => {
                require_role(identity, &[UserRole::Admin])?;
                if !self.pipeline.directory().contains_id(&department) {
                    return Err(DeskError::BadRequest(format!(
                        "Unknown department: {}",
                        department
                    )));
                }
                let officer = Officer::new(id, name, department);
                self.backing.add_officer(&officer).await?;
                info!(officer_id = %officer.id, department_id = %officer.department_id, "Officer registered");
                Ok(serde_json::to_value(officer)?)
            }

            Command::Officers { department } => {
                require_role(identity, &[UserRole::Officer, UserRole::Admin])?;
                let officers = self.backing.store().find_officers(&department).await?;
                let rows: Vec<Value> = officers
                    .iter()
                    .map(|o| {
                        json!({
                            "id": o.id,
                            "name": o.name,
                            "active": o.active_count(),
                        })
                    })
                    .collect();
                Ok(Value::Array(rows))
            }

            Command::ShowConfig => Err(DeskError::BadRequest(
                "show-config is handled before the desk starts".to_string(),
            )),

            Command::Check => {
                let oracle = self.pipeline.oracle_available().await;
                Ok(json!({
                    "oracle_available": oracle,
                    "store": self.backing.store().name(),
                    "departments": self
                        .pipeline
                        .directory()
                        .departments()
                        .iter()
                        .map(|d| d.id.as_str())
                        .collect::<Vec<_>>(),
                }))
            }
        }
    }
}

fn require_role(identity: &Identity, allowed: &[UserRole]) -> Result<()> {
    if allowed.contains(&identity.role) {
        Ok(())
    } else {
        Err(DeskError::Forbidden(format!(
            "{:?} may not run this command",
            identity.role
        )))
    }
}
