//! Complaint document schema

use bson::{doc, DateTime, Document};
use complaint_triage::{Complaint, ComplaintCategory, ComplaintStatus};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::{AnalysisDoc, Metadata};

/// Collection name for complaints
pub const COMPLAINT_COLLECTION: &str = "complaints";

/// Complaint document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ComplaintDoc {
    /// Complaint id, generated by the pipeline
    pub _id: String,

    #[serde(default)]
    pub metadata: Metadata,

    /// Owner (the citizen's user id)
    pub citizen_id: String,
    pub title: String,
    pub description: String,
    pub location: String,
    #[serde(default)]
    pub category: ComplaintCategory,
    #[serde(default)]
    pub status: ComplaintStatus,
    pub department_id: Option<String>,
    pub assigned_to: Option<String>,
    pub ai_analysis: Option<AnalysisDoc>,
    pub image_url: Option<String>,
    pub created_at: DateTime,
    pub last_updated: DateTime,
    pub resolution_eta: Option<DateTime>,
}

impl From<&Complaint> for ComplaintDoc {
    fn from(c: &Complaint) -> Self {
        Self {
            _id: c.id.clone(),
            metadata: Metadata::default(),
            citizen_id: c.citizen_id.clone(),
            title: c.title.clone(),
            description: c.description.clone(),
            location: c.location.clone(),
            category: c.category,
            status: c.status,
            department_id: c.department_id.clone(),
            assigned_to: c.assigned_to.clone(),
            ai_analysis: c.ai_analysis.as_ref().map(AnalysisDoc::from),
            image_url: c.image_url.clone(),
            created_at: DateTime::from_chrono(c.created_at),
            last_updated: DateTime::from_chrono(c.last_updated),
            resolution_eta: c.resolution_eta.map(DateTime::from_chrono),
        }
    }
}

impl From<ComplaintDoc> for Complaint {
    fn from(doc: ComplaintDoc) -> Self {
        Self {
            id: doc._id,
            citizen_id: doc.citizen_id,
            title: doc.title,
            description: doc.description,
            location: doc.location,
            category: doc.category,
            status: doc.status,
            department_id: doc.department_id,
            assigned_to: doc.assigned_to,
            ai_analysis: doc.ai_analysis.map(Into::into),
            image_url: doc.image_url,
            created_at: doc.created_at.to_chrono(),
            last_updated: doc.last_updated.to_chrono(),
            resolution_eta: doc.resolution_eta.map(|eta| eta.to_chrono()),
        }
    }
}

impl IntoIndexes for ComplaintDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Citizen's own listing
            (
                doc! { "citizen_id": 1, "created_at": 1 },
                Some(
                    IndexOptions::builder()
                        .name("citizen_id_created_at".to_string())
                        .build(),
                ),
            ),
            // Department dashboards filter by status
            (
                doc! { "department_id": 1, "status": 1 },
                Some(
                    IndexOptions::builder()
                        .name("department_id_status".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ComplaintDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
