//! Triage analysis document schema
//!
//! Embedded in complaints and appended to the `ai_analyses` audit collection.

use bson::{doc, DateTime, Document};
use complaint_triage::{ComplaintCategory, TriageResult};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for the analysis audit trail
pub const ANALYSIS_COLLECTION: &str = "ai_analyses";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AnalysisDoc {
    /// Analysis id
    pub _id: String,

    /// Only set on audit records, not on the copy embedded in a complaint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,

    pub complaint_id: String,
    pub department_id: String,
    pub priority_score: f64,
    pub analysis_text: String,
    pub officer_recommendation: String,
    #[serde(default)]
    pub category_prediction: ComplaintCategory,
    pub version: String,
    pub created_at: DateTime,
}

impl From<&TriageResult> for AnalysisDoc {
    fn from(result: &TriageResult) -> Self {
        Self {
            _id: result.id.clone(),
            metadata: None,
            complaint_id: result.complaint_id.clone(),
            department_id: result.department_id.clone(),
            priority_score: result.priority_score,
            analysis_text: result.analysis_text.clone(),
            officer_recommendation: result.officer_recommendation.clone(),
            category_prediction: result.category_prediction,
            version: result.version.clone(),
            created_at: DateTime::from_chrono(result.created_at),
        }
    }
}

impl From<AnalysisDoc> for TriageResult {
    fn from(doc: AnalysisDoc) -> Self {
        Self {
            id: doc._id,
            complaint_id: doc.complaint_id,
            department_id: doc.department_id,
            priority_score: doc.priority_score,
            analysis_text: doc.analysis_text,
            officer_recommendation: doc.officer_recommendation,
            category_prediction: doc.category_prediction,
            version: doc.version,
            created_at: doc.created_at.to_chrono(),
        }
    }
}

impl IntoIndexes for AnalysisDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "complaint_id": 1, "created_at": -1 },
            Some(
                IndexOptions::builder()
                    .name("complaint_id_created_at".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for AnalysisDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        self.metadata.get_or_insert_with(Metadata::default)
    }
}
