//! User document schema
//!
//! Only officers matter to triage; their `active_complaints` array is the
//! load the assignment engine balances.

use bson::{doc, DateTime, Document};
use complaint_triage::Officer;
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// Role value marking officers
pub const OFFICER_ROLE: &str = "officer";

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UserDoc {
    /// User id (a citizen's email)
    pub _id: String,

    #[serde(default)]
    pub metadata: Metadata,

    pub name: String,

    /// citizen, officer or admin
    pub role: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department_id: Option<String>,

    #[serde(default)]
    pub active_complaints: Vec<String>,

    #[serde(default = "DateTime::now")]
    pub last_updated: DateTime,
}

impl From<&Officer> for UserDoc {
    fn from(officer: &Officer) -> Self {
        Self {
            _id: officer.id.clone(),
            metadata: Metadata::default(),
            name: officer.name.clone(),
            role: OFFICER_ROLE.to_string(),
            department_id: Some(officer.department_id.clone()),
            active_complaints: officer.active_complaints.clone(),
            last_updated: DateTime::from_chrono(officer.last_updated),
        }
    }
}

impl From<UserDoc> for Officer {
    fn from(doc: UserDoc) -> Self {
        Self {
            id: doc._id,
            name: doc.name,
            department_id: doc.department_id.unwrap_or_default(),
            active_complaints: doc.active_complaints,
            last_updated: doc.last_updated.to_chrono(),
        }
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "role": 1, "department_id": 1 },
            Some(
                IndexOptions::builder()
                    .name("role_department_id".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
