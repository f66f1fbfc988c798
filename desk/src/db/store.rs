//! MongoDB implementation of the triage store.
//!
//! Officer load lives in the `active_complaints` array of each user document;
//! conditional claims compare its size server-side so the check and the push
//! happen in one update.

use async_trait::async_trait;
use bson::{doc, DateTime, Document};
use complaint_triage::{
    Complaint, ComplaintFilter, ComplaintUpdate, Officer, SlotGuard, StoreError, TriageResult,
    TriageStore,
};
use tracing::debug;

use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{
    AnalysisDoc, ComplaintDoc, UserDoc, ANALYSIS_COLLECTION, COMPLAINT_COLLECTION, OFFICER_ROLE,
    USER_COLLECTION,
};
use crate::types::Result;

/// Triage store backed by the `complaints`, `users` and `ai_analyses` collections
#[derive(Clone)]
pub struct MongoTriageStore {
    complaints: MongoCollection<ComplaintDoc>,
    users: MongoCollection<UserDoc>,
    analyses: MongoCollection<AnalysisDoc>,
}

impl MongoTriageStore {
    pub async fn new(client: &MongoClient) -> Result<Self> {
        Ok(Self {
            complaints: client.collection(COMPLAINT_COLLECTION).await?,
            users: client.collection(USER_COLLECTION).await?,
            analyses: client.collection(ANALYSIS_COLLECTION).await?,
        })
    }

    /// Register an officer. Fails if the id is already taken.
    pub async fn add_officer(&self, officer: &Officer) -> Result<()> {
        self.users.insert_one(UserDoc::from(officer)).await
    }
}

/// Query for a complaint listing.
pub fn filter_document(filter: &ComplaintFilter) -> Result<Document> {
    let mut query = Document::new();
    if let Some(citizen_id) = &filter.citizen_id {
        query.insert("citizen_id", citizen_id.as_str());
    }
    if let Some(department_id) = &filter.department_id {
        query.insert("department_id", department_id.as_str());
    }
    if let Some(status) = filter.status {
        query.insert("status", bson::to_bson(&status)?);
    }
    Ok(query)
}

/// `$set` update for a complaint patch.
pub fn update_document(update: &ComplaintUpdate) -> Result<Document> {
    let mut set = doc! { "last_updated": DateTime::now() };

    if let Some(status) = update.status {
        set.insert("status", bson::to_bson(&status)?);
    }
    if let Some(department_id) = &update.department_id {
        set.insert("department_id", department_id.as_str());
    }
    if let (Some(assigned_to), false) = (&update.assigned_to, update.clear_assignee) {
        set.insert("assigned_to", assigned_to.as_str());
    }
    if let Some(analysis) = &update.ai_analysis {
        set.insert("ai_analysis", bson::to_bson(&AnalysisDoc::from(analysis))?);
    }
    if let Some(image_url) = &update.image_url {
        set.insert("image_url", image_url.as_str());
    }
    if let Some(eta) = update.resolution_eta {
        set.insert("resolution_eta", DateTime::from_chrono(eta));
    }

    let mut update_doc = doc! { "$set": set };
    if update.clear_assignee {
        update_doc.insert("$unset", doc! { "assigned_to": "" });
    }
    Ok(update_doc)
}

/// Filter selecting an officer whose slot may be claimed under `guard`.
pub fn slot_filter(officer_id: &str, guard: SlotGuard) -> Document {
    let mut filter = doc! { "_id": officer_id, "role": OFFICER_ROLE };
    if let SlotGuard::ExpectedCount(expected) = guard {
        let expected = expected as i64;
        filter.insert(
            "$expr",
            doc! {
                "$eq": [
                    { "$size": { "$ifNull": ["$active_complaints", []] } },
                    expected
                ]
            },
        );
    }
    filter
}

#[async_trait]
impl TriageStore for MongoTriageStore {
    fn name(&self) -> &str {
        "mongodb"
    }

    async fn insert_complaint(&self, complaint: &Complaint) -> std::result::Result<(), StoreError> {
        self.complaints
            .insert_one(ComplaintDoc::from(complaint))
            .await
            .map_err(StoreError::from)
    }

    async fn find_complaint(&self, id: &str) -> std::result::Result<Option<Complaint>, StoreError> {
        let found = self.complaints.find_one(doc! { "_id": id }).await?;
        Ok(found.map(Complaint::from))
    }

    async fn find_complaints(
        &self,
        filter: &ComplaintFilter,
    ) -> std::result::Result<Vec<Complaint>, StoreError> {
        let query = filter_document(filter)?;
        let order = if filter.newest_first { -1 } else { 1 };
        let docs = self
            .complaints
            .find_many(
                query,
                Some(doc! { "created_at": order }),
                Some(filter.limit as i64),
            )
            .await?;
        Ok(docs.into_iter().map(Complaint::from).collect())
    }

    async fn count_complaints(&self, filter: &ComplaintFilter) -> std::result::Result<u64, StoreError> {
        Ok(self.complaints.count(filter_document(filter)?).await?)
    }

    async fn update_complaint(
        &self,
        id: &str,
        update: &ComplaintUpdate,
    ) -> std::result::Result<bool, StoreError> {
        let result = self
            .complaints
            .update_one(doc! { "_id": id }, update_document(update)?)
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn record_analysis(&self, result: &TriageResult) -> std::result::Result<(), StoreError> {
        self.analyses
            .insert_one(AnalysisDoc::from(result))
            .await
            .map_err(StoreError::from)
    }

    async fn find_officers(&self, department_id: &str) -> std::result::Result<Vec<Officer>, StoreError> {
        let docs = self
            .users
            .find_many(
                doc! { "role": OFFICER_ROLE, "department_id": department_id },
                None,
                None,
            )
            .await?;
        Ok(docs.into_iter().map(Officer::from).collect())
    }

    async fn claim_officer_slot(
        &self,
        officer_id: &str,
        complaint_id: &str,
        guard: SlotGuard,
    ) -> std::result::Result<bool, StoreError> {
        let result = self
            .users
            .update_one(
                slot_filter(officer_id, guard),
                doc! {
                    "$push": { "active_complaints": complaint_id },
                    "$set": { "last_updated": DateTime::now() },
                },
            )
            .await?;

        debug!(
            officer_id = %officer_id,
            complaint_id = %complaint_id,
            matched = result.matched_count,
            "Officer slot claim"
        );
        Ok(result.matched_count > 0)
    }

    async fn release_officer_slot(
        &self,
        officer_id: &str,
        complaint_id: &str,
    ) -> std::result::Result<bool, StoreError> {
        let result = self
            .users
            .update_one(
                doc! { "_id": officer_id },
                doc! {
                    "$pull": { "active_complaints": complaint_id },
                    "$set": { "last_updated": DateTime::now() },
                },
            )
            .await?;
        Ok(result.modified_count > 0)
    }
}
