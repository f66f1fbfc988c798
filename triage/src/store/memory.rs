//! In-memory store.
//!
//! Backs the tests and local demos. Insertion order is the natural order, so
//! officer ties resolve the same way they would on a fresh collection scan.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::traits::*;
use crate::types::{Complaint, Officer, TriageResult};

#[derive(Default)]
struct Inner {
    complaints: Vec<Complaint>,
    officers: Vec<Officer>,
    analyses: Vec<TriageResult>,
}

/// Store held entirely in process memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    fail_inserts: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with officers.
    pub fn with_officers(mut self, officers: impl IntoIterator<Item = Officer>) -> Self {
        self.inner.get_mut().officers.extend(officers);
        self
    }

    pub async fn add_officer(&self, officer: Officer) {
        self.inner.write().await.officers.push(officer);
    }

    /// Make complaint inserts fail.
    pub fn set_fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    /// Make every write after the insert fail (updates, audit, slot claims).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn officer(&self, officer_id: &str) -> Option<Officer> {
        self.inner
            .read()
            .await
            .officers
            .iter()
            .find(|o| o.id == officer_id)
            .cloned()
    }

    /// Audit trail, oldest first.
    pub async fn analyses(&self) -> Vec<TriageResult> {
        self.inner.read().await.analyses.clone()
    }

    fn check_writes(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store writes disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TriageStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn insert_complaint(&self, complaint: &Complaint) -> Result<(), StoreError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store inserts disabled".to_string()));
        }

        let mut inner = self.inner.write().await;
        if inner.complaints.iter().any(|c| c.id == complaint.id) {
            return Err(StoreError::Duplicate(complaint.id.clone()));
        }
        inner.complaints.push(complaint.clone());
        Ok(())
    }

    async fn find_complaint(&self, id: &str) -> Result<Option<Complaint>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .complaints
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn find_complaints(&self, filter: &ComplaintFilter) -> Result<Vec<Complaint>, StoreError> {
        let inner = self.inner.read().await;
        let matching = inner.complaints.iter().filter(|c| filter.matches(c));
        let found = if filter.newest_first {
            matching.rev().take(filter.limit).cloned().collect()
        } else {
            matching.take(filter.limit).cloned().collect()
        };
        Ok(found)
    }

    async fn count_complaints(&self, filter: &ComplaintFilter) -> Result<u64, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.complaints.iter().filter(|c| filter.matches(c)).count() as u64)
    }

    async fn update_complaint(&self, id: &str, update: &ComplaintUpdate) -> Result<bool, StoreError> {
        self.check_writes()?;

        let mut inner = self.inner.write().await;
        match inner.complaints.iter_mut().find(|c| c.id == id) {
            Some(complaint) => {
                update.apply_to(complaint);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_analysis(&self, result: &TriageResult) -> Result<(), StoreError> {
        self.check_writes()?;
        self.inner.write().await.analyses.push(result.clone());
        Ok(())
    }

    async fn find_officers(&self, department_id: &str) -> Result<Vec<Officer>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .officers
            .iter()
            .filter(|o| o.department_id == department_id)
            .cloned()
            .collect())
    }

    async fn claim_officer_slot(
        &self,
        officer_id: &str,
        complaint_id: &str,
        guard: SlotGuard,
    ) -> Result<bool, StoreError> {
        self.check_writes()?;

        let mut inner = self.inner.write().await;
        let Some(officer) = inner.officers.iter_mut().find(|o| o.id == officer_id) else {
            return Ok(false);
        };

        if let SlotGuard::ExpectedCount(expected) = guard {
            if officer.active_count() != expected {
                return Ok(false);
            }
        }

        officer.active_complaints.push(complaint_id.to_string());
        officer.last_updated = Utc::now();
        Ok(true)
    }

    async fn release_officer_slot(
        &self,
        officer_id: &str,
        complaint_id: &str,
    ) -> Result<bool, StoreError> {
        self.check_writes()?;

        let mut inner = self.inner.write().await;
        let Some(officer) = inner.officers.iter_mut().find(|o| o.id == officer_id) else {
            return Ok(false);
        };

        let before = officer.active_count();
        officer.active_complaints.retain(|c| c != complaint_id);
        officer.last_updated = Utc::now();
        Ok(officer.active_count() < before)
    }
}
