//! Officer assignment.
//!
//! Picks the least-loaded officer of a department who is still below the
//! capacity ceiling and records the complaint in that officer's active set.
//! Finding nobody is a normal outcome.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{AssignmentConfig, ClaimMode};
use crate::store::{SlotGuard, StoreError, TriageStore};
use crate::types::Officer;

/// The officer a complaint was handed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignedOfficer {
    pub officer_id: String,
    pub name: String,
    /// Active count when the officer was selected, before the claim
    pub load_before: usize,
}

/// Least-loaded officer strictly below `ceiling`.
///
/// Ties go to the officer that comes first in `officers`.
pub fn select_least_loaded(officers: &[Officer], ceiling: usize) -> Option<&Officer> {
    officers
        .iter()
        .filter(|o| o.active_count() < ceiling)
        .min_by_key(|o| o.active_count())
}

/// Assignment engine.
#[derive(Debug, Clone, Default)]
pub struct AssignmentEngine {
    config: AssignmentConfig,
}

impl AssignmentEngine {
    pub fn new(config: AssignmentConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AssignmentConfig {
        &self.config
    }

    /// Assign `complaint_id` to an officer of `department_id`.
    pub async fn assign(
        &self,
        store: &dyn TriageStore,
        department_id: &str,
        complaint_id: &str,
    ) -> Result<Option<AssignedOfficer>, StoreError> {
        match self.config.claim_mode {
            ClaimMode::BestEffort => self.assign_best_effort(store, department_id, complaint_id).await,
            ClaimMode::Conditional => self.assign_conditional(store, department_id, complaint_id).await,
        }
    }

    async fn assign_best_effort(
        &self,
        store: &dyn TriageStore,
        department_id: &str,
        complaint_id: &str,
    ) -> Result<Option<AssignedOfficer>, StoreError> {
        let officers = store.find_officers(department_id).await?;
        let Some(officer) = select_least_loaded(&officers, self.config.capacity_ceiling) else {
            debug!(department_id = %department_id, "No officer below capacity");
            return Ok(None);
        };

        // Concurrent submissions may both pass the check above.
        if !store
            .claim_officer_slot(&officer.id, complaint_id, SlotGuard::Unchecked)
            .await?
        {
            warn!(officer_id = %officer.id, "Officer vanished between read and claim");
            return Ok(None);
        }

        Ok(Some(assigned(officer)))
    }

    async fn assign_conditional(
        &self,
        store: &dyn TriageStore,
        department_id: &str,
        complaint_id: &str,
    ) -> Result<Option<AssignedOfficer>, StoreError> {
        let rounds = self.config.max_claim_attempts.max(1);

        for round in 1..=rounds {
            let officers = store.find_officers(department_id).await?;
            let Some(officer) = select_least_loaded(&officers, self.config.capacity_ceiling) else {
                debug!(department_id = %department_id, "No officer below capacity");
                return Ok(None);
            };

            let guard = SlotGuard::ExpectedCount(officer.active_count());
            if store.claim_officer_slot(&officer.id, complaint_id, guard).await? {
                return Ok(Some(assigned(officer)));
            }

            debug!(
                officer_id = %officer.id,
                round = round,
                "Lost claim race, re-selecting"
            );
        }

        warn!(
            department_id = %department_id,
            complaint_id = %complaint_id,
            rounds = rounds,
            "Gave up claiming an officer slot"
        );
        Ok(None)
    }
}

fn assigned(officer: &Officer) -> AssignedOfficer {
    AssignedOfficer {
        officer_id: officer.id.clone(),
        name: officer.name.clone(),
        load_before: officer.active_count(),
    }
}
