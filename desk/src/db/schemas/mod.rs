//! Database schemas for the complaint desk
//!
//! Defines MongoDB document structures for complaints, officers and the
//! analysis audit trail, with conversions to and from the core types.

mod analysis;
mod complaint;
mod metadata;
mod user;

pub use analysis::{AnalysisDoc, ANALYSIS_COLLECTION};
pub use complaint::{ComplaintDoc, COMPLAINT_COLLECTION};
pub use metadata::Metadata;
pub use user::{UserDoc, OFFICER_ROLE, USER_COLLECTION};
