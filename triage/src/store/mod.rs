//! Persistence seam for complaints, officers and the analysis audit trail.
//!
//! The pipeline only talks to [`TriageStore`]; this crate ships the in-memory
//! implementation and the desk crate provides the MongoDB one.

pub mod memory;
pub mod traits;

pub use memory::MemoryStore;
pub use traits::{ComplaintFilter, ComplaintUpdate, SlotGuard, StoreError, TriageStore};
