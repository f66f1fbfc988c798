//! Complaint Triage - routing citizen complaints to departments and officers
//!
//! Provides the core of the complaint desk:
//! - Trait-based oracle backends (Groq and other OpenAI-compatible services)
//! - Labeled-line and JSON response parsing with per-field fallbacks
//! - Bounded retries with exponential backoff and a failure sentinel
//! - Least-loaded officer assignment under a capacity ceiling
//! - A storage seam with an in-memory implementation
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            TriagePipeline               │
//! │  (submit, triage, lifecycle updates)    │
//! └────────────────┬────────────────────────┘
//!                  │
//!      ┌───────────┼───────────────┐
//!      ▼           ▼               ▼
//! ┌──────────┐ ┌──────────┐ ┌─────────────┐
//! │ Retry    │ │Assignment│ │ TriageStore │
//! │Controller│ │ Engine   │ │ (memory /   │
//! └────┬─────┘ └──────────┘ │  MongoDB)   │
//!      ▼                    └─────────────┘
//! ┌──────────────┐  ┌────────────────┐
//! │ OracleClient │─▶│ ResponseParser │
//! └──────────────┘  └────────────────┘
//! ```

pub mod assignment;
pub mod backend;
pub mod config;
pub mod directory;
pub mod oracle;
pub mod parser;
pub mod pipeline;
pub mod retry;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use assignment::{AssignedOfficer, AssignmentEngine};
pub use backend::traits::{CompletionRequest, CompletionResponse, OracleBackend, OracleError};
pub use config::{ClaimMode, ConfigError, ResponseFormat, TriageConfig};
pub use directory::{DepartmentDirectory, DepartmentEntry, DirectoryError};
pub use oracle::OracleClient;
pub use parser::{JsonResponseParser, LabeledLineParser, ParseError, ResponseParser};
pub use pipeline::{CitizenStats, PipelineError, StatusUpdate, TriagePipeline, TriageReport};
pub use retry::{AttemptError, RetryController, RetryOutcome, RetryPolicy, Sleeper, TokioSleeper};
pub use store::{ComplaintFilter, ComplaintUpdate, MemoryStore, SlotGuard, StoreError, TriageStore};
pub use types::*;
