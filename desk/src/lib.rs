//! Triage Desk - operator front end for the complaint triage pipeline
//!
//! Wires the core pipeline to MongoDB and exposes it as a command-line desk.
//!
//! ## Components
//!
//! - **Config**: clap arguments with environment fallbacks
//! - **Db**: typed MongoDB collections and the `TriageStore` adapter
//! - **Desk**: command dispatch against the pipeline

pub mod config;
pub mod db;
pub mod desk;
pub mod types;

pub use config::Args;
pub use desk::{Backing, Desk};
pub use types::{DeskError, Result};
