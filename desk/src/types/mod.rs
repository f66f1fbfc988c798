//! Shared types for the complaint desk

mod error;

pub use error::{DeskError, Result};
