//! Oracle client: one classification call per attempt.
//!
//! Builds the fixed instruction prompt from the department directory, sends
//! the complaint snapshot to the backend under a hard timeout, and returns the
//! raw text. It never invents a fallback answer; failures go back to the retry
//! controller untouched.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::backend::traits::{CompletionRequest, OracleBackend, OracleError};
use crate::config::OracleConfig;
use crate::directory::DepartmentDirectory;
use crate::types::{ComplaintCategory, ComplaintSnapshot};

const ROLE_INSTRUCTIONS: &str = "You are an assistant that triages citizen complaints for a municipal \
government. For each complaint you decide:
1. The most appropriate department to handle it
2. A priority score from 1 to 10 (10 being highest priority)
3. A category
4. A brief analysis of the complaint
5. What kind of officer should handle it, and why

Base your answer on the complaint title, description and location. For the officer \
recommendation consider complexity and urgency, required expertise, geography and workload.";

/// Classification call wrapper.
pub struct OracleClient {
    backend: Arc<dyn OracleBackend>,
    config: OracleConfig,
    system_prompt: String,
}

impl OracleClient {
    /// Create a client; the system prompt is fixed for the client's lifetime.
    pub fn new(
        backend: Arc<dyn OracleBackend>,
        directory: &DepartmentDirectory,
        config: OracleConfig,
    ) -> Self {
        let system_prompt = build_system_prompt(directory, config.include_officer_roster);
        Self {
            backend,
            config,
            system_prompt,
        }
    }

    /// Version tag for results produced through this client.
    pub fn version(&self) -> &str {
        self.backend.id()
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Probe the backend.
    pub async fn is_available(&self) -> bool {
        self.backend.is_available().await
    }

    /// Classify one complaint, returning the oracle's raw text.
    pub async fn classify(&self, snapshot: &ComplaintSnapshot) -> Result<String, OracleError> {
        let request = CompletionRequest::user(build_user_prompt(snapshot))
            .with_system(self.system_prompt.clone())
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature);

        let timeout = self.config.timeout();
        let response = tokio::time::timeout(timeout, self.backend.complete(request))
            .await
            .map_err(|_| OracleError::Timeout(timeout_ms(timeout)))?
            .map_err(|e| match e {
                // reqwest's own timeout doesn't know the configured bound
                OracleError::Timeout(0) => OracleError::Timeout(timeout_ms(timeout)),
                other => other,
            })?;

        debug!(
            backend = %self.backend.id(),
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            "Oracle answered"
        );

        Ok(response.content)
    }
}

fn timeout_ms(timeout: Duration) -> u64 {
    timeout.as_millis() as u64
}

/// Fixed instruction listing the closed set of departments and the output format.
pub fn build_system_prompt(directory: &DepartmentDirectory, include_roster: bool) -> String {
    let mut prompt = String::from(ROLE_INSTRUCTIONS);

    prompt.push_str("\n\nValid departments (answer with one of these names exactly):\n");
    for dept in directory.departments() {
        let _ = writeln!(prompt, "- {}", dept.name);
        if include_roster && !dept.officers.is_empty() {
            let _ = writeln!(prompt, "  Officers: {}", dept.officers.join("; "));
        }
    }

    let categories: Vec<&str> = ComplaintCategory::ALL.iter().map(|c| c.as_str()).collect();
    let _ = write!(
        prompt,
        "\nValid categories: {}\n\n\
         Format your response exactly as follows, one field per line, nothing else:\n\
         Department: <department name>\n\
         Priority: <1-10>\n\
         Category: <category>\n\
         Analysis: <one-paragraph analysis>\n\
         Officer: <officer recommendation>\n",
        categories.join(", ")
    );

    prompt
}

/// Complaint-specific user content.
pub fn build_user_prompt(snapshot: &ComplaintSnapshot) -> String {
    format!(
        "Complaint Title: {}\nDescription: {}\nLocation: {}\nCitizen-selected category: {}\n\n\
         Analyze this complaint using the required format.",
        snapshot.title,
        snapshot.description,
        snapshot.location,
        snapshot.category.as_str()
    )
}
