//! Department directory.
//!
//! Maps the department names the oracle is allowed to answer with onto stable
//! internal identifiers. The directory is an immutable value injected into the
//! pipeline; lookups are total and fall back to the configured default.

use serde::{Deserialize, Serialize};

/// Errors raised when a directory is built from configuration.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Directory has no departments")]
    Empty,

    #[error("Default department {0} is not in the directory")]
    UnknownDefault(String),

    #[error("Duplicate department id: {0}")]
    DuplicateId(String),

    #[error("Invalid directory YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// One department.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentEntry {
    /// Stable short identifier, e.g. `ROADS_001`
    pub id: String,
    /// Canonical display name offered to the oracle
    pub name: String,
    /// Alternate spellings accepted on the way back
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Officer display strings, for prompt and rationale text only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub officers: Vec<String>,
}

impl DepartmentEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            aliases: Vec::new(),
            officers: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn with_officer(mut self, officer: impl Into<String>) -> Self {
        self.officers.push(officer.into());
        self
    }

    fn matches(&self, normalized: &str) -> bool {
        normalize(&self.name) == normalized
            || normalize(&self.id) == normalized
            || self.aliases.iter().any(|a| normalize(a) == normalized)
    }
}

/// Read-only department directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartmentDirectory {
    departments: Vec<DepartmentEntry>,
    default_id: String,
}

impl DepartmentDirectory {
    /// Build a directory, checking that the fallback id is one of its entries.
    pub fn new(
        departments: Vec<DepartmentEntry>,
        default_id: impl Into<String>,
    ) -> Result<Self, DirectoryError> {
        let default_id = default_id.into();

        if departments.is_empty() {
            return Err(DirectoryError::Empty);
        }

        for (i, dept) in departments.iter().enumerate() {
            if departments[..i].iter().any(|d| d.id == dept.id) {
                return Err(DirectoryError::DuplicateId(dept.id.clone()));
            }
        }

        if !departments.iter().any(|d| d.id == default_id) {
            return Err(DirectoryError::UnknownDefault(default_id));
        }

        Ok(Self {
            departments,
            default_id,
        })
    }

    /// Load from YAML (`departments: [...]`, `default_id: ...`).
    pub fn from_yaml(yaml: &str) -> Result<Self, DirectoryError> {
        let raw: DepartmentDirectory = serde_yaml::from_str(yaml)?;
        Self::new(raw.departments, raw.default_id)
    }

    /// The four departments of the municipal deployment.
    pub fn civic_default() -> Self {
        Self {
            departments: vec![
                DepartmentEntry::new("ROADS_001", "Roads and Bridges Department")
                    .with_alias("Roads & Bridges Department")
                    .with_alias("Roads and Bridges")
                    .with_officer("Executive Engineer, Roads Division")
                    .with_officer("Assistant Engineer, Bridges Maintenance"),
                DepartmentEntry::new("SOCIAL_001", "Social Welfare Department")
                    .with_officer("District Social Welfare Officer")
                    .with_officer("Welfare Inspector"),
                DepartmentEntry::new("HEALTH_001", "Public Health Department")
                    .with_officer("Medical Officer of Health")
                    .with_officer("Sanitary Inspector"),
                DepartmentEntry::new("WORKS_001", "Public Works Department")
                    .with_officer("Superintending Engineer, Public Works")
                    .with_officer("Junior Engineer, Water and Drainage"),
            ],
            default_id: "WORKS_001".to_string(),
        }
    }

    /// Resolve a department name (or id, or alias) to its id.
    ///
    /// Never fails: unknown names resolve to the default department.
    pub fn resolve(&self, name: &str) -> &str {
        self.lookup(name)
            .map(|d| d.id.as_str())
            .unwrap_or(&self.default_id)
    }

    /// Exact lookup without fallback.
    pub fn lookup(&self, name: &str) -> Option<&DepartmentEntry> {
        let normalized = normalize(name);
        if normalized.is_empty() {
            return None;
        }
        self.departments.iter().find(|d| d.matches(&normalized))
    }

    /// Officer roster of a department, for display only.
    pub fn officers_of(&self, department_id: &str) -> &[String] {
        self.departments
            .iter()
            .find(|d| d.id == department_id)
            .map(|d| d.officers.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains_id(&self, department_id: &str) -> bool {
        self.departments.iter().any(|d| d.id == department_id)
    }

    pub fn default_id(&self) -> &str {
        &self.default_id
    }

    pub fn departments(&self) -> &[DepartmentEntry] {
        &self.departments
    }
}

impl Default for DepartmentDirectory {
    fn default() -> Self {
        Self::civic_default()
    }
}

/// Case, whitespace and `&`/`and` insensitive key.
fn normalize(name: &str) -> String {
    name.replace('&', " and ")
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric() && c != '_'))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
