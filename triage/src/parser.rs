//! Parsing oracle output into triage results.
//!
//! The oracle answers in free text following a small labeled-line contract:
//!
//! ```text
//! Department: Roads and Bridges Department
//! Priority: 8
//! Category: infrastructure
//! Analysis: Large pothole on a busy road, accident risk.
//! Officer: Executive Engineer, Roads Division
//! ```
//!
//! Lines are located by label, in any order. Only the complete absence of
//! structure is an error; every individual field has a fallback.

use chrono::Utc;
use serde::Deserialize;

use crate::directory::DepartmentDirectory;
use crate::types::{ComplaintCategory, TriageResult};

/// Priority used when the oracle's value is missing or unusable.
pub const DEFAULT_PRIORITY: f64 = 0.5;

pub const NO_ANALYSIS: &str = "No analysis provided.";
pub const NO_OFFICER_RECOMMENDATION: &str = "No specific officer recommendation provided.";

/// The oracle ignored the format contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Oracle returned an empty response")]
    Empty,

    #[error("Oracle response has {found} recognised section(s), need at least {required}")]
    MissingStructure { found: usize, required: usize },
}

/// What a parser needs besides the raw text.
#[derive(Debug, Clone, Copy)]
pub struct ParseContext<'a> {
    pub complaint_id: &'a str,
    /// Version tag for the result (the oracle model id)
    pub version: &'a str,
    pub directory: &'a DepartmentDirectory,
}

/// Strategy for turning oracle output into a [`TriageResult`].
pub trait ResponseParser: Send + Sync {
    fn parse(&self, raw: &str, ctx: &ParseContext<'_>) -> Result<TriageResult, ParseError>;
}

/// Fields pulled out of a response before defaults are applied.
#[derive(Debug, Default)]
struct RawFields {
    department: Option<String>,
    priority: Option<String>,
    category: Option<String>,
    analysis: Option<String>,
    officer: Option<String>,
}

impl RawFields {
    fn into_result(self, ctx: &ParseContext<'_>) -> TriageResult {
        let department_id = self
            .department
            .as_deref()
            .map(|name| ctx.directory.resolve(name))
            .unwrap_or_else(|| ctx.directory.default_id())
            .to_string();

        TriageResult {
            id: uuid::Uuid::new_v4().to_string(),
            complaint_id: ctx.complaint_id.to_string(),
            department_id,
            priority_score: self
                .priority
                .as_deref()
                .and_then(parse_priority)
                .unwrap_or(DEFAULT_PRIORITY),
            analysis_text: non_empty(self.analysis).unwrap_or_else(|| NO_ANALYSIS.to_string()),
            officer_recommendation: non_empty(self.officer)
                .unwrap_or_else(|| NO_OFFICER_RECOMMENDATION.to_string()),
            category_prediction: self
                .category
                .as_deref()
                .map(ComplaintCategory::from_label)
                .unwrap_or_default(),
            version: ctx.version.to_string(),
            created_at: Utc::now(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Normalize a 1-10 priority to [0, 1].
///
/// Takes the leading number of the value, so `8`, `8/10` and `7.5 (high)` all
/// parse. Out-of-range values are treated as unparsable.
pub fn parse_priority(value: &str) -> Option<f64> {
    let value = value.trim();
    let end = value
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
        .map(|(i, _)| i)
        .unwrap_or(value.len());

    let score: f64 = value[..end].trim_end_matches('.').parse().ok()?;
    if !(1.0..=10.0).contains(&score) {
        return None;
    }

    // Round away float noise: 7 / 10 must store as 0.7.
    Some((score / 10.0 * 1000.0).round() / 1000.0)
}

/// Labeled-line parser for the plain-text oracle contract.
#[derive(Debug, Clone)]
pub struct LabeledLineParser {
    min_sections: usize,
}

impl LabeledLineParser {
    pub fn new(min_sections: usize) -> Self {
        Self {
            min_sections: min_sections.max(1),
        }
    }
}

impl Default for LabeledLineParser {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Strip `label:` from the start of a line, ignoring case, list bullets and
/// markdown emphasis (`- **Priority:** 8`).
fn strip_label<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let line = line
        .trim()
        .trim_start_matches(|c: char| c == '-' || c == '*' || c == '#' || c.is_whitespace());

    let head = line.get(..label.len())?;
    if !head.eq_ignore_ascii_case(label) {
        return None;
    }

    let rest = line[label.len()..].trim_start_matches('*').trim_start();
    let rest = rest.strip_prefix(':')?;
    Some(rest.trim_start_matches('*').trim())
}

impl ResponseParser for LabeledLineParser {
    fn parse(&self, raw: &str, ctx: &ParseContext<'_>) -> Result<TriageResult, ParseError> {
        if raw.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let mut fields = RawFields::default();
        let mut found = 0;

        for line in raw.lines() {
            // Longer labels first: "Officer Assignment:" before "Officer:".
            let slot = if let Some(rest) = strip_label(line, "Department") {
                Some((&mut fields.department, rest))
            } else if let Some(rest) = strip_label(line, "Priority") {
                Some((&mut fields.priority, rest))
            } else if let Some(rest) = strip_label(line, "Category") {
                Some((&mut fields.category, rest))
            } else if let Some(rest) = strip_label(line, "Analysis") {
                Some((&mut fields.analysis, rest))
            } else if let Some(rest) = strip_label(line, "Officer Assignment") {
                Some((&mut fields.officer, rest))
            } else if let Some(rest) = strip_label(line, "Officer") {
                Some((&mut fields.officer, rest))
            } else {
                None
            };

            if let Some((field, rest)) = slot {
                // First occurrence wins.
                if field.is_none() {
                    *field = Some(rest.to_string());
                    found += 1;
                }
            }
        }

        if found < self.min_sections {
            return Err(ParseError::MissingStructure {
                found,
                required: self.min_sections,
            });
        }

        Ok(fields.into_result(ctx))
    }
}

/// Parser for oracles with native structured (JSON) output.
///
/// Accepts `{"department": ..., "priority": ..., "category": ...,
/// "analysis": ..., "officer": ...}`; markdown code fences are tolerated.
#[derive(Debug, Clone, Default)]
pub struct JsonResponseParser;

#[derive(Debug, Deserialize)]
struct JsonFields {
    department: Option<String>,
    priority: Option<serde_json::Value>,
    category: Option<String>,
    analysis: Option<String>,
    #[serde(alias = "officer_assignment", alias = "officer_recommendation")]
    officer: Option<String>,
}

impl ResponseParser for JsonResponseParser {
    fn parse(&self, raw: &str, ctx: &ParseContext<'_>) -> Result<TriageResult, ParseError> {
        let body = raw
            .trim()
            .trim_start_matches("```json")
            .trim_start_matches("```")
            .trim_end_matches("```")
            .trim();

        if body.is_empty() {
            return Err(ParseError::Empty);
        }

        let json: JsonFields = serde_json::from_str(body).map_err(|_| {
            ParseError::MissingStructure {
                found: 0,
                required: 1,
            }
        })?;

        let fields = RawFields {
            department: json.department,
            priority: json.priority.map(|p| match p {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            }),
            category: json.category,
            analysis: json.analysis,
            officer: json.officer,
        };

        if fields.department.is_none()
            && fields.priority.is_none()
            && fields.category.is_none()
            && fields.analysis.is_none()
            && fields.officer.is_none()
        {
            return Err(ParseError::MissingStructure {
                found: 0,
                required: 1,
            });
        }

        Ok(fields.into_result(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(directory: &DepartmentDirectory) -> ParseContext<'_> {
        ParseContext {
            complaint_id: "c-1",
            version: "test-model",
            directory,
        }
    }

    #[test]
    fn test_full_response() {
        let dir = DepartmentDirectory::civic_default();
        let raw = "Department: Roads & Bridges Department\n\
                   Priority: 8\n\
                   Category: infrastructure\n\
                   Analysis: Pothole causing accidents.\n\
                   Officer: Executive Engineer, Roads Division";

        let result = LabeledLineParser::default().parse(raw, &ctx(&dir)).unwrap();

        assert_eq!(result.department_id, "ROADS_001");
        assert_eq!(result.priority_score, 0.8);
        assert_eq!(result.category_prediction, ComplaintCategory::Infrastructure);
        assert_eq!(result.analysis_text, "Pothole causing accidents.");
        assert_eq!(result.officer_recommendation, "Executive Engineer, Roads Division");
        assert_eq!(result.complaint_id, "c-1");
        assert_eq!(result.version, "test-model");
    }

    #[test]
    fn test_order_insensitive_and_idempotent() {
        let dir = DepartmentDirectory::civic_default();
        let parser = LabeledLineParser::default();
        let a = "Officer: Inspector\nAnalysis: Dirty water\nPriority: 6\nDepartment: Public Health Department";
        let b = "Priority: 6\nDepartment: Public Health Department\nOfficer: Inspector\nAnalysis: Dirty water";

        let ra = parser.parse(a, &ctx(&dir)).unwrap();
        let rb = parser.parse(b, &ctx(&dir)).unwrap();
        let ra2 = parser.parse(a, &ctx(&dir)).unwrap();

        for r in [&rb, &ra2] {
            assert_eq!(ra.department_id, r.department_id);
            assert_eq!(ra.priority_score, r.priority_score);
            assert_eq!(ra.analysis_text, r.analysis_text);
            assert_eq!(ra.officer_recommendation, r.officer_recommendation);
        }
        assert_eq!(ra.department_id, "HEALTH_001");
    }

    #[test]
    fn test_unknown_department_uses_default() {
        let dir = DepartmentDirectory::civic_default();
        let raw = "Department: Department of Silly Walks\nPriority: 3";

        let result = LabeledLineParser::default().parse(raw, &ctx(&dir)).unwrap();
        assert_eq!(result.department_id, "WORKS_001");
        assert_eq!(result.priority_score, 0.3);
    }

    #[test]
    fn test_missing_department_uses_default() {
        let dir = DepartmentDirectory::civic_default();
        let result = LabeledLineParser::default()
            .parse("Priority: 9\nAnalysis: urgent", &ctx(&dir))
            .unwrap();
        assert_eq!(result.department_id, "WORKS_001");
    }

    #[test]
    fn test_priority_normalization() {
        assert_eq!(parse_priority("7"), Some(0.7));
        assert_eq!(parse_priority("10"), Some(1.0));
        assert_eq!(parse_priority("1"), Some(0.1));
        assert_eq!(parse_priority("8/10"), Some(0.8));
        assert_eq!(parse_priority("7.5 (high)"), Some(0.75));
        assert_eq!(parse_priority("high"), None);
        assert_eq!(parse_priority("0"), None);
        assert_eq!(parse_priority("11"), None);
        assert_eq!(parse_priority(""), None);
    }

    #[test]
    fn test_garbled_or_missing_priority_defaults() {
        let dir = DepartmentDirectory::civic_default();
        let parser = LabeledLineParser::default();

        let garbled = parser
            .parse("Department: Public Works Department\nPriority: urgent!!", &ctx(&dir))
            .unwrap();
        assert_eq!(garbled.priority_score, DEFAULT_PRIORITY);

        let missing = parser
            .parse("Department: Public Works Department", &ctx(&dir))
            .unwrap();
        assert_eq!(missing.priority_score, DEFAULT_PRIORITY);
    }

    #[test]
    fn test_absent_free_text_gets_placeholders() {
        let dir = DepartmentDirectory::civic_default();
        let result = LabeledLineParser::default()
            .parse("Department: Social Welfare Department\nAnalysis:   ", &ctx(&dir))
            .unwrap();

        assert_eq!(result.analysis_text, NO_ANALYSIS);
        assert_eq!(result.officer_recommendation, NO_OFFICER_RECOMMENDATION);
        assert_eq!(result.category_prediction, ComplaintCategory::Others);
    }

    #[test]
    fn test_markdown_and_alternate_labels() {
        let dir = DepartmentDirectory::civic_default();
        let raw = "Here is my analysis:\n\
                   - **Department:** Public Health Department\n\
                   - **Priority:** 9\n\
                   **Officer Assignment:** Sanitary Inspector";

        let result = LabeledLineParser::default().parse(raw, &ctx(&dir)).unwrap();
        assert_eq!(result.department_id, "HEALTH_001");
        assert_eq!(result.priority_score, 0.9);
        assert_eq!(result.officer_recommendation, "Sanitary Inspector");
    }

    #[test]
    fn test_unstructured_response_is_error() {
        let dir = DepartmentDirectory::civic_default();
        let parser = LabeledLineParser::default();

        assert_eq!(parser.parse("   \n ", &ctx(&dir)), Err(ParseError::Empty));
        assert!(matches!(
            parser.parse("I'm sorry, I can't help with that.", &ctx(&dir)),
            Err(ParseError::MissingStructure { found: 0, required: 1 })
        ));
    }

    #[test]
    fn test_min_sections() {
        let dir = DepartmentDirectory::civic_default();
        let parser = LabeledLineParser::new(2);

        assert!(parser.parse("Priority: 4", &ctx(&dir)).is_err());
        assert!(parser.parse("Priority: 4\nAnalysis: ok", &ctx(&dir)).is_ok());
    }

    #[test]
    fn test_json_parser() {
        let dir = DepartmentDirectory::civic_default();
        let raw = "```json\n{\"department\": \"Roads and Bridges Department\", \"priority\": 7, \"analysis\": \"Cracked bridge deck\", \"officer_assignment\": \"Bridge engineer\"}\n```";

        let result = JsonResponseParser.parse(raw, &ctx(&dir)).unwrap();
        assert_eq!(result.department_id, "ROADS_001");
        assert_eq!(result.priority_score, 0.7);
        assert_eq!(result.officer_recommendation, "Bridge engineer");

        assert!(JsonResponseParser.parse("not json", &ctx(&dir)).is_err());
        assert!(JsonResponseParser.parse("{}", &ctx(&dir)).is_err());
    }
}
