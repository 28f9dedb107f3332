//! Low-severity findings recorded while the model is built.
//!
//! Diagnostics never fail anything; they are kept on the model for callers to
//! inspect and mirrored to `tracing`.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticLevel {
    Debug,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub code: &'static str,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

pub mod codes {
    pub const AMBIGUOUS_NAVIGATION: &str = "ambiguous_navigation";
    pub const AMBIGUOUS_FOREIGN_KEY: &str = "ambiguous_foreign_key";
    pub const FOREIGN_KEY_CANDIDATE_REJECTED: &str = "foreign_key_candidate_rejected";
    pub const MULTIPLE_KEY_CANDIDATES: &str = "multiple_key_candidates";
    pub const BASE_TYPE_REJECTED: &str = "base_type_rejected";
    pub const RELATIONSHIP_DEFERRED: &str = "relationship_deferred";
    pub const MEMBER_CONFLICT: &str = "member_conflict";
}
