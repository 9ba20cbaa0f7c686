//! Issue records collected by validation, expansion, and derivation.
//!
//! No exceptions traverse the public API: every diagnostic rides in an
//! [`Issue`] list next to the result. Fatal issues block expansion; warnings
//! never do.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Fatal,
    Warning,
}

/// Which stage of the pipeline raised the issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Parse,
    Validate,
    Expand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub severity: Severity,
    pub phase: Phase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub surface_index: Option<usize>,
}

impl Issue {
    pub fn fatal(phase: Phase, message: impl Into<String>) -> Issue {
        Issue {
            severity: Severity::Fatal,
            phase,
            message: message.into(),
            block_id: None,
            surface_index: None,
        }
    }

    pub fn warning(phase: Phase, message: impl Into<String>) -> Issue {
        Issue {
            severity: Severity::Warning,
            phase,
            message: message.into(),
            block_id: None,
            surface_index: None,
        }
    }

    pub fn for_block(mut self, block_id: impl Into<String>) -> Issue {
        self.block_id = Some(block_id.into());
        self
    }

    pub fn at_surface(mut self, index: usize) -> Issue {
        self.surface_index = Some(index);
        self
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Fatal => "fatal",
            Severity::Warning => "warning",
        };
        write!(f, "[{severity}] {}", self.message)?;
        if let Some(id) = &self.block_id {
            write!(f, " (block {id})")?;
        }
        if let Some(i) = self.surface_index {
            write!(f, " (surface {i})")?;
        }
        Ok(())
    }
}

/// True when any issue in the list blocks expansion.
pub fn has_fatal(issues: &[Issue]) -> bool {
    issues.iter().any(|i| i.severity == Severity::Fatal)
}
