//! Validation results.
//!
//! A failed validation produces a tree of [`ValidationReport`]s mirroring the
//! shape of the input. [`ValidationErrors::flatten`] walks it depth-first and
//! emits one [`FieldViolation`] per violated constraint, keyed by dotted path.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One violated constraint, as rendered in error envelopes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
    #[serde(rename = "value", default, skip_serializing_if = "Option::is_none")]
    pub rejected_value: Option<Value>,
}

/// A single failed constraint on one property.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub constraint: &'static str,
    pub message: String,
}

/// Validation outcome of one property and its nested properties.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub property: String,
    pub value: Option<Value>,
    pub violations: Vec<Violation>,
    pub children: Vec<ValidationReport>,
}

impl ValidationReport {
    pub fn new(property: impl Into<String>, value: Option<Value>) -> Self {
        Self {
            property: property.into(),
            value,
            violations: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn violation(mut self, constraint: &'static str, message: impl Into<String>) -> Self {
        self.push(constraint, message);
        self
    }

    pub fn push(&mut self, constraint: &'static str, message: impl Into<String>) {
        self.violations.push(Violation {
            constraint,
            message: message.into(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty() && self.children.iter().all(Self::is_clean)
    }

    fn flatten_into(&self, parent: Option<&str>, out: &mut Vec<FieldViolation>) {
        let path = match parent {
            Some(parent) => format!("{parent}.{}", self.property),
            None => self.property.clone(),
        };

        out.extend(self.violations.iter().map(|v| FieldViolation {
            field: path.clone(),
            message: v.message.clone(),
            rejected_value: self.value.clone(),
        }));

        for child in &self.children {
            child.flatten_into(Some(&path), out);
        }
    }
}

/// All violations found in one input.
///
/// Rendered with the generic `Bad Request` error name unless a more specific
/// one is attached with [`with_kind`](Self::with_kind).
#[derive(Debug, Clone, PartialEq, Default, Error)]
#[error("Validation failed: {}", summary(.reports))]
pub struct ValidationErrors {
    reports: Vec<ValidationReport>,
    kind: Option<&'static str>,
}

impl ValidationErrors {
    pub fn new(reports: Vec<ValidationReport>) -> Self {
        Self {
            reports,
            kind: None,
        }
    }

    /// Name the failure, e.g. `"Invalid date format"`.
    pub fn with_kind(mut self, kind: &'static str) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn kind(&self) -> Option<&'static str> {
        self.kind
    }

    /// Errors consisting of a single violated constraint.
    pub fn single(
        property: &str,
        value: Option<Value>,
        constraint: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            ValidationReport::new(property, value).violation(constraint, message),
        ])
    }

    pub fn is_empty(&self) -> bool {
        self.reports.iter().all(ValidationReport::is_clean)
    }

    /// Depth-first list of violations with dotted field paths.
    pub fn flatten(&self) -> Vec<FieldViolation> {
        let mut out = Vec::new();
        for report in &self.reports {
            report.flatten_into(None, &mut out);
        }
        out
    }

    /// Violation messages in [`flatten`](Self::flatten) order.
    pub fn messages(&self) -> Vec<String> {
        self.flatten().into_iter().map(|v| v.message).collect()
    }
}

fn summary(reports: &[ValidationReport]) -> String {
    let mut flat = Vec::new();
    for report in reports {
        report.flatten_into(None, &mut flat);
    }
    flat.into_iter()
        .map(|v| v.message)
        .collect::<Vec<_>>()
        .join("; ")
}
