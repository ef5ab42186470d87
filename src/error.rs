//! Error types.
//!
//! Two families, mirroring the two phases of the crate:
//!
//! - [`DefinitionError`]: a problem found while reading or resolving a
//!   definition. Always fatal; compilation stops at the first one. Carries a
//!   source location (row/column, resolved through line-continuation offsets)
//!   whenever one is known.
//! - [`ExtractionError`]: an internal inconsistency found while matching
//!   (the pre-filter automaton accepted a candidate whose compiled regexp then
//!   failed to match). Distinct from "no rule matched", which is a normal
//!   `None` result, not an error.

use thiserror::Error;

/// Problem in an extraction definition, reported with its source location.
#[derive(Debug, Clone, Error)]
#[error("({source_desc}{location}): {message}")]
pub struct DefinitionError {
    message: String,
    source_desc: String,
    location: LocationSuffix,
}

/// Formats as `, row R, column C` when a location is known, empty otherwise.
#[derive(Debug, Clone)]
struct LocationSuffix(Option<(usize, usize)>);

impl std::fmt::Display for LocationSuffix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            Some((row, column)) => write!(f, ", row {row}, column {column}"),
            None => Ok(()),
        }
    }
}

impl DefinitionError {
    pub(crate) fn located(
        source_desc: &str,
        row: usize,
        column: usize,
        message: impl Into<String>,
    ) -> Self {
        DefinitionError {
            message: message.into(),
            source_desc: source_desc.to_string(),
            location: LocationSuffix(Some((row, column))),
        }
    }

    pub(crate) fn unlocated(source_desc: &str, message: impl Into<String>) -> Self {
        DefinitionError {
            message: message.into(),
            source_desc: source_desc.to_string(),
            location: LocationSuffix(None),
        }
    }

    /// The problem description, without the source-location prefix.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 1-based physical row, if the error has a known location.
    pub fn row(&self) -> Option<usize> {
        self.location.0.map(|(row, _)| row)
    }

    /// 1-based column within the physical row, if known.
    pub fn column(&self) -> Option<usize> {
        self.location.0.map(|(_, col)| col)
    }
}

/// Internal fault while extracting: the automaton and the compiled regexp
/// disagreed about an input. Worth logging; callers may fall back to
/// [`Extractor::extract_safe`](crate::Extractor::extract_safe).
#[derive(Debug, Clone, Error)]
#[error("{message} (input: {input:?})")]
pub struct ExtractionError {
    pub(crate) input: String,
    pub(crate) message: String,
}

impl ExtractionError {
    /// The input line that triggered the inconsistency.
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
