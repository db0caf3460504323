//! Error types for Python analysis and slicing.
//!
//! Almost nothing in this crate is fatal: unresolved specs fall back to
//! conservative effects, missing reaching definitions simply produce no
//! edges, and malformed statements are skipped during traversal. What
//! remains is surfaced here: syntax errors in cell text, queries addressed
//! at identities the log has never seen, and malformed caller-supplied spec
//! tables.

use thiserror::Error;

/// Result alias for analysis and slicing operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;

/// Errors reported by the parser, the analyzer, and the execution-log
/// slicer.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The source text is not valid Python. The position points at the
    /// first node the grammar could not make sense of.
    #[error("syntax error at {line}:{column}")]
    SyntaxError { line: u32, column: u32 },

    /// The Python grammar could not be loaded into the parser.
    #[error("failed to load Python grammar: {0}")]
    Grammar(#[from] tree_sitter::LanguageError),

    /// A slicing query named an execution event the log has never seen.
    #[error("no logged execution with event id '{execution_event_id}'")]
    UnknownExecution { execution_event_id: String },

    /// A slicing query named a persistent cell with no sliceable execution.
    #[error("no sliceable execution for cell '{persistent_id}'")]
    UnknownCell { persistent_id: String },

    /// A caller-supplied spec table was not valid JSON for the schema.
    #[error("invalid spec table: {0}")]
    InvalidSpecTable(#[from] serde_json::Error),
}

impl AnalysisError {
    pub fn syntax_error(line: u32, column: u32) -> Self {
        AnalysisError::SyntaxError { line, column }
    }

    pub fn unknown_execution(execution_event_id: impl Into<String>) -> Self {
        AnalysisError::UnknownExecution {
            execution_event_id: execution_event_id.into(),
        }
    }

    pub fn unknown_cell(persistent_id: impl Into<String>) -> Self {
        AnalysisError::UnknownCell {
            persistent_id: persistent_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_identity() {
        let err = AnalysisError::syntax_error(3, 7);
        assert_eq!(err.to_string(), "syntax error at 3:7");

        let err = AnalysisError::unknown_execution("ev-9");
        assert!(err.to_string().contains("ev-9"));

        let err = AnalysisError::unknown_cell("cell-2");
        assert!(err.to_string().contains("cell-2"));
    }
}
