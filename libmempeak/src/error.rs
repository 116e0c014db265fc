use thiserror::Error;

use crate::trace::TraceError;

/// Errors from reading trace tables and interval files.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{file}: {source}")]
    File {
        file: String,
        #[source]
        source: Box<ParseError>,
    },

    #[error("Line {line}: {message}\n  Content: {content}")]
    Line {
        line: usize,
        content: String,
        message: String,
    },

    #[error("Incomplete interval record starting at line {line}: expected a label, a start and an end line")]
    IncompleteRecord { line: usize },

    #[error(transparent)]
    Trace(#[from] TraceError),
}

impl ParseError {
    pub(crate) fn line(line: usize, content: &str, message: impl Into<String>) -> Self {
        ParseError::Line {
            line,
            content: content.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn in_file(self, file: impl Into<String>) -> Self {
        ParseError::File {
            file: file.into(),
            source: Box::new(self),
        }
    }
}
