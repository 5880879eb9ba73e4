use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Coarse classification of load failures.
///
/// Callers use this to decide whether to keep the previously loaded scene,
/// skip a file, or give up entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Missing section, bad column count, unknown keyword.
    Malformed,
    /// A name (frame, parent) that does not resolve against the model.
    UnresolvedReference,
    /// A data token that is not a number.
    NumericParse,
    /// A mesh or data file that could not be found.
    ResourceNotFound,
    Io,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: did not find {section} section", path.display())]
    MissingSection { path: PathBuf, section: &'static str },

    #[error("{}:{line}: {message}", path.display())]
    Column { path: PathBuf, line: usize, message: String },

    #[error("{}:{line}: only found {found} data columns, but {expected} columns were specified in the COLUMNS section", path.display())]
    ColumnCount {
        path: PathBuf,
        line: usize,
        found: usize,
        expected: usize,
    },

    #[error("{}:{line}: could not convert value '{token}' into a number (column {column})", path.display())]
    Number {
        path: PathBuf,
        line: usize,
        column: usize,
        token: String,
    },

    #[error("{}:{line}: timestamp {timestamp} is smaller than the previous timestamp {previous}", path.display())]
    Timestamp {
        path: PathBuf,
        line: usize,
        timestamp: f32,
        previous: f32,
    },

    #[error("{}:{line}: unknown frame '{name}'", path.display())]
    UnknownFrame { path: PathBuf, line: usize, name: String },

    #[error("could not find parent frame '{parent}' of frame '{frame}'")]
    UnknownParent { frame: String, parent: String },

    #[error("could not find frame '{0}'")]
    MissingFrame(String),

    #[error("frame '{0}' already exists")]
    DuplicateFrame(String),

    #[error("invalid character '{character}' in frame name '{name}'")]
    InvalidFrameName { name: String, character: char },

    #[error("could not load mesh '{mesh}': {reason}")]
    Mesh { mesh: String, reason: String },

    #[error("{}: {message}", path.display())]
    ModelFormat { path: PathBuf, message: String },

    #[error("{}: could not determine file type, must be either .json or .toml", path.display())]
    UnsupportedExtension { path: PathBuf },

    #[error("invalid configuration: {0}")]
    Configuration(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound => FailureKind::ResourceNotFound,
            Self::Io { .. } => FailureKind::Io,
            Self::Mesh { .. } => FailureKind::ResourceNotFound,
            Self::Number { .. } => FailureKind::NumericParse,
            Self::UnknownFrame { .. } | Self::UnknownParent { .. } | Self::MissingFrame(_) => {
                FailureKind::UnresolvedReference
            }
            Self::MissingSection { .. }
            | Self::Column { .. }
            | Self::ColumnCount { .. }
            | Self::Timestamp { .. }
            | Self::DuplicateFrame(_)
            | Self::InvalidFrameName { .. }
            | Self::ModelFormat { .. }
            | Self::UnsupportedExtension { .. }
            | Self::Configuration(_) => FailureKind::Malformed,
        }
    }

    /// 1-based line number the error refers to, if any.
    pub fn line(&self) -> Option<usize> {
        match self {
            Self::Column { line, .. }
            | Self::ColumnCount { line, .. }
            | Self::Number { line, .. }
            | Self::Timestamp { line, .. }
            | Self::UnknownFrame { line, .. } => Some(*line),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_resource_not_found() {
        let err = Error::io("anim.txt", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert_eq!(err.kind(), FailureKind::ResourceNotFound);
        assert_eq!(err.line(), None);
    }

    #[test]
    fn column_errors_carry_line_context() {
        let err = Error::Column {
            path: "walk.txt".into(),
            line: 3,
            message: "Unknown transform type 'bogus'".to_string(),
        };
        assert_eq!(err.kind(), FailureKind::Malformed);
        assert_eq!(err.line(), Some(3));
        assert_eq!(err.to_string(), "walk.txt:3: Unknown transform type 'bogus'");
    }
}
