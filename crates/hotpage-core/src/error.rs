use std::path::PathBuf;
use thiserror::Error;

/// Core error type for hotpage operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read config at {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Watch(#[from] crate::watch::WatchError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

/// Project layout problems. Fatal at startup.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Pages directory not found: {}", .0.display())]
    MissingPagesDir(PathBuf),

    #[error("Pages path is not a directory: {}", .0.display())]
    PagesDirNotADirectory(PathBuf),

    #[error("Pages directory {} is outside the project root", .0.display())]
    PagesOutsideRoot(PathBuf),

    #[error("Duplicate route {pattern}: {first} and {second} map to the same path")]
    DuplicateRoute {
        pattern: String,
        first: String,
        second: String,
    },

    #[error("Invalid route segment {segment:?} in {file}")]
    InvalidSegment { file: String, segment: String },
}

/// A source file could not be turned into a module.
///
/// Contained to a failed build; never escapes the bundler session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{file}{}: {message}", .line.map(|l| format!(":{l}")).unwrap_or_default())]
pub struct TransformError {
    /// Project-relative path of the offending file.
    pub file: String,
    /// 1-based line, when known.
    pub line: Option<u32>,
    pub message: String,
}

impl TransformError {
    #[must_use]
    pub fn new(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_error_display() {
        let err = TransformError::new("pages/index.tsx", "unclosed '{'").at_line(3);
        assert_eq!(err.to_string(), "pages/index.tsx:3: unclosed '{'");

        let err = TransformError::new("a.css", "bad");
        assert_eq!(err.to_string(), "a.css: bad");
    }

    #[test]
    fn test_duplicate_route_display() {
        let err = ConfigurationError::DuplicateRoute {
            pattern: "/about".into(),
            first: "pages/about.tsx".into(),
            second: "pages/about/index.tsx".into(),
        };
        assert!(err.to_string().contains("/about"));
        assert!(err.to_string().contains("pages/about/index.tsx"));
    }
}
