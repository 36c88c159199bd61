use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// Document is not well-formed XML.
    #[error("malformed XML: {0}")]
    Xml(String),
    #[error("cannot decode document: {0}")]
    Encoding(String),
    #[error("invalid file pattern {pattern:?}: {message}")]
    Pattern { pattern: String, message: String },
    #[error("mapping sheet {path}: {message}")]
    Sheet { path: String, message: String },
    #[error("store {path}: {message}")]
    Store { path: String, message: String },
    #[error("cannot write {path}: {message}")]
    Export { path: String, message: String },
}
