use std::path::PathBuf;

/// Error type for the decomposition and export pipeline.
///
/// `Validation` aborts a run before any pixel work begins; `Decode` rejects
/// an input file; `Export` leaves prior in-memory state intact so the caller
/// may retry; `State` reports a lifecycle misuse (e.g. decomposing with no
/// image loaded).
#[derive(Debug)]
pub enum PicgleError {
    Validation(String),
    Decode { path: PathBuf, reason: String },
    Export(String),
    State(String),
    Io(std::io::Error),
}

impl std::fmt::Display for PicgleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PicgleError::Validation(msg) => write!(f, "Invalid parameter: {}", msg),
            PicgleError::Decode { path, reason } => {
                write!(f, "Cannot load image '{}': {}", path.display(), reason)
            }
            PicgleError::Export(msg) => write!(f, "Export failed: {}", msg),
            PicgleError::State(msg) => write!(f, "Invalid operation: {}", msg),
            PicgleError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for PicgleError {}

impl From<std::io::Error> for PicgleError {
    fn from(e: std::io::Error) -> Self {
        PicgleError::Io(e)
    }
}

impl From<image::ImageError> for PicgleError {
    fn from(e: image::ImageError) -> Self {
        PicgleError::Export(e.to_string())
    }
}

impl From<zip::result::ZipError> for PicgleError {
    fn from(e: zip::result::ZipError) -> Self {
        PicgleError::Export(e.to_string())
    }
}
