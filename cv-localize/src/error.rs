use std::path::PathBuf;

/// Errors raised while loading the database or processing queries.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unable to access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
    #[error("malformed {what} at token {token}: {message}")]
    Parse {
        what: &'static str,
        token: usize,
        message: String,
    },
    #[error("inconsistent {what}: {message}")]
    Inconsistent { what: &'static str, message: String },
    #[error("invalid setting {name}: {message}")]
    Setting { name: &'static str, message: String },
    #[error("no gps coordinate for {what} {index} (the table has {len} entries)")]
    MissingGps {
        what: &'static str,
        index: usize,
        len: usize,
    },
    #[error(transparent)]
    Embedding(#[from] hamming_embedding::Error),
    #[error("unable to read image dimensions of {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[cfg(feature = "serde-serialize")]
    #[error("reconstruction cache: {0}")]
    Bincode(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }

    pub(crate) fn inconsistent(what: &'static str, message: impl Into<String>) -> Self {
        Self::Inconsistent {
            what,
            message: message.into(),
        }
    }
}
