use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("directory {0} does not exist")]
    MissingDir(PathBuf),

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("output directory {path} is not writable: {source}")]
    NotWritable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("filesystem error: {0}")]
    Fs(#[from] std::io::Error),
}
