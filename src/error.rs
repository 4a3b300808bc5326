use std::path::PathBuf;

/// Errors raised by the dataset, metrics and configuration layers.
///
/// Code driving the pretrained pipeline reports `anyhow::Result` instead,
/// matching the `diffusers` crate it calls into.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("error accessing {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error decoding image {path:?}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("index {index} out of range for dataset of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("cannot batch an empty dataset")]
    EmptyDataset,

    #[error(transparent)]
    Tch(#[from] tch::TchError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("the generation worker has stopped")]
    WorkerStopped,
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
