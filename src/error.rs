use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("file `{0}' does not exist")]
    NotFound(PathBuf),

    #[error("channel `{name}' is not present in the recording")]
    InvalidChannel { name: String },

    #[error("status channel `{channel}' has no active samples, cannot locate the video window")]
    EmptySignal { channel: String },

    #[error("window [{start}, {end}) is empty or inverted")]
    InvalidWindow { start: usize, end: usize },

    #[error("samples [{start}, {end}) are outside channel {channel} ({available} samples)")]
    OutOfRange {
        channel: usize,
        start: usize,
        end: usize,
        available: usize,
    },

    #[error("malformed recording header, {0}")]
    Format(String),

    #[error("{0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
