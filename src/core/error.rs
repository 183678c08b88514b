use crate::core::ClusterId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FatError {
    #[error("Cluster index {index} out of range (table has {capacity} clusters)")]
    IndexOutOfRange { index: u64, capacity: usize },

    #[error("Insufficient space: {needed} clusters needed, {available} free")]
    InsufficientSpace { needed: u64, available: usize },

    #[error("Invalid file handle: cluster {0} is not an occupied start cluster")]
    InvalidHandle(ClusterId),

    #[error("Invalid cluster size: {0} (must be greater than zero)")]
    InvalidClusterSize(u64),

    #[error("Invalid pointer width: {0} bits (must be between 1 and 24)")]
    InvalidPointerBits(u32),

    #[error("Corrupt chain starting at cluster {start}: {reason}")]
    CorruptChain { start: ClusterId, reason: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FatError>;
