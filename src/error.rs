//! Error types for every stage of the capture pipeline

use std::io;

use thiserror::Error;

use crate::session::probe::ProbeFailure;

/// Opening a frame source failed
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("no decoder available for stream url {0}")]
    Unsupported(String),

    #[error("failed to open stream {url}: {reason}")]
    Open { url: String, reason: String },
}

/// Turning a decoded frame into a JPEG failed
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("frame buffer holds {actual} bytes, expected {expected} for {width}x{height}")]
    BufferSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("jpeg encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Live frame buffer lifecycle errors
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("decode loop for camera {camera_id} was already started")]
    AlreadyStarted { camera_id: String },

    #[error("failed to spawn decode thread: {0}")]
    Spawn(#[source] io::Error),
}

/// The out-of-band unlock action failed
#[derive(Debug, Error)]
pub enum UnlockError {
    #[error("failed to run unlock command {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("unlock command {program} exited with {status}")]
    Failed { program: String, status: String },
}

/// Establishing a camera session failed
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("stream {url} is unreachable: {reason}")]
    Unreachable { url: String, reason: ProbeFailure },

    #[error("unlock failed: {0}")]
    Unlock(#[from] UnlockError),

    #[error("stream still locked after {attempts} polls")]
    UnlockTimedOut { attempts: u32 },

    #[error("session establishment cancelled")]
    Cancelled,

    #[error("camera {0} already has an open session")]
    DuplicateCamera(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("snapshot directory: {0}")]
    Io(#[from] io::Error),
}

/// Persisting a snapshot failed
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("no open session for camera {0}")]
    UnknownCamera(String),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("failed to write snapshot: {0}")]
    Io(#[from] io::Error),
}

/// Loading or validating configuration failed
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
