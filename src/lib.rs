pub mod capture;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod snapshot;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use capture::{Frame, FrameSource};
pub use error::ConfigError;
pub use pipeline::LiveFrameBuffer;
pub use session::SessionRegistry;
pub use snapshot::{CaptureOutcome, FrameIdentity, Scraper};

use snapshot::{CAMERA_ID_WIDTH, SERIAL_LIMIT};

/// Environment variable prefix, e.g. `ARGUS_CAPTURE__MAX_SERIAL_NUM`
pub const ENV_PREFIX: &str = "ARGUS";

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "argus.toml";

/// One monitored feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDescriptor {
    /// Fixed-width id embedded in every snapshot name
    pub camera_id: String,
    /// Name the camera portal lists the camera under
    pub display_name: String,
    pub stream_url: String,
}

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cameras: Vec<CameraDescriptor>,
    pub capture: CaptureConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Sleep between decode attempts. Throttles the loop; not a frame rate.
    pub decode_interval_secs: f64,
    /// Serial numbers wrap to 0 after this value
    pub max_serial_num: u32,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub unlock_poll_interval_secs: f64,
    /// Give up unlocking after this many polls; unbounded when absent
    pub max_unlock_polls: Option<u32>,
    pub probe_timeout_secs: f64,
    /// Command run to unlock a stream; the display name is appended
    pub unlock_command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub snapshot_dir: PathBuf,
    /// Cadence of the periodic scrape in the service binary
    pub capture_interval_secs: f64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            decode_interval_secs: 1.0 / 60.0,
            max_serial_num: SERIAL_LIMIT,
            jpeg_quality: 90,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            unlock_poll_interval_secs: 0.1,
            max_unlock_polls: None,
            probe_timeout_secs: 10.0,
            unlock_command: Vec::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: PathBuf::from("input_data"),
            capture_interval_secs: 0.5,
        }
    }
}

impl CaptureConfig {
    pub fn decode_interval(&self) -> Duration {
        Duration::from_secs_f64(self.decode_interval_secs)
    }
}

impl SessionConfig {
    pub fn unlock_poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.unlock_poll_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.probe_timeout_secs)
    }
}

impl StorageConfig {
    pub fn capture_interval(&self) -> Duration {
        Duration::from_secs_f64(self.capture_interval_secs)
    }
}

impl Config {
    /// Load from an optional TOML file, then `ARGUS_*` environment overrides.
    ///
    /// Without an explicit path, `argus.toml` in the working directory is
    /// used if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => ::config::File::from(path).required(true),
            None => ::config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config: Config = ::config::Config::builder()
            .add_source(file)
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        let mut seen = HashSet::new();
        for camera in &self.cameras {
            let id = &camera.camera_id;
            if id.len() != CAMERA_ID_WIDTH || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
                return invalid(format!(
                    "camera id {:?} must be {} ASCII letters or digits",
                    id, CAMERA_ID_WIDTH
                ));
            }
            if !seen.insert(id.as_str()) {
                return invalid(format!("camera id {} is listed twice", id));
            }
            if camera.stream_url.is_empty() {
                return invalid(format!("camera {} has no stream url", id));
            }
        }

        // Two serials at least, or same-second captures would share a name
        if !(1..=SERIAL_LIMIT).contains(&self.capture.max_serial_num) {
            return invalid(format!(
                "max_serial_num {} outside 1..={}",
                self.capture.max_serial_num, SERIAL_LIMIT
            ));
        }
        if !(1..=100).contains(&self.capture.jpeg_quality) {
            return invalid(format!(
                "jpeg_quality {} outside 1..=100",
                self.capture.jpeg_quality
            ));
        }
        if self.session.max_unlock_polls == Some(0) {
            return invalid("max_unlock_polls must be at least 1".into());
        }

        for (name, secs) in [
            ("capture.decode_interval_secs", self.capture.decode_interval_secs),
            ("session.unlock_poll_interval_secs", self.session.unlock_poll_interval_secs),
            ("session.probe_timeout_secs", self.session.probe_timeout_secs),
            ("storage.capture_interval_secs", self.storage.capture_interval_secs),
        ] {
            if !secs.is_finite() || secs <= 0.0 {
                return invalid(format!("{} must be a positive number of seconds", name));
            }
            if Duration::try_from_secs_f64(secs).is_err() {
                return invalid(format!("{} = {} is too large", name, secs));
            }
        }

        Ok(())
    }
}
