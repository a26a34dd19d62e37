//! Frame identity: the file name a snapshot is persisted under
//!
//! `img` + camera id (4 chars) + serial (7 digits) + `_DD_MM_YYYYTHH_MM_SS`.
//! Within one camera, sorting identities lexicographically sorts by serial.

use std::fmt;

use chrono::{NaiveDateTime, Timelike};

/// Width of a camera id inside an identity
pub const CAMERA_ID_WIDTH: usize = 4;

/// Digits reserved for the serial number
pub const SERIAL_WIDTH: usize = 7;

/// Largest serial that still fits [`SERIAL_WIDTH`] digits
pub const SERIAL_LIMIT: u32 = 9_999_999;

/// Extension of persisted snapshots
pub const SNAPSHOT_EXTENSION: &str = "jpg";

const PREFIX: &str = "img";
const TIME_FORMAT: &str = "%d_%m_%YT%H_%M_%S";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FrameIdentity {
    camera_id: String,
    serial: u32,
    captured_at: NaiveDateTime,
}

impl FrameIdentity {
    /// `camera_id` must be [`CAMERA_ID_WIDTH`] chars and `serial` at most
    /// [`SERIAL_LIMIT`]; configuration validation guarantees both.
    pub fn new(camera_id: &str, serial: u32, captured_at: NaiveDateTime) -> Self {
        debug_assert_eq!(camera_id.len(), CAMERA_ID_WIDTH);
        debug_assert!(serial <= SERIAL_LIMIT);
        Self {
            camera_id: camera_id.to_string(),
            serial,
            // Sub-second precision is not part of the name
            captured_at: captured_at.with_nanosecond(0).unwrap_or(captured_at),
        }
    }

    /// Parse an identity, with or without its `.jpg` extension.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s
            .strip_suffix(SNAPSHOT_EXTENSION)
            .and_then(|rest| rest.strip_suffix('.'))
            .unwrap_or(s);
        let rest = s.strip_prefix(PREFIX)?;
        if !rest.is_ascii() || rest.len() < CAMERA_ID_WIDTH + SERIAL_WIDTH + 1 {
            return None;
        }

        let (camera_id, rest) = rest.split_at(CAMERA_ID_WIDTH);
        let (serial, rest) = rest.split_at(SERIAL_WIDTH);
        let timestamp = rest.strip_prefix('_')?;

        if !camera_id.chars().all(|c| c.is_ascii_alphanumeric())
            || !serial.chars().all(|c| c.is_ascii_digit())
        {
            return None;
        }
        // chrono accepts unpadded fields; the name never has them
        if timestamp.len() != "DD_MM_YYYYTHH_MM_SS".len() {
            return None;
        }
        let captured_at = NaiveDateTime::parse_from_str(timestamp, TIME_FORMAT).ok()?;

        Some(Self {
            camera_id: camera_id.to_string(),
            serial: serial.parse().ok()?,
            captured_at,
        })
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn serial(&self) -> u32 {
        self.serial
    }

    pub fn captured_at(&self) -> NaiveDateTime {
        self.captured_at
    }

    /// Name of the snapshot file, e.g. `img00010000023_20_11_2022T02_54_24.jpg`
    pub fn file_name(&self) -> String {
        format!("{}.{}", self, SNAPSHOT_EXTENSION)
    }
}

impl fmt::Display for FrameIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{:0width$}_{}",
            PREFIX,
            self.camera_id,
            self.serial,
            self.captured_at.format(TIME_FORMAT),
            width = SERIAL_WIDTH
        )
    }
}
