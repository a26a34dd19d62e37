//! Snapshot writer: persists the live buffer's latest frame under a fresh identity

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tracing::{debug, info, instrument};

use super::allocator::SerialAllocator;
use super::identity::FrameIdentity;
use super::store::SnapshotStore;
use crate::capture::encode_jpeg;
use crate::error::SnapshotError;
use crate::pipeline::LiveFrameBuffer;
use crate::CameraDescriptor;

/// A snapshot that made it to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub identity: FrameIdentity,
    pub path: PathBuf,
}

/// Result of a capture request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureOutcome {
    Saved(Snapshot),
    /// The buffer has not decoded anything yet; nothing was written
    NoFrameAvailable,
}

pub struct Scraper {
    camera: CameraDescriptor,
    buffer: Arc<LiveFrameBuffer>,
    allocator: SerialAllocator,
    store: Arc<SnapshotStore>,
    jpeg_quality: u8,
}

impl Scraper {
    pub fn new(
        camera: CameraDescriptor,
        buffer: Arc<LiveFrameBuffer>,
        allocator: SerialAllocator,
        store: Arc<SnapshotStore>,
        jpeg_quality: u8,
    ) -> Self {
        Self {
            camera,
            buffer,
            allocator,
            store,
            jpeg_quality,
        }
    }

    pub fn allocator(&self) -> &SerialAllocator {
        &self.allocator
    }

    /// Persist the latest frame.
    ///
    /// The serial is reserved only once there is a frame to write and is
    /// consumed only when the write succeeds. Concurrent captures for the
    /// same camera queue on the allocator and never share a serial.
    #[instrument(skip(self), fields(camera = %self.camera.camera_id))]
    pub fn capture(&self) -> Result<CaptureOutcome, SnapshotError> {
        let Some(frame) = self.buffer.read() else {
            debug!("No frame decoded yet");
            metrics::counter!("argus_snapshots_skipped_total", "camera" => self.camera.camera_id.clone())
                .increment(1);
            return Ok(CaptureOutcome::NoFrameAvailable);
        };

        let jpeg = encode_jpeg(&frame, self.jpeg_quality)?;

        let ticket = self.allocator.reserve();
        let identity = FrameIdentity::new(
            &self.camera.camera_id,
            ticket.serial(),
            Local::now().naive_local(),
        );
        let path = self.store.write(&identity, &jpeg)?;
        ticket.commit();

        info!("Saved {}", path.display());
        metrics::counter!("argus_snapshots_saved_total", "camera" => self.camera.camera_id.clone())
            .increment(1);

        Ok(CaptureOutcome::Saved(Snapshot { identity, path }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::SyntheticSource;
    use std::time::Duration;
    use tempfile::TempDir;

    fn camera() -> CameraDescriptor {
        CameraDescriptor {
            camera_id: "0001".into(),
            display_name: "Tel Arad".into(),
            stream_url: "stub://tel-arad".into(),
        }
    }

    fn scraper(dir: &TempDir, frames: Option<u64>) -> Scraper {
        let buffer = Arc::new(LiveFrameBuffer::new(
            "0001",
            Box::new(SyntheticSource::new(16, 8, frames)),
            Duration::from_millis(1),
        ));
        let store = Arc::new(SnapshotStore::open(dir.path()).unwrap());
        Scraper::new(camera(), buffer, SerialAllocator::new(9_999_999), store, 80)
    }

    fn wait_for_frame(scraper: &Scraper) {
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while scraper.buffer.read().is_none() {
            assert!(std::time::Instant::now() < deadline, "no frame decoded");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn empty_buffer_does_not_consume_a_serial() {
        let dir = TempDir::new().unwrap();
        let scraper = scraper(&dir, None);

        assert_eq!(scraper.capture().unwrap(), CaptureOutcome::NoFrameAvailable);
        assert_eq!(scraper.allocator().peek(), 0);

        scraper.buffer.start().unwrap();
        wait_for_frame(&scraper);
        match scraper.capture().unwrap() {
            CaptureOutcome::Saved(snapshot) => {
                assert_eq!(snapshot.identity.serial(), 0);
                assert!(snapshot.path.is_file());
            }
            other => panic!("expected a snapshot, got {other:?}"),
        }
        scraper.buffer.stop();
    }

    #[test]
    fn saved_file_is_a_jpeg_named_by_identity() {
        let dir = TempDir::new().unwrap();
        let scraper = scraper(&dir, Some(1));
        scraper.buffer.start().unwrap();
        wait_for_frame(&scraper);

        let CaptureOutcome::Saved(snapshot) = scraper.capture().unwrap() else {
            panic!("expected a snapshot");
        };
        let name = snapshot.path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("img00010000000_"));
        assert!(name.ends_with(".jpg"));
        assert_eq!(name.len(), "img00010000023_20_11_2022T02_54_24.jpg".len());
        assert_eq!(&std::fs::read(&snapshot.path).unwrap()[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn write_failure_propagates_and_keeps_serial() {
        let dir = TempDir::new().unwrap();
        let scraper = scraper(&dir, Some(1));
        scraper.buffer.start().unwrap();
        wait_for_frame(&scraper);

        // Replace the snapshot directory with a file so writes fail
        std::fs::remove_dir_all(dir.path()).unwrap();
        std::fs::write(dir.path(), b"not a dir").unwrap();

        assert!(matches!(scraper.capture(), Err(SnapshotError::Io(_))));
        assert_eq!(scraper.allocator().peek(), 0);
        std::fs::remove_file(dir.path()).unwrap();
    }
}
