//! Open camera sessions, keyed by camera id
//!
//! Built once at startup and handed to whatever serves requests; there are no
//! process-wide singletons. Cameras are established independently: a session
//! joins the registry the moment its own stream is ready, while others may
//! still be waiting on an unlock.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::establish::SessionEstablisher;
use super::probe::StreamProbe;
use super::unlock::AccessUnlocker;
use crate::capture::FrameSource;
use crate::error::{SessionError, SnapshotError, SourceError};
use crate::pipeline::LiveFrameBuffer;
use crate::snapshot::{CaptureOutcome, Scraper, SerialAllocator, SnapshotStore};
use crate::{CameraDescriptor, Config};

/// Everything running for one camera
pub struct CameraSession {
    buffer: Arc<LiveFrameBuffer>,
    scraper: Scraper,
}

impl CameraSession {
    pub fn buffer(&self) -> &Arc<LiveFrameBuffer> {
        &self.buffer
    }

    pub fn scraper(&self) -> &Scraper {
        &self.scraper
    }
}

pub struct SessionRegistry {
    config: Config,
    store: Arc<SnapshotStore>,
    sessions: RwLock<HashMap<String, Arc<CameraSession>>>,
}

impl SessionRegistry {
    pub fn new(config: Config, store: Arc<SnapshotStore>) -> Self {
        Self {
            config,
            store,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    fn sessions(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<CameraSession>>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Establish access to `camera`, open its stream with `open_source`, start
    /// the decode loop and seed its serial counter from the store.
    pub async fn open<P, U, F>(
        &self,
        camera: CameraDescriptor,
        probe: &P,
        unlocker: &U,
        open_source: F,
        cancel: &CancellationToken,
    ) -> Result<(), SessionError>
    where
        P: StreamProbe,
        U: AccessUnlocker,
        F: FnOnce(&str) -> Result<Box<dyn FrameSource>, SourceError>,
    {
        if self.sessions().contains_key(&camera.camera_id) {
            return Err(SessionError::DuplicateCamera(camera.camera_id));
        }

        let session = &self.config.session;
        SessionEstablisher::new(probe, unlocker, session.unlock_poll_interval())
            .with_max_polls(session.max_unlock_polls)
            .establish(&camera, cancel)
            .await?;

        let source = open_source(&camera.stream_url)?;
        let buffer = Arc::new(LiveFrameBuffer::new(
            camera.camera_id.clone(),
            source,
            self.config.capture.decode_interval(),
        ));

        // Seed under the write lock so a concurrent wipe cannot slip in between
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let Entry::Vacant(slot) = sessions.entry(camera.camera_id.clone()) else {
            return Err(SessionError::DuplicateCamera(camera.camera_id));
        };

        let existing = self.store.count(&camera.camera_id)?;
        let allocator = SerialAllocator::initialize_from(existing, self.config.capture.max_serial_num);
        info!(
            "Camera {} ({}) ready, continuing from serial {}",
            camera.camera_id,
            camera.display_name,
            allocator.peek()
        );

        buffer.start()?;

        let scraper = Scraper::new(
            camera,
            Arc::clone(&buffer),
            allocator,
            Arc::clone(&self.store),
            self.config.capture.jpeg_quality,
        );
        slot.insert(Arc::new(CameraSession { buffer, scraper }));
        Ok(())
    }

    /// Open every camera at once.
    ///
    /// Each camera becomes capturable as soon as its own establishment
    /// finishes, so a stream stuck behind an unlock holds up nobody else.
    /// Failures are logged as they happen and returned per camera id, in
    /// input order.
    pub async fn open_all<P, U, F>(
        &self,
        cameras: impl IntoIterator<Item = CameraDescriptor>,
        probe: &P,
        unlocker: &U,
        open_source: F,
        cancel: &CancellationToken,
    ) -> Vec<(String, Result<(), SessionError>)>
    where
        P: StreamProbe,
        U: AccessUnlocker,
        F: Fn(&str) -> Result<Box<dyn FrameSource>, SourceError>,
    {
        let open_source = &open_source;
        join_all(cameras.into_iter().map(|camera| async move {
            let camera_id = camera.camera_id.clone();
            let result = self
                .open(camera, probe, unlocker, open_source, cancel)
                .await;
            match &result {
                Ok(()) => {}
                Err(SessionError::Cancelled) => info!("Camera {} not opened: cancelled", camera_id),
                Err(e) => error!("Camera {} unavailable: {}", camera_id, e),
            }
            (camera_id, result)
        }))
        .await
    }

    pub fn get(&self, camera_id: &str) -> Option<Arc<CameraSession>> {
        self.sessions().get(camera_id).cloned()
    }

    /// Ids of the cameras open right now
    pub fn camera_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }

    /// Snapshot the latest frame of `camera_id`.
    pub fn capture(&self, camera_id: &str) -> Result<CaptureOutcome, SnapshotError> {
        self.get(camera_id)
            .ok_or_else(|| SnapshotError::UnknownCamera(camera_id.to_string()))?
            .scraper
            .capture()
    }

    /// Delete all stored snapshots and restart every camera's numbering at 0.
    ///
    /// Every serial counter stays locked for the whole wipe, so no capture
    /// can write a file that survives it or lose its temp file to it.
    pub fn wipe(&self) -> io::Result<()> {
        let sessions = self.sessions();
        let tickets: Vec<_> = sessions
            .values()
            .map(|session| session.scraper.allocator().reserve())
            .collect();

        self.store.wipe()?;
        for ticket in tickets {
            ticket.reset(0);
        }
        info!("Deleted local data, serial counters reset");
        Ok(())
    }

    /// Stop every decode loop and release its source.
    pub fn shutdown(&self) {
        for (camera_id, session) in self.sessions().iter() {
            info!("Stopping camera {}", camera_id);
            session.buffer.stop();
        }
    }
}
