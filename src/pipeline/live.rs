//! Bufferless capture: a background decode loop feeding a single latest-frame slot

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use crossbeam::utils::CachePadded;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::{Frame, FrameSource};
use crate::error::CaptureError;

/// Lifecycle of the decode loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Created, `start` not called yet
    Idle = 0,
    /// Decode loop running
    Running = 1,
    /// Source reported end of stream; the last frame stays readable
    Ended = 2,
    /// Stopped by `stop` or drop
    Stopped = 3,
}

impl BufferState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => BufferState::Running,
            2 => BufferState::Ended,
            3 => BufferState::Stopped,
            _ => BufferState::Idle,
        }
    }
}

/// Counters exposed for monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub frames_decoded: u64,
    pub reads: u64,
}

#[derive(Default)]
struct Stats {
    frames_decoded: AtomicU64,
    reads: AtomicU64,
}

/// State shared between the decode thread and readers
struct Shared {
    slot: ArcSwapOption<Frame>,
    state: AtomicU8,
    stats: CachePadded<Stats>,
}

impl Shared {
    fn set_state(&self, state: BufferState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Holds only the most recently decoded frame of one camera.
///
/// A single background thread owns the [`FrameSource`] and swaps each decoded
/// frame into the slot. Readers load the current `Arc<Frame>` without
/// locking, so a read never waits on decode I/O and never sees a torn frame.
pub struct LiveFrameBuffer {
    camera_id: String,
    poll_interval: Duration,
    shared: Arc<Shared>,
    source: Mutex<Option<Box<dyn FrameSource>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl LiveFrameBuffer {
    /// Wrap `source`; nothing is decoded until [`start`](Self::start).
    pub fn new(
        camera_id: impl Into<String>,
        source: Box<dyn FrameSource>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            camera_id: camera_id.into(),
            poll_interval,
            shared: Arc::new(Shared {
                slot: ArcSwapOption::empty(),
                state: AtomicU8::new(BufferState::Idle as u8),
                stats: CachePadded::new(Stats::default()),
            }),
            source: Mutex::new(Some(source)),
            worker: Mutex::new(None),
            cancel: CancellationToken::new(),
        }
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    /// Spawn the decode loop. A second call is rejected: the source has
    /// already moved into the first loop and the slot allows one writer only.
    pub fn start(&self) -> Result<(), CaptureError> {
        let source = self
            .source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(source) = source else {
            warn!("Decode loop for camera {} already started", self.camera_id);
            return Err(CaptureError::AlreadyStarted {
                camera_id: self.camera_id.clone(),
            });
        };

        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();
        let camera_id = self.camera_id.clone();
        let interval = self.poll_interval;

        shared.set_state(BufferState::Running);
        let handle = thread::Builder::new()
            .name(format!("decode-{}", self.camera_id))
            .spawn(move || decode_loop(source, shared, cancel, interval, camera_id))
            .map_err(|e| {
                self.shared.set_state(BufferState::Stopped);
                CaptureError::Spawn(e)
            })?;

        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    /// Latest committed frame, or `None` before the first successful decode.
    pub fn read(&self) -> Option<Arc<Frame>> {
        self.shared.stats.reads.fetch_add(1, Ordering::Relaxed);
        self.shared.slot.load_full()
    }

    pub fn state(&self) -> BufferState {
        BufferState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            frames_decoded: self.shared.stats.frames_decoded.load(Ordering::Relaxed),
            reads: self.shared.stats.reads.load(Ordering::Relaxed),
        }
    }

    /// Stop the decode loop and wait for it to release its source.
    ///
    /// Returns once any in-flight `next_frame` call has come back. The last
    /// frame stays readable.
    pub fn stop(&self) {
        self.cancel.cancel();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Decode loop for camera {} panicked", self.camera_id);
            }
        } else if self.state() == BufferState::Idle {
            // Never started: drop the unused source now
            self.source
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            self.shared.set_state(BufferState::Stopped);
        }
    }
}

impl Drop for LiveFrameBuffer {
    fn drop(&mut self) {
        // Don't join here; the loop exits on its own after the current decode
        self.cancel.cancel();
    }
}

fn decode_loop(
    mut source: Box<dyn FrameSource>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    interval: Duration,
    camera_id: String,
) {
    info!("Decode loop started for camera {}", camera_id);

    loop {
        if cancel.is_cancelled() {
            shared.set_state(BufferState::Stopped);
            info!("Decode loop for camera {} stopped", camera_id);
            break;
        }

        // Throttles CPU spin; not tied to the camera's frame rate
        thread::sleep(interval);

        match source.next_frame() {
            Some(frame) => {
                debug!("Camera {} decoded frame {}", camera_id, frame.meta.sequence);
                shared.slot.store(Some(Arc::new(frame)));
                shared.stats.frames_decoded.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("argus_frames_decoded_total", "camera" => camera_id.clone())
                    .increment(1);
            }
            None => {
                shared.set_state(BufferState::Ended);
                warn!(
                    camera = %camera_id,
                    frames = shared.stats.frames_decoded.load(Ordering::Relaxed),
                    "Stream ended, check camera url; serving last decoded frame"
                );
                break;
            }
        }
    }

    drop(source);
}
