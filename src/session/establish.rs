//! Session establishment: make sure a stream is fetchable before decoding it
//!
//! ```text
//! Checking --Reachable--> Ready
//!    |  \--OtherError--> Failed
//!    AccessDenied
//!    v
//! Unlocking --(unlock once, poll until Reachable)--> Ready
//! ```
//!
//! `Unlocking` is only entered from `Checking`, which is only the initial
//! state, so one establishment triggers the unlocker at most once.

use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::probe::{ProbeFailure, ProbeStatus, StreamProbe};
use super::unlock::AccessUnlocker;
use crate::error::SessionError;
use crate::CameraDescriptor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EstablishState {
    Checking,
    Unlocking,
    Ready,
    Failed(ProbeFailure),
}

pub struct SessionEstablisher<'a, P, U> {
    probe: &'a P,
    unlocker: &'a U,
    poll_interval: Duration,
    max_polls: Option<u32>,
}

impl<'a, P: StreamProbe, U: AccessUnlocker> SessionEstablisher<'a, P, U> {
    pub fn new(probe: &'a P, unlocker: &'a U, poll_interval: Duration) -> Self {
        Self {
            probe,
            unlocker,
            poll_interval,
            max_polls: None,
        }
    }

    /// Give up unlocking after `max_polls` probes instead of polling forever.
    pub fn with_max_polls(mut self, max_polls: Option<u32>) -> Self {
        self.max_polls = max_polls;
        self
    }

    /// Drive the state machine until the stream is ready or establishment fails.
    #[instrument(skip_all, fields(camera = %camera.camera_id))]
    pub async fn establish(
        &self,
        camera: &CameraDescriptor,
        cancel: &CancellationToken,
    ) -> Result<(), SessionError> {
        let url = camera.stream_url.as_str();
        let mut state = EstablishState::Checking;

        loop {
            state = match state {
                EstablishState::Checking => {
                    let status = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                        status = self.probe.check(url) => status,
                    };
                    info!("Access to camera: {:?}", status);
                    match status {
                        ProbeStatus::Reachable => EstablishState::Ready,
                        ProbeStatus::AccessDenied => EstablishState::Unlocking,
                        ProbeStatus::Other(reason) => EstablishState::Failed(reason),
                    }
                }
                EstablishState::Unlocking => {
                    self.unlock_and_wait(camera, cancel).await?;
                    EstablishState::Ready
                }
                EstablishState::Ready => return Ok(()),
                EstablishState::Failed(reason) => {
                    warn!("Stream {} unreachable: {}", url, reason);
                    return Err(SessionError::Unreachable {
                        url: url.to_string(),
                        reason,
                    });
                }
            };
            debug!("Establishment state -> {:?}", state);
        }
    }

    async fn unlock_and_wait(
        &self,
        camera: &CameraDescriptor,
        cancel: &CancellationToken,
    ) -> Result<(), SessionError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SessionError::Cancelled),
            result = self.unlocker.unlock(&camera.display_name) => result?,
        }

        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts = 0u32;

        loop {
            let status = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                _ = ticker.tick() => {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                        status = self.probe.check(&camera.stream_url) => status,
                    }
                }
            };
            attempts += 1;

            if status == ProbeStatus::Reachable {
                info!("Access to camera: OK after {} polls", attempts);
                return Ok(());
            }
            debug!("Still locked (poll {}): {:?}", attempts, status);

            if self.max_polls.is_some_and(|max| attempts >= max) {
                return Err(SessionError::UnlockTimedOut { attempts });
            }
        }
    }
}
