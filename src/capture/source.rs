//! Frame sources: one open decode session against a stream URL

use tracing::{debug, info};

use crate::capture::frame::{Frame, FrameMetadata, PixelFormat};
use crate::error::SourceError;

/// A single open decode session.
///
/// `next_frame` blocks on stream I/O and returns `None` once the stream has
/// ended or a decode attempt failed. Callers treat `None` as final; sources
/// do not retry internally. Dropping the source releases the decoder.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Option<Frame>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Option<Frame> {
        (**self).next_frame()
    }
}

/// Scheme for generated test streams
pub const STUB_SCHEME: &str = "stub://";

/// Open the best available source for `url`.
///
/// `stub://` URLs always resolve to a [`SyntheticSource`]. Anything else needs
/// the `gstreamer-pipeline` feature.
pub fn open_source(url: &str) -> Result<Box<dyn FrameSource>, SourceError> {
    if let Some(rest) = url.strip_prefix(STUB_SCHEME) {
        let limit = parse_frame_limit(rest);
        info!("Opening synthetic source {} (limit: {:?})", url, limit);
        return Ok(Box::new(SyntheticSource::new(64, 48, limit)));
    }

    #[cfg(feature = "gstreamer-pipeline")]
    {
        let source = super::gst_capture::GstFrameSource::open(url)?;
        Ok(Box::new(source))
    }
    #[cfg(not(feature = "gstreamer-pipeline"))]
    {
        Err(SourceError::Unsupported(url.to_string()))
    }
}

fn parse_frame_limit(rest: &str) -> Option<u64> {
    let (_, query) = rest.split_once('?')?;
    query
        .split('&')
        .find_map(|pair| pair.strip_prefix("frames="))
        .and_then(|n| n.parse().ok())
}

/// Generated RGB frames, for running the service without a decoder.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    sequence: u64,
    limit: Option<u64>,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, limit: Option<u64>) -> Self {
        Self {
            width,
            height,
            sequence: 0,
            limit,
        }
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Option<Frame> {
        if self.limit.is_some_and(|limit| self.sequence >= limit) {
            debug!("Synthetic source exhausted after {} frames", self.sequence);
            return None;
        }
        self.sequence += 1;

        // Horizontal gradient that drifts one column per frame
        let width = u64::from(self.width.max(1));
        let mut data = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let v = ((u64::from(x) + self.sequence) % width * 255 / width) as u8;
                data.extend_from_slice(&[v, (y * 255 / self.height.max(1)) as u8, 255 - v]);
            }
        }

        Some(Frame::new(
            data,
            FrameMetadata {
                sequence: self.sequence,
                width: self.width,
                height: self.height,
                format: PixelFormat::Rgb24,
            },
        ))
    }
}
