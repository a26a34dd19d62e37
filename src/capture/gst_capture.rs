//! GStreamer-backed frame source for HLS, RTSP and HTTP streams

use std::time::Duration;

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use tracing::{debug, info, warn};

use crate::capture::frame::{Frame, FrameMetadata, PixelFormat};
use crate::capture::source::FrameSource;
use crate::error::SourceError;

/// How long a pull may stall before the stream counts as ended
const PULL_TIMEOUT: Duration = Duration::from_secs(5);

/// Wait for the first sample; HLS has to fetch a playlist and a segment first
const FIRST_PULL_TIMEOUT: Duration = Duration::from_secs(30);

fn pull_timeout(frames_decoded: u64) -> Duration {
    if frames_decoded == 0 {
        FIRST_PULL_TIMEOUT
    } else {
        PULL_TIMEOUT
    }
}

/// Decodes a network stream into packed RGB frames
pub struct GstFrameSource {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    url: String,
    sequence: u64,
}

impl GstFrameSource {
    /// Build the decode pipeline for `url` and set it playing
    pub fn open(url: &str) -> Result<Self, SourceError> {
        let open_err = |reason: String| SourceError::Open {
            url: url.to_string(),
            reason,
        };

        gst::init().map_err(|e| open_err(format!("failed to initialize GStreamer: {}", e)))?;

        let pipeline_str = Self::build_pipeline_string(url);
        info!("Pipeline: {}", pipeline_str);

        let pipeline = gst::parse::launch(&pipeline_str)
            .map_err(|e| open_err(e.to_string()))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| open_err("failed to create pipeline".into()))?;

        let appsink = pipeline
            .by_name("appsink")
            .ok_or_else(|| open_err("failed to find appsink element".into()))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| open_err("failed to cast to AppSink".into()))?;

        // Keep only the newest decoded buffer; the live buffer drops the rest anyway
        appsink.set_property("emit-signals", false);
        appsink.set_property("max-buffers", 1u32);
        appsink.set_property("drop", true);
        appsink.set_property("sync", false);

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| open_err(format!("failed to start pipeline: {:?}", e)))?;

        Ok(Self {
            pipeline,
            appsink,
            url: url.to_string(),
            sequence: 0,
        })
    }

    fn build_pipeline_string(url: &str) -> String {
        format!(
            "uridecodebin uri=\"{}\" ! \
             queue max-size-buffers=2 leaky=downstream ! \
             videoconvert ! \
             video/x-raw,format=RGB ! \
             appsink name=appsink",
            url
        )
    }

    fn frame_from_sample(&mut self, sample: &gst::Sample) -> Option<Frame> {
        let buffer = sample.buffer()?;
        let map = buffer.map_readable().ok()?;
        let caps = sample.caps()?;
        let info = gst_video::VideoInfo::from_caps(caps).ok()?;

        let width = info.width();
        let height = info.height();
        let row = width as usize * 3;
        let stride = usize::try_from(*info.stride().first()?).ok()?;

        // videoconvert pads RGB rows to 4 bytes; frames are stored unpadded
        let data = if stride == row {
            map.as_slice().to_vec()
        } else {
            map.as_slice()
                .chunks(stride)
                .take(height as usize)
                .flat_map(|line| &line[..row.min(line.len())])
                .copied()
                .collect()
        };

        self.sequence += 1;
        Some(Frame::new(
            data,
            FrameMetadata {
                sequence: self.sequence,
                width,
                height,
                format: PixelFormat::Rgb24,
            },
        ))
    }
}

impl FrameSource for GstFrameSource {
    fn next_frame(&mut self) -> Option<Frame> {
        let wait = pull_timeout(self.sequence);
        let timeout = gst::ClockTime::from_mseconds(wait.as_millis() as u64);
        let Some(sample) = self.appsink.try_pull_sample(timeout) else {
            if self.appsink.is_eos() {
                info!("End of stream on {}", self.url);
            } else {
                warn!("No frame from {} within {:?}", self.url, wait);
            }
            return None;
        };

        let frame = self.frame_from_sample(&sample);
        if frame.is_none() {
            warn!("Undecodable sample from {}", self.url);
        }
        frame
    }
}

impl Drop for GstFrameSource {
    fn drop(&mut self) {
        debug!("Releasing pipeline for {}", self.url);
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_gets_the_startup_allowance() {
        assert_eq!(pull_timeout(0), FIRST_PULL_TIMEOUT);
        assert_eq!(pull_timeout(1), PULL_TIMEOUT);
        assert_eq!(pull_timeout(500), PULL_TIMEOUT);
        assert!(FIRST_PULL_TIMEOUT > PULL_TIMEOUT);
    }

    #[test]
    fn pipeline_keeps_only_fresh_buffers() {
        let pipeline = GstFrameSource::build_pipeline_string("https://host/live.m3u8");
        assert!(pipeline.starts_with("uridecodebin uri=\"https://host/live.m3u8\""));
        assert!(pipeline.contains("leaky=downstream"));
        assert!(pipeline.contains("format=RGB"));
    }
}
