pub mod encode;
pub mod frame;
#[cfg(feature = "gstreamer-pipeline")]
pub mod gst_capture;
pub mod source;

pub use encode::encode_jpeg;
pub use frame::{Frame, FrameMetadata, PixelFormat};
#[cfg(feature = "gstreamer-pipeline")]
pub use gst_capture::GstFrameSource;
pub use source::{open_source, FrameSource, SyntheticSource};
