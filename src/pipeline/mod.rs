pub mod live;

pub use live::{BufferState, BufferStats, LiveFrameBuffer};
