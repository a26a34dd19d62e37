pub mod allocator;
pub mod identity;
pub mod scraper;
pub mod store;

pub use allocator::{SerialAllocator, SerialTicket};
pub use identity::{FrameIdentity, CAMERA_ID_WIDTH, SERIAL_LIMIT};
pub use scraper::{CaptureOutcome, Scraper, Snapshot};
pub use store::SnapshotStore;
