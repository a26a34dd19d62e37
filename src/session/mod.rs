pub mod establish;
pub mod probe;
pub mod registry;
pub mod unlock;

pub use establish::{EstablishState, SessionEstablisher};
pub use probe::{HttpProbe, ProbeFailure, ProbeStatus, StreamProbe};
pub use registry::{CameraSession, SessionRegistry};
pub use unlock::{AccessUnlocker, CommandUnlocker};
