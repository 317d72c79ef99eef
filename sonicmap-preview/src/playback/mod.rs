//! Preview playback: the device output manager, session planning and the
//! controller that sequences them.

pub mod controller;
pub mod device;
pub mod session;

pub use controller::{PlayOutcome, PlaybackController};
pub use device::{DeviceOutputManager, ManagerState};
pub use session::{plan_window, PlaybackWindow, SessionId, SessionInfo};
