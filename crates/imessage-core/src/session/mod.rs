//! Live session state shared by the detector, user commands and the renderer.

mod controller;
mod state;
mod update;

pub use controller::{SessionConfig, SessionController};
pub use state::{InFlightGuard, SessionState};
pub use update::{RenderUpdate, Status, UpdateReceiver, UpdateSender, channel};
