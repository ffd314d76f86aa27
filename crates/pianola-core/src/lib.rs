pub mod app;
pub mod convert;
pub mod diagnostics;
pub mod editor;
pub mod ipc;
pub mod piano_roll;
pub mod playback;
pub mod scheduler;
pub mod transport;

pub use app::*;
pub use convert::*;
pub use diagnostics::*;
pub use editor::*;
pub use ipc::*;
pub use piano_roll::*;
pub use playback::*;
pub use scheduler::*;
pub use transport::*;
