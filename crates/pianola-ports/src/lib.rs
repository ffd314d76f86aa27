pub mod audio;
pub mod clock;
pub mod pitch;
pub mod render;
pub mod storage;
pub mod tone;
pub mod types;

pub use audio::*;
pub use clock::*;
pub use pitch::*;
pub use render::*;
pub use storage::*;
pub use tone::*;
pub use types::*;
