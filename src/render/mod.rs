pub mod canvas;
pub mod skeleton;
#[cfg(feature = "desktop")]
pub mod window;

pub use canvas::{pack_rgb, Canvas};
#[cfg(feature = "desktop")]
pub use minifb::Key;
pub use skeleton::{bone_lines, BoneLine, BACKGROUND_COLOR, GHOST_COLOR, SKELETON_COLOR};
#[cfg(feature = "desktop")]
pub use window::MinifbRenderer;
