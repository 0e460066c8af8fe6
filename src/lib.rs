pub mod blob;
#[cfg(feature = "desktop")]
pub mod camera;
pub mod config;
pub mod error;
pub mod logging;
pub mod math;
pub mod pose;
pub mod record;
pub mod render;
pub mod session;
pub mod topology;
pub mod transformer;
