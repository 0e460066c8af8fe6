pub mod capture;

pub use capture::{CameraLandmarkSource, OpenCvCamera};
