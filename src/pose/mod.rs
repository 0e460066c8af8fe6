#[cfg(feature = "desktop")]
pub mod detector;
pub mod landmark;
#[cfg(feature = "desktop")]
pub mod preprocess;
pub mod smooth;
pub mod source;
pub mod synthetic;
pub mod vector;

#[cfg(feature = "desktop")]
pub use detector::PoseLandmarker;
pub use landmark::{Landmark, Skeleton};
#[cfg(feature = "desktop")]
pub use preprocess::{preprocess_for_landmarker, Letterbox};
pub use smooth::{NumberSmoother, SkeletonSmoother};
pub use source::{DetectedFrame, FrameGate, LandmarkSource, ReplaySource, SyntheticSource};
pub use vector::{flatten, unflatten, PoseVector, POSE_VECTOR_LEN};
