mod detector;
mod landmarks;
mod pipeline;
mod pool;
mod skeleton;
mod smoothing;
mod tracker;

pub use detector::{OnnxPoseDetector, PoseError, PoseEstimator, RawPose};
pub use pipeline::{process_video, PipelineError, VideoReport};
pub use pool::{PoolError, ProcessingPool};
pub use tracker::{shared, SharedEstimator};
