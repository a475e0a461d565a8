use std::path::Path;
use std::time::Instant;

use opencv::core::{Mat, Size};
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture, VideoWriter};
use serde::Serialize;
use thiserror::Error;

use crate::config::TrackingConfig;

use super::detector::PoseError;
use super::landmarks::select_keypoints;
use super::skeleton::draw_skeleton;
use super::tracker::{PoseTracker, SharedEstimator};

/// Used when the container does not report a frame rate.
const FALLBACK_FPS: f64 = 30.0;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("could not open video {0}")]
    Open(String),
    #[error("video contains no frames")]
    EmptyVideo,
    #[error("could not open video writer for {0}")]
    Writer(String),
    #[error("opencv error: {0}")]
    OpenCv(#[from] opencv::Error),
    #[error("pose estimation failed: {0}")]
    Pose(#[from] PoseError),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VideoReport {
    pub inference_time: f64,
    pub frames: u64,
    pub frames_with_pose: u64,
    pub fps: f64,
    pub width: i32,
    pub height: i32,
}

/// Renders the skeleton overlay onto every frame of `path_in`, writing an
/// mp4v video with the same frame rate and resolution to `path_out`.
pub fn process_video(
    path_in: &Path,
    path_out: &Path,
    estimator: SharedEstimator,
    tracking: TrackingConfig,
) -> Result<VideoReport, PipelineError> {
    let start = Instant::now();
    let input_name = path_in.to_string_lossy().into_owned();
    let output_name = path_out.to_string_lossy().into_owned();

    let mut capture = VideoCapture::from_file(&input_name, videoio::CAP_ANY)?;
    if !capture.is_opened()? {
        return Err(PipelineError::Open(input_name));
    }

    let fps = match capture.get(videoio::CAP_PROP_FPS)? {
        fps if fps.is_finite() && fps > 0.0 => fps,
        _ => FALLBACK_FPS,
    };

    // one frame to learn the resolution
    let mut frame = Mat::default();
    if !capture.read(&mut frame)? || frame.empty() {
        return Err(PipelineError::EmptyVideo);
    }
    let width = frame.cols();
    let height = frame.rows();

    let fourcc = VideoWriter::fourcc('m', 'p', '4', 'v')?;
    let mut writer = VideoWriter::new(&output_name, fourcc, fps, Size::new(width, height), true)?;
    if !writer.is_opened()? {
        return Err(PipelineError::Writer(output_name));
    }

    let mut tracker = PoseTracker::new(estimator, tracking);
    let mut frames = 0u64;
    let mut frames_with_pose = 0u64;

    loop {
        let timestamp = frames as f64 / fps;
        if render_frame(&mut tracker, &mut frame, timestamp)? {
            frames_with_pose += 1;
        }
        writer.write(&frame)?;
        frames += 1;

        if !capture.read(&mut frame)? || frame.empty() {
            break;
        }
    }

    writer.release()?;
    capture.release()?;

    let report = VideoReport {
        inference_time: start.elapsed().as_secs_f64(),
        frames,
        frames_with_pose,
        fps,
        width,
        height,
    };

    tracing::debug!(
        frames = report.frames,
        frames_with_pose = report.frames_with_pose,
        inference_time = format!("{:.2}", report.inference_time),
        "video processed"
    );

    Ok(report)
}

/// Draws the pose onto `frame` in place. Returns whether a pose was found;
/// frames without one are left untouched.
pub fn render_frame(
    tracker: &mut PoseTracker,
    frame: &mut Mat,
    timestamp: f64,
) -> Result<bool, PipelineError> {
    let landmarks = tracker.process(frame, timestamp)?;
    if landmarks.is_empty() {
        return Ok(false);
    }

    let keypoints = select_keypoints(&landmarks);
    draw_skeleton(frame, &keypoints)?;
    Ok(true)
}
