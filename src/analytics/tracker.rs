use std::sync::{Arc, Mutex, PoisonError};

use opencv::core::{Mat, Rect};
use opencv::prelude::*;

use crate::config::TrackingConfig;

use super::detector::{PoseError, PoseEstimator, RawPose};
use super::landmarks::{Landmark, NUM_LANDMARKS};
use super::smoothing::OneEuroFilter;

/// Region of interest side relative to the landmark bounding box.
const ROI_SCALE: f32 = 1.25;
const MIN_ROI_SIDE: i32 = 16;

/// The pose model shared by every job; inference runs one call at a time.
pub type SharedEstimator = Arc<Mutex<Box<dyn PoseEstimator>>>;

pub fn shared(estimator: impl PoseEstimator + 'static) -> SharedEstimator {
    Arc::new(Mutex::new(Box::new(estimator)))
}

struct LandmarkFilter {
    x: OneEuroFilter,
    y: OneEuroFilter,
}

/// Per-video state: the region to search next and the landmark filters.
pub struct PoseTracker {
    estimator: SharedEstimator,
    config: TrackingConfig,
    roi: Option<Rect>,
    filters: Vec<LandmarkFilter>,
}

impl PoseTracker {
    pub fn new(estimator: SharedEstimator, config: TrackingConfig) -> Self {
        let filters = (0..NUM_LANDMARKS)
            .map(|_| LandmarkFilter {
                x: OneEuroFilter::default(),
                y: OneEuroFilter::default(),
            })
            .collect();

        Self {
            estimator,
            config,
            roi: None,
            filters,
        }
    }

    /// Finds the pose in `frame`, returning landmarks in frame pixels.
    pub fn process(&mut self, frame: &Mat, timestamp: f64) -> Result<Vec<Landmark>, PoseError> {
        let frame_rect = Rect::new(0, 0, frame.cols(), frame.rows());
        if frame_rect.width == 0 || frame_rect.height == 0 {
            return Ok(Vec::new());
        }

        let mut pose = None;
        if let Some(roi) = self.roi.take() {
            pose = self.run(frame, roi, self.config.min_tracking_confidence)?;
            if pose.is_none() {
                tracing::trace!("lost track, falling back to full frame");
            }
        }
        if pose.is_none() {
            pose = self.run(frame, frame_rect, self.config.min_detection_confidence)?;
        }

        let Some(mut landmarks) = pose else {
            self.reset_filters();
            return Ok(Vec::new());
        };

        if self.config.smooth_landmarks && !self.config.static_image_mode {
            self.smooth(&mut landmarks, frame_rect, timestamp);
        }

        if !self.config.static_image_mode {
            self.roi = roi_from_landmarks(&landmarks, frame_rect);
        }

        Ok(landmarks)
    }

    fn run(
        &self,
        frame: &Mat,
        region: Rect,
        threshold: f32,
    ) -> Result<Option<Vec<Landmark>>, PoseError> {
        let crop = Mat::roi(frame, region)?.try_clone()?;

        let estimate = {
            // a panic inside an earlier inference must not lock out later videos
            let mut estimator = self.estimator.lock().unwrap_or_else(|poisoned| {
                tracing::warn!("pose model lock poisoned by an earlier panic, recovering");
                PoisonError::into_inner(poisoned)
            });
            estimator.estimate(&crop)?
        };

        Ok(estimate
            .filter(|pose| pose.score >= threshold)
            .map(|pose| offset(pose, region)))
    }

    fn smooth(&mut self, landmarks: &mut [Landmark], frame_rect: Rect, timestamp: f64) {
        let width = frame_rect.width as f64;
        let height = frame_rect.height as f64;
        for (lm, filter) in landmarks.iter_mut().zip(self.filters.iter_mut()) {
            lm.x = (filter.x.filter(lm.x as f64 / width, timestamp) * width) as f32;
            lm.y = (filter.y.filter(lm.y as f64 / height, timestamp) * height) as f32;
        }
    }

    fn reset_filters(&mut self) {
        for filter in &mut self.filters {
            filter.x.reset();
            filter.y.reset();
        }
    }
}

fn offset(pose: RawPose, region: Rect) -> Vec<Landmark> {
    pose.landmarks
        .into_iter()
        .map(|lm| Landmark {
            x: lm.x + region.x as f32,
            y: lm.y + region.y as f32,
            ..lm
        })
        .collect()
}

/// Square region around the landmarks, clamped to the frame.
pub fn roi_from_landmarks(landmarks: &[Landmark], frame: Rect) -> Option<Rect> {
    if landmarks.is_empty() {
        return None;
    }

    let (mut min_x, mut min_y) = (f32::MAX, f32::MAX);
    let (mut max_x, mut max_y) = (f32::MIN, f32::MIN);
    for lm in landmarks {
        min_x = min_x.min(lm.x);
        min_y = min_y.min(lm.y);
        max_x = max_x.max(lm.x);
        max_y = max_y.max(lm.y);
    }

    let center_x = (min_x + max_x) / 2.0;
    let center_y = (min_y + max_y) / 2.0;
    let side = (max_x - min_x).max(max_y - min_y) * ROI_SCALE;

    let x0 = ((center_x - side / 2.0) as i32).clamp(0, frame.width);
    let y0 = ((center_y - side / 2.0) as i32).clamp(0, frame.height);
    let x1 = ((center_x + side / 2.0) as i32).clamp(0, frame.width);
    let y1 = ((center_y + side / 2.0) as i32).clamp(0, frame.height);

    if x1 - x0 < MIN_ROI_SIDE || y1 - y0 < MIN_ROI_SIDE {
        return None;
    }

    Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
}
