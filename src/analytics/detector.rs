use ndarray::Array4;
use opencv::core::{Mat, Scalar, Size, BORDER_CONSTANT};
use opencv::imgproc;
use opencv::prelude::*;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;
use thiserror::Error;

use crate::config::ModelConfig;

use super::landmarks::{Landmark, NUM_LANDMARKS};

/// Values per landmark in the model output: x, y, z, visibility, presence.
const LANDMARK_STRIDE: usize = 5;

#[derive(Debug, Error)]
pub enum PoseError {
    #[error("failed to load pose model: {0}")]
    Load(Box<dyn std::error::Error + Send + Sync>),
    #[error("onnx runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("opencv error: {0}")]
    OpenCv(#[from] opencv::Error),
    #[error("tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("model output {0:?} not found")]
    MissingOutput(String),
    #[error("model returned {got} landmark values, expected at least {expected}")]
    ShortOutput { got: usize, expected: usize },
    #[error("frame data too small")]
    FrameTooSmall,
}

/// Landmarks found in one image, in that image's pixel space.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPose {
    pub landmarks: Vec<Landmark>,
    pub score: f32,
}

/// Something that finds a single body pose in a BGR image.
pub trait PoseEstimator: Send {
    fn estimate(&mut self, image: &Mat) -> Result<Option<RawPose>, PoseError>;
}

/// Maps model input coordinates back to the source image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    /// Size of the resized image inside the padded square, never below 1x1.
    pub width: i32,
    pub height: i32,
}

impl Letterbox {
    pub fn fit(width: i32, height: i32, target: u32) -> Self {
        let side = target as i32;
        let target = target as f32;
        let scale = (target / width as f32).min(target / height as f32);
        let new_w = ((width as f32 * scale).round() as i32).clamp(1, side);
        let new_h = ((height as f32 * scale).round() as i32).clamp(1, side);
        Self {
            scale,
            pad_x: ((side - new_w) / 2) as f32,
            pad_y: ((side - new_h) / 2) as f32,
            width: new_w,
            height: new_h,
        }
    }

    pub fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

pub struct OnnxPoseDetector {
    session: Session,
    input_size: u32,
    landmarks_output: String,
    pose_flag_output: String,
}

impl OnnxPoseDetector {
    pub fn new(config: &ModelConfig) -> Result<Self, PoseError> {
        let session =
            build_session(&config.path, config.intra_threads).map_err(PoseError::Load)?;
        tracing::info!(model = %config.path, input_size = config.input_size, "pose model loaded");

        Ok(Self {
            session,
            input_size: config.input_size,
            landmarks_output: config.landmarks_output.clone(),
            pose_flag_output: config.pose_flag_output.clone(),
        })
    }

    fn preprocess(&self, image: &Mat) -> Result<(Array4<f32>, Letterbox), PoseError> {
        let letterbox = Letterbox::fit(image.cols(), image.rows(), self.input_size);
        let padded = letterbox_image(image, &letterbox, self.input_size as i32)?;

        let mut rgb = Mat::default();
        imgproc::cvt_color(&padded, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

        let data = rgb.data_bytes()?;
        let side = self.input_size as usize;
        if data.len() < side * side * 3 {
            return Err(PoseError::FrameTooSmall);
        }

        let pixels: Vec<f32> = data[..side * side * 3]
            .iter()
            .map(|&v| v as f32 / 255.0)
            .collect();
        let tensor = Array4::from_shape_vec((1, side, side, 3), pixels)?;

        Ok((tensor, letterbox))
    }
}

impl PoseEstimator for OnnxPoseDetector {
    fn estimate(&mut self, image: &Mat) -> Result<Option<RawPose>, PoseError> {
        if image.rows() == 0 || image.cols() == 0 {
            return Ok(None);
        }

        let (input, letterbox) = self.preprocess(image)?;
        let tensor_ref = TensorRef::from_array_view(input.view())?.into_dyn();
        let outputs = self.session.run(ort::inputs![tensor_ref])?;

        let landmarks = outputs
            .get(self.landmarks_output.as_str())
            .ok_or_else(|| PoseError::MissingOutput(self.landmarks_output.clone()))?
            .try_extract_array::<f32>()?
            .iter()
            .copied()
            .collect::<Vec<f32>>();
        let flag = outputs
            .get(self.pose_flag_output.as_str())
            .ok_or_else(|| PoseError::MissingOutput(self.pose_flag_output.clone()))?
            .try_extract_array::<f32>()?
            .iter()
            .copied()
            .next()
            .unwrap_or(0.0);
        drop(outputs);

        decode_landmarks(&landmarks, flag, &letterbox).map(Some)
    }
}

/// Resizes `image` into the letterbox and pads it to a `side` square.
fn letterbox_image(image: &Mat, letterbox: &Letterbox, side: i32) -> Result<Mat, PoseError> {
    let mut resized = Mat::default();
    imgproc::resize(
        image,
        &mut resized,
        Size::new(letterbox.width, letterbox.height),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;

    let pad_x = letterbox.pad_x as i32;
    let pad_y = letterbox.pad_y as i32;
    let mut padded = Mat::default();
    opencv::core::copy_make_border(
        &resized,
        &mut padded,
        pad_y,
        side - letterbox.height - pad_y,
        pad_x,
        side - letterbox.width - pad_x,
        BORDER_CONSTANT,
        Scalar::all(0.0),
    )?;
    Ok(padded)
}

fn build_session(
    model_path: &str,
    intra_threads: usize,
) -> Result<Session, Box<dyn std::error::Error + Send + Sync>> {
    let builder = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(intra_threads)?;

    let session = if model_path.starts_with("http://") || model_path.starts_with("https://") {
        builder.commit_from_url(model_path)?
    } else {
        builder.commit_from_file(model_path)?
    };

    Ok(session)
}

/// Turns the flat landmark tensor into source-image landmarks.
pub fn decode_landmarks(
    raw: &[f32],
    pose_flag: f32,
    letterbox: &Letterbox,
) -> Result<RawPose, PoseError> {
    let expected = NUM_LANDMARKS * LANDMARK_STRIDE;
    if raw.len() < expected {
        return Err(PoseError::ShortOutput {
            got: raw.len(),
            expected,
        });
    }

    let landmarks = raw[..expected]
        .chunks_exact(LANDMARK_STRIDE)
        .map(|v| {
            let (x, y) = letterbox.to_source(v[0], v[1]);
            Landmark {
                x,
                y,
                z: v[2] / letterbox.scale,
                visibility: sigmoid(v[3]),
                presence: sigmoid(v[4]),
            }
        })
        .collect();

    Ok(RawPose {
        landmarks,
        score: pose_flag,
    })
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letterbox_landscape() {
        let lb = Letterbox::fit(640, 480, 256);
        assert_eq!(lb.scale, 0.4);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 32.0);
        let (x, y) = lb.to_source(128.0, 32.0);
        assert!((x - 320.0).abs() < 1e-3);
        assert!(y.abs() < 1e-3);
    }

    #[test]
    fn test_letterbox_portrait() {
        let lb = Letterbox::fit(480, 640, 256);
        assert_eq!(lb.pad_x, 32.0);
        assert_eq!(lb.pad_y, 0.0);
        let (x, y) = lb.to_source(256.0 - 32.0, 256.0);
        assert!((x - 480.0).abs() < 1e-3);
        assert!((y - 640.0).abs() < 1e-3);
    }

    #[test]
    fn test_letterbox_extreme_aspect_keeps_a_pixel() {
        let lb = Letterbox::fit(10000, 10, 256);
        assert_eq!((lb.width, lb.height), (256, 1));
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 127.0);

        let lb = Letterbox::fit(3, 5000, 256);
        assert_eq!((lb.width, lb.height), (1, 256));
        assert_eq!(lb.pad_x, 127.0);
    }

    #[test]
    fn test_letterbox_image_of_thin_strip() {
        let strip =
            Mat::new_rows_cols_with_default(10, 10000, opencv::core::CV_8UC3, Scalar::all(255.0))
                .unwrap();
        let lb = Letterbox::fit(strip.cols(), strip.rows(), 256);
        let padded = letterbox_image(&strip, &lb, 256).unwrap();
        assert_eq!((padded.cols(), padded.rows()), (256, 256));
    }

    #[test]
    fn test_decode_maps_through_letterbox() {
        let lb = Letterbox::fit(640, 480, 256);
        let mut raw = vec![0.0f32; 39 * LANDMARK_STRIDE];
        raw[0] = 128.0;
        raw[1] = 128.0;
        raw[3] = 0.0;
        raw[4] = 100.0;

        let pose = decode_landmarks(&raw, 0.9, &lb).unwrap();
        assert_eq!(pose.landmarks.len(), NUM_LANDMARKS);
        assert_eq!(pose.score, 0.9);
        let nose = pose.landmarks[0];
        assert!((nose.x - 320.0).abs() < 1e-3);
        assert!((nose.y - 240.0).abs() < 1e-3);
        assert!((nose.visibility - 0.5).abs() < 1e-6);
        assert!(nose.presence > 0.99);
    }

    #[test]
    fn test_decode_rejects_short_output() {
        let lb = Letterbox::fit(256, 256, 256);
        let err = decode_landmarks(&[0.0; 10], 1.0, &lb).unwrap_err();
        assert!(matches!(err, PoseError::ShortOutput { got: 10, .. }));
    }
}
