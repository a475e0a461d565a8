use std::collections::BTreeMap;

use opencv::core::Point;

/// Number of body landmarks produced by the BlazePose landmark model.
pub const NUM_LANDMARKS: usize = 33;

pub const NOSE: usize = 0;
pub const LEFT_SHOULDER: usize = 11;
pub const RIGHT_SHOULDER: usize = 12;
pub const LEFT_HIP: usize = 23;
pub const RIGHT_HIP: usize = 24;

/// Synthetic keypoint halfway between the shoulders.
pub const SHOULDER_MID: usize = 33;
/// Synthetic keypoint halfway between the hips.
pub const HIP_MID: usize = 34;

/// Landmarks kept for the overlay.
pub const KEYPOINTS: [usize; 21] = [
    NOSE, 2, 5, 7, 8, 11, 12, 13, 14, 15, 16, 23, 24, 25, 26, 27, 28, 29, 30, 31, 32,
];

pub const CONNECTIONS: [(usize, usize); 26] = [
    (NOSE, 2),
    (NOSE, SHOULDER_MID),
    (NOSE, 5),
    (2, 7),
    (5, 8),
    (LEFT_SHOULDER, SHOULDER_MID),
    (SHOULDER_MID, RIGHT_SHOULDER),
    (LEFT_SHOULDER, 13),
    (LEFT_SHOULDER, LEFT_HIP),
    (RIGHT_SHOULDER, 14),
    (RIGHT_SHOULDER, RIGHT_HIP),
    (13, 15),
    (14, 16),
    (LEFT_HIP, HIP_MID),
    (HIP_MID, RIGHT_HIP),
    (LEFT_HIP, 25),
    (RIGHT_HIP, 26),
    (25, 27),
    (26, 28),
    (27, 29),
    (27, 31),
    (28, 30),
    (28, 32),
    (29, 31),
    (30, 32),
    (SHOULDER_MID, HIP_MID),
];

const MIDPOINTS: [(usize, usize, usize); 2] = [
    (SHOULDER_MID, LEFT_SHOULDER, RIGHT_SHOULDER),
    (HIP_MID, LEFT_HIP, RIGHT_HIP),
];

/// A single model landmark in image pixel space.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub visibility: f32,
    pub presence: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            ..Default::default()
        }
    }

    /// Truncating conversion to integer pixel coordinates.
    pub fn to_point(self) -> Point {
        Point::new(self.x as i32, self.y as i32)
    }
}

pub type Keypoints = BTreeMap<usize, Point>;

/// Reduces a full landmark set to the drawn keypoints, including the
/// synthetic shoulder and hip midpoints. An empty input yields no keypoints.
pub fn select_keypoints(landmarks: &[Landmark]) -> Keypoints {
    let mut keypoints: Keypoints = KEYPOINTS
        .iter()
        .filter_map(|&idx| landmarks.get(idx).map(|lm| (idx, lm.to_point())))
        .collect();

    for (mid, a, b) in MIDPOINTS {
        if let (Some(pa), Some(pb)) = (keypoints.get(&a), keypoints.get(&b)) {
            let point = midpoint(*pa, *pb);
            keypoints.insert(mid, point);
        }
    }

    keypoints
}

pub fn midpoint(a: Point, b: Point) -> Point {
    Point::new(
        ((a.x + b.x) as f32 * 0.5) as i32,
        ((a.y + b.y) as f32 * 0.5) as i32,
    )
}
