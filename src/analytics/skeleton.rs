use opencv::core::{Mat, Scalar};
use opencv::imgproc::{self, FILLED, LINE_8};

use super::landmarks::{Keypoints, CONNECTIONS};

const LINE_THICKNESS: i32 = 2;
const POINT_RADIUS: i32 = 5;
const RING_RADIUS: i32 = 10;
const RING_THICKNESS: i32 = 2;

fn red() -> Scalar {
    Scalar::new(0.0, 0.0, 255.0, 0.0)
}

fn white() -> Scalar {
    Scalar::all(255.0)
}

/// Draws every connection whose endpoints are both present, with a dot and
/// a ring on each endpoint.
pub fn draw_skeleton(frame: &mut Mat, keypoints: &Keypoints) -> opencv::Result<usize> {
    let mut drawn = 0;

    for (from, to) in CONNECTIONS {
        let (Some(&a), Some(&b)) = (keypoints.get(&from), keypoints.get(&to)) else {
            continue;
        };

        imgproc::line(frame, a, b, red(), LINE_THICKNESS, LINE_8, 0)?;

        for point in [a, b] {
            imgproc::circle(frame, point, POINT_RADIUS, white(), FILLED, LINE_8, 0)?;
        }
        for point in [a, b] {
            imgproc::circle(frame, point, RING_RADIUS, white(), RING_THICKNESS, LINE_8, 0)?;
        }

        drawn += 1;
    }

    Ok(drawn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::landmarks::{HIP_MID, NOSE, SHOULDER_MID};
    use opencv::core::{Point, Vec3b, CV_8UC3};
    use opencv::prelude::*;

    fn black_frame() -> Mat {
        Mat::new_rows_cols_with_default(200, 200, CV_8UC3, Scalar::all(0.0)).unwrap()
    }

    fn pixel(frame: &Mat, x: i32, y: i32) -> [u8; 3] {
        let px = frame.at_2d::<Vec3b>(y, x).unwrap();
        [px[0], px[1], px[2]]
    }

    #[test]
    fn test_empty_keypoints_leave_frame_untouched() {
        let mut frame = black_frame();
        let drawn = draw_skeleton(&mut frame, &Keypoints::new()).unwrap();
        assert_eq!(drawn, 0);
        assert_eq!(opencv::core::sum_elems(&frame).unwrap(), Scalar::all(0.0));
    }

    #[test]
    fn test_draws_line_and_markers() {
        let mut frame = black_frame();
        let mut keypoints = Keypoints::new();
        keypoints.insert(SHOULDER_MID, Point::new(100, 20));
        keypoints.insert(HIP_MID, Point::new(100, 180));

        let drawn = draw_skeleton(&mut frame, &keypoints).unwrap();
        assert_eq!(drawn, 1);

        // line body between the rings is red (BGR)
        assert_eq!(pixel(&frame, 100, 100), [0, 0, 255]);
        // endpoint dot is white
        assert_eq!(pixel(&frame, 100, 20), [255, 255, 255]);
        // ring passes 10px left of the endpoint
        assert_eq!(pixel(&frame, 90, 180), [255, 255, 255]);
        // well away from the skeleton nothing changes
        assert_eq!(pixel(&frame, 10, 100), [0, 0, 0]);
    }

    #[test]
    fn test_skips_edges_with_missing_endpoint() {
        let mut frame = black_frame();
        let mut keypoints = Keypoints::new();
        keypoints.insert(NOSE, Point::new(50, 50));

        let drawn = draw_skeleton(&mut frame, &keypoints).unwrap();
        assert_eq!(drawn, 0);
        assert_eq!(pixel(&frame, 50, 50), [0, 0, 0]);
    }
}
