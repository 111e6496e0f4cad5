//! Page rectification: find the page boundary in a photo and flatten it.
//!
//! [`ContourRectifier`] runs grayscale → blur → edges → closing → contours,
//! then tries a 4-vertex polygon first and an axis-aligned bounding box second.
//! Whatever goes wrong, [`Rectifier::rectify`] hands the original bytes back.

pub mod geometry;

use std::io::Cursor;
use std::panic::{self, AssertUnwindSafe};

use image::{DynamicImage, GrayImage, ImageOutputFormat, Rgb, RgbImage};
use imageproc::contours::find_contours;
use imageproc::distance_transform::Norm;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::morphology::close;
use tracing::{debug, info, warn};

use crate::config::RectifierConfig;
use crate::error::PipelineResult;
use crate::schema::{RawCapture, RectifiedImage};
use geometry::{
    bounding_box, destination_size, fit_within, order_corners, polygon_area, BoundingBox, Point,
    Quad,
};

/// Sigma matching a 5×5 Gaussian kernel.
const BLUR_SIGMA: f32 = 1.1;
const CANNY_LOW: f32 = 75.0;
const CANNY_HIGH: f32 = 200.0;
/// Closing radius; LInf norm makes the structuring element a 5×5 square.
const CLOSE_RADIUS: u8 = 2;
const JPEG_QUALITY: u8 = 90;

/// Capability: turn a page photo into an upright crop. Must never fail.
pub trait Rectifier: Send + Sync {
    fn rectify(&self, photo: &[u8]) -> Vec<u8>;
}

/// Rectify one capture, keeping its role and page index.
pub fn rectify_capture(rectifier: &dyn Rectifier, capture: &RawCapture) -> RectifiedImage {
    RectifiedImage {
        role: capture.role,
        page_index: capture.page_index,
        data: rectifier.rectify(&capture.data),
    }
}

/// What the detector settled on.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    Quad(Quad),
    BoundingBox(BoundingBox),
}

/// Contour-based page detector with perspective correction.
#[derive(Debug, Clone, Default)]
pub struct ContourRectifier {
    config: RectifierConfig,
}

impl ContourRectifier {
    pub fn new(config: RectifierConfig) -> Self {
        Self { config }
    }

    /// Locate the page in a grayscale photo.
    pub fn detect(&self, gray: &GrayImage) -> Option<Detection> {
        let blurred = gaussian_blur_f32(gray, BLUR_SIGMA);
        let edges = canny(&blurred, CANNY_LOW, CANNY_HIGH);
        let closed = close(&edges, Norm::LInf, CLOSE_RADIUS);

        let mut contours: Vec<(Vec<imageproc::point::Point<i32>>, f64)> =
            find_contours::<i32>(&closed)
                .into_iter()
                .filter(|c| c.points.len() >= 3)
                .map(|c| {
                    let area = polygon_area(&to_points(&c.points));
                    (c.points, area)
                })
                .collect();
        contours.sort_by(|a, b| b.1.total_cmp(&a.1));
        debug!("Rectifier: {} contours found", contours.len());

        for (points, area) in &contours {
            if *area <= self.config.min_quad_area {
                break;
            }
            let epsilon = self.config.approx_epsilon_ratio * arc_length(points, true);
            if epsilon <= 0.0 {
                continue;
            }
            let approx = to_points(&approximate_polygon_dp(points, epsilon, true));
            if approx.len() == 4 {
                let quad = order_corners([approx[0], approx[1], approx[2], approx[3]]);
                info!("Rectifier: 4-sided page contour found (area {:.0})", area);
                return Some(Detection::Quad(quad));
            }
        }

        let (width, height) = gray.dimensions();
        for (points, area) in &contours {
            if *area <= self.config.min_box_area {
                break;
            }
            if let Some(bbox) = bounding_box(&to_points(points)) {
                if bbox.fits_within(width, height) {
                    info!("Rectifier: no 4-sided contour, using bounding box {:?}", bbox);
                    return Some(Detection::BoundingBox(bbox));
                }
            }
        }

        None
    }

    fn try_rectify(&self, photo: &[u8]) -> PipelineResult<Option<Vec<u8>>> {
        let decoded = image::load_from_memory(photo)?;
        let rgb = decoded.to_rgb8();
        let gray = decoded.to_luma8();

        let cropped = match self.detect(&gray) {
            Some(Detection::Quad(quad)) => warp_quad(&rgb, &quad),
            Some(Detection::BoundingBox(bbox)) => Some(
                image::imageops::crop_imm(&rgb, bbox.x, bbox.y, bbox.width, bbox.height).to_image(),
            ),
            None => None,
        };

        match cropped {
            Some(page) => {
                let mut buf = Vec::new();
                DynamicImage::ImageRgb8(page)
                    .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Jpeg(JPEG_QUALITY))?;
                Ok(Some(buf))
            }
            None => Ok(None),
        }
    }
}

impl Rectifier for ContourRectifier {
    fn rectify(&self, photo: &[u8]) -> Vec<u8> {
        if photo.is_empty() {
            return Vec::new();
        }
        match panic::catch_unwind(AssertUnwindSafe(|| self.try_rectify(photo))) {
            Ok(Ok(Some(rectified))) => {
                debug!("Rectifier: {} -> {} bytes", photo.len(), rectified.len());
                rectified
            }
            Ok(Ok(None)) => {
                info!("Rectifier: no suitable crop found, returning original");
                photo.to_vec()
            }
            Ok(Err(e)) => {
                warn!("Rectifier: {}, returning original", e);
                photo.to_vec()
            }
            Err(_) => {
                warn!("Rectifier: panicked during detection, returning original");
                photo.to_vec()
            }
        }
    }
}

fn to_points(points: &[imageproc::point::Point<i32>]) -> Vec<Point> {
    points.iter().copied().map(Point::from).collect()
}

/// Rectifier that leaves photos untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughRectifier;

impl Rectifier for PassthroughRectifier {
    fn rectify(&self, photo: &[u8]) -> Vec<u8> {
        photo.to_vec()
    }
}

/// Warp the quad onto an upright rectangle no larger than the source.
pub fn warp_quad(src: &RgbImage, quad: &Quad) -> Option<RgbImage> {
    let (width, height) = fit_within(destination_size(quad), src.dimensions());
    if width < 2 || height < 2 {
        return None;
    }

    let from = quad.corners().map(|p| (p.x as f32, p.y as f32));
    let (right, bottom) = ((width - 1) as f32, (height - 1) as f32);
    let to = [(0.0, 0.0), (right, 0.0), (right, bottom), (0.0, bottom)];
    let projection = Projection::from_control_points(from, to)?;

    let mut out = RgbImage::new(width, height);
    warp_into(src, &projection, Interpolation::Bilinear, Rgb([255, 255, 255]), &mut out);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::{draw_filled_rect_mut, draw_polygon_mut};
    use imageproc::rect::Rect;

    fn encode_png(img: RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)
            .unwrap();
        buf
    }

    fn page_on_table() -> RgbImage {
        let mut img = RgbImage::from_pixel(400, 300, Rgb([20, 20, 20]));
        draw_filled_rect_mut(&mut img, Rect::at(100, 80).of_size(200, 120), Rgb([240, 240, 240]));
        img
    }

    fn tilted_page() -> (RgbImage, [Point; 4]) {
        let corners = [(60, 40), (320, 70), (300, 260), (40, 230)];
        let mut img = RgbImage::from_pixel(400, 300, Rgb([15, 15, 15]));
        let poly: Vec<imageproc::point::Point<i32>> = corners
            .iter()
            .map(|&(x, y)| imageproc::point::Point::new(x, y))
            .collect();
        draw_polygon_mut(&mut img, &poly, Rgb([235, 235, 235]));
        let pts = corners.map(|(x, y)| Point::new(x as f64, y as f64));
        (img, pts)
    }

    #[test]
    fn test_non_image_bytes_returned_unchanged() {
        let rectifier = ContourRectifier::default();
        let garbage = b"definitely not an image".to_vec();
        assert_eq!(rectifier.rectify(&garbage), garbage);
        assert!(rectifier.rectify(&[]).is_empty());
    }

    #[test]
    fn test_featureless_photo_returned_unchanged() {
        let rectifier = ContourRectifier::default();
        let blank = encode_png(RgbImage::from_pixel(200, 150, Rgb([128, 128, 128])));
        assert_eq!(rectifier.rectify(&blank), blank);
    }

    #[test]
    fn test_detects_page_and_crops_to_it() {
        let rectifier = ContourRectifier::default();
        let rectified = rectifier.rectify(&encode_png(page_on_table()));
        let out = image::load_from_memory(&rectified).unwrap();
        let (w, h) = (out.width(), out.height());
        assert!((190..=210).contains(&w), "width {}", w);
        assert!((110..=130).contains(&h), "height {}", h);
    }

    #[test]
    fn test_tilted_page_detected_as_quad() {
        let (img, corners) = tilted_page();
        let gray = DynamicImage::ImageRgb8(img).to_luma8();
        let detection = ContourRectifier::default().detect(&gray);

        let Some(Detection::Quad(quad)) = detection else {
            panic!("expected quad, got {:?}", detection);
        };
        let expected = order_corners(corners);
        for (found, want) in quad.corners().iter().zip(expected.corners().iter()) {
            assert!(found.distance(want) < 6.0, "{:?} vs {:?}", found, want);
        }
    }

    #[test]
    fn test_rectified_ratio_matches_destination_ratio() {
        let (img, _) = tilted_page();
        let gray = DynamicImage::ImageRgb8(img.clone()).to_luma8();
        let rectifier = ContourRectifier::default();
        let Some(Detection::Quad(quad)) = rectifier.detect(&gray) else {
            panic!("expected quad");
        };
        let (dw, dh) = fit_within(destination_size(&quad), img.dimensions());

        let out = image::load_from_memory(&rectifier.rectify(&encode_png(img))).unwrap();
        let expected = dw as f64 / dh as f64;
        let actual = out.width() as f64 / out.height() as f64;
        assert!((expected - actual).abs() < 0.02, "{} vs {}", expected, actual);
    }

    #[test]
    fn test_warp_never_exceeds_source() {
        // slanted edge is longer than the frame is tall
        let src = RgbImage::from_pixel(100, 40, Rgb([0, 0, 0]));
        let quad = order_corners([
            Point::new(30.0, 0.0),
            Point::new(60.0, 0.0),
            Point::new(70.0, 39.0),
            Point::new(0.0, 39.0),
        ]);
        assert_eq!(destination_size(&quad), (70, 49));
        let out = warp_quad(&src, &quad).unwrap();
        assert!(out.width() <= 100 && out.height() <= 40);
        assert!(out.height() >= 39, "height {}", out.height());
    }

    #[test]
    fn test_degenerate_quad_is_no_detection() {
        let src = RgbImage::from_pixel(50, 50, Rgb([0, 0, 0]));
        let p = Point::new(10.0, 10.0);
        assert!(warp_quad(&src, &order_corners([p, p, p, p])).is_none());
    }

    #[test]
    fn test_zero_tolerance_does_not_panic() {
        let rectifier = ContourRectifier::new(RectifierConfig {
            approx_epsilon_ratio: 0.0,
            ..RectifierConfig::default()
        });
        let gray = DynamicImage::ImageRgb8(page_on_table()).to_luma8();
        assert!(!matches!(rectifier.detect(&gray), Some(Detection::Quad(_))));
    }

    #[test]
    fn test_small_contours_ignored() {
        let mut gray = GrayImage::from_pixel(200, 200, Luma([10]));
        for x in 90..100 {
            for y in 90..100 {
                gray.put_pixel(x, y, Luma([250]));
            }
        }
        assert!(ContourRectifier::default().detect(&gray).is_none());
    }
}
