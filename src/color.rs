//! Appearance cue for people: mean RGB of the torso and of the legs.
//!
//! Both regions are taken relative to the box height (upper body 25%..50%,
//! lower body 60%..85%) and inset horizontally by 20% on each side so the
//! silhouette edges, which mostly carry background, are left out.

use image::RgbImage;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};

/// Largest possible distance between two RGB triples, `255 * sqrt(3)`
pub const MAX_RGB_DISTANCE: f32 = 441.7;

/// Similarity reported when there is nothing to compare against
pub const NEUTRAL_SIMILARITY: f32 = 0.3;

const UPPER_BODY: (f32, f32) = (0.25, 0.50);
const LOWER_BODY: (f32, f32) = (0.60, 0.85);
const HORIZONTAL_INSET: f32 = 0.2;
const MIN_REGION_WIDTH: i64 = 10;
const MIN_REGION_HEIGHT: i64 = 20;
const MIN_BOX_AREA: i64 = 100;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ColorFeatures {
    pub upper_body: [f32; 3],
    pub lower_body: [f32; 3],
}

impl ColorFeatures {
    /// Equal-weight blend of the upper and lower body similarities, in `[0, 1]`
    pub fn similarity(&self, other: &ColorFeatures) -> f32 {
        let upper = rgb_similarity(&self.upper_body, &other.upper_body);
        let lower = rgb_similarity(&self.lower_body, &other.lower_body);

        (upper * 0.5 + lower * 0.5).clamp(0.0, 1.0)
    }
}

pub fn rgb_similarity(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let distance = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt();

    (1.0 - distance / MAX_RGB_DISTANCE).clamp(0.0, 1.0)
}

/// Samples both body regions of `bbox`. Returns `None` for boxes that are
/// empty or smaller than 100 px² once clamped to the image.
pub fn extract(image: &RgbImage, bbox: &BBox<Ltrb>) -> Option<ColorFeatures> {
    let (img_w, img_h) = (image.width() as i64, image.height() as i64);
    if img_w == 0 || img_h == 0 || !bbox.is_finite() {
        return None;
    }

    let left = (bbox.left() as i64).max(0);
    let top = (bbox.top() as i64).max(0);
    let right = (bbox.right() as i64).min(img_w - 1);
    let bottom = (bbox.bottom() as i64).min(img_h - 1);

    let width = right - left;
    let height = bottom - top;
    if width <= 0 || height <= 0 || width * height < MIN_BOX_AREA {
        return None;
    }

    let margin = (width as f32 * HORIZONTAL_INSET) as i64;
    let (mut inner_left, mut inner_right) = (left + margin, right - margin);
    if inner_right - inner_left < MIN_REGION_WIDTH {
        let center = (left + right) / 2;
        inner_left = (center - MIN_REGION_WIDTH / 2).max(0);
        inner_right = (center + MIN_REGION_WIDTH / 2).min(img_w - 1);
    }

    let band = |(from, to): (f32, f32)| {
        let band_top = top + (height as f32 * from) as i64;
        let mut band_bottom = top + (height as f32 * to) as i64;
        if band_bottom - band_top < MIN_REGION_HEIGHT {
            band_bottom = band_top + MIN_REGION_HEIGHT;
        }

        (band_top, band_bottom.min(bottom))
    };

    let (upper_top, upper_bottom) = band(UPPER_BODY);
    let (lower_top, lower_bottom) = band(LOWER_BODY);

    Some(ColorFeatures {
        upper_body: mean_rgb(image, inner_left, upper_top, inner_right, upper_bottom)?,
        lower_body: mean_rgb(image, inner_left, lower_top, inner_right, lower_bottom)?,
    })
}

/// Mean color over `[left, right) x [top, bottom)`, clamped to the image
fn mean_rgb(image: &RgbImage, left: i64, top: i64, right: i64, bottom: i64) -> Option<[f32; 3]> {
    let left = left.clamp(0, image.width() as i64) as u32;
    let right = right.clamp(0, image.width() as i64) as u32;
    let top = top.clamp(0, image.height() as i64) as u32;
    let bottom = bottom.clamp(0, image.height() as i64) as u32;

    if right <= left || bottom <= top {
        return None;
    }

    let mut sum = [0u64; 3];
    for y in top..bottom {
        for x in left..right {
            let px = image.get_pixel(x, y);
            sum[0] += px[0] as u64;
            sum[1] += px[1] as u64;
            sum[2] += px[2] as u64;
        }
    }

    let count = ((right - left) as u64 * (bottom - top) as u64) as f32;
    Some([
        sum[0] as f32 / count,
        sum[1] as f32 / count,
        sum[2] as f32 / count,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// Red shirt above row 110, blue trousers below
    fn two_tone(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |_, y| {
            if y < 110 {
                Rgb([200, 20, 20])
            } else {
                Rgb([10, 10, 180])
            }
        })
    }

    #[test]
    fn samples_torso_and_legs() {
        let img = two_tone(100, 200);
        let features = extract(&img, &BBox::ltrb(0.0, 0.0, 100.0, 200.0)).unwrap();

        assert_eq!(features.upper_body, [200.0, 20.0, 20.0]);
        assert_eq!(features.lower_body, [10.0, 10.0, 180.0]);
    }

    #[test]
    fn out_of_bounds_box_is_clamped() {
        let img = two_tone(100, 200);
        let features = extract(&img, &BBox::ltrb(-50.0, -10.0, 400.0, 900.0));

        assert!(features.is_some());
    }

    #[test]
    fn tiny_or_empty_boxes_are_skipped() {
        let img = two_tone(100, 200);

        assert!(extract(&img, &BBox::ltrb(10.0, 10.0, 15.0, 15.0)).is_none());
        assert!(extract(&img, &BBox::ltrb(300.0, 300.0, 400.0, 400.0)).is_none());
        assert!(extract(&img, &BBox::ltrb(f32::NAN, 0.0, 10.0, 10.0)).is_none());
    }

    #[test]
    fn similarity_bounds() {
        let a = ColorFeatures {
            upper_body: [255.0, 255.0, 255.0],
            lower_body: [0.0, 0.0, 0.0],
        };
        let b = ColorFeatures {
            upper_body: [0.0, 0.0, 0.0],
            lower_body: [255.0, 255.0, 255.0],
        };
        let c = ColorFeatures {
            upper_body: [120.0, 30.0, 200.0],
            lower_body: [60.0, 60.0, 60.0],
        };

        assert_eq!(a.similarity(&a), 1.0);
        assert_eq!(c.similarity(&c), 1.0);

        for (x, y) in [(&a, &b), (&a, &c), (&b, &c), (&c, &a)] {
            let s = x.similarity(y);
            assert!((0.0..=1.0).contains(&s), "{}", s);
        }

        assert!(a.similarity(&b) < 0.01);
    }
}
