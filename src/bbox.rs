use nalgebra as na;
use serde_derive::{Deserialize, Serialize};
use std::marker::PhantomData;

pub trait BBoxFormat: std::fmt::Debug + Copy + PartialEq {}

/// Left-top-right-bottom format, contains left top and right bottom corners
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct Ltrb;
impl BBoxFormat for Ltrb {}

/// X-y-width-height format, contains coordinates of the center of bbox and width-height
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq)]
pub struct Xywh;
impl BBoxFormat for Xywh {}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(transparent, bound = "")]
pub struct BBox<F: BBoxFormat>([f32; 4], #[serde(skip)] PhantomData<F>);

impl<F: BBoxFormat> From<BBox<F>> for [f32; 4] {
    fn from(bbox: BBox<F>) -> Self {
        bbox.0
    }
}

impl<F: BBoxFormat> BBox<F> {
    #[inline]
    pub fn as_slice(&self) -> &[f32; 4] {
        &self.0
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

impl BBox<Ltrb> {
    #[inline]
    pub fn ltrb(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        BBox([left, top, right, bottom], PhantomData)
    }

    #[inline(always)]
    pub fn left(&self) -> f32 {
        self.0[0]
    }

    #[inline(always)]
    pub fn top(&self) -> f32 {
        self.0[1]
    }

    #[inline(always)]
    pub fn right(&self) -> f32 {
        self.0[2]
    }

    #[inline(always)]
    pub fn bottom(&self) -> f32 {
        self.0[3]
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.0[2] - self.0[0]
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.0[3] - self.0[1]
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    #[inline]
    pub fn center(&self) -> na::Point2<f32> {
        na::Point2::new(
            (self.0[0] + self.0[2]) / 2.0,
            (self.0[1] + self.0[3]) / 2.0,
        )
    }

    /// Positive width and height, all corners finite
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.is_finite() && self.right() > self.left() && self.bottom() > self.top()
    }

    /// Same extent, shifted by `(dx, dy)`
    #[inline]
    pub fn translate(&self, dx: f32, dy: f32) -> Self {
        Self::ltrb(
            self.left() + dx,
            self.top() + dy,
            self.right() + dx,
            self.bottom() + dy,
        )
    }

    /// Clamps every edge into `[0, width] x [0, height]`
    pub fn clamp(&self, width: f32, height: f32) -> Self {
        Self::ltrb(
            self.left().clamp(0.0, width),
            self.top().clamp(0.0, height),
            self.right().clamp(0.0, width),
            self.bottom().clamp(0.0, height),
        )
    }

    pub fn intersection(&self, other: &Self) -> f32 {
        let i_left = self.left().max(other.left());
        let i_top = self.top().max(other.top());
        let i_right = self.right().min(other.right());
        let i_bottom = self.bottom().min(other.bottom());

        if i_right < i_left || i_bottom < i_top {
            return 0.0;
        }

        (i_right - i_left) * (i_bottom - i_top)
    }

    /// Intersection over union, `0.0` for disjoint boxes
    pub fn iou(&self, other: &Self) -> f32 {
        let inter = self.intersection(other);
        if inter <= 0.0 {
            return 0.0;
        }

        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            return 0.0;
        }

        (inter / union).clamp(0.0, 1.0)
    }
}

impl BBox<Xywh> {
    #[inline]
    pub fn xywh(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        BBox([cx, cy, width, height], PhantomData)
    }

    #[inline]
    pub fn as_ltrb(&self) -> BBox<Ltrb> {
        self.into()
    }
}

impl<'a> From<&'a BBox<Xywh>> for BBox<Ltrb> {
    #[inline]
    fn from(v: &'a BBox<Xywh>) -> Self {
        let hw = v.0[2] / 2.0;
        let hh = v.0[3] / 2.0;

        Self(
            [v.0[0] - hw, v.0[1] - hh, v.0[0] + hw, v.0[1] + hh],
            PhantomData,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_is_symmetric_and_bounded() {
        let boxes = [
            BBox::ltrb(0.0, 0.0, 10.0, 10.0),
            BBox::ltrb(5.0, 5.0, 15.0, 15.0),
            BBox::ltrb(1.0, 1.0, 11.0, 11.0),
            BBox::ltrb(100.0, 100.0, 120.0, 150.0),
            BBox::ltrb(-5.0, 2.0, 3.0, 4.5),
        ];

        for a in &boxes {
            assert!((a.iou(a) - 1.0).abs() < 1e-6);

            for b in &boxes {
                let ab = a.iou(b);
                assert_eq!(ab, b.iou(a));
                assert!((0.0..=1.0).contains(&ab));
            }
        }
    }

    #[test]
    fn disjoint_boxes_have_zero_iou() {
        let a = BBox::ltrb(0.0, 0.0, 10.0, 10.0);
        let b = BBox::ltrb(20.0, 20.0, 30.0, 30.0);
        let touching = BBox::ltrb(10.0, 0.0, 20.0, 10.0);

        assert_eq!(a.iou(&b), 0.0);
        assert_eq!(a.iou(&touching), 0.0);
    }

    #[test]
    fn iou_of_shifted_square() {
        let a = BBox::ltrb(0.0, 0.0, 10.0, 10.0);
        let b = BBox::ltrb(1.0, 1.0, 11.0, 11.0);

        // 81 / (100 + 100 - 81)
        assert!((a.iou(&b) - 81.0 / 119.0).abs() < 1e-6);
    }

    #[test]
    fn center_format_to_corners() {
        let c = BBox::xywh(30.0, 60.0, 40.0, 80.0);

        assert_eq!(c.as_ltrb(), BBox::ltrb(10.0, 20.0, 50.0, 100.0));
        assert_eq!(c.as_ltrb().center(), na::Point2::new(30.0, 60.0));
    }

    #[test]
    fn clamp_and_validity() {
        let b = BBox::ltrb(-10.0, -5.0, 700.0, 300.0).clamp(640.0, 480.0);
        assert_eq!(b.as_slice(), &[0.0, 0.0, 640.0, 300.0]);
        assert!(b.is_valid());

        let outside = BBox::ltrb(650.0, 10.0, 700.0, 20.0).clamp(640.0, 480.0);
        assert!(!outside.is_valid());
    }

    #[test]
    fn translate_preserves_extent() {
        let b = BBox::ltrb(10.0, 10.0, 50.0, 90.0).translate(2.0, -1.0);

        assert_eq!(b.as_slice(), &[12.0, 9.0, 52.0, 89.0]);
        assert_eq!(b.width(), 40.0);
        assert_eq!(b.height(), 80.0);
    }
}
