use nalgebra as na;
use serde_derive::Serialize;

use crate::bbox::{BBox, Ltrb};
use crate::color::ColorFeatures;
use crate::detection::Detection;

/// A persistent identity followed across frames
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackedObject {
    pub id: u32,
    pub label: String,
    pub confidence: f32,
    /// Last confirmed box
    #[serde(flatten, with = "crate::detection::ltrb_fields")]
    pub bbox: BBox<Ltrb>,
    /// Frames since the last successful match
    pub age: u32,
    /// EMA of the center displacement per frame
    pub velocity: na::Vector2<f32>,
    pub prev_center: na::Point2<f32>,
    /// Box projected by the velocity, only meaningful while matching
    #[serde(skip)]
    pub predicted: BBox<Ltrb>,
    pub colors: Option<ColorFeatures>,
    pub last_matched_ms: i64,
    #[serde(skip)]
    has_motion_sample: bool,
}

impl TrackedObject {
    pub fn new(id: u32, det: &Detection, now_ms: i64) -> Self {
        Self {
            id,
            label: det.label.clone(),
            confidence: det.confidence,
            bbox: det.bbox,
            age: 0,
            velocity: na::Vector2::zeros(),
            prev_center: det.center(),
            predicted: det.bbox,
            colors: None,
            last_matched_ms: now_ms,
            has_motion_sample: false,
        }
    }

    #[inline]
    pub fn center(&self) -> na::Point2<f32> {
        self.bbox.center()
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.bbox.width()
    }

    #[inline]
    pub fn speed(&self) -> f32 {
        self.velocity.norm()
    }

    #[inline]
    pub fn has_color_info(&self) -> bool {
        self.colors.is_some()
    }

    #[inline]
    pub fn is_labelled(&self, label: &str) -> bool {
        self.label == label
    }

    /// Projects the box one frame ahead for tracks that missed the last
    /// frame; fresh tracks keep their literal box
    pub fn predict_for_matching(&mut self) {
        self.predicted = if self.age > 0 {
            self.bbox.translate(self.velocity.x, self.velocity.y)
        } else {
            self.bbox
        };
    }

    /// Absorbs a matched detection of the same label.
    ///
    /// The first displacement seeds the velocity; later ones are blended in
    /// with weight `alpha`.
    pub fn update(&mut self, det: &Detection, alpha: f32, now_ms: i64) {
        debug_assert_eq!(self.label, det.label, "track {} matched across labels", self.id);

        let center = det.center();
        let displacement = center - self.prev_center;

        if self.has_motion_sample {
            self.velocity = displacement * alpha + self.velocity * (1.0 - alpha);
        } else {
            self.velocity = displacement;
            self.has_motion_sample = true;
        }

        self.prev_center = center;
        self.confidence = det.confidence;
        self.bbox = det.bbox;
        self.predicted = det.bbox;
        self.age = 0;
        self.last_matched_ms = now_ms;
    }

    #[inline]
    pub fn increment_age(&mut self) {
        self.age += 1;
    }

    #[inline]
    pub fn boost_velocity(&mut self, factor: f32) {
        self.velocity *= factor;
    }

    #[inline]
    pub fn set_colors(&mut self, colors: ColorFeatures) {
        self.colors = Some(colors);
    }
}
