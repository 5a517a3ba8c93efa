use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};

/// A single decoded, labelled box in frame pixel coordinates
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    #[serde(flatten, with = "ltrb_fields")]
    pub bbox: BBox<Ltrb>,
}

impl Detection {
    pub fn new<S: Into<String>>(label: S, confidence: f32, bbox: BBox<Ltrb>) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }

    #[inline]
    pub fn iou(&self, other: &Detection) -> f32 {
        self.bbox.iou(&other.bbox)
    }

    #[inline(always)]
    pub fn center(&self) -> na::Point2<f32> {
        self.bbox.center()
    }

    #[inline(always)]
    pub fn width(&self) -> f32 {
        self.bbox.width()
    }

    #[inline(always)]
    pub fn height(&self) -> f32 {
        self.bbox.height()
    }
}

/// Detections travel as `{label, confidence, left, top, right, bottom}`
pub(crate) mod ltrb_fields {
    use crate::bbox::{BBox, Ltrb};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct Fields {
        left: f32,
        top: f32,
        right: f32,
        bottom: f32,
    }

    pub fn serialize<S: Serializer>(bbox: &BBox<Ltrb>, serializer: S) -> Result<S::Ok, S::Error> {
        Fields {
            left: bbox.left(),
            top: bbox.top(),
            right: bbox.right(),
            bottom: bbox.bottom(),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BBox<Ltrb>, D::Error> {
        let f = Fields::deserialize(deserializer)?;
        Ok(BBox::ltrb(f.left, f.top, f.right, f.bottom))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_flat_corners() {
        let det = Detection::new("cup", 0.5, BBox::ltrb(1.0, 2.0, 3.0, 4.0));
        let json = serde_json::to_value(&det).unwrap();

        assert_eq!(json["label"], "cup");
        assert_eq!(json["left"], 1.0);
        assert_eq!(json["bottom"], 4.0);

        let back: Detection = serde_json::from_value(json).unwrap();
        assert_eq!(back, det);
    }
}
