use log::debug;
use serde_derive::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::detection::Detection;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct NmsConfig {
    pub iou_threshold: f32,
    /// Labels that get their own threshold, e.g. a higher one for people standing close together
    pub label_thresholds: HashMap<String, f32>,
}

impl Default for NmsConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.5,
            label_thresholds: [("person".to_string(), 0.75)].into_iter().collect(),
        }
    }
}

impl NmsConfig {
    pub fn new(iou_threshold: f32) -> Self {
        Self {
            iou_threshold,
            label_thresholds: HashMap::new(),
        }
    }

    pub fn with_label_threshold<S: Into<String>>(mut self, label: S, threshold: f32) -> Self {
        self.label_thresholds.insert(label.into(), threshold);
        self
    }

    #[inline]
    pub fn threshold_for(&self, label: &str) -> f32 {
        self.label_thresholds
            .get(label)
            .copied()
            .unwrap_or(self.iou_threshold)
    }
}

/// Label-scoped greedy NMS. Survivors come back in descending confidence order.
pub fn non_maximum_suppression(mut dets: Vec<Detection>, config: &NmsConfig) -> Vec<Detection> {
    if dets.len() < 2 {
        return dets;
    }

    let before = dets.len();
    dets.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut removed = vec![false; dets.len()];
    for idx in 0..dets.len() - 1 {
        if removed[idx] {
            continue;
        }

        let current = &dets[idx];
        let threshold = config.threshold_for(&current.label);

        for (other, flag) in dets[idx + 1..].iter().zip(removed[idx + 1..].iter_mut()) {
            if *flag || other.label != current.label {
                continue;
            }

            if current.iou(other) > threshold {
                *flag = true;
            }
        }
    }

    let mut flags = removed.into_iter();
    dets.retain(|_| !flags.next().unwrap_or(false));

    debug!("nms: {} -> {} detections", before, dets.len());
    dets
}
