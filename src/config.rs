use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use serde_derive::{Deserialize, Serialize};

use crate::detector::DetectorConfig;
use crate::error::Error;
use crate::events::EventConfig;
use crate::tracker::TrackerConfig;

/// Every tunable of the pipeline. Missing keys take their defaults, so
/// `{}` is a valid document.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub detector: DetectorConfig,
    pub tracker: TrackerConfig,
    pub events: EventConfig,
}

impl Config {
    pub fn from_json_str(s: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, Error> {
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path)?;

        Self::from_reader(BufReader::new(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::OutputLayout;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(Config::from_json_str("{}").unwrap(), Config::default());
    }

    #[test]
    fn partial_overrides() {
        let config = Config::from_json_str(
            r#"{
                "detector": {
                    "layout": "heatmap",
                    "allowedLabels": ["face"],
                    "nms": { "iouThreshold": 0.3 }
                },
                "tracker": {
                    "maxAge": 20,
                    "weights": { "other": { "iou": 1.0 } }
                },
                "events": {
                    "lineStart": [0, 300],
                    "lineEnd": [640, 300],
                    "zone": [0, 0, 100, 100],
                    "cooldownMs": 500
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.detector.layout, OutputLayout::Heatmap);
        assert_eq!(config.detector.allowed_labels, vec!["face"]);
        assert_eq!(config.detector.nms.iou_threshold, 0.3);
        assert_eq!(config.detector.nms.threshold_for("person"), 0.75);

        assert_eq!(config.tracker.max_age, 20);
        assert_eq!(config.tracker.iou_threshold, 0.25);
        assert_eq!(config.tracker.weights.other.iou, 1.0);
        assert_eq!(config.tracker.weights.other.size, 0.0);
        assert_eq!(config.tracker.weights.person, TrackerConfig::default().weights.person);

        assert_eq!(config.events.line_start, [0.0, 300.0]);
        assert_eq!(config.events.zone.unwrap().right(), 100.0);
        assert_eq!(config.events.cooldown_ms, 500);
        assert_eq!(config.events.min_confidence, 0.7);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = Config::from_json_str(r#"{ "tracker": { "maxAge": "ten" } }"#).unwrap_err();

        assert!(matches!(err, Error::JsonError(_)));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Config::from_path("/nonexistent/crosstrack.json").unwrap_err();

        assert!(matches!(err, Error::IoError(_)));
    }
}
