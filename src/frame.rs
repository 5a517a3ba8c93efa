use std::sync::Arc;

use image::RgbImage;
use serde_derive::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::detection::Detection;
use crate::detector::{Detector, RawOutputs};
use crate::error::Error;
use crate::events::{Event, EventDeriver};
use crate::nms::non_maximum_suppression;
use crate::track::TrackedObject;
use crate::tracker::Tracker;

fn default_dim() -> u32 {
    640
}

/// Already decoded detections of one frame, as recorded by a detection dump
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Frame {
    #[serde(default = "default_dim")]
    pub width: u32,
    #[serde(default = "default_dim")]
    pub height: u32,
    pub detections: Vec<Detection>,
    /// Milliseconds
    pub timestamp: i64,
}

impl Frame {
    #[inline]
    pub fn len(&self) -> usize {
        self.detections.len()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FrameOutput {
    pub detections: Vec<Detection>,
    pub tracks: Vec<TrackedObject>,
    pub events: Vec<Event>,
}

/// Decoder, NMS, tracker and event derivation for a single stream.
///
/// Frames go through one at a time; `&mut self` keeps concurrent updates out.
pub struct FrameProcessor {
    detector: Detector,
    tracker: Tracker,
    events: EventDeriver,
    clock: Arc<dyn Clock>,
}

impl FrameProcessor {
    pub fn new(config: Config, labels: Vec<String>) -> Self {
        Self {
            detector: Detector::new(config.detector, labels),
            tracker: Tracker::new(config.tracker),
            events: EventDeriver::new(config.events),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[inline]
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    #[inline]
    pub fn event_deriver(&self) -> &EventDeriver {
        &self.events
    }

    /// Runs raw model output of `image` through the whole pipeline
    pub fn process(&mut self, outputs: &RawOutputs<'_>, image: &RgbImage) -> Result<FrameOutput, Error> {
        let (width, height) = image.dimensions();
        let detections = self.detector.detect(outputs, width, height)?;

        Ok(self.track(detections, Some(image), width, height))
    }

    /// Skips decoding for detections that were produced elsewhere. Empty
    /// boxes are dropped and the rest go through the same suppression as
    /// decoded output.
    pub fn process_frame(&mut self, frame: &Frame, image: Option<&RgbImage>) -> FrameOutput {
        let valid: Vec<Detection> = frame
            .iter()
            .filter(|d| d.bbox.is_valid())
            .cloned()
            .collect();

        let detections = non_maximum_suppression(valid, &self.detector.config().nms);
        self.track(detections, image, frame.width, frame.height)
    }

    fn track(
        &mut self,
        detections: Vec<Detection>,
        image: Option<&RgbImage>,
        width: u32,
        height: u32,
    ) -> FrameOutput {
        let now_ms = self.clock.now_ms();
        let tracks = self.tracker.update(&detections, image, now_ms);
        let events = self.events.derive(&tracks, width, height, now_ms);

        FrameOutput {
            detections,
            tracks,
            events,
        }
    }
}
