pub mod bbox;
pub mod clock;
pub mod color;
pub mod config;
pub mod detection;
pub mod detector;
pub mod error;
pub mod events;
pub mod frame;
pub mod math;
pub mod nms;
pub mod quant;
pub mod track;
pub mod tracker;

pub use bbox::{BBox, Ltrb, Xywh};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use detection::Detection;
pub use detector::{Detector, DetectorConfig, OutputLayout, QuantizedTensor, RawOutputs};
pub use error::Error;
pub use events::{Event, EventConfig, EventDeriver};
pub use frame::{Frame, FrameOutput, FrameProcessor};
pub use nms::{non_maximum_suppression, NmsConfig};
pub use quant::QuantParams;
pub use track::TrackedObject;
pub use tracker::{Tracker, TrackerConfig};
