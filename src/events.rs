use std::collections::{BTreeMap, HashSet};

use log::debug;
use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::{BBox, Ltrb};
use crate::math::signed_distance_to_line;
use crate::track::TrackedObject;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct EventConfig {
    /// Virtual line endpoints, in reference space
    pub line_start: [f32; 2],
    pub line_end: [f32; 2],
    /// Frame centers are rescaled into a `width x height` space before the
    /// line and zone tests
    pub reference_size: [f32; 2],
    /// Optional area of interest, in reference space
    pub zone: Option<BBox<Ltrb>>,
    pub cooldown_ms: i64,
    pub min_confidence: f32,
    /// Labels watched for line crossings
    pub crossing_labels: Vec<String>,
    /// Labels whose crossings mean somebody picked them up or put them down
    pub manipulable_labels: Vec<String>,
    pub person_label: String,
    /// Frames a person may be absent before a disappearance is reported
    pub missing_threshold: u32,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            line_start: [640.0, 550.0],
            line_end: [0.0, 550.0],
            reference_size: [640.0, 640.0],
            zone: None,
            cooldown_ms: 1000,
            min_confidence: 0.7,
            crossing_labels: vec!["cup".into()],
            manipulable_labels: vec!["cup".into()],
            person_label: "person".into(),
            missing_threshold: 10,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CrossingDirection {
    TopToBottom,
    BottomToTop,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemAction {
    #[serde(rename = "pick up")]
    PickUp,
    #[serde(rename = "put down")]
    PutDown,
}

impl From<CrossingDirection> for ItemAction {
    fn from(direction: CrossingDirection) -> Self {
        match direction {
            CrossingDirection::TopToBottom => ItemAction::PutDown,
            CrossingDirection::BottomToTop => ItemAction::PickUp,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    #[serde(rename_all = "camelCase")]
    Crossing {
        object_id: u32,
        label: String,
        timestamp: i64,
        direction: CrossingDirection,
        #[serde(skip_serializing_if = "Option::is_none")]
        action: Option<ItemAction>,
    },

    #[serde(rename_all = "camelCase")]
    Appearance {
        person_id: u32,
        label: String,
        timestamp: i64,
    },

    #[serde(rename_all = "camelCase")]
    Disappearance {
        person_id: u32,
        label: String,
        timestamp: i64,
    },

    /// A person handled an item: the nearest person at the moment it crossed
    #[serde(rename_all = "camelCase")]
    Action {
        object_id: u32,
        label: String,
        person_id: u32,
        distance: f32,
        action: ItemAction,
        in_zone: bool,
        timestamp: i64,
    },
}

#[derive(Debug, Clone, Copy)]
struct LineState {
    below: bool,
    last_event_ms: Option<i64>,
}

#[derive(Debug, Clone)]
struct Presence {
    label: String,
    missing: u32,
}

/// Turns per-frame track lists into discrete events.
///
/// Keeps per-id bookkeeping only; the tracks themselves belong to the tracker.
#[derive(Debug, Default)]
pub struct EventDeriver {
    config: EventConfig,
    lines: BTreeMap<u32, LineState>,
    presence: BTreeMap<u32, Presence>,
}

impl EventDeriver {
    pub fn new(config: EventConfig) -> Self {
        Self {
            config,
            lines: BTreeMap::new(),
            presence: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &EventConfig {
        &self.config
    }

    /// Frame pixels to reference space
    fn to_reference(&self, p: &na::Point2<f32>, frame: (u32, u32)) -> na::Point2<f32> {
        let [rw, rh] = self.config.reference_size;

        na::Point2::new(
            p.x * rw / frame.0.max(1) as f32,
            p.y * rh / frame.1.max(1) as f32,
        )
    }

    /// Reference space to frame pixels
    fn to_frame(&self, p: &na::Point2<f32>, frame: (u32, u32)) -> na::Point2<f32> {
        let [rw, rh] = self.config.reference_size;

        na::Point2::new(p.x * frame.0 as f32 / rw, p.y * frame.1 as f32 / rh)
    }

    #[inline]
    fn is_person(&self, track: &TrackedObject) -> bool {
        track.is_labelled(&self.config.person_label)
            && track.confidence >= self.config.min_confidence
    }

    /// Closest confident person to `target`, with the center distance
    pub fn nearest_person<'a>(
        &self,
        tracks: &'a [TrackedObject],
        target: &na::Point2<f32>,
    ) -> Option<(&'a TrackedObject, f32)> {
        let mut nearest: Option<(&'a TrackedObject, f32)> = None;

        for track in tracks.iter().filter(|t| self.is_person(t)) {
            let distance = na::distance(&track.center(), target);

            if nearest.map_or(true, |(_, d)| distance < d) {
                nearest = Some((track, distance));
            }
        }

        nearest
    }

    /// Closest confident person to the zone center; `None` without a zone
    pub fn nearest_person_to_zone<'a>(
        &self,
        tracks: &'a [TrackedObject],
        frame_width: u32,
        frame_height: u32,
    ) -> Option<(&'a TrackedObject, f32)> {
        let zone = self.config.zone?;
        let center = self.to_frame(&zone.center(), (frame_width, frame_height));

        self.nearest_person(tracks, &center)
    }

    fn in_zone(&self, p: &na::Point2<f32>) -> bool {
        match &self.config.zone {
            Some(z) => p.x >= z.left() && p.x <= z.right() && p.y >= z.top() && p.y <= z.bottom(),
            None => false,
        }
    }

    /// Derives this frame's events from the current track list
    pub fn derive(
        &mut self,
        tracks: &[TrackedObject],
        frame_width: u32,
        frame_height: u32,
        now_ms: i64,
    ) -> Vec<Event> {
        let mut events = self.detect_crossings(tracks, (frame_width, frame_height), now_ms);
        events.extend(self.update_presence(tracks, now_ms));

        for event in &events {
            debug!("event: {:?}", event);
        }

        events
    }

    fn detect_crossings(
        &mut self,
        tracks: &[TrackedObject],
        frame: (u32, u32),
        now_ms: i64,
    ) -> Vec<Event> {
        let [sx, sy] = self.config.line_start;
        let [ex, ey] = self.config.line_end;
        let (start, end) = (na::Point2::new(sx, sy), na::Point2::new(ex, ey));
        let mut events = Vec::new();

        for track in tracks {
            if track.confidence < self.config.min_confidence
                || !self.config.crossing_labels.contains(&track.label)
            {
                continue;
            }

            let center = self.to_reference(&track.center(), frame);
            let below = signed_distance_to_line(&center, &start, &end) > 0.0;

            let previous = self.lines.get(&track.id).copied();
            let mut last_event_ms = previous.and_then(|s| s.last_event_ms);

            if let Some(prev) = previous {
                let cooled_down = last_event_ms.map_or(true, |t| now_ms - t > self.config.cooldown_ms);

                if prev.below != below && cooled_down {
                    let direction = if below {
                        CrossingDirection::TopToBottom
                    } else {
                        CrossingDirection::BottomToTop
                    };

                    events.extend(self.crossing_events(track, tracks, direction, &center, now_ms));
                    last_event_ms = Some(now_ms);
                }
            }

            self.lines.insert(
                track.id,
                LineState {
                    below,
                    last_event_ms,
                },
            );
        }

        let current: HashSet<u32> = tracks.iter().map(|t| t.id).collect();
        self.lines.retain(|id, _| current.contains(id));

        events
    }

    fn crossing_events(
        &self,
        track: &TrackedObject,
        tracks: &[TrackedObject],
        direction: CrossingDirection,
        reference_center: &na::Point2<f32>,
        now_ms: i64,
    ) -> Vec<Event> {
        let manipulable = self.config.manipulable_labels.contains(&track.label);
        let action = manipulable.then(|| ItemAction::from(direction));

        let mut events = vec![Event::Crossing {
            object_id: track.id,
            label: track.label.clone(),
            timestamp: now_ms,
            direction,
            action,
        }];

        if let Some(action) = action {
            if let Some((person, distance)) = self.nearest_person(tracks, &track.center()) {
                events.push(Event::Action {
                    object_id: track.id,
                    label: track.label.clone(),
                    person_id: person.id,
                    distance,
                    action,
                    in_zone: self.in_zone(reference_center),
                    timestamp: now_ms,
                });
            }
        }

        events
    }

    fn update_presence(&mut self, tracks: &[TrackedObject], now_ms: i64) -> Vec<Event> {
        let mut events = Vec::new();
        let mut present = HashSet::new();
        let config = &self.config;

        for track in tracks.iter().filter(|t| t.is_labelled(&config.person_label)) {
            present.insert(track.id);

            match self.presence.get_mut(&track.id) {
                Some(p) => p.missing = 0,
                None => {
                    self.presence.insert(
                        track.id,
                        Presence {
                            label: track.label.clone(),
                            missing: 0,
                        },
                    );

                    events.push(Event::Appearance {
                        person_id: track.id,
                        label: track.label.clone(),
                        timestamp: now_ms,
                    });
                }
            }
        }

        let threshold = config.missing_threshold;
        self.presence.retain(|&id, p| {
            if present.contains(&id) {
                return true;
            }

            p.missing += 1;
            if p.missing > threshold {
                events.push(Event::Disappearance {
                    person_id: id,
                    label: p.label.clone(),
                    timestamp: now_ms,
                });

                return false;
            }

            true
        });

        events
    }
}
