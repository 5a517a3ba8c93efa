use std::collections::{BTreeMap, HashSet};

use image::RgbImage;
use log::{debug, trace};
use nalgebra as na;
use serde_derive::{Deserialize, Serialize};

use crate::color::{self, ColorFeatures, NEUTRAL_SIMILARITY};
use crate::detection::Detection;
use crate::math;
use crate::track::TrackedObject;

/// Weights of the composite association score
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(default)]
pub struct ScoreWeights {
    pub iou: f32,
    pub size: f32,
    pub proximity: f32,
    pub direction: f32,
    pub color: f32,
}

impl ScoreWeights {
    pub const fn new(iou: f32, size: f32, proximity: f32, direction: f32, color: f32) -> Self {
        Self {
            iou,
            size,
            proximity,
            direction,
            color,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct WeightProfiles {
    /// People whose box sits on top of another person's: position says little
    pub overlapping_person: ScoreWeights,
    pub person: ScoreWeights,
    pub other: ScoreWeights,
}

impl Default for WeightProfiles {
    fn default() -> Self {
        Self {
            overlapping_person: ScoreWeights::new(0.25, 0.1, 0.05, 0.35, 0.25),
            person: ScoreWeights::new(0.4, 0.1, 0.0, 0.25, 0.25),
            other: ScoreWeights::new(0.6, 0.2, 0.15, 0.05, 0.0),
        }
    }
}

impl WeightProfiles {
    #[inline]
    pub fn select(&self, is_person: bool, overlapping: bool) -> &ScoreWeights {
        match (is_person, overlapping) {
            (true, true) => &self.overlapping_person,
            (true, false) => &self.person,
            _ => &self.other,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TrackerConfig {
    /// Minimal composite score (stage 2) and plain IoU (stage 3) to accept a match
    pub iou_threshold: f32,
    /// Stage 1 IoU gate against predicted boxes
    pub confident_iou_threshold: f32,
    /// Frames a track survives without a match
    pub max_age: u32,
    /// Person centers closer than this many average widths count as overlapping
    pub overlap_threshold: f32,
    /// EMA weight of the newest displacement
    pub velocity_weight: f32,
    pub crossing_boost: f32,
    /// Below this speed (px/frame) direction is not trusted
    pub min_speed: f32,
    /// Unmatched detections closer than this many average widths to a track
    /// of the same label do not start a new track
    pub duplicate_distance: f32,
    pub person_label: String,
    pub weights: WeightProfiles,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            iou_threshold: 0.25,
            confident_iou_threshold: 0.5,
            max_age: 10,
            overlap_threshold: 1.2,
            velocity_weight: 0.7,
            crossing_boost: 1.5,
            min_speed: 0.5,
            duplicate_distance: 1.5,
            person_label: "person".to_string(),
            weights: WeightProfiles::default(),
        }
    }
}

/// Where a detection stands in the association cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionState {
    Unmatched,
    Matched(u32),
}

impl DetectionState {
    #[inline]
    pub fn is_unmatched(&self) -> bool {
        matches!(self, DetectionState::Unmatched)
    }
}

fn matched_tracks(states: &[DetectionState]) -> HashSet<u32> {
    states
        .iter()
        .filter_map(|s| match s {
            DetectionState::Matched(id) => Some(*id),
            DetectionState::Unmatched => None,
        })
        .collect()
}

/// A detection of the current frame with its appearance sampled once
#[derive(Debug)]
struct Candidate<'a> {
    det: &'a Detection,
    colors: Option<ColorFeatures>,
}

/// Highest scoring unmatched candidate of `label`; the first of equal maxima wins
fn best_candidate<F>(
    candidates: &[Candidate<'_>],
    states: &[DetectionState],
    label: &str,
    mut score: F,
) -> Option<(usize, f32)>
where
    F: FnMut(&Candidate<'_>) -> f32,
{
    let mut best: Option<(usize, f32)> = None;

    for (idx, (cand, state)) in candidates.iter().zip(states).enumerate() {
        if !state.is_unmatched() || cand.det.label != label {
            continue;
        }

        let value = score(cand);
        if value.is_nan() {
            continue;
        }

        if best.map_or(true, |(_, b)| value > b) {
            best = Some((idx, value));
        }
    }

    best
}

fn composite_score(
    track: &TrackedObject,
    cand: &Candidate<'_>,
    weights: &ScoreWeights,
    is_person: bool,
    min_speed: f32,
) -> f32 {
    let det = cand.det;

    let color = if is_person {
        match (&track.colors, &cand.colors) {
            (Some(stored), Some(sampled)) => stored.similarity(sampled),
            _ => NEUTRAL_SIMILARITY,
        }
    } else {
        0.0
    };

    weights.iou * track.predicted.iou(&det.bbox)
        + weights.size * math::size_ratio(&track.bbox, &det.bbox)
        + weights.proximity * math::center_proximity(&track.predicted, &det.bbox)
        + weights.direction
            * math::direction_score(&track.velocity, &track.center(), &det.center(), min_speed)
        + weights.color * color
}

fn absorb(config: &TrackerConfig, track: &mut TrackedObject, cand: &Candidate<'_>, now_ms: i64) {
    track.update(cand.det, config.velocity_weight, now_ms);

    if !track.has_color_info() && track.is_labelled(&config.person_label) {
        if let Some(colors) = cand.colors {
            track.set_colors(colors);
        }
    }
}

/// Multi-object tracker keeping stable ids across frames
#[derive(Debug, Default)]
pub struct Tracker {
    config: TrackerConfig,
    tracks: BTreeMap<u32, TrackedObject>,
    next_id: u32,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: BTreeMap::new(),
            next_id: 0,
        }
    }

    #[inline]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    #[inline]
    pub fn get(&self, id: u32) -> Option<&TrackedObject> {
        self.tracks.get(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Live tracks ordered by id
    pub fn tracks(&self) -> Vec<TrackedObject> {
        self.tracks.values().cloned().collect()
    }

    /// Associates one frame of detections with the live tracks.
    ///
    /// Detections with an empty or non-finite box are ignored.
    ///
    /// Without an image no color is sampled and the color term of the
    /// composite score stays neutral. Unlike a live camera loop, which skips
    /// frames that arrive without an image, the cascade still runs so that
    /// recorded detections can be replayed.
    pub fn update(
        &mut self,
        detections: &[Detection],
        image: Option<&RgbImage>,
        now_ms: i64,
    ) -> Vec<TrackedObject> {
        let person = &self.config.person_label;
        let candidates: Vec<Candidate<'_>> = detections
            .iter()
            .filter(|det| det.bbox.is_valid())
            .map(|det| Candidate {
                det,
                colors: match image {
                    Some(img) if &det.label == person => color::extract(img, &det.bbox),
                    _ => None,
                },
            })
            .collect();

        if candidates.is_empty() {
            for track in self.tracks.values_mut() {
                track.increment_age();
            }

            self.evict();
            return self.tracks();
        }

        for track in self.tracks.values_mut() {
            track.predict_for_matching();
        }

        let states = vec![DetectionState::Unmatched; candidates.len()];
        let states = self.match_confident(&candidates, states, now_ms);
        self.boost_crossings(&states);
        let states = self.match_composite(&candidates, states, now_ms);
        let states = self.match_fallback(&candidates, states, now_ms);

        self.age_unmatched(&states);
        self.spawn(&candidates, &states, now_ms);
        self.evict();

        self.tracks()
    }

    /// Stage 1: strict IoU against the predicted boxes
    fn match_confident(
        &mut self,
        candidates: &[Candidate<'_>],
        mut states: Vec<DetectionState>,
        now_ms: i64,
    ) -> Vec<DetectionState> {
        let config = &self.config;

        for track in self.tracks.values_mut() {
            let best = best_candidate(candidates, &states, &track.label, |c| {
                track.predicted.iou(&c.det.bbox)
            });

            if let Some((idx, iou)) = best {
                if iou > config.confident_iou_threshold {
                    trace!("stage 1: track {} <- detection {} (iou {:.3})", track.id, idx, iou);
                    absorb(config, track, &candidates[idx], now_ms);
                    states[idx] = DetectionState::Matched(track.id);
                }
            }
        }

        states
    }

    /// People still looking for a match that are passing each other get their
    /// velocities amplified, so direction weighs more in stage 2
    fn boost_crossings(&mut self, states: &[DetectionState]) {
        let matched = matched_tracks(states);
        let config = &self.config;
        let movers: Vec<&TrackedObject> = self
            .tracks
            .values()
            .filter(|t| t.is_labelled(&config.person_label) && !matched.contains(&t.id))
            .collect();

        let mut boosted = HashSet::new();
        for (i, a) in movers.iter().enumerate() {
            for b in &movers[i + 1..] {
                let reach = config.overlap_threshold * (a.width() + b.width()) / 2.0;
                if na::distance(&a.center(), &b.center()) >= reach {
                    continue;
                }

                if a.speed() <= config.min_speed || b.speed() <= config.min_speed {
                    continue;
                }

                if a.velocity.dot(&b.velocity) < 0.0 {
                    debug!("tracks {} and {} are crossing", a.id, b.id);
                    boosted.insert(a.id);
                    boosted.insert(b.id);
                }
            }
        }

        for id in boosted {
            if let Some(track) = self.tracks.get_mut(&id) {
                track.boost_velocity(self.config.crossing_boost);
            }
        }
    }

    /// Person tracks whose center lies close to another person's
    fn overlapping_persons(&self) -> HashSet<u32> {
        let people: Vec<&TrackedObject> = self
            .tracks
            .values()
            .filter(|t| t.is_labelled(&self.config.person_label))
            .collect();

        let mut overlapping = HashSet::new();
        for (i, a) in people.iter().enumerate() {
            for b in &people[i + 1..] {
                let reach = self.config.overlap_threshold * (a.width() + b.width()) / 2.0;

                if na::distance(&a.center(), &b.center()) < reach {
                    overlapping.insert(a.id);
                    overlapping.insert(b.id);
                }
            }
        }

        overlapping
    }

    /// Stage 2: weighted blend of overlap, size, position, motion and color
    fn match_composite(
        &mut self,
        candidates: &[Candidate<'_>],
        mut states: Vec<DetectionState>,
        now_ms: i64,
    ) -> Vec<DetectionState> {
        let overlapping = self.overlapping_persons();
        let matched = matched_tracks(&states);
        let config = &self.config;

        for track in self.tracks.values_mut() {
            if matched.contains(&track.id) {
                continue;
            }

            let is_person = track.is_labelled(&config.person_label);
            let weights = config
                .weights
                .select(is_person, overlapping.contains(&track.id));

            let best = best_candidate(candidates, &states, &track.label, |c| {
                composite_score(track, c, weights, is_person, config.min_speed)
            });

            if let Some((idx, score)) = best {
                if score > config.iou_threshold {
                    trace!("stage 2: track {} <- detection {} (score {:.3})", track.id, idx, score);
                    absorb(config, track, &candidates[idx], now_ms);
                    states[idx] = DetectionState::Matched(track.id);
                }
            }
        }

        states
    }

    /// Stage 3: plain IoU on the literal boxes
    fn match_fallback(
        &mut self,
        candidates: &[Candidate<'_>],
        mut states: Vec<DetectionState>,
        now_ms: i64,
    ) -> Vec<DetectionState> {
        let matched = matched_tracks(&states);
        let config = &self.config;

        for track in self.tracks.values_mut() {
            if matched.contains(&track.id) {
                continue;
            }

            let best = best_candidate(candidates, &states, &track.label, |c| {
                track.bbox.iou(&c.det.bbox)
            });

            if let Some((idx, iou)) = best {
                if iou > config.iou_threshold {
                    trace!("stage 3: track {} <- detection {} (iou {:.3})", track.id, idx, iou);
                    absorb(config, track, &candidates[idx], now_ms);
                    states[idx] = DetectionState::Matched(track.id);
                }
            }
        }

        states
    }

    fn age_unmatched(&mut self, states: &[DetectionState]) {
        let matched = matched_tracks(states);

        for track in self.tracks.values_mut() {
            if !matched.contains(&track.id) {
                track.increment_age();
            }
        }
    }

    fn find_duplicate(&self, det: &Detection) -> Option<u32> {
        let center = det.center();

        self.tracks
            .values()
            .find(|t| {
                let reach = self.config.duplicate_distance * (t.width() + det.width()) / 2.0;
                t.is_labelled(&det.label) && na::distance(&t.center(), &center) < reach
            })
            .map(|t| t.id)
    }

    fn spawn(&mut self, candidates: &[Candidate<'_>], states: &[DetectionState], now_ms: i64) {
        for (cand, state) in candidates.iter().zip(states) {
            if !state.is_unmatched() {
                continue;
            }

            if let Some(existing) = self.find_duplicate(cand.det) {
                trace!("{} detection duplicates track {}", cand.det.label, existing);
                continue;
            }

            let id = self.next_id;
            self.next_id += 1;

            let mut track = TrackedObject::new(id, cand.det, now_ms);
            if track.is_labelled(&self.config.person_label) {
                if let Some(colors) = cand.colors {
                    track.set_colors(colors);
                }
            }

            debug!("new track {} ({})", id, track.label);
            self.tracks.insert(id, track);
        }
    }

    fn evict(&mut self) {
        let max_age = self.config.max_age;

        self.tracks.retain(|id, track| {
            let keep = track.age <= max_age;
            if !keep {
                debug!("track {} ({}) evicted", id, track.label);
            }

            keep
        });
    }
}
