//! End-to-end scenarios over the public API.

use std::sync::Arc;

use crosstrack::detector::QuantizedTensor;
use crosstrack::events::{CrossingDirection, ItemAction};
use crosstrack::{
    non_maximum_suppression, BBox, Config, Detection, Detector, DetectorConfig, Event, Frame,
    FrameProcessor, ManualClock, NmsConfig, QuantParams, RawOutputs, Tracker,
};
use ndarray::{Array2, Array3};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn det(label: &str, confidence: f32, l: f32, t: f32, r: f32, b: f32) -> Detection {
    Detection::new(label, confidence, BBox::ltrb(l, t, r, b))
}

/// 40x40 box centered at `(cx, cy)`
fn cup(cx: f32, cy: f32) -> Detection {
    det("cup", 0.9, cx - 20.0, cy - 20.0, cx + 20.0, cy + 20.0)
}

fn frame(timestamp: i64, detections: Vec<Detection>) -> Frame {
    Frame {
        width: 640,
        height: 640,
        detections,
        timestamp,
    }
}

#[test]
fn basic_single_object_tracking() {
    init_logger();
    let mut tracker = Tracker::default();

    let first = tracker.update(&[det("person", 0.9, 10.0, 10.0, 50.0, 90.0)], None, 0);
    let second = tracker.update(&[det("person", 0.9, 12.0, 11.0, 52.0, 91.0)], None, 40);

    assert_eq!(second.len(), 1);
    assert_eq!(first[0].id, second[0].id);
    assert_eq!(second[0].confidence, 0.9);
    assert!((second[0].velocity.x - 2.0).abs() < 1e-3);
    assert!((second[0].velocity.y - 1.0).abs() < 1e-3);
}

#[test]
fn nms_dedup() {
    let out = non_maximum_suppression(
        vec![
            det("cup", 0.9, 0.0, 0.0, 10.0, 10.0),
            det("cup", 0.8, 1.0, 1.0, 11.0, 11.0),
        ],
        &NmsConfig::new(0.5),
    );

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].confidence, 0.9);
}

#[test]
fn decoder_fallback_produces_finite_boxes() {
    init_logger();

    let boxes = Array3::from_shape_vec((1, 2, 4), vec![10u8, 10, 200, 250, 0, 0, 255, 255]).unwrap();
    let scores = Array2::from_shape_vec((1, 2), vec![200u8, 220]).unwrap();
    let classes = Array2::from_shape_vec((1, 2), vec![0u8, 1]).unwrap();

    let outputs = RawOutputs::BoxScoreClass {
        boxes: QuantizedTensor::new(boxes.view(), QuantParams::new(0.0, 0)),
        scores: QuantizedTensor::new(scores.view(), QuantParams::new(0.0, 0)),
        classes: QuantizedTensor::new(classes.view(), QuantParams::new(f32::NAN, 0)),
    };

    let detector = Detector::new(
        DetectorConfig::default(),
        vec!["person".to_string(), "cup".to_string()],
    );
    let dets = detector.decode(&outputs, 640, 480).unwrap();

    // scores fall back to 0.004: 200 -> 0.8, 220 -> 0.88
    assert_eq!(dets.len(), 2);
    for d in &dets {
        assert!(d.bbox.is_valid(), "{:?}", d);
        assert!(d.confidence.is_finite());
    }
}

#[test]
fn line_crossing_with_tracker() {
    init_logger();
    let clock = Arc::new(ManualClock::new(0));
    let mut processor = FrameProcessor::new(Config::default(), Vec::new()).with_clock(clock.clone());

    let mut events = Vec::new();
    let mut ids = Vec::new();

    for (i, cy) in [500.0, 515.0, 530.0, 545.0, 560.0, 575.0, 590.0].iter().enumerate() {
        let ts = i as i64 * 1100;
        clock.set(ts);

        let out = processor.process_frame(&frame(ts, vec![cup(100.0, *cy)]), None);
        ids.extend(out.tracks.iter().map(|t| t.id));
        events.extend(out.events);
    }

    ids.dedup();
    assert_eq!(ids.len(), 1, "cup changed identity: {:?}", ids);

    let crossings: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::Crossing { direction, timestamp, .. } => Some((*direction, *timestamp)),
            _ => None,
        })
        .collect();

    assert_eq!(crossings, vec![(CrossingDirection::TopToBottom, 4400)]);
}

#[test]
fn person_puts_cup_down() {
    init_logger();
    let clock = Arc::new(ManualClock::new(0));
    let mut processor = FrameProcessor::new(Config::default(), Vec::new()).with_clock(clock.clone());
    let person = det("person", 0.95, 200.0, 300.0, 280.0, 600.0);

    let mut events = Vec::new();
    for (i, cy) in [530.0, 540.0, 550.0, 560.0, 570.0].iter().enumerate() {
        let ts = i as i64 * 300;
        clock.set(ts);

        let out = processor.process_frame(&frame(ts, vec![person.clone(), cup(100.0, *cy)]), None);
        events.extend(out.events);
    }

    let person_id = processor
        .tracker()
        .tracks()
        .iter()
        .find(|t| t.label == "person")
        .map(|t| t.id)
        .unwrap();

    assert_eq!(
        events[0],
        Event::Appearance {
            person_id,
            label: "person".into(),
            timestamp: 0
        }
    );

    let actions: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::Action {
                person_id,
                action,
                distance,
                timestamp,
                ..
            } => Some((*person_id, *action, *distance, *timestamp)),
            _ => None,
        })
        .collect();

    assert_eq!(actions.len(), 1);
    let (who, action, distance, timestamp) = actions[0];
    assert_eq!(who, person_id);
    assert_eq!(action, ItemAction::PutDown);
    assert_eq!(timestamp, 900);
    // cup center (100, 560), person center (240, 450)
    assert!((distance - (140.0f32 * 140.0 + 110.0 * 110.0).sqrt()).abs() < 1e-2);
}

#[test]
fn parallel_walkers_keep_identities() {
    init_logger();
    let mut tracker = Tracker::default();
    let mut first_ids = None;

    for step in 0..25 {
        let x = step as f32 * 4.0;
        let tracks = tracker.update(
            &[
                det("person", 0.9, x, 0.0, x + 40.0, 100.0),
                det("person", 0.9, 400.0 - x, 200.0, 440.0 - x, 300.0),
            ],
            None,
            step * 40,
        );

        assert_eq!(tracks.len(), 2);

        let upper = tracks.iter().find(|t| t.bbox.top() < 100.0).unwrap().id;
        let lower = tracks.iter().find(|t| t.bbox.top() >= 100.0).unwrap().id;

        match first_ids {
            None => first_ids = Some((upper, lower)),
            Some(ids) => assert_eq!(ids, (upper, lower), "swap at step {}", step),
        }
    }
}

#[test]
fn disappearance_after_eviction() {
    init_logger();
    let clock = Arc::new(ManualClock::new(0));
    let mut processor = FrameProcessor::new(Config::default(), Vec::new()).with_clock(clock.clone());

    let out = processor.process_frame(
        &frame(0, vec![det("person", 0.9, 100.0, 100.0, 160.0, 300.0)]),
        None,
    );
    assert!(matches!(out.events.as_slice(), [Event::Appearance { .. }]));

    let mut disappeared_at = None;
    for i in 1..40 {
        clock.set(i * 100);
        let out = processor.process_frame(&frame(i * 100, Vec::new()), None);

        if out
            .events
            .iter()
            .any(|e| matches!(e, Event::Disappearance { .. }))
        {
            disappeared_at = Some(i);
            break;
        }
    }

    // evicted at frame 11, reported once missing for more than 10 frames
    assert_eq!(disappeared_at, Some(21));
}
