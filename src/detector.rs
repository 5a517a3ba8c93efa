use std::io::BufRead;

use log::{debug, trace};
use ndarray::prelude::*;
use serde_derive::{Deserialize, Serialize};

use crate::bbox::BBox;
use crate::detection::Detection;
use crate::error::Error;
use crate::nms::{non_maximum_suppression, NmsConfig};
use crate::quant::{QuantParams, TensorRole};

/// Shape of the model output the detector expects
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum OutputLayout {
    /// `boxes[1][N][4]`, `scores[1][N]`, `classes[1][N]`
    BoxScoreClass,
    /// `heatmap[1][H][W][1]` objectness with `boxes[1][H][W][4]` offsets
    Heatmap,
}

/// Affine recalibration of raw heatmap bytes:
/// `((raw - zero_point) * scale + offset) / range`
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoreCalibration {
    pub zero_point: f32,
    pub scale: f32,
    pub offset: f32,
    pub range: f32,
}

impl Default for ScoreCalibration {
    fn default() -> Self {
        Self {
            zero_point: 192.0,
            scale: 0.039235096,
            offset: 7.530337,
            range: 10.00052,
        }
    }
}

impl ScoreCalibration {
    #[inline]
    pub fn apply(&self, raw: u8) -> f32 {
        ((raw as f32 - self.zero_point) * self.scale + self.offset) / self.range
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DetectorConfig {
    pub layout: OutputLayout,
    /// Detections are kept when their confidence is strictly above this
    pub confidence_threshold: f32,
    /// Labels kept after class resolution; empty keeps everything
    pub allowed_labels: Vec<String>,
    /// Side of the square model input, box tensors are in these pixels
    pub input_size: f32,
    /// Label given to every heatmap detection
    pub heatmap_label: String,
    /// `None` dequantizes the heatmap with the tensor's own parameters
    pub calibration: Option<ScoreCalibration>,
    pub nms: NmsConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self::box_score_class()
    }
}

impl DetectorConfig {
    pub fn box_score_class() -> Self {
        Self {
            layout: OutputLayout::BoxScoreClass,
            confidence_threshold: 0.4,
            allowed_labels: vec!["cup".into(), "person".into(), "laptop".into()],
            input_size: 640.0,
            heatmap_label: "face".into(),
            calibration: Some(ScoreCalibration::default()),
            nms: NmsConfig::default(),
        }
    }

    pub fn heatmap() -> Self {
        Self {
            layout: OutputLayout::Heatmap,
            confidence_threshold: 0.1,
            allowed_labels: Vec::new(),
            nms: NmsConfig::new(0.2),
            ..Self::box_score_class()
        }
    }

    #[inline]
    pub fn is_allowed(&self, label: &str) -> bool {
        self.allowed_labels.is_empty() || self.allowed_labels.iter().any(|l| l == label)
    }
}

/// A quantized output tensor as handed over by the model runner
#[derive(Debug, Clone)]
pub struct QuantizedTensor<'a, D: Dimension> {
    pub data: ArrayView<'a, u8, D>,
    pub params: QuantParams,
}

impl<'a, D: Dimension> QuantizedTensor<'a, D> {
    pub fn new(data: ArrayView<'a, u8, D>, params: QuantParams) -> Self {
        Self { data, params }
    }
}

/// One frame of raw model output
#[derive(Debug, Clone)]
pub enum RawOutputs<'a> {
    BoxScoreClass {
        boxes: QuantizedTensor<'a, Ix3>,
        scores: QuantizedTensor<'a, Ix2>,
        classes: QuantizedTensor<'a, Ix2>,
    },
    Heatmap {
        heatmap: QuantizedTensor<'a, Ix4>,
        boxes: QuantizedTensor<'a, Ix4>,
    },
}

impl<'a> RawOutputs<'a> {
    #[inline]
    pub fn layout(&self) -> OutputLayout {
        match self {
            RawOutputs::BoxScoreClass { .. } => OutputLayout::BoxScoreClass,
            RawOutputs::Heatmap { .. } => OutputLayout::Heatmap,
        }
    }
}

/// Reads a label table, one label per line. Blank lines are skipped.
pub fn load_labels<R: BufRead>(reader: R) -> Result<Vec<String>, Error> {
    let mut labels = Vec::new();

    for line in reader.lines() {
        let line = line?;
        let label = line.trim();

        if !label.is_empty() {
            labels.push(label.to_string());
        }
    }

    Ok(labels)
}

fn check_shape(tensor: &'static str, actual: &[usize], ok: bool, expected: String) -> Result<(), Error> {
    if ok {
        Ok(())
    } else {
        Err(Error::ShapeMismatch {
            tensor,
            actual: actual.to_vec(),
            expected,
        })
    }
}

/// Turns quantized model output into pixel-space detections
#[derive(Debug, Clone)]
pub struct Detector {
    config: DetectorConfig,
    labels: Vec<String>,
}

impl Detector {
    pub fn new(config: DetectorConfig, labels: Vec<String>) -> Self {
        Self { config, labels }
    }

    #[inline]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    #[inline]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Decodes and deduplicates one frame
    pub fn detect(
        &self,
        outputs: &RawOutputs<'_>,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<Vec<Detection>, Error> {
        let decoded = self.decode(outputs, frame_width, frame_height)?;

        Ok(non_maximum_suppression(decoded, &self.config.nms))
    }

    /// Decodes without suppression. Boxes come back clamped to the frame.
    pub fn decode(
        &self,
        outputs: &RawOutputs<'_>,
        frame_width: u32,
        frame_height: u32,
    ) -> Result<Vec<Detection>, Error> {
        if outputs.layout() != self.config.layout {
            return Err(Error::LayoutMismatch {
                configured: self.config.layout,
                received: outputs.layout(),
            });
        }

        let (fw, fh) = (frame_width as f32, frame_height as f32);
        let detections = match outputs {
            RawOutputs::BoxScoreClass {
                boxes,
                scores,
                classes,
            } => self.decode_box_score_class(boxes, scores, classes, fw, fh)?,

            RawOutputs::Heatmap { heatmap, boxes } => self.decode_heatmap(heatmap, boxes, fw, fh)?,
        };

        debug!("decoded {} detections", detections.len());
        Ok(detections)
    }

    fn decode_box_score_class(
        &self,
        boxes: &QuantizedTensor<'_, Ix3>,
        scores: &QuantizedTensor<'_, Ix2>,
        classes: &QuantizedTensor<'_, Ix2>,
        fw: f32,
        fh: f32,
    ) -> Result<Vec<Detection>, Error> {
        let npreds = scores.data.shape()[1];

        check_shape(
            "scores",
            scores.data.shape(),
            scores.data.shape()[0] >= 1,
            "[1, N]".into(),
        )?;
        check_shape(
            "classes",
            classes.data.shape(),
            classes.data.shape()[0] >= 1 && classes.data.shape()[1] == npreds,
            format!("[1, {}]", npreds),
        )?;
        check_shape(
            "boxes",
            boxes.data.shape(),
            boxes.data.shape()[0] >= 1 && boxes.data.shape()[1] == npreds && boxes.data.shape()[2] >= 4,
            format!("[1, {}, 4]", npreds),
        )?;

        let box_q = boxes.params.sanitized(TensorRole::Boxes);
        let score_q = scores.params.sanitized(TensorRole::Scores);
        let class_q = classes.params.sanitized(TensorRole::Classes);
        let scale = 1.0 / self.config.input_size;

        let mut results = Vec::new();

        for index in 0..npreds {
            let confidence = score_q.dequantize(scores.data[[0, index]]).min(1.0);
            if !(confidence > self.config.confidence_threshold) {
                continue;
            }

            let class_value = class_q.dequantize(classes.data[[0, index]]);
            if !class_value.is_finite() {
                continue;
            }

            // truncates toward zero, so -0.5 still reads as class 0
            let label = match usize::try_from(class_value as i64)
                .ok()
                .and_then(|idx| self.labels.get(idx))
            {
                Some(label) => label,
                None => {
                    trace!("class index {} out of range", class_value);
                    continue;
                }
            };

            if !self.config.is_allowed(label) {
                continue;
            }

            let coord = |k: usize| box_q.dequantize(boxes.data[[0, index, k]]) * scale;
            let bbox = BBox::ltrb(coord(0) * fw, coord(1) * fh, coord(2) * fw, coord(3) * fh)
                .clamp(fw, fh);

            if !bbox.is_valid() {
                continue;
            }

            results.push(Detection::new(label.as_str(), confidence, bbox));
        }

        Ok(results)
    }

    fn decode_heatmap(
        &self,
        heatmap: &QuantizedTensor<'_, Ix4>,
        boxes: &QuantizedTensor<'_, Ix4>,
        fw: f32,
        fh: f32,
    ) -> Result<Vec<Detection>, Error> {
        let shape = heatmap.data.shape();
        let (grid_h, grid_w) = (shape[1], shape[2]);

        check_shape(
            "heatmap",
            shape,
            shape[0] >= 1 && shape[3] >= 1 && grid_h > 0 && grid_w > 0,
            "[1, H, W, 1]".into(),
        )?;
        check_shape(
            "boxes",
            boxes.data.shape(),
            boxes.data.shape()[0] >= 1
                && boxes.data.shape()[1] == grid_h
                && boxes.data.shape()[2] == grid_w
                && boxes.data.shape()[3] >= 4,
            format!("[1, {}, {}, 4]", grid_h, grid_w),
        )?;

        if !self.config.is_allowed(&self.config.heatmap_label) {
            debug!("label {} is not allowed, heatmap ignored", self.config.heatmap_label);
            return Ok(Vec::new());
        }

        let score_q = heatmap.params.sanitized(TensorRole::Scores);
        let box_q = boxes.params.sanitized(TensorRole::Boxes);
        let (gw, gh) = (grid_w as f32, grid_h as f32);

        let mut results = Vec::new();

        for y in 0..grid_h {
            for x in 0..grid_w {
                let raw = heatmap.data[[0, y, x, 0]];
                let confidence = match &self.config.calibration {
                    Some(calibration) => calibration.apply(raw),
                    None => score_q.dequantize(raw),
                }
                .clamp(0.0, 1.0);

                if !(confidence > self.config.confidence_threshold) {
                    continue;
                }

                // center offsets within the cell, size in cells
                let offset = |k: usize| box_q.dequantize(boxes.data[[0, y, x, k]]);
                let bbox = BBox::xywh(
                    (x as f32 + offset(0)) / gw * fw,
                    (y as f32 + offset(1)) / gh * fh,
                    offset(2) / gw * fw,
                    offset(3) / gh * fh,
                )
                .as_ltrb()
                .clamp(fw, fh);

                if !bbox.is_valid() {
                    continue;
                }

                results.push(Detection::new(
                    self.config.heatmap_label.as_str(),
                    confidence,
                    bbox,
                ));
            }
        }

        Ok(results)
    }
}
