use log::warn;
use num_traits::AsPrimitive;
use serde_derive::{Deserialize, Serialize};

/// Per-tensor affine quantization, `value = (raw - zero_point) * scale`
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuantParams {
    pub scale: f32,
    pub zero_point: i32,
}

/// What an output tensor carries; picks the fallback used for broken metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorRole {
    Boxes,
    Scores,
    Classes,
}

impl TensorRole {
    pub fn fallback(self) -> QuantParams {
        match self {
            TensorRole::Boxes => QuantParams::new(0.01, 0),
            TensorRole::Scores => QuantParams::new(0.004, 0),
            TensorRole::Classes => QuantParams::new(1.0, 0),
        }
    }
}

impl QuantParams {
    #[inline]
    pub const fn new(scale: f32, zero_point: i32) -> Self {
        Self { scale, zero_point }
    }

    #[inline]
    pub fn is_degenerate(&self) -> bool {
        self.scale == 0.0 || self.scale.is_nan()
    }

    /// Replaces a zero or NaN scale with the role's fallback pair
    pub fn sanitized(self, role: TensorRole) -> Self {
        if self.is_degenerate() {
            let fallback = role.fallback();
            warn!(
                "degenerate {:?} quantization (scale={}, zero_point={}), using {:?}",
                role, self.scale, self.zero_point, fallback
            );
            fallback
        } else {
            self
        }
    }

    /// Raw elements are read with their storage signedness: `u8` as `0..=255`, `i8` as `-128..=127`
    #[inline(always)]
    pub fn dequantize<T: AsPrimitive<f32>>(&self, raw: T) -> f32 {
        (raw.as_() - self.zero_point as f32) * self.scale
    }
}

impl Default for QuantParams {
    fn default() -> Self {
        Self::new(1.0, 0)
    }
}
