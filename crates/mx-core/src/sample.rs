//! Sample types

use std::ops::{Add, AddAssign, Mul};

/// Type alias for audio samples (host voltages, ±10V nominal)
pub type Sample = f64;

/// Stereo sample pair
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    pub const ZERO: Self = Self::new(0.0, 0.0);

    #[inline]
    pub const fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    #[inline]
    pub const fn mono(value: Sample) -> Self {
        Self {
            left: value,
            right: value,
        }
    }

    /// Mono sum, halved so a centered signal keeps its level
    #[inline]
    pub fn mono_sum(self) -> Sample {
        (self.left + self.right) * 0.5
    }

    #[inline]
    pub fn peak(self) -> Sample {
        self.left.abs().max(self.right.abs())
    }

    /// Replace non-finite channels with silence
    #[inline]
    pub fn sanitized(self) -> Self {
        Self {
            left: if self.left.is_finite() { self.left } else { 0.0 },
            right: if self.right.is_finite() { self.right } else { 0.0 },
        }
    }
}

impl Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.left + rhs.left, self.right + rhs.right)
    }
}

impl AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.left += rhs.left;
        self.right += rhs.right;
    }
}

impl Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Sample) -> Self {
        Self::new(self.left * rhs, self.right * rhs)
    }
}
