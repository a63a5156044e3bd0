//! mx-core: Shared types for the mixing console engine
//!
//! This crate provides the foundational types used across all mx crates:
//! sample types, channel-count constants, parameter enums, errors and
//! engine configuration.

mod sample;
mod params;
mod error;
mod config;

pub use sample::*;
pub use params::*;
pub use error::*;
pub use config::*;

/// Number of input tracks on a mixer
pub const N_TRK: usize = 16;
/// Number of group buses
pub const N_GRP: usize = 4;
/// Number of aux returns
pub const N_AUX: usize = 4;
/// Tracks and groups share one solo/link bit space
pub const N_SOLO: usize = N_TRK + N_GRP;
/// Tracks processed by the EQ module (tracks + groups + aux)
pub const N_EQ_TRK: usize = N_TRK + N_GRP + N_AUX;
/// Taps per strip
pub const N_TAPS: usize = 4;

/// Host signal ceiling in volts
pub const MAX_VOLTAGE: Sample = 10.0;

/// Clamp a voltage to ±20V before feeding it to a log or pow
#[inline]
pub fn clamp20v(v: Sample) -> Sample {
    if v.is_finite() { v.clamp(-20.0, 20.0) } else { 0.0 }
}

/// Convert decibels to linear gain
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Convert linear gain to decibels
#[inline]
pub fn linear_to_db(linear: f64) -> f64 {
    if linear <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}
