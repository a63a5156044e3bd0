//! Round-robin refresh scheduler
//!
//! Slow work is spread across samples instead of being done all at once:
//! - every `eco_stride` samples an eco tick recomputes gain targets and fades
//! - every sample one refresh slot is serviced; slots 0..15 are tracks,
//!   16..19 groups, 20..23 aux returns
//!
//! A full solo/group-membership rebuild therefore takes `N_REFRESH_SLOTS`
//! samples.

use mx_core::{MAX_ECO_STRIDE, N_AUX, N_SOLO};

pub const N_REFRESH_SLOTS: usize = N_SOLO + N_AUX;

/// What the current sample should refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshTick {
    /// Slow parameters are due
    pub eco: bool,
    /// Samples covered by this tick (since the previous eco tick)
    pub elapsed: usize,
    /// Refresh slot serviced this sample
    pub slot: usize,
}

impl RefreshTick {
    /// Tick that refreshes everything, for the first sample after a reset
    pub const fn full() -> Self {
        Self {
            eco: true,
            elapsed: 1,
            slot: 0,
        }
    }

    /// Seconds covered by an eco tick
    #[inline]
    pub fn eco_dt(&self, sample_time: f64) -> f64 {
        self.elapsed as f64 * sample_time
    }

    /// Track/group index whose solo bit is due
    #[inline]
    pub fn solo_index(&self) -> Option<usize> {
        (self.slot < N_SOLO).then_some(self.slot)
    }

    /// Aux return whose solo bit is due
    #[inline]
    pub fn aux_index(&self) -> Option<usize> {
        (self.slot >= N_SOLO && self.slot < N_REFRESH_SLOTS).then(|| self.slot - N_SOLO)
    }
}

#[derive(Debug, Clone)]
pub struct RefreshScheduler {
    stride: usize,
    phase: usize,
    since_eco: usize,
    slot: usize,
}

impl RefreshScheduler {
    /// `eco_stride` of 1 disables eco mode
    pub fn new(eco_stride: usize) -> Self {
        Self {
            stride: eco_stride.clamp(1, MAX_ECO_STRIDE),
            phase: 0,
            since_eco: 0,
            slot: 0,
        }
    }

    pub fn set_stride(&mut self, eco_stride: usize) {
        self.stride = eco_stride.clamp(1, MAX_ECO_STRIDE);
        self.phase %= self.stride;
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn reset(&mut self) {
        self.phase = 0;
        self.since_eco = 0;
        self.slot = 0;
    }

    /// Advance by one sample
    #[inline]
    pub fn tick(&mut self) -> RefreshTick {
        self.since_eco += 1;
        let eco = self.phase == 0;
        let elapsed = self.since_eco;
        if eco {
            self.since_eco = 0;
        }
        self.phase = (self.phase + 1) % self.stride;

        let slot = self.slot;
        self.slot = (slot + 1) % N_REFRESH_SLOTS;
        RefreshTick { eco, elapsed, slot }
    }
}
