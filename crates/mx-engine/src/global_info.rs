//! Per-mixer coordination state
//!
//! `GlobalInfo` is owned by one mixer and handed by reference to every strip.
//! Solo and link bits share one 20-bit space: bits 0..15 are tracks, bits
//! 16..19 are groups. Bits are updated one index at a time from the refresh
//! scheduler, so a full rebuild is spread over a refresh cycle.

use mx_core::{MonoPanLaw, N_AUX, N_GRP, N_SOLO, N_TRK, StereoPanMode, TapMode};
use mx_dsp::pan_law::MAX_FADER;

/// Bits of the tracks (0..15) in a solo/link mask
pub const TRACK_BITS: u32 = (1 << N_TRK) - 1;
/// Bits of every track and group
pub const ALL_SOLO_BITS: u32 = (1 << N_SOLO) - 1;

/// Solo/link bit of a group
#[inline]
pub const fn group_bit(group: usize) -> u32 {
    1 << (N_TRK + group)
}

#[derive(Debug, Clone)]
pub struct GlobalInfo {
    /// Tracks and groups with solo engaged
    pub solo_bit_mask: u32,
    /// Tracks and groups whose faders move together
    pub link_bit_mask: u32,
    /// Tracks routed to each group
    pub group_usage: [u32; N_GRP],
    /// Aux returns with solo engaged (from the expander)
    pub aux_solo_mask: u32,

    pub pan_law_stereo: StereoPanMode,
    pub pan_law_mono: MonoPanLaw,
    pub direct_outs_mode: TapMode,
    pub aux_sends_mode: TapMode,
    pub symmetrical_fade: bool,
    /// Meters are held at rest
    pub cloaked: bool,
    pub aux_returns_mute_when_track_solo: bool,
    pub aux_solo_mutes_dry: bool,

    /// Last fader positions seen by `process_linked`
    old_faders: [Option<f64>; N_SOLO],
}

impl Default for GlobalInfo {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalInfo {
    pub fn new() -> Self {
        Self {
            solo_bit_mask: 0,
            link_bit_mask: 0,
            group_usage: [0; N_GRP],
            aux_solo_mask: 0,
            pan_law_stereo: StereoPanMode::default(),
            pan_law_mono: MonoPanLaw::default(),
            direct_outs_mode: TapMode::default(),
            aux_sends_mode: TapMode::default(),
            symmetrical_fade: false,
            cloaked: false,
            aux_returns_mute_when_track_solo: false,
            aux_solo_mutes_dry: false,
            old_faders: [None; N_SOLO],
        }
    }

    /// Back to power-on state
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Forget runtime state while keeping the settings
    pub fn clear_runtime(&mut self) {
        self.solo_bit_mask = 0;
        self.group_usage = [0; N_GRP];
        self.aux_solo_mask = 0;
        self.old_faders = [None; N_SOLO];
    }

    // ============ Incremental updates ============

    /// Set or clear one track/group solo bit
    #[inline]
    pub fn update_solo_bit(&mut self, index: usize, soloed: bool) {
        if index >= N_SOLO {
            return;
        }
        if soloed {
            self.solo_bit_mask |= 1 << index;
        } else {
            self.solo_bit_mask &= !(1 << index);
        }
    }

    /// Move one track to a group (or to the master mix when `None`)
    #[inline]
    pub fn update_group_usage(&mut self, track: usize, group: Option<usize>) {
        if track >= N_TRK {
            return;
        }
        let bit = 1 << track;
        for (g, usage) in self.group_usage.iter_mut().enumerate() {
            if group == Some(g) {
                *usage |= bit;
            } else {
                *usage &= !bit;
            }
        }
    }

    #[inline]
    pub fn set_linked(&mut self, index: usize, linked: bool) {
        if index >= N_SOLO {
            return;
        }
        if linked {
            self.link_bit_mask |= 1 << index;
        } else {
            self.link_bit_mask &= !(1 << index);
        }
    }

    #[inline]
    pub fn is_linked(&self, index: usize) -> bool {
        index < N_SOLO && self.link_bit_mask & (1 << index) != 0
    }

    /// Propagate a linked fader move
    ///
    /// Compares `faders[index]` with the value seen on the previous call and
    /// adds the difference to every other linked fader, clamped to the fader
    /// range. The first call after a reset only records the position.
    pub fn process_linked(&mut self, index: usize, faders: &mut [f64; N_SOLO]) {
        if index >= N_SOLO {
            return;
        }
        let current = faders[index];
        if let Some(old) = self.old_faders[index] {
            if current != old && self.is_linked(index) {
                let delta = current - old;
                for j in 0..N_SOLO {
                    if j != index && self.is_linked(j) {
                        faders[j] = (faders[j] + delta).clamp(0.0, MAX_FADER);
                        self.old_faders[j] = Some(faders[j]);
                    }
                }
            }
        }
        self.old_faders[index] = Some(current);
    }

    // ============ Solo gates ============

    #[inline]
    pub fn any_solo(&self) -> bool {
        self.solo_bit_mask != 0
    }

    #[inline]
    pub fn is_soloed(&self, index: usize) -> bool {
        index < N_SOLO && self.solo_bit_mask & (1 << index) != 0
    }

    /// Audibility of a track
    ///
    /// A track plays when nothing is soloed, when it is soloed itself, or when
    /// its group is soloed and no member of that group is soloed.
    pub fn track_solo_gate(&self, track: usize, group: Option<usize>) -> f64 {
        let mask = self.solo_bit_mask;
        if mask == 0 || self.is_soloed(track) {
            return 1.0;
        }
        match group {
            Some(g) if g < N_GRP && mask & group_bit(g) != 0 && self.group_usage[g] & mask == 0 => 1.0,
            _ => 0.0,
        }
    }

    /// Audibility of a group: soloed itself, or carrying a soloed track
    pub fn group_solo_gate(&self, group: usize) -> f64 {
        let mask = self.solo_bit_mask;
        if group >= N_GRP {
            return 0.0;
        }
        if mask == 0 || mask & group_bit(group) != 0 || mask & self.group_usage[group] != 0 {
            1.0
        } else {
            0.0
        }
    }

    /// Groups with at least one routed track
    #[inline]
    pub fn group_in_use(&self, group: usize) -> bool {
        group < N_GRP && self.group_usage[group] != 0
    }
}

/// Audibility of an aux return
///
/// Aux returns solo among themselves. With no aux solo, a track/group solo
/// silences the returns only when the mute toggle is on.
pub fn aux_solo_gate(aux: usize, aux_solo_mask: u32, track_solo_active: bool, mute_when_track_solo: bool) -> f64 {
    if aux >= N_AUX {
        return 0.0;
    }
    if aux_solo_mask != 0 {
        return if aux_solo_mask & (1 << aux) != 0 { 1.0 } else { 0.0 };
    }
    if track_solo_active && mute_when_track_solo {
        0.0
    } else {
        1.0
    }
}
