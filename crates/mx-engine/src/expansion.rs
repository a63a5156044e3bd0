//! Mixer ↔ aux expander message bus
//!
//! Each direction is an `ExpansionInterface`: a double buffer written by the
//! producer and flipped by the host between samples. The consumer only ever
//! reads the front buffer and must not hold on to it across a flip.
//!
//! Messages also have a positional `f32` wire layout. Offsets are part of the
//! format: append fields, never reorder.

use mx_core::{MonoPanLaw, N_AUX, N_SOLO, StereoPanMode, StereoSample};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::survey::{Label, LABEL_LEN, MixerLabels};

/// Labels carried by the bus (tracks, groups, aux)
pub const N_BUS_LABELS: usize = N_SOLO + N_AUX;

// ============ Double buffer ============

#[derive(Debug)]
pub struct ExpansionInterface<T> {
    buffers: [T; 2],
    front: usize,
    flip_requested: AtomicBool,
    generation: AtomicU64,
}

impl<T: Default> Default for ExpansionInterface<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default> ExpansionInterface<T> {
    pub fn new() -> Self {
        Self {
            buffers: [T::default(), T::default()],
            front: 0,
            flip_requested: AtomicBool::new(false),
            generation: AtomicU64::new(0),
        }
    }
}

impl<T> ExpansionInterface<T> {
    /// Producer side: the back buffer
    #[inline]
    pub fn write(&mut self) -> &mut T {
        &mut self.buffers[1 - self.front]
    }

    /// Producer side: the back buffer is complete
    #[inline]
    pub fn request_flip(&self) {
        self.flip_requested.store(true, Ordering::Release);
    }

    /// Host side, between samples. Returns true when the buffers swapped.
    pub fn flip(&mut self) -> bool {
        if self.flip_requested.swap(false, Ordering::AcqRel) {
            self.front = 1 - self.front;
            self.generation.fetch_add(1, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Consumer side: the front buffer
    #[inline]
    pub fn read(&self) -> &T {
        &self.buffers[self.front]
    }

    /// Number of flips so far
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

// ============ Mixer → expander ============

pub mod mother_to_aux {
    use super::*;

    pub const AUX_SENDS: usize = 0;
    pub const TRACK_SOLO_ACTIVE: usize = AUX_SENDS + N_AUX * 2;
    pub const MUTE_AUX_WHEN_TRACK_SOLO: usize = TRACK_SOLO_ACTIVE + 1;
    pub const UPDATE_LABELS: usize = MUTE_AUX_WHEN_TRACK_SOLO + 1;
    pub const LABELS: usize = UPDATE_LABELS + 1;
    pub const PAN_LAW_STEREO: usize = LABELS + N_BUS_LABELS * LABEL_LEN;
    pub const PAN_LAW_MONO: usize = PAN_LAW_STEREO + 1;
    pub const SYMMETRICAL_FADE: usize = PAN_LAW_MONO + 1;
    pub const CLOAKED: usize = SYMMETRICAL_FADE + 1;
    pub const LEN: usize = CLOAKED + 1;
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotherToAux {
    /// Summed aux send signals
    pub aux_sends: [StereoSample; N_AUX],
    /// Any track or group soloed
    pub track_solo_active: bool,
    pub mute_aux_when_track_solo: bool,
    /// `labels` is valid in this message
    pub update_labels: bool,
    pub labels: [Label; N_BUS_LABELS],
    /// Mixer-wide settings the aux returns share with the tracks
    pub pan_law_stereo: StereoPanMode,
    pub pan_law_mono: MonoPanLaw,
    pub symmetrical_fade: bool,
    pub cloaked: bool,
}

impl MotherToAux {
    pub fn set_labels(&mut self, labels: &MixerLabels) {
        for (dst, src) in self.labels.iter_mut().zip(labels.flat()) {
            *dst = src;
        }
        self.update_labels = true;
    }

    pub fn to_wire(&self, out: &mut [f32; mother_to_aux::LEN]) {
        use mother_to_aux::*;
        for (a, s) in self.aux_sends.iter().enumerate() {
            out[AUX_SENDS + 2 * a] = s.left as f32;
            out[AUX_SENDS + 2 * a + 1] = s.right as f32;
        }
        out[TRACK_SOLO_ACTIVE] = flag(self.track_solo_active);
        out[MUTE_AUX_WHEN_TRACK_SOLO] = flag(self.mute_aux_when_track_solo);
        out[UPDATE_LABELS] = flag(self.update_labels);
        for (i, label) in self.labels.iter().enumerate() {
            for (c, b) in label.bytes().into_iter().enumerate() {
                out[LABELS + i * LABEL_LEN + c] = b as f32;
            }
        }
        out[PAN_LAW_STEREO] = self.pan_law_stereo.index() as f32;
        out[PAN_LAW_MONO] = self.pan_law_mono.index() as f32;
        out[SYMMETRICAL_FADE] = flag(self.symmetrical_fade);
        out[CLOAKED] = flag(self.cloaked);
    }

    pub fn from_wire(wire: &[f32; mother_to_aux::LEN]) -> Self {
        use mother_to_aux::*;
        let mut msg = Self {
            track_solo_active: wire[TRACK_SOLO_ACTIVE] > 0.5,
            mute_aux_when_track_solo: wire[MUTE_AUX_WHEN_TRACK_SOLO] > 0.5,
            update_labels: wire[UPDATE_LABELS] > 0.5,
            pan_law_stereo: StereoPanMode::from_index(wire_index(wire[PAN_LAW_STEREO])).unwrap_or_default(),
            pan_law_mono: MonoPanLaw::from_index(wire_index(wire[PAN_LAW_MONO])).unwrap_or_default(),
            symmetrical_fade: wire[SYMMETRICAL_FADE] > 0.5,
            cloaked: wire[CLOAKED] > 0.5,
            ..Self::default()
        };
        for (a, s) in msg.aux_sends.iter_mut().enumerate() {
            *s = StereoSample::new(wire[AUX_SENDS + 2 * a] as f64, wire[AUX_SENDS + 2 * a + 1] as f64);
        }
        for (i, label) in msg.labels.iter_mut().enumerate() {
            let mut bytes = [b' '; LABEL_LEN];
            for (c, b) in bytes.iter_mut().enumerate() {
                *b = wire[LABELS + i * LABEL_LEN + c].clamp(0.0, 255.0) as u8;
            }
            *label = Label::from_bytes(bytes);
        }
        msg
    }
}

// ============ Expander → mixer ============

pub mod aux_to_mother {
    use super::*;

    pub const AUX_RETURNS: usize = 0;
    pub const AUX_SOLO_MASK: usize = AUX_RETURNS + N_AUX * 2;
    pub const SEND_LEVELS: usize = AUX_SOLO_MASK + 1;
    pub const SEND_MUTES: usize = SEND_LEVELS + N_SOLO * N_AUX;
    pub const LEN: usize = SEND_MUTES + N_AUX;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuxToMother {
    /// Aux return signals after the aux strips
    pub aux_returns: [StereoSample; N_AUX],
    pub aux_solo_mask: u32,
    /// Send knob per track/group and aux, in [0, 1]
    pub send_levels: [[f64; N_AUX]; N_SOLO],
    /// Global per-aux send mutes
    pub send_mutes: [bool; N_AUX],
}

impl Default for AuxToMother {
    fn default() -> Self {
        Self {
            aux_returns: [StereoSample::ZERO; N_AUX],
            aux_solo_mask: 0,
            send_levels: [[0.0; N_AUX]; N_SOLO],
            send_mutes: [false; N_AUX],
        }
    }
}

impl AuxToMother {
    pub fn to_wire(&self, out: &mut [f32; aux_to_mother::LEN]) {
        use aux_to_mother::*;
        for (a, s) in self.aux_returns.iter().enumerate() {
            out[AUX_RETURNS + 2 * a] = s.left as f32;
            out[AUX_RETURNS + 2 * a + 1] = s.right as f32;
        }
        out[AUX_SOLO_MASK] = (self.aux_solo_mask & 0xF) as f32;
        for (i, levels) in self.send_levels.iter().enumerate() {
            for (a, &level) in levels.iter().enumerate() {
                out[SEND_LEVELS + i * N_AUX + a] = level as f32;
            }
        }
        for (a, &mute) in self.send_mutes.iter().enumerate() {
            out[SEND_MUTES + a] = flag(mute);
        }
    }

    pub fn from_wire(wire: &[f32; aux_to_mother::LEN]) -> Self {
        use aux_to_mother::*;
        let mut msg = Self {
            aux_solo_mask: (wire[AUX_SOLO_MASK].clamp(0.0, 15.0) as u32) & 0xF,
            ..Self::default()
        };
        for (a, s) in msg.aux_returns.iter_mut().enumerate() {
            *s = StereoSample::new(wire[AUX_RETURNS + 2 * a] as f64, wire[AUX_RETURNS + 2 * a + 1] as f64);
        }
        for (i, levels) in msg.send_levels.iter_mut().enumerate() {
            for (a, level) in levels.iter_mut().enumerate() {
                *level = wire[SEND_LEVELS + i * N_AUX + a] as f64;
            }
        }
        for (a, mute) in msg.send_mutes.iter_mut().enumerate() {
            *mute = wire[SEND_MUTES + a] > 0.5;
        }
        msg
    }
}

#[inline]
fn flag(b: bool) -> f32 {
    if b { 1.0 } else { 0.0 }
}

/// Enum index carried as a float; garbage maps past every valid index
#[inline]
fn wire_index(v: f32) -> usize {
    if v.is_finite() && v >= 0.0 { v.round() as usize } else { usize::MAX }
}
