//! Parameter enums shared by the strips, the EQ and the persistence layer
//!
//! Every enum here is persisted as its integer index, so variant order is
//! part of the patch format. Append new variants, never reorder.

use serde::{Deserialize, Serialize};

macro_rules! indexed_enum {
    ($name:ident { $($variant:ident),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            #[inline]
            pub fn index(self) -> usize {
                self as usize
            }

            pub fn from_index(index: usize) -> Option<Self> {
                Self::ALL.get(index).copied()
            }
        }
    };
}

/// Named signal point inside a strip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Tap {
    PreInsert = 0,
    PreFader = 1,
    #[default]
    PostFader = 2,
    PostMuteSolo = 3,
}
indexed_enum!(Tap { PreInsert, PreFader, PostFader, PostMuteSolo });

/// Global tap selector for direct outs and aux sends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TapMode {
    PreInsert = 0,
    PreFader = 1,
    #[default]
    PostFader = 2,
    PostMuteSolo = 3,
    /// Each strip uses its own tap setting
    PerTrack = 4,
}
indexed_enum!(TapMode { PreInsert, PreFader, PostFader, PostMuteSolo, PerTrack });

impl TapMode {
    /// Resolve to a concrete tap, deferring to the strip when per-track
    #[inline]
    pub fn resolve(self, per_track: Tap) -> Tap {
        match self {
            TapMode::PreInsert => Tap::PreInsert,
            TapMode::PreFader => Tap::PreFader,
            TapMode::PostFader => Tap::PostFader,
            TapMode::PostMuteSolo => Tap::PostMuteSolo,
            TapMode::PerTrack => per_track,
        }
    }
}

/// Pan law for stereo sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StereoPanLaw {
    /// Attenuate the far side only, no crosstalk
    #[default]
    Balance = 0,
    /// Equal-power balance, +3 dB at the extremes
    EqualPower = 1,
    /// Move the far channel into the near side
    TruePan = 2,
}
indexed_enum!(StereoPanLaw { Balance, EqualPower, TruePan });

/// Global stereo pan law selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StereoPanMode {
    #[default]
    Balance = 0,
    EqualPower = 1,
    TruePan = 2,
    PerTrack = 3,
}
indexed_enum!(StereoPanMode { Balance, EqualPower, TruePan, PerTrack });

impl StereoPanMode {
    #[inline]
    pub fn resolve(self, per_track: StereoPanLaw) -> StereoPanLaw {
        match self {
            StereoPanMode::Balance => StereoPanLaw::Balance,
            StereoPanMode::EqualPower => StereoPanLaw::EqualPower,
            StereoPanMode::TruePan => StereoPanLaw::TruePan,
            StereoPanMode::PerTrack => per_track,
        }
    }
}

/// Pan law for mono sources, named by the hard-side gain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MonoPanLaw {
    /// No compensation
    Plus0Db = 0,
    /// Equal power
    #[default]
    Plus3Db = 1,
    /// Compromise between equal power and linear
    Plus4p5Db = 2,
    /// Linear
    Plus6Db = 3,
}
indexed_enum!(MonoPanLaw { Plus0Db, Plus3Db, Plus4p5Db, Plus6Db });

/// Filter placement relative to the insert point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FilterPos {
    #[default]
    PreInsert = 0,
    PostInsert = 1,
}
indexed_enum!(FilterPos { PreInsert, PostInsert });

/// Master output clipper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ClipMode {
    #[default]
    Soft = 0,
    Hard = 1,
}
indexed_enum!(ClipMode { Soft, Hard });

/// Spectrum decay speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DecayRate {
    Slow = 0,
    #[default]
    Medium = 1,
    Fast = 2,
    /// Hold the last frame
    Frozen = 3,
}
indexed_enum!(DecayRate { Slow, Medium, Fast, Frozen });
