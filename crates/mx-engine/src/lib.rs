//! mx-engine: Mixing console engine
//!
//! Provides:
//! - 16 tracks, 4 groups and a master with per-sample routing
//! - Staggered solo/group refresh over a 24-slot scheduler
//! - Aux expander attached through a double-buffered message bus
//! - Process-wide label survey
//! - Flat JSON patch persistence
//! - 24-track EQ module with a background spectrum analyzer

// Strip arrays are walked by index alongside the solo/link bit space
#![allow(clippy::needless_range_loop)]
// Constructors hand back (module, handle, meters)
#![allow(clippy::type_complexity)]
// Per-sample strip processing takes every host input explicitly
#![allow(clippy::too_many_arguments)]

// Coordination
pub mod global_info;
pub mod refresh;
pub mod survey;

// Strips
pub mod strip;
pub mod track;
pub mod group;
pub mod master;

// Modules
mod mixer;
pub mod aux_expander;
pub mod expansion;
mod console;
mod eq_master;

// Persistence
pub mod persist;

pub use global_info::{aux_solo_gate, group_bit, GlobalInfo};
pub use refresh::{RefreshScheduler, RefreshTick, N_REFRESH_SLOTS};
pub use survey::{registry, Label, LabelRegistry, MixerLabels};

pub use strip::{FadeSettings, GainStage, StripControls, StripCv, Taps};
pub use track::{Track, TrackInput, TrackSettings};
pub use group::{Group, GroupInput, GroupSettings};
pub use master::{Master, MasterControls, MasterInput, MasterSettings};

pub use mixer::*;
pub use aux_expander::{AuxExpander, AuxInput, AuxSettings, AuxStrip};
pub use expansion::{AuxToMother, ExpansionInterface, MotherToAux};
pub use console::{Console, ConsoleFrame};
pub use eq_master::{EqMaster, EqTrackInput, SpectrumMode};
