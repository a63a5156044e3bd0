//! Labels and the process-wide label survey
//!
//! Every mixer publishes its strip labels to one global registry so that
//! other modules (the EQ) can mirror track names without being wired to
//! the mixer.

use mx_core::{N_AUX, N_GRP, N_TRK};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// Characters per strip label
pub const LABEL_LEN: usize = 4;

/// Four-character strip label, padded with spaces
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label([u8; LABEL_LEN]);

impl Label {
    pub const BLANK: Self = Self([b' '; LABEL_LEN]);

    /// Printable ASCII only; other characters become `?`, extra ones are cut
    pub fn new(text: &str) -> Self {
        let mut bytes = [b' '; LABEL_LEN];
        for (dst, ch) in bytes.iter_mut().zip(text.chars()) {
            *dst = if ch.is_ascii_graphic() || ch == ' ' { ch as u8 } else { b'?' };
        }
        Self(bytes)
    }

    #[inline]
    pub fn bytes(&self) -> [u8; LABEL_LEN] {
        self.0
    }

    pub fn from_bytes(bytes: [u8; LABEL_LEN]) -> Self {
        let mut label = Self::BLANK;
        for (dst, b) in label.0.iter_mut().zip(bytes) {
            *dst = if b.is_ascii_graphic() || b == b' ' { b } else { b'?' };
        }
        label
    }

    pub fn as_str(&self) -> &str {
        // Only printable ASCII is ever stored
        std::str::from_utf8(&self.0).unwrap_or("????")
    }

    pub fn trimmed(&self) -> &str {
        self.as_str().trim_end()
    }
}

impl Default for Label {
    fn default() -> Self {
        Self::BLANK
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Label({:?})", self.as_str())
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.trimmed())
    }
}

/// Labels of one mixer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MixerLabels {
    pub tracks: [Label; N_TRK],
    pub groups: [Label; N_GRP],
    pub aux: [Label; N_AUX],
}

impl Default for MixerLabels {
    fn default() -> Self {
        Self {
            tracks: std::array::from_fn(|i| Label::new(&format!("-{:02}-", i + 1))),
            groups: std::array::from_fn(|i| Label::new(&format!("GRP{}", i + 1))),
            aux: std::array::from_fn(|i| Label::new(&format!("AUX{}", (b'A' + i as u8) as char))),
        }
    }
}

impl MixerLabels {
    /// Labels in EQ track order: tracks, groups, aux
    pub fn flat(&self) -> impl Iterator<Item = Label> + '_ {
        self.tracks.iter().chain(&self.groups).chain(&self.aux).copied()
    }

    pub fn get(&self, index: usize) -> Option<Label> {
        self.flat().nth(index)
    }

    pub fn set(&mut self, index: usize, label: Label) {
        if index < N_TRK {
            self.tracks[index] = label;
        } else if index < N_TRK + N_GRP {
            self.groups[index - N_TRK] = label;
        } else if index < N_TRK + N_GRP + N_AUX {
            self.aux[index - N_TRK - N_GRP] = label;
        }
    }
}

// ============ Registry ============

/// Unique id for a new mixer
pub fn next_mixer_id() -> u64 {
    static NEXT_ID: AtomicU64 = AtomicU64::new(1);
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Published labels, keyed by mixer id
#[derive(Debug, Default)]
pub struct LabelRegistry {
    entries: RwLock<HashMap<u64, MixerLabels>>,
}

impl LabelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a mixer's labels
    pub fn publish(&self, mixer_id: u64, labels: MixerLabels) {
        self.entries.write().insert(mixer_id, labels);
    }

    pub fn unregister(&self, mixer_id: u64) {
        self.entries.write().remove(&mixer_id);
    }

    pub fn labels(&self, mixer_id: u64) -> Option<MixerLabels> {
        self.entries.read().get(&mixer_id).copied()
    }

    /// Like `labels`, but gives up instead of waiting on a writer
    pub fn try_labels(&self, mixer_id: u64) -> Option<MixerLabels> {
        self.entries.try_read()?.get(&mixer_id).copied()
    }

    /// Registered mixer ids, ascending
    pub fn mixer_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.entries.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// The process-wide registry
pub fn registry() -> &'static LabelRegistry {
    static REGISTRY: OnceLock<LabelRegistry> = OnceLock::new();
    REGISTRY.get_or_init(LabelRegistry::new)
}
