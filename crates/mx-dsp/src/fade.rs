//! Mute/fade envelope
//!
//! Turns a 0/1 mute-or-solo target into a shaped gain:
//! - Mute mode (`fade_rate` below `MIN_FADE_RATE`): the gain snaps to the
//!   target and only the downstream anti-pop slew smooths it.
//! - Fade mode: the gain travels to the target over `fade_rate` seconds.
//!
//! The profile runs from -1 (logarithmic) through 0 (linear) to +1
//! (exponential) and crossfades linearly between the closed-form curves.
//!
//! Symmetrical fades apply the profile to a single linear position, so a
//! fade down retraces the fade up. Asymmetrical fades accumulate the local
//! slope of the curve from the moment of the last target flip, so rise and
//! fall both start on the same end of the curve.

/// Below this fade time (seconds) the envelope is a plain mute
pub const MIN_FADE_RATE: f64 = 0.1;
/// Curvature of the exponential profile
pub const FADE_EXP_A: f64 = 4.0;

/// e^A - 1
#[inline]
fn e_a_m1() -> f64 {
    FADE_EXP_A.exp_m1()
}

/// Exponential curve through (0,0) and (1,1)
#[inline]
pub fn exp_curve(x: f64) -> f64 {
    (FADE_EXP_A * x).exp_m1() / e_a_m1()
}

/// Inverse of `exp_curve`
#[inline]
pub fn log_curve(x: f64) -> f64 {
    (x * e_a_m1()).ln_1p() / FADE_EXP_A
}

/// Position on the blended curve for a profile in [-1, 1]
#[inline]
pub fn shaped(x: f64, profile: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let profile = profile.clamp(-1.0, 1.0);
    if profile >= 0.0 {
        x * (1.0 - profile) + exp_curve(x) * profile
    } else {
        x * (1.0 + profile) + log_curve(x) * -profile
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum FadeState {
    /// Nothing processed since reset; the first target is taken as-is
    Uninitialized,
    Active { target: f64 },
}

/// Fade-gain state machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeGain {
    gain: f64,
    /// Linear position toward the target
    x: f64,
    /// Progress since the last target flip (asymmetrical mode)
    xr: f64,
    state: FadeState,
}

impl Default for FadeGain {
    fn default() -> Self {
        Self::new()
    }
}

impl FadeGain {
    pub const fn new() -> Self {
        Self {
            gain: 0.0,
            x: 0.0,
            xr: 0.0,
            state: FadeState::Uninitialized,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Advance by `dt` seconds toward `target` and return the gain
    pub fn process(
        &mut self,
        target: f64,
        fade_rate: f64,
        profile: f64,
        symmetrical: bool,
        dt: f64,
    ) -> f64 {
        let target = if target.is_finite() { target.clamp(0.0, 1.0) } else { 0.0 };

        match self.state {
            FadeState::Uninitialized => {
                self.gain = target;
                self.x = target;
                self.xr = 0.0;
                self.state = FadeState::Active { target };
                return self.gain;
            }
            FadeState::Active { target: old } if old != target => {
                // Double-pressed mute: restart the shaped part from where we are
                self.xr = 0.0;
                if !symmetrical {
                    self.x = self.gain;
                }
                self.state = FadeState::Active { target };
            }
            FadeState::Active { .. } => {}
        }

        if fade_rate.is_nan() || fade_rate < MIN_FADE_RATE {
            self.gain = target;
            self.x = target;
            self.xr = 0.0;
            return self.gain;
        }

        let step = dt / fade_rate;
        self.x = if target > self.x {
            (self.x + step).min(target)
        } else {
            (self.x - step).max(target)
        };

        if symmetrical {
            self.gain = shaped(self.x, profile);
        } else if self.gain != target {
            let next = (self.xr + step).min(1.0);
            let profile = profile.clamp(-1.0, 1.0);
            let delta = if profile >= 0.0 {
                step * (1.0 - profile) + (exp_curve(next) - exp_curve(self.xr)) * profile
            } else {
                step * (1.0 + profile) + (log_curve(next) - log_curve(self.xr)) * -profile
            };
            self.xr = next;
            self.gain = if self.xr >= 1.0 {
                target
            } else if target > self.gain {
                (self.gain + delta).min(target)
            } else {
                (self.gain - delta).max(target)
            };
        }
        self.gain
    }

    #[inline]
    pub fn gain(&self) -> f64 {
        self.gain
    }

    /// Last target seen, if any
    pub fn target(&self) -> Option<f64> {
        match self.state {
            FadeState::Uninitialized => None,
            FadeState::Active { target } => Some(target),
        }
    }

    pub fn is_fading(&self) -> bool {
        matches!(self.state, FadeState::Active { target } if target != self.gain)
    }
}
