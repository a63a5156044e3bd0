//! Engine Integration Tests
//!
//! Verifies:
//! - Tap ordering through a full mixer
//! - Staggered solo refresh latency and solo classes
//! - Linked faders
//! - Patch round trips reproduce the audio output
//! - Master clipping bounds
//! - Mixer ↔ aux expander bus end to end

use approx::assert_abs_diff_eq;
use mx_core::{ClipMode, EngineConfig, N_AUX, N_EQ_TRK, StereoSample, StereoPanMode, TapMode};
use mx_engine::{
    AuxInput, Console, EqMaster, EqTrackInput, Mixer, MixerCommand, MixerInputs, StripId, TrackInput,
};

const SAMPLE_RATE: f64 = 48000.0;
const BLOCK_SIZE: usize = 256;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Generate test sine wave
fn generate_sine(samples: usize, freq: f64, amplitude: f64) -> Vec<f64> {
    (0..samples)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE;
            amplitude * (2.0 * std::f64::consts::PI * freq * t).sin()
        })
        .collect()
}

/// Calculate RMS of signal
fn rms(signal: &[f64]) -> f64 {
    let sum: f64 = signal.iter().map(|x| x * x).sum();
    (sum / signal.len() as f64).sqrt()
}

fn run(mixer: &mut Mixer, inputs: &MixerInputs, samples: usize) -> StereoSample {
    let mut out = StereoSample::ZERO;
    for _ in 0..samples {
        out = mixer.process(inputs, None, None);
    }
    out
}

fn silent_aux() -> [AuxInput; N_AUX] {
    [AuxInput::default(); N_AUX]
}

// ═══════════════════════════════════════════════════════════════════════════════
// SIGNAL FLOW
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_tap_ordering_primary_scenario() {
    init_logging();
    let (mut mixer, mut handle, _meters) = Mixer::new(&EngineConfig::default()).unwrap();
    handle.send(MixerCommand::SetGainAdjust(0, 2.0)).unwrap();

    let mut inputs = MixerInputs::default();
    inputs.tracks[0] = TrackInput::mono(5.0);
    run(&mut mixer, &inputs, 1);

    for tap in mixer.track(0).taps() {
        assert_eq!(*tap, StereoSample::new(10.0, 10.0));
    }
    assert_eq!(mixer.outputs().insert_sends[0], StereoSample::new(10.0, 10.0));
    assert_eq!(mixer.outputs().direct_outs[0], StereoSample::new(10.0, 10.0));
    // 10V summed into the master lands on the soft knee
    assert!(mixer.outputs().master.left < 10.0);
}

#[test]
fn test_direct_out_mode_switch() {
    let (mut mixer, mut handle, _meters) = Mixer::new(&EngineConfig::default()).unwrap();
    handle.set_mute(StripId::Track(1), true).unwrap();
    handle.send(MixerCommand::SetDirectOutsMode(TapMode::PreFader)).unwrap();
    let mut inputs = MixerInputs::default();
    inputs.tracks[1] = TrackInput::stereo(3.0, -3.0);
    run(&mut mixer, &inputs, 1);
    assert_eq!(mixer.outputs().direct_outs[1], StereoSample::new(3.0, -3.0));

    handle.send(MixerCommand::SetDirectOutsMode(TapMode::PostMuteSolo)).unwrap();
    run(&mut mixer, &inputs, 1);
    assert_eq!(mixer.outputs().direct_outs[1], StereoSample::ZERO);
}

#[test]
fn test_sine_through_group_keeps_level() {
    let (mut mixer, _handle, _meters) = Mixer::new(&EngineConfig::default()).unwrap();
    mixer.track_mut(0).set_group(Some(2));
    let sine = generate_sine(BLOCK_SIZE * 40, 440.0, 2.0);

    let mut out = Vec::with_capacity(sine.len());
    let mut inputs = MixerInputs::default();
    for &x in &sine {
        inputs.tracks[0] = TrackInput::mono(x);
        out.push(mixer.process(&inputs, None, None).left);
    }
    assert!(mixer.group(2).in_use());
    let tail = out.len() - BLOCK_SIZE * 20;
    assert_abs_diff_eq!(rms(&out[tail..]), rms(&sine[tail..]), epsilon = 0.02);
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOLO
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_solo_takes_one_refresh_cycle() {
    let (mut mixer, mut handle, _meters) = Mixer::new(&EngineConfig::default()).unwrap();
    let mut inputs = MixerInputs::default();
    inputs.tracks[0] = TrackInput::mono(1.0);
    inputs.tracks[5] = TrackInput::mono(1.0);

    // Next refresh slot is 1: track 0's bit was just serviced
    run(&mut mixer, &inputs, 49);
    handle.set_solo(StripId::Track(0), true).unwrap();

    run(&mut mixer, &inputs, 23);
    assert!(!mixer.global().any_solo());
    run(&mut mixer, &inputs, 1);
    assert!(mixer.global().is_soloed(0));

    run(&mut mixer, &inputs, 1000);
    assert_eq!(mixer.track(5).output(), StereoSample::ZERO);
    assert_eq!(mixer.track(0).output(), StereoSample::mono(1.0));
}

#[test]
fn test_group_solo_classes() {
    let (mut mixer, _handle, _meters) = Mixer::new(&EngineConfig::default()).unwrap();
    mixer.track_mut(0).set_group(Some(0));
    mixer.track_mut(1).set_group(Some(0));
    let mut inputs = MixerInputs::default();
    for t in 0..3 {
        inputs.tracks[t] = TrackInput::mono(1.0);
    }

    // Group solo: its members play, everyone else is silenced
    mixer.apply(MixerCommand::SetSolo(StripId::Group(0), true));
    run(&mut mixer, &inputs, 1000);
    assert_eq!(mixer.track(0).output(), StereoSample::mono(1.0));
    assert_eq!(mixer.track(1).output(), StereoSample::mono(1.0));
    assert_eq!(mixer.track(2).output(), StereoSample::ZERO);

    // A soloed member excludes its siblings, the group stays open
    mixer.apply(MixerCommand::SetSolo(StripId::Track(1), true));
    run(&mut mixer, &inputs, 1000);
    assert_eq!(mixer.track(0).output(), StereoSample::ZERO);
    assert_eq!(mixer.track(1).output(), StereoSample::mono(1.0));
    assert_eq!(mixer.group(0).output(), StereoSample::mono(1.0));

    // No solos: everything plays again
    mixer.apply(MixerCommand::SetSolo(StripId::Group(0), false));
    mixer.apply(MixerCommand::SetSolo(StripId::Track(1), false));
    run(&mut mixer, &inputs, 1000);
    assert_eq!(mixer.track(2).output(), StereoSample::mono(1.0));
}

#[test]
fn test_linked_faders_follow() {
    let (mut mixer, mut handle, _meters) = Mixer::new(&EngineConfig::default()).unwrap();
    for id in [StripId::Track(0), StripId::Track(1), StripId::Group(2)] {
        handle.send(MixerCommand::SetLinked(id, true)).unwrap();
    }
    run(&mut mixer, &MixerInputs::default(), 1);

    handle.set_fader(StripId::Track(0), 0.5).unwrap();
    run(&mut mixer, &MixerInputs::default(), 8);
    assert_abs_diff_eq!(mixer.track(1).controls.fader, 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(mixer.group(2).controls.fader, 0.5, epsilon = 1e-12);
    assert_abs_diff_eq!(mixer.track(2).controls.fader, 1.0, epsilon = 1e-12);
}

// ═══════════════════════════════════════════════════════════════════════════════
// PERSISTENCE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_patch_round_trip_reproduces_output() {
    init_logging();
    let config = EngineConfig::default();
    let (mut original, _h1, _m1) = Mixer::new(&config).unwrap();
    original.track_mut(0).controls.fader = 0.9;
    original.track_mut(0).controls.pan = 0.3;
    original.track_mut(1).set_group(Some(3));
    original.track_mut(1).settings.hpf_cutoff = 120.0;
    original.track_mut(1).settings.fade.rate = 0.2;
    original.track_mut(2).controls.mute = true;
    original.group_mut(3).controls.pan = 0.8;
    original.master_mut().controls.dim = true;
    original.master_mut().settings.clipping = ClipMode::Hard;
    original.global_mut().pan_law_stereo = StereoPanMode::TruePan;
    original.global_mut().set_linked(0, true);
    original.apply(MixerCommand::SetEcoStride(8));
    original.set_label(1, "SNR");

    let json = original.to_json_string().unwrap();
    assert!(json.contains("\"id_t1_fadeRate\""));

    let (mut restored, _h2, _m2) = Mixer::new(&config).unwrap();
    restored.from_json_str(&json).unwrap();
    assert_eq!(restored.eco_stride(), 8);
    assert_eq!(restored.labels().tracks[1].trimmed(), "SNR");

    let sine = generate_sine(4096, 220.0, 4.0);
    let mut inputs = MixerInputs::default();
    for &x in &sine {
        for t in 0..3 {
            inputs.tracks[t] = TrackInput::stereo(x, -x);
        }
        let a = original.process(&inputs, None, None);
        let b = restored.process(&inputs, None, None);
        assert_eq!(a, b);
    }
}

#[test]
fn test_config_file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.json");
    let config = EngineConfig {
        eco_stride: 2,
        ..EngineConfig::default()
    };
    config.save(&path).unwrap();
    let loaded = EngineConfig::load(&path).unwrap();
    assert_eq!(loaded, config);
    let (mixer, _handle, _meters) = Mixer::new(&loaded).unwrap();
    assert_eq!(mixer.eco_stride(), 2);
}

// ═══════════════════════════════════════════════════════════════════════════════
// MASTER
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_master_never_exceeds_ceiling() {
    for mode in [ClipMode::Soft, ClipMode::Hard] {
        let (mut mixer, _handle, _meters) = Mixer::new(&EngineConfig::default()).unwrap();
        mixer.master_mut().settings.clipping = mode;
        let sine = generate_sine(9600, 100.0, 8.0);
        let mut inputs = MixerInputs::default();
        let mut peak: f64 = 0.0;
        for &x in &sine {
            inputs.tracks[0] = TrackInput::stereo(x, x);
            inputs.tracks[1] = TrackInput::stereo(x, x);
            peak = peak.max(mixer.process(&inputs, None, None).peak());
        }
        assert!(peak <= 10.0, "{mode:?} peak {peak}");
        assert!(peak > 9.0, "{mode:?} peak {peak}");
    }
}

#[test]
fn test_meters_and_cloaked_mode() {
    let (mut mixer, mut handle, meters) = Mixer::new(&EngineConfig::default()).unwrap();
    mixer.master_mut().settings.dc_block = false;
    let mut inputs = MixerInputs::default();
    inputs.tracks[4] = TrackInput::mono(2.0);
    run(&mut mixer, &inputs, 4800);
    assert!(handle.track_level(4).0 > 1.0);
    assert!(meters.master.levels().0 > 1.0);

    handle.send(MixerCommand::SetCloaked(true)).unwrap();
    run(&mut mixer, &inputs, 8);
    assert_eq!(handle.track_level(4), (0.0, 0.0));
    assert_eq!(handle.master_level(), (0.0, 0.0));
}

#[test]
fn test_eco_stride_keeps_steady_state_output() {
    let sine = generate_sine(2048, 330.0, 3.0);
    let mut outputs = Vec::new();
    for stride in [1, 4, 16] {
        let config = EngineConfig {
            eco_stride: stride,
            ..EngineConfig::default()
        };
        let (mut mixer, _handle, _meters) = Mixer::new(&config).unwrap();
        let mut inputs = MixerInputs::default();
        let out: Vec<StereoSample> = sine
            .iter()
            .map(|&x| {
                inputs.tracks[7] = TrackInput::mono(x);
                mixer.process(&inputs, None, None)
            })
            .collect();
        outputs.push(out);
    }
    assert_eq!(outputs[0], outputs[1]);
    assert_eq!(outputs[0], outputs[2]);
}

// ═══════════════════════════════════════════════════════════════════════════════
// EXPANDER BUS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_send_and_return_through_console() {
    let (mut console, _handle, _meters) = Console::with_expander(&EngineConfig::default()).unwrap();
    console.mixer_mut().master_mut().settings.dc_block = false;
    console.expander_mut().unwrap().send_levels[0][0] = 1.0;

    let mut inputs = MixerInputs::default();
    inputs.tracks[0] = TrackInput::mono(1.0);
    // Patch each aux send straight back into its return
    let mut aux_in = silent_aux();
    let mut master = StereoSample::ZERO;
    for _ in 0..16 {
        let frame = console.process(&inputs, &aux_in);
        for (input, send) in aux_in.iter_mut().zip(frame.aux_sends) {
            *input = AuxInput::stereo(send.left, send.right);
        }
        master = frame.master;
    }
    assert_abs_diff_eq!(master.left, 2.0, epsilon = 1e-9);
    assert_abs_diff_eq!(master.right, 2.0, epsilon = 1e-9);
}

#[test]
fn test_aux_solo_mutes_dry_mix() {
    let (mut console, mut handle, _meters) = Console::with_expander(&EngineConfig::default()).unwrap();
    console.mixer_mut().master_mut().settings.dc_block = false;
    handle.send(MixerCommand::SetAuxSoloMutesDry(true)).unwrap();
    console.expander_mut().unwrap().strips[1].controls.solo = true;

    let mut inputs = MixerInputs::default();
    inputs.tracks[0] = TrackInput::mono(1.0);
    let mut aux_in = silent_aux();
    aux_in[1] = AuxInput::stereo(0.5, 0.5);

    let mut master = StereoSample::ZERO;
    for _ in 0..2000 {
        master = console.process(&inputs, &aux_in).master;
    }
    assert_eq!(console.expander().unwrap().aux_solo_mask(), 0b0010);
    assert_abs_diff_eq!(master.left, 0.5, epsilon = 1e-9);

    // Without the toggle the dry mix comes back
    handle.send(MixerCommand::SetAuxSoloMutesDry(false)).unwrap();
    for _ in 0..2000 {
        master = console.process(&inputs, &aux_in).master;
    }
    assert_abs_diff_eq!(master.left, 1.5, epsilon = 1e-9);
}

#[test]
fn test_track_solo_mutes_returns_when_enabled() {
    let (mut console, mut handle, _meters) = Console::with_expander(&EngineConfig::default()).unwrap();
    console.mixer_mut().master_mut().settings.dc_block = false;
    handle.send(MixerCommand::SetAuxReturnsMuteWhenSolo(true)).unwrap();
    handle.set_solo(StripId::Track(0), true).unwrap();

    let mut inputs = MixerInputs::default();
    inputs.tracks[0] = TrackInput::mono(1.0);
    let aux_in = [AuxInput::stereo(0.25, 0.25); N_AUX];
    let mut master = StereoSample::ZERO;
    for _ in 0..2000 {
        master = console.process(&inputs, &aux_in).master;
    }
    assert_abs_diff_eq!(master.left, 1.0, epsilon = 1e-9);
}

// ═══════════════════════════════════════════════════════════════════════════════
// EQ MODULE
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_eq_pulls_labels_from_console_mixer() {
    let (mut console, _handle, _meters) = Console::new(&EngineConfig::default()).unwrap();
    console.mixer_mut().set_label(16, "BUS1");
    let mut eq = EqMaster::new(&EngineConfig::default()).unwrap();
    eq.map_mixer(Some(console.mixer().id()));

    let inputs = [EqTrackInput::default(); N_EQ_TRK];
    eq.process(&inputs);
    assert_eq!(eq.labels()[16].as_str(), "BUS1");

    // Relabels show up on the next refresh cycle
    console.mixer_mut().set_label(16, "BUS2");
    for _ in 0..23 {
        eq.process(&inputs);
    }
    assert_eq!(eq.labels()[16].as_str(), "BUS1");
    eq.process(&inputs);
    assert_eq!(eq.labels()[16].as_str(), "BUS2");
}
