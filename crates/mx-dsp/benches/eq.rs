//! Track EQ benchmarks

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use mx_core::StereoSample;
use mx_dsp::eq::{BandCv, N_BANDS, TrackEq};
use mx_dsp::filters::TrackFilters;

fn bench_track_eq_static(c: &mut Criterion) {
    let mut eq = TrackEq::new(48000.0);
    for band in eq.params_mut().bands.iter_mut() {
        band.gain_db = 6.0;
    }
    let cv = [BandCv::default(); N_BANDS];
    let input: Vec<f64> = (0..1024).map(|i| (i as f64 * 0.01).sin()).collect();

    c.bench_function("track_eq_stereo_1024", |b| {
        b.iter(|| {
            for &x in &input {
                black_box(eq.process(StereoSample::new(x, -x), true, &cv));
            }
        })
    });
}

fn bench_track_eq_cv_sweep(c: &mut Criterion) {
    let mut eq = TrackEq::new(48000.0);
    eq.params_mut().bands[1].gain_db = 12.0;
    let input: Vec<f64> = (0..1024).map(|i| (i as f64 * 0.01).sin()).collect();

    // Every sample moves the frequency CV, forcing a redesign
    c.bench_function("track_eq_cv_sweep_1024", |b| {
        b.iter(|| {
            for (i, &x) in input.iter().enumerate() {
                let mut cv = [BandCv::default(); N_BANDS];
                cv[1].freq = Some((i as f64 / 1024.0) * 4.0);
                black_box(eq.process(StereoSample::mono(x), false, &cv));
            }
        })
    });
}

fn bench_track_filters(c: &mut Criterion) {
    let mut filters = TrackFilters::new(48000.0);
    filters.set_hpf_cutoff(80.0);
    filters.set_lpf_cutoff(12000.0);
    let input: Vec<f64> = (0..1024).map(|i| (i as f64 * 0.01).sin()).collect();

    c.bench_function("track_filters_stereo_1024", |b| {
        b.iter(|| {
            for &x in &input {
                black_box(filters.process(StereoSample::new(x, x), true));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_track_eq_static,
    bench_track_eq_cv_sweep,
    bench_track_filters
);
criterion_main!(benches);
