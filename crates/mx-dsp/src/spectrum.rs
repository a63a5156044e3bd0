//! Background spectrum analyzer
//!
//! The audio thread fills Hann-windowed pages with a mono sum and hands each
//! full page to a worker thread through a single-slot channel. If the slot is
//! still occupied the page is dropped and counted; the audio thread never
//! blocks and the backlog never grows past one page.
//!
//! Worker pipeline per page:
//! 1. Real FFT and power spectrum
//! 2. Log-frequency pixel mapping
//! 3. Compaction: bins sharing a pixel keep their maximum
//! 4. Decay against the previous frame (frozen holds the last frame)
//! 5. dB conversion into the shared draw buffer
//!
//! Three pages circulate: one being written, at most one queued, at most one
//! under analysis.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use mx_core::{DecayRate, MxError, MxResult, SpectrumSettings, StereoSample};
use parking_lot::{Mutex, MutexGuard};
use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Pages in circulation
const N_PAGES: usize = 3;
/// Display floor (dB)
pub const SPECTRUM_FLOOR_DB: f32 = -140.0;
const POWER_FLOOR: f64 = 1e-14;
/// How often an idle worker checks for shutdown
const WORKER_POLL: Duration = Duration::from_millis(20);

/// One compacted display point
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpectrumPoint {
    /// Horizontal pixel
    pub x: f32,
    pub db: f32,
}

/// Decay time constant of a display level (seconds)
fn decay_time(rate: DecayRate) -> Option<f64> {
    match rate {
        DecayRate::Slow => Some(1.0),
        DecayRate::Medium => Some(0.3),
        DecayRate::Fast => Some(0.08),
        DecayRate::Frozen => None,
    }
}

// ============ Shared state ============

#[derive(Debug)]
struct Shared {
    /// Pages handed off and not yet analyzed. The audio thread counts a page
    /// before sending it, the worker uncounts it once analyzed.
    pending: AtomicUsize,
    running: AtomicBool,
    skipped: AtomicU64,
    frames: AtomicU64,
    decay: AtomicU8,
    draw_size: AtomicUsize,
    draw: Mutex<Vec<SpectrumPoint>>,
}

/// Audio-thread side of the analyzer; owns the worker
pub struct SpectrumAnalyzer {
    fft_size: usize,
    window: Vec<f64>,
    page: Option<Vec<f64>>,
    write_pos: usize,
    work_tx: Sender<Vec<f64>>,
    free_rx: Receiver<Vec<f64>>,
    shared: Arc<Shared>,
    mapper: PixelMapper,
    worker: Option<JoinHandle<()>>,
}

impl SpectrumAnalyzer {
    pub fn new(settings: &SpectrumSettings, sample_rate: f64) -> MxResult<Self> {
        settings.validate()?;
        let n = settings.fft_size;

        let window: Vec<f64> = (0..n)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / n as f64).cos()))
            .collect();

        let (work_tx, work_rx) = bounded::<Vec<f64>>(1);
        let (free_tx, free_rx) = bounded::<Vec<f64>>(N_PAGES);
        for _ in 1..N_PAGES {
            free_tx
                .try_send(vec![0.0; n])
                .map_err(|e| MxError::Worker(e.to_string()))?;
        }

        let shared = Arc::new(Shared {
            pending: AtomicUsize::new(0),
            running: AtomicBool::new(true),
            skipped: AtomicU64::new(0),
            frames: AtomicU64::new(0),
            decay: AtomicU8::new(settings.decay.index() as u8),
            draw_size: AtomicUsize::new(0),
            draw: Mutex::new(Vec::with_capacity(settings.display_width)),
        });

        let mapper = PixelMapper::new(settings, sample_rate);
        let worker = SpectrumWorker::new(n, sample_rate, mapper.clone(), shared.clone(), work_rx, free_tx);

        let handle = thread::Builder::new()
            .name("mx-spectrum".into())
            .spawn(move || worker.run())
            .map_err(|e| {
                log::warn!("Failed to spawn spectrum worker: {e}");
                MxError::Worker(e.to_string())
            })?;
        log::info!("Spectrum worker started ({n}-point FFT)");

        Ok(Self {
            fft_size: n,
            window,
            page: Some(vec![0.0; n]),
            write_pos: 0,
            work_tx,
            free_rx,
            shared,
            mapper,
            worker: Some(handle),
        })
    }

    /// Feed one frame (audio thread, never blocks)
    #[inline]
    pub fn push(&mut self, frame: StereoSample) {
        if self.page.is_none() {
            // Every page is in flight; wait for one to come back
            self.page = self.free_rx.try_recv().ok();
            self.write_pos = 0;
        }
        let Some(page) = self.page.as_mut() else {
            return;
        };
        let x = frame.sanitized().mono_sum();
        page[self.write_pos] = x * self.window[self.write_pos];
        self.write_pos += 1;
        if self.write_pos < self.fft_size {
            return;
        }

        self.write_pos = 0;
        if let Some(page) = self.page.take() {
            self.shared.pending.fetch_add(1, Ordering::AcqRel);
            match self.work_tx.try_send(page) {
                Ok(()) => {
                    self.page = self.free_rx.try_recv().ok();
                }
                Err(TrySendError::Full(page)) => {
                    self.shared.pending.fetch_sub(1, Ordering::AcqRel);
                    // Worker still busy: drop this page and start over in it
                    self.shared.skipped.fetch_add(1, Ordering::Relaxed);
                    log::debug!("Spectrum worker busy, page skipped");
                    self.page = Some(page);
                }
                Err(TrySendError::Disconnected(page)) => {
                    self.shared.pending.fetch_sub(1, Ordering::AcqRel);
                    self.page = Some(page);
                }
            }
        }
    }

    /// Drop the partially filled page
    pub fn restart_page(&mut self) {
        self.write_pos = 0;
    }

    pub fn set_decay(&self, rate: DecayRate) {
        self.shared.decay.store(rate.index() as u8, Ordering::Relaxed);
    }

    pub fn decay(&self) -> DecayRate {
        DecayRate::from_index(self.shared.decay.load(Ordering::Relaxed) as usize).unwrap_or_default()
    }

    /// Reader handle for the GUI side
    pub fn view(&self) -> SpectrumView {
        SpectrumView {
            shared: self.shared.clone(),
        }
    }

    /// True while a page is queued or under analysis
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.shared.is_busy()
    }

    #[inline]
    pub fn skipped_pages(&self) -> u64 {
        self.shared.skipped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn frames_computed(&self) -> u64 {
        self.shared.frames.load(Ordering::Acquire)
    }

    /// Pages waiting for the worker (0 or 1)
    #[inline]
    pub fn queued_pages(&self) -> usize {
        self.work_tx.len()
    }

    #[inline]
    pub fn draw_size(&self) -> usize {
        self.shared.draw_size.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> Vec<SpectrumPoint> {
        self.shared.snapshot()
    }

    /// Horizontal pixel of a frequency
    pub fn pixel_for_freq(&self, freq: f64) -> f64 {
        self.mapper.pixel(freq)
    }

    #[inline]
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }
}

impl Drop for SpectrumAnalyzer {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

// ============ GUI view ============

/// Cloneable read side of the analyzer
#[derive(Debug, Clone)]
pub struct SpectrumView {
    shared: Arc<Shared>,
}

impl SpectrumView {
    /// Valid points in the draw buffer
    #[inline]
    pub fn draw_size(&self) -> usize {
        self.shared.draw_size.load(Ordering::Acquire)
    }

    /// Lock the draw buffer; the worker waits to publish while it is held
    pub fn lock(&self) -> MutexGuard<'_, Vec<SpectrumPoint>> {
        self.shared.draw.lock()
    }

    /// Copy of the current display points
    pub fn snapshot(&self) -> Vec<SpectrumPoint> {
        self.shared.snapshot()
    }

    #[inline]
    pub fn is_busy(&self) -> bool {
        self.shared.is_busy()
    }
}

impl Shared {
    #[inline]
    fn is_busy(&self) -> bool {
        self.pending.load(Ordering::Acquire) > 0
    }

    fn snapshot(&self) -> Vec<SpectrumPoint> {
        let draw = self.draw.lock();
        let n = self.draw_size.load(Ordering::Acquire).min(draw.len());
        draw[..n].to_vec()
    }
}

// ============ Pixel mapping ============

#[derive(Debug, Clone)]
struct PixelMapper {
    log_min: f64,
    log_span: f64,
    width: usize,
    /// Compacted slot of every FFT bin, if displayed
    bin_slot: Vec<Option<usize>>,
    /// Pixel of every slot, ascending
    slot_pixel: Vec<u32>,
}

impl PixelMapper {
    fn new(settings: &SpectrumSettings, sample_rate: f64) -> Self {
        let log_min = settings.min_freq.log10();
        let log_span = settings.max_freq.log10() - log_min;
        let mut mapper = Self {
            log_min,
            log_span,
            width: settings.display_width,
            bin_slot: Vec::new(),
            slot_pixel: Vec::new(),
        };

        let n = settings.fft_size;
        let bins = n / 2 + 1;
        mapper.bin_slot = vec![None; bins];
        for k in 1..bins {
            let freq = k as f64 * sample_rate / n as f64;
            if freq < settings.min_freq || freq > settings.max_freq {
                continue;
            }
            let px = mapper.pixel(freq).round() as u32;
            if mapper.slot_pixel.last() != Some(&px) {
                mapper.slot_pixel.push(px);
            }
            mapper.bin_slot[k] = Some(mapper.slot_pixel.len() - 1);
        }
        mapper
    }

    #[inline]
    fn pixel(&self, freq: f64) -> f64 {
        let t = (freq.max(1e-9).log10() - self.log_min) / self.log_span;
        t * (self.width.saturating_sub(1)) as f64
    }
}

// ============ Worker ============

struct SpectrumWorker {
    fft: Arc<dyn RealToComplex<f64>>,
    input: Vec<f64>,
    output: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
    /// Per-slot power of the latest page
    compact: Vec<f64>,
    /// Per-slot decayed power shown on screen
    display: Vec<f64>,
    page_secs: f64,
    mapper: PixelMapper,
    shared: Arc<Shared>,
    work_rx: Receiver<Vec<f64>>,
    free_tx: Sender<Vec<f64>>,
}

impl SpectrumWorker {
    fn new(
        n: usize,
        sample_rate: f64,
        mapper: PixelMapper,
        shared: Arc<Shared>,
        work_rx: Receiver<Vec<f64>>,
        free_tx: Sender<Vec<f64>>,
    ) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(n);
        let input = fft.make_input_vec();
        let output = fft.make_output_vec();
        let scratch = fft.make_scratch_vec();
        let slots = mapper.slot_pixel.len();
        Self {
            fft,
            input,
            output,
            scratch,
            compact: vec![0.0; slots],
            display: vec![0.0; slots],
            page_secs: n as f64 / sample_rate,
            mapper,
            shared,
            work_rx,
            free_tx,
        }
    }

    fn run(mut self) {
        while self.shared.running.load(Ordering::Relaxed) {
            match self.work_rx.recv_timeout(WORKER_POLL) {
                Ok(page) => {
                    self.input.copy_from_slice(&page);
                    // Pool capacity covers every page, so this cannot be full
                    let _ = self.free_tx.try_send(page);
                    self.analyze();
                    self.shared.frames.fetch_add(1, Ordering::Release);
                    self.shared.pending.fetch_sub(1, Ordering::AcqRel);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        log::info!("Spectrum worker exiting");
    }

    fn analyze(&mut self) {
        if let Err(e) = self
            .fft
            .process_with_scratch(&mut self.input, &mut self.output, &mut self.scratch)
        {
            log::warn!("Spectrum FFT failed: {e}");
            return;
        }

        // Hann coherent gain is 0.5, so a full-scale sine reads its amplitude
        let scale = 4.0 / (self.input.len() as f64);
        self.compact.iter_mut().for_each(|p| *p = 0.0);
        for (k, c) in self.output.iter().enumerate() {
            if let Some(slot) = self.mapper.bin_slot[k] {
                let amp = c.norm() * scale;
                let power = amp * amp;
                if power > self.compact[slot] {
                    self.compact[slot] = power;
                }
            }
        }

        let rate = DecayRate::from_index(self.shared.decay.load(Ordering::Relaxed) as usize)
            .unwrap_or_default();
        let Some(tau) = decay_time(rate) else {
            // Frozen: keep showing the last frame
            return;
        };
        let decay = (-self.page_secs / tau).exp();
        for (shown, &fresh) in self.display.iter_mut().zip(&self.compact) {
            *shown = fresh.max(*shown * decay);
        }

        let mut draw = self.shared.draw.lock();
        draw.clear();
        draw.extend(
            self.display
                .iter()
                .zip(&self.mapper.slot_pixel)
                .map(|(&p, &px)| SpectrumPoint {
                    x: px as f32,
                    db: ((10.0 * p.max(POWER_FLOOR).log10()) as f32).max(SPECTRUM_FLOOR_DB),
                }),
        );
        self.shared.draw_size.store(draw.len(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    const SR: f64 = 48000.0;

    fn settings(fft_size: usize) -> SpectrumSettings {
        SpectrumSettings {
            fft_size,
            ..SpectrumSettings::default()
        }
    }

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(5) {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    fn push_page(an: &mut SpectrumAnalyzer, freq: f64, amp: f64, offset: &mut usize) {
        for _ in 0..an.fft_size() {
            let x = amp * (2.0 * std::f64::consts::PI * freq * *offset as f64 / SR).sin();
            an.push(StereoSample::mono(x));
            *offset += 1;
        }
    }

    #[test]
    fn test_pixel_map_is_monotonic() {
        let mapper = PixelMapper::new(&settings(2048), SR);
        assert!(mapper.slot_pixel.windows(2).all(|w| w[0] < w[1]));
        assert!(*mapper.slot_pixel.last().unwrap() <= 511);
        // DC is never displayed
        assert_eq!(mapper.bin_slot[0], None);
    }

    #[test]
    fn test_sine_peak_lands_on_its_pixel() {
        let mut an = SpectrumAnalyzer::new(&settings(2048), SR).unwrap();
        let mut t = 0;
        push_page(&mut an, 1000.0, 5.0, &mut t);
        assert!(wait_until(|| an.frames_computed() >= 1 && !an.is_busy()));

        let points = an.snapshot();
        assert_eq!(points.len(), an.draw_size());
        let peak = points
            .iter()
            .copied()
            .fold(SpectrumPoint { x: 0.0, db: f32::MIN }, |a, b| if b.db > a.db { b } else { a });
        assert!((peak.x as f64 - an.pixel_for_freq(1000.0)).abs() <= 3.0);
        // 5V sine: 20*log10(5) ≈ 14 dB, within window scalloping
        assert!(peak.db > 10.0 && peak.db < 15.0, "peak {} dB", peak.db);
    }

    #[test]
    fn test_backpressure_skips_one_page_per_overrun() {
        let mut an = SpectrumAnalyzer::new(&settings(256), SR).unwrap();
        let mut t = 0;

        // Holding the draw buffer stalls the worker at publish time
        let view = an.view();
        let guard = view.lock();
        push_page(&mut an, 440.0, 1.0, &mut t);
        assert!(wait_until(|| an.queued_pages() == 0));
        assert!(an.is_busy());

        push_page(&mut an, 440.0, 1.0, &mut t);
        assert_eq!(an.queued_pages(), 1);
        assert_eq!(an.skipped_pages(), 0);

        push_page(&mut an, 440.0, 1.0, &mut t);
        assert_eq!(an.skipped_pages(), 1);
        push_page(&mut an, 440.0, 1.0, &mut t);
        assert_eq!(an.skipped_pages(), 2);
        assert_eq!(an.queued_pages(), 1);

        drop(guard);
        assert!(wait_until(|| !an.is_busy()));
        assert_eq!(an.frames_computed(), 2);
        assert_eq!(an.skipped_pages(), 2);
        assert!(an.draw_size() > 0);
    }

    #[test]
    fn test_queued_page_always_reads_busy() {
        let mut an = SpectrumAnalyzer::new(&settings(256), SR).unwrap();
        let view = an.view();
        let mut t = 0;
        for _ in 0..300 {
            push_page(&mut an, 1000.0, 1.0, &mut t);
            if an.queued_pages() > 0 {
                assert!(an.is_busy());
                assert!(view.is_busy());
            }
        }
        assert!(wait_until(|| !an.is_busy()));
        assert_eq!(an.queued_pages(), 0);
        assert_eq!(an.frames_computed() + an.skipped_pages(), 300);
    }

    #[test]
    fn test_frozen_holds_last_frame() {
        let mut an = SpectrumAnalyzer::new(&settings(1024), SR).unwrap();
        let mut t = 0;
        push_page(&mut an, 2000.0, 4.0, &mut t);
        assert!(wait_until(|| an.frames_computed() >= 1 && !an.is_busy()));
        let held = an.snapshot();

        an.set_decay(DecayRate::Frozen);
        assert_eq!(an.decay(), DecayRate::Frozen);
        push_page(&mut an, 2000.0, 0.0, &mut t);
        assert!(wait_until(|| an.frames_computed() >= 2 && !an.is_busy()));
        assert_eq!(an.snapshot(), held);

        an.set_decay(DecayRate::Fast);
        push_page(&mut an, 2000.0, 0.0, &mut t);
        assert!(wait_until(|| an.frames_computed() >= 3 && !an.is_busy()));
        let decayed = an.snapshot();
        let max_held = held.iter().map(|p| p.db).fold(f32::MIN, f32::max);
        let max_now = decayed.iter().map(|p| p.db).fold(f32::MIN, f32::max);
        assert!(max_now < max_held);
    }

    #[test]
    fn test_drop_joins_worker() {
        let an = SpectrumAnalyzer::new(&settings(512), SR).unwrap();
        let start = Instant::now();
        drop(an);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
