//! QRS (heartbeat) detection on raw ECG channels.
//!
//! The detector band-passes the signal, rectifies it and scans it with a
//! half-second window. A window whose first sample rises above a threshold
//! derived from the first seconds of the recording yields one candidate beat
//! at its maximum. Candidates with outlying energy or too many threshold
//! crossings (see [`Crossings`]) are treated as noise and dropped.

use std::f64::consts::{PI, SQRT_2};

use log::trace;

use crate::ecg_process::{PeakSet, Waveform};

/// Anything able to locate heartbeats in a waveform.
pub trait PeakDetector {
    fn detect(&self, waveform: &Waveform) -> PeakSet;
}

/// How the detection threshold is chosen, as a fraction of the initial peak
/// amplitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Threshold {
    Fixed(f64),
    /// Try 0.30, 0.35, ..., 1.05 and keep the run whose overall rate is
    /// closest to a plausible one.
    Auto,
}

impl Threshold {
    fn fractions(self) -> Vec<f64> {
        match self {
            Threshold::Fixed(value) => vec![value],
            Threshold::Auto => (0..16).map(|i| 0.3 + 0.05 * i as f64).collect(),
        }
    }
}

/// How threshold crossings inside a candidate window are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossings {
    /// Net change of the above-threshold indicator between the first and
    /// last sample. A candidate window starts above threshold, so this is
    /// never positive and no candidate is rejected on crossings.
    Net,
    /// Every upward crossing inside the window.
    Rising,
}

impl Crossings {
    fn count(self, window: &[f64], thresh: f64) -> isize {
        match self {
            Crossings::Net => match (window.first(), window.last()) {
                (Some(&first), Some(&last)) => {
                    (last > thresh) as isize - (first > thresh) as isize
                }
                _ => 0,
            },
            Crossings::Rising => window
                .windows(2)
                .filter(|pair| pair[0] <= thresh && pair[1] > thresh)
                .count() as isize,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QrsConfig {
    pub threshold: Threshold,
    /// Candidates whose RMS exceeds mean + `levels` standard deviations are noise.
    pub levels: f64,
    /// Candidates with this many threshold crossings or more are noise.
    pub max_crossings: usize,
    pub crossings: Crossings,
    /// Band-pass corner frequencies in Hz.
    pub low_freq: f64,
    pub high_freq: f64,
}

impl Default for QrsConfig {
    fn default() -> Self {
        Self {
            threshold: Threshold::Fixed(0.6),
            levels: 2.5,
            max_crossings: 3,
            crossings: Crossings::Net,
            low_freq: 5.0,
            high_freq: 35.0,
        }
    }
}

/// Second-order IIR section, `[b0, b1, b2]` over `[a1, a2]` with `a0 = 1`.
#[derive(Debug, Clone, Copy)]
struct Biquad {
    b: [f64; 3],
    a: [f64; 2],
}

impl Biquad {
    /// Butterworth high-pass designed via bilinear transform.
    fn high_pass(fc: f64, fs: f64) -> Self {
        let k = (PI * fc / fs).tan();
        let k2 = k * k;
        let norm = 1.0 / (1.0 + SQRT_2 * k + k2);
        Self {
            b: [norm, -2.0 * norm, norm],
            a: [2.0 * (k2 - 1.0) * norm, (1.0 - SQRT_2 * k + k2) * norm],
        }
    }

    /// Butterworth low-pass designed via bilinear transform.
    fn low_pass(fc: f64, fs: f64) -> Self {
        let k = (PI * fc / fs).tan();
        let k2 = k * k;
        let norm = 1.0 / (1.0 + SQRT_2 * k + k2);
        Self {
            b: [k2 * norm, 2.0 * k2 * norm, k2 * norm],
            a: [2.0 * (k2 - 1.0) * norm, (1.0 - SQRT_2 * k + k2) * norm],
        }
    }

    /// Direct form I, zero initial state.
    fn apply(&self, signal: &mut [f64]) {
        let [b0, b1, b2] = self.b;
        let [a1, a2] = self.a;
        let (mut x1, mut x2) = (0.0, 0.0);
        let (mut y1, mut y2) = (0.0, 0.0);
        for sample in signal.iter_mut() {
            let x0 = *sample;
            let y0 = b0 * x0 + b1 * x1 + b2 * x2 - a1 * y1 - a2 * y2;
            *sample = y0;
            x2 = x1;
            x1 = x0;
            y2 = y1;
            y1 = y0;
        }
    }

    /// Forward then backward pass, cancelling the phase shift.
    fn apply_zero_phase(&self, signal: &mut [f64]) {
        self.apply(signal);
        signal.reverse();
        self.apply(signal);
        signal.reverse();
    }
}

/// Zero-phase band-pass between `low` and `high` Hz. A corner at or beyond
/// Nyquist (or at or below zero) is skipped.
pub fn band_pass(signal: &[f64], fs: f64, low: f64, high: f64) -> Vec<f64> {
    let mut out = signal.to_vec();
    let nyquist = fs / 2.0;
    if low > 0.0 && low < nyquist {
        Biquad::high_pass(low, fs).apply_zero_phase(&mut out);
    }
    if high > 0.0 && high < nyquist {
        Biquad::low_pass(high, fs).apply_zero_phase(&mut out);
    }
    out
}

/// Index of the first maximum.
fn argmax(window: &[f64]) -> usize {
    let mut best = 0;
    for (i, &value) in window.iter().enumerate() {
        if value > window[best] {
            best = i;
        }
    }
    best
}

struct Candidate {
    time: usize,
    crossings: isize,
    rms: f64,
}

#[derive(Debug, Clone, Default)]
pub struct QrsDetector {
    config: QrsConfig,
}

impl QrsDetector {
    pub fn new(config: QrsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QrsConfig {
        &self.config
    }

    /// Mean of the maxima of the first three one-second blocks.
    fn initial_maximum(rectified: &[f64], fs: f64) -> Option<f64> {
        let block = fs as usize;
        if block == 0 {
            return None;
        }
        let maxima: Vec<f64> = rectified
            .chunks(block)
            .take(3)
            .map(|chunk| chunk.iter().cloned().fold(f64::NEG_INFINITY, f64::max))
            .collect();
        if maxima.is_empty() {
            return None;
        }
        let mean = maxima.iter().sum::<f64>() / maxima.len() as f64;
        (mean.is_finite() && mean > 0.0).then_some(mean)
    }

    /// One threshold run over the rectified signal.
    fn scan(&self, rectified: &[f64], win: usize, thresh: f64) -> Vec<usize> {
        let n = rectified.len();
        let mut candidates = Vec::new();
        let mut ii = 0;
        while ii + win < n {
            let window = &rectified[ii..ii + win];
            if window[0] > thresh {
                let crossings = self.config.crossings.count(window, thresh);
                let rms = (window.iter().map(|x| x * x).sum::<f64>() / win as f64).sqrt();
                candidates.push(Candidate {
                    time: ii + argmax(window),
                    crossings,
                    rms,
                });
                ii += win;
            } else {
                ii += 1;
            }
        }
        if candidates.is_empty() {
            return Vec::new();
        }

        let count = candidates.len() as f64;
        let mean = candidates.iter().map(|c| c.rms).sum::<f64>() / count;
        let var = candidates
            .iter()
            .map(|c| (c.rms - mean).powi(2))
            .sum::<f64>()
            / count;
        let rms_limit = mean + var.sqrt() * self.config.levels;
        let max_crossings = self.config.max_crossings as isize;

        candidates
            .into_iter()
            .filter(|c| c.rms <= rms_limit && c.crossings < max_crossings)
            .map(|c| c.time)
            .collect()
    }

    /// Among several threshold runs, keep the one whose overall rate is
    /// closest to the median of the plausible (40-160 bpm) ones, or to 80 bpm.
    fn pick_run(runs: Vec<Vec<usize>>, duration: f64) -> Option<Vec<usize>> {
        let rates: Vec<f64> = runs
            .iter()
            .map(|run| 60.0 * run.len() as f64 / duration)
            .collect();
        let mut plausible: Vec<f64> = rates
            .iter()
            .cloned()
            .filter(|r| (40.0..=160.0).contains(r))
            .collect();
        plausible.sort_by(f64::total_cmp);
        let ideal = match plausible.len() {
            0 => 80.0,
            n if n % 2 == 1 => plausible[n / 2],
            n => (plausible[n / 2 - 1] + plausible[n / 2]) / 2.0,
        };

        let mut best: Option<(usize, f64)> = None;
        for (i, rate) in rates.iter().enumerate() {
            let distance = (rate - ideal).abs();
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((i, distance));
            }
        }
        best.and_then(|(i, _)| runs.into_iter().nth(i))
    }
}

impl PeakDetector for QrsDetector {
    fn detect(&self, waveform: &Waveform) -> PeakSet {
        let fs = waveform.sample_frequency();
        if waveform.is_empty() || !(fs > 0.0) {
            return PeakSet::default();
        }

        let filtered = band_pass(
            waveform.samples(),
            fs,
            self.config.low_freq,
            self.config.high_freq,
        );
        let rectified: Vec<f64> = filtered.iter().map(|x| x.abs()).collect();

        let Some(init_max) = Self::initial_maximum(&rectified, fs) else {
            return PeakSet::default();
        };
        let win = ((60.0 * fs) / 120.0).round().max(1.0) as usize;

        let runs: Vec<Vec<usize>> = self
            .config
            .threshold
            .fractions()
            .into_iter()
            .map(|fraction| self.scan(&rectified, win, init_max * fraction))
            .filter(|run| !run.is_empty())
            .collect();
        trace!("{} non-empty threshold runs", runs.len());

        let best = match self.config.threshold {
            Threshold::Fixed(_) => runs.into_iter().next(),
            Threshold::Auto => Self::pick_run(runs, waveform.duration()),
        };
        PeakSet::new(best.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Gaussian QRS-like pulses of roughly 8 ms standard deviation, one
    /// every `interval` samples starting one second in.
    fn synthetic_ecg(fs: f64, seconds: f64, interval: usize) -> Vec<f64> {
        let n = (fs * seconds) as usize;
        let sigma = 0.008 * fs;
        let half = (4.0 * sigma) as usize;
        let mut signal = vec![0.0; n];
        let mut centre = fs as usize;
        while centre + half < n {
            for k in centre - half..=centre + half {
                let t = (k as f64 - centre as f64) / sigma;
                signal[k] += 1000.0 * (-0.5 * t * t).exp();
            }
            centre += interval;
        }
        signal
    }

    #[test]
    fn test_argmax_takes_first() {
        assert_eq!(argmax(&[1.0, 3.0, 2.0, 3.0]), 1);
    }

    #[test]
    fn test_band_pass_removes_offset() {
        let fs = 256.0;
        let signal = vec![50.0; 2048];
        let filtered = band_pass(&signal, fs, 5.0, 35.0);
        // Zero-phase start-up transients settle well before the middle.
        assert!(filtered[1024].abs() < 1.0, "{}", filtered[1024]);
    }

    #[test]
    fn test_detects_regular_beats() {
        let fs = 256.0;
        let interval = 213; // ~72 bpm
        let waveform = Waveform::new(synthetic_ecg(fs, 20.0, interval), fs);
        let peaks = QrsDetector::default().detect(&waveform);

        assert!(peaks.len() >= 20, "only {} peaks", peaks.len());
        for gap in peaks.intervals() {
            assert!(gap.abs_diff(interval) <= 1, "gap {gap}");
        }
    }

    #[test]
    fn test_auto_threshold_detects_regular_beats() {
        let fs = 256.0;
        let interval = 256; // 60 bpm
        let waveform = Waveform::new(synthetic_ecg(fs, 20.0, interval), fs);
        let detector = QrsDetector::new(QrsConfig {
            threshold: Threshold::Auto,
            ..QrsConfig::default()
        });
        let peaks = detector.detect(&waveform);
        assert!(peaks.len() >= 15, "only {} peaks", peaks.len());
        for gap in peaks.intervals() {
            assert!(gap.abs_diff(interval) <= 1, "gap {gap}");
        }
    }

    #[test]
    fn test_flat_and_short_signals_have_no_peaks() {
        let detector = QrsDetector::default();
        assert!(detector.detect(&Waveform::new(vec![], 256.0)).is_empty());
        assert!(detector
            .detect(&Waveform::new(vec![0.0; 4096], 256.0))
            .is_empty());
        assert!(detector.detect(&Waveform::new(vec![1.0; 10], 0.0)).is_empty());
    }

    #[test]
    fn test_crossing_counts() {
        let ringing = [2.0, 0.0, 2.0, 0.0, 2.0, 0.0, 2.0];
        assert_eq!(Crossings::Rising.count(&ringing, 1.0), 3);
        assert_eq!(Crossings::Net.count(&ringing, 1.0), 0);
        assert_eq!(Crossings::Net.count(&[2.0, 0.0], 1.0), -1);
        assert_eq!(Crossings::Net.count(&[], 1.0), 0);
        assert_eq!(QrsDetector::default().config().crossings, Crossings::Net);
    }

    #[test]
    fn test_rising_crossings_reject_ringing_windows() {
        let win = 128;
        // Clean pulses, then one candidate window that rings around the
        // threshold.
        let mut rectified = vec![0.0; 8 * win];
        for start in [0, 2 * win, 4 * win] {
            rectified[start] = 10.0;
        }
        for k in (6 * win..7 * win).step_by(8) {
            rectified[k] = 10.0;
        }

        let net = QrsDetector::default().scan(&rectified, win, 5.0);
        assert_eq!(net, vec![0, 2 * win, 4 * win, 6 * win]);

        let rising = QrsDetector::new(QrsConfig {
            crossings: Crossings::Rising,
            ..QrsConfig::default()
        })
        .scan(&rectified, win, 5.0);
        assert_eq!(rising, vec![0, 2 * win, 4 * win]);
    }

    #[test]
    fn test_pick_run_prefers_plausible_rate() {
        // 10 s: 5, 12 and 40 beats are 30, 72 and 240 bpm.
        let runs = vec![vec![0; 5], vec![1; 12], vec![2; 40]];
        let best = QrsDetector::pick_run(runs, 10.0).unwrap();
        assert_eq!(best, vec![1; 12]);
    }
}
