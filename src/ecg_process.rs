use crate::qrs_detect::{PeakDetector, QrsDetector};

/// A decoded stretch of one channel and the rate it was sampled at.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    samples: Vec<f64>,
    sample_frequency: f64,
}

impl Waveform {
    pub fn new(samples: Vec<f64>, sample_frequency: f64) -> Self {
        Self {
            samples,
            sample_frequency,
        }
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Sampling frequency in Hz.
    pub fn sample_frequency(&self) -> f64 {
        self.sample_frequency
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_frequency
    }
}

/// Heartbeat positions as strictly increasing sample indices.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeakSet(Vec<usize>);

impl PeakSet {
    /// Sorts and deduplicates `peaks`, so consecutive intervals are never zero.
    pub fn new(mut peaks: Vec<usize>) -> Self {
        peaks.sort_unstable();
        peaks.dedup();
        Self(peaks)
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Distance in samples between each consecutive pair of peaks.
    pub fn intervals(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.windows(2).map(|pair| pair[1] - pair[0])
    }
}

impl From<Vec<usize>> for PeakSet {
    fn from(peaks: Vec<usize>) -> Self {
        Self::new(peaks)
    }
}

/// Open interval of physiologically plausible instantaneous rates, in bpm.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateBand {
    pub min_bpm: f64,
    pub max_bpm: f64,
}

impl RateBand {
    pub fn contains(&self, bpm: f64) -> bool {
        self.min_bpm < bpm && bpm < self.max_bpm
    }
}

impl Default for RateBand {
    fn default() -> Self {
        Self {
            min_bpm: 30.0,
            max_bpm: 240.0,
        }
    }
}

/// Rate in bpm implied by each consecutive pair of peaks.
pub fn instantaneous_rates(peaks: &PeakSet, sample_frequency: f64) -> Vec<f64> {
    peaks
        .intervals()
        .map(|interval| 60.0 * sample_frequency / interval as f64)
        .collect()
}

/// Mean of the instantaneous rates that fall inside `band`.
///
/// Out-of-band rates are dropped, not clipped. Returns `0.0` when fewer than
/// two peaks exist or no rate survives the band.
pub fn average_rate(peaks: &PeakSet, sample_frequency: f64, band: RateBand) -> f64 {
    let kept: Vec<f64> = instantaneous_rates(peaks, sample_frequency)
        .into_iter()
        .filter(|&rate| band.contains(rate))
        .collect();
    if kept.is_empty() {
        return 0.0;
    }
    let mean = kept.iter().sum::<f64>() / kept.len() as f64;
    if mean.is_finite() {
        mean
    } else {
        0.0
    }
}

/// Average heart rate of one channel plus the peaks it was computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct RateEstimate {
    /// Beats per minute; `0.0` means the rate could not be determined.
    pub average_bpm: f64,
    pub peaks: PeakSet,
}

/// Estimate the average heart rate of `waveform` with the default QRS
/// detector and the 30-240 bpm band.
pub fn estimate(waveform: &Waveform) -> RateEstimate {
    estimate_with(&QrsDetector::default(), waveform, RateBand::default())
}

pub fn estimate_with<D>(detector: &D, waveform: &Waveform, band: RateBand) -> RateEstimate
where
    D: PeakDetector + ?Sized,
{
    let peaks = detector.detect(waveform);
    let average_bpm = average_rate(&peaks, waveform.sample_frequency(), band);
    RateEstimate { average_bpm, peaks }
}
