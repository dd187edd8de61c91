//! One sample of the database: a session directory holding a physiology
//! recording and the video it was synchronised with.

use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::channel_extract::{active_window, extract_window};
use crate::config::EstimatorConfig;
use crate::ecg_process::{estimate_with, RateEstimate};
use crate::edf_read::EdfReader;
use crate::error::{Error, Result};
use crate::qrs_detect::{PeakDetector, QrsDetector};
use crate::recording::Recording;
use crate::sensor_reconcile::{reconcile_with, Rule};

pub const RECORDING_EXTENSION: &str = "bdf";
pub const VIDEO_EXTENSION: &str = "avi";

/// A sample as listed by the metadata provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleRecord {
    /// Session directory, relative to the database root.
    pub basedir: PathBuf,
    /// File name of the recording without its extension.
    pub recording_stem: String,
    /// File name of the video without its extension.
    pub video_stem: String,
    /// Approximate duration of the session in seconds.
    pub duration_secs: u32,
}

impl SampleRecord {
    pub fn new(
        basedir: impl Into<PathBuf>,
        recording_stem: impl Into<String>,
        video_stem: impl Into<String>,
        duration_secs: u32,
    ) -> Self {
        Self {
            basedir: basedir.into(),
            recording_stem: recording_stem.into(),
            video_stem: video_stem.into(),
            duration_secs,
        }
    }

    /// Stable identifier of the sample within the database.
    pub fn key(&self) -> String {
        self.basedir
            .join(&self.recording_stem)
            .to_string_lossy()
            .into_owned()
    }

    pub fn recording_path(&self, root: impl AsRef<Path>) -> PathBuf {
        root.as_ref()
            .join(&self.basedir)
            .join(format!("{}.{}", self.recording_stem, RECORDING_EXTENSION))
    }

    /// Path of the video, which must exist.
    pub fn video_path(&self, root: impl AsRef<Path>) -> Result<PathBuf> {
        let path = root
            .as_ref()
            .join(&self.basedir)
            .join(format!("{}.{}", self.video_stem, VIDEO_EXTENSION));
        if !path.exists() {
            return Err(Error::NotFound(path));
        }
        Ok(path)
    }

    /// Consensus heart rate of this sample, in bpm.
    pub fn estimate_heart_rate(&self, root: impl AsRef<Path>) -> Result<f64> {
        Ok(self.explain(root, &EstimatorConfig::default())?.consensus_bpm)
    }

    /// Per-sensor estimates and how they were reconciled.
    pub fn explain(
        &self,
        root: impl AsRef<Path>,
        config: &EstimatorConfig,
    ) -> Result<HeartRateReport> {
        let mut reader = EdfReader::open(self.recording_path(root))?;
        let detector = QrsDetector::new(config.qrs.clone());
        let report = explain_recording(&mut reader, config, &detector)?;
        info!("{}: {:.2} bpm ({:?})", self.key(), report.consensus_bpm, report.rule);
        Ok(report)
    }
}

impl fmt::Display for SampleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "File('{}')", self.recording_stem)
    }
}

/// Rate estimate of one ECG sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEstimate {
    pub channel: String,
    pub sample_frequency: f64,
    pub estimate: RateEstimate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HeartRateReport {
    /// In sensor order.
    pub channels: Vec<ChannelEstimate>,
    pub consensus_bpm: f64,
    pub rule: Rule,
}

impl HeartRateReport {
    pub fn rates(&self) -> [f64; 3] {
        let mut rates = [0.0; 3];
        for (slot, channel) in rates.iter_mut().zip(&self.channels) {
            *slot = channel.estimate.average_bpm;
        }
        rates
    }
}

/// Estimate every configured sensor over the video window of `recording`
/// and reconcile them.
///
/// Fails as a whole if any channel cannot be decoded.
pub fn explain_recording<R, D>(
    recording: &mut R,
    config: &EstimatorConfig,
    detector: &D,
) -> Result<HeartRateReport>
where
    R: Recording + ?Sized,
    D: PeakDetector + ?Sized,
{
    for channel in &config.channels {
        recording.channel_index(channel)?;
    }
    let window = active_window(recording, &config.status_channel)?;
    debug!("video window [{}, {}]", window.start, window.end);

    let mut channels = Vec::with_capacity(config.channels.len());
    for channel in &config.channels {
        let waveform = extract_window(recording, channel, window, None, None)?;
        let estimate = estimate_with(detector, &waveform, config.band);
        debug!(
            "{channel}: {} peaks, {:.2} bpm",
            estimate.peaks.len(),
            estimate.average_bpm
        );
        channels.push(ChannelEstimate {
            channel: channel.clone(),
            sample_frequency: waveform.sample_frequency(),
            estimate,
        });
    }

    let mut report = HeartRateReport {
        channels,
        consensus_bpm: 0.0,
        rule: Rule::NoSensor,
    };
    let (consensus_bpm, rule) = reconcile_with(report.rates(), config.agreement_bpm);
    report.consensus_bpm = consensus_bpm;
    report.rule = rule;
    Ok(report)
}

/// Consensus heart rate of `sample` with the default configuration.
pub fn estimate_heart_rate(sample: &SampleRecord, root: impl AsRef<Path>) -> Result<f64> {
    sample.estimate_heart_rate(root)
}
