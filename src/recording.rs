//! The multi-channel recording abstraction shared by the file reader and
//! in-memory fixtures.

use crate::error::{Error, Result};

/// Read access to a multi-channel biosignal recording.
///
/// Channel labels are unique within a recording. Each channel carries its own
/// sampling frequency and sample count, which may differ between channels.
pub trait Recording {
    fn labels(&self) -> &[String];

    /// Sampling frequency of channel `index` in Hz.
    fn sample_frequency(&self, index: usize) -> f64;

    /// Total number of samples stored for channel `index`.
    fn samples_in_file(&self, index: usize) -> usize;

    /// Read `count` physical samples of channel `index` starting at `start`.
    fn read(&mut self, index: usize, start: usize, count: usize) -> Result<Vec<f64>>;

    /// Position of the channel called `name`.
    fn channel_index(&self, name: &str) -> Result<usize> {
        self.labels()
            .iter()
            .position(|label| label == name)
            .ok_or_else(|| Error::InvalidChannel {
                name: name.to_string(),
            })
    }
}

/// One channel held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub label: String,
    pub sample_frequency: f64,
    pub samples: Vec<f64>,
}

impl Channel {
    pub fn new(label: impl Into<String>, sample_frequency: f64, samples: Vec<f64>) -> Self {
        Self {
            label: label.into(),
            sample_frequency,
            samples,
        }
    }
}

/// A recording whose channels are already decoded into memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecording {
    labels: Vec<String>,
    channels: Vec<Channel>,
}

impl MemoryRecording {
    pub fn new(channels: Vec<Channel>) -> Self {
        let labels = channels.iter().map(|c| c.label.clone()).collect();
        Self { labels, channels }
    }
}

impl Recording for MemoryRecording {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn sample_frequency(&self, index: usize) -> f64 {
        self.channels[index].sample_frequency
    }

    fn samples_in_file(&self, index: usize) -> usize {
        self.channels[index].samples.len()
    }

    fn read(&mut self, index: usize, start: usize, count: usize) -> Result<Vec<f64>> {
        let samples = &self.channels[index].samples;
        match start.checked_add(count) {
            Some(end) if end <= samples.len() => Ok(samples[start..end].to_vec()),
            _ => Err(Error::OutOfRange {
                channel: index,
                start,
                end: start.saturating_add(count),
                available: samples.len(),
            }),
        }
    }
}
