//! Extracting one channel of a recording, restricted to the stretch during
//! which the paired video was being captured.

use std::path::Path;

use log::{debug, warn};

use crate::config::STATUS_CHANNEL;
use crate::ecg_process::Waveform;
use crate::edf_read::EdfReader;
use crate::error::{Error, Result};
use crate::recording::Recording;

/// First and last non-zero status sample, in status-channel sample units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveWindow {
    pub start: usize,
    pub end: usize,
}

/// Locate the video-active window from the status channel.
///
/// Status samples are rounded to the nearest integer, ties to even; any
/// non-zero value marks the video as running.
pub fn active_window<R>(recording: &mut R, status_channel: &str) -> Result<ActiveWindow>
where
    R: Recording + ?Sized,
{
    let index = recording.channel_index(status_channel)?;
    let len = recording.samples_in_file(index);
    let status = recording.read(index, 0, len)?;

    let active = |v: &f64| v.round_ties_even() as i64 != 0;
    let start = status.iter().position(active);
    let end = status.iter().rposition(active);
    match (start, end) {
        (Some(start), Some(end)) => Ok(ActiveWindow { start, end }),
        _ => Err(Error::EmptySignal {
            channel: status_channel.to_string(),
        }),
    }
}

/// Read `channel` inside an already located window.
///
/// The window indices are reused as-is for the target channel, and offsets
/// are converted with the target channel's own frequency. When the status and
/// target frequencies differ the two channels are therefore not time-aligned.
pub fn extract_window<R>(
    recording: &mut R,
    channel: &str,
    window: ActiveWindow,
    start_offset: Option<f64>,
    end_offset: Option<f64>,
) -> Result<Waveform>
where
    R: Recording + ?Sized,
{
    let index = recording.channel_index(channel)?;
    let frequency = recording.sample_frequency(index);
    let window_start_secs = window.start as f64 / frequency;

    // f64::max and f64::min discard NaN, so a NaN offset lands on the
    // window edge.
    let start = match start_offset {
        Some(offset) => {
            ((offset + window_start_secs) * frequency).max(window.start as f64) as usize
        }
        None => window.start,
    };

    let mut end = match end_offset {
        Some(offset) => ((offset + window_start_secs) * frequency)
            .min(window.end as f64)
            .max(0.0) as usize,
        None => window.end,
    };

    let available = recording.samples_in_file(index);
    if end > available {
        warn!("channel `{channel}' has {available} samples, clamping window end {end}");
        end = available;
    }
    if start >= end {
        return Err(Error::InvalidWindow { start, end });
    }

    debug!("reading `{channel}' samples [{start}, {end}) at {frequency} Hz");
    let samples = recording.read(index, start, end - start)?;
    Ok(Waveform::new(samples, frequency))
}

/// Read `channel` restricted to the video-active window, optionally trimmed
/// by offsets in seconds relative to the window start.
pub fn extract_channel<R>(
    recording: &mut R,
    channel: &str,
    status_channel: &str,
    start_offset: Option<f64>,
    end_offset: Option<f64>,
) -> Result<Waveform>
where
    R: Recording + ?Sized,
{
    // Resolve the target first so a bad name fails before the status read.
    recording.channel_index(channel)?;
    let window = active_window(recording, status_channel)?;
    extract_window(recording, channel, window, start_offset, end_offset)
}

/// Open the recording at `path` and extract `channel` from its video window.
pub fn decode(
    path: impl AsRef<Path>,
    channel: &str,
    start_offset: Option<f64>,
    end_offset: Option<f64>,
) -> Result<Waveform> {
    let mut reader = EdfReader::open(path)?;
    extract_channel(&mut reader, channel, STATUS_CHANNEL, start_offset, end_offset)
}
