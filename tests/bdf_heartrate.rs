use std::fs;
use std::path::Path;

use anyhow::Result;
use pretty_assertions::assert_eq;

use hci_heartrate::edf_read::{EdfReader, Variant};
use hci_heartrate::edf_write::write_recording;
use hci_heartrate::recording::{Channel, Recording};
use hci_heartrate::sensor_reconcile::Rule;
use hci_heartrate::{
    decode, estimate, estimate_heart_rate, EstimatorConfig, Error, SampleRecord,
};

/// Divisible by 72, 73 and 110 bpm: beat intervals of 4015, 3960 and 2628
/// samples.
const FS: f64 = 4818.0;

/// Gaussian QRS-like pulses every `interval` samples, starting one second in.
fn synthetic_ecg(n: usize, interval: usize) -> Vec<f64> {
    let sigma = 0.008 * FS;
    let half = (4.0 * sigma) as usize;
    let mut signal = vec![0.0; n];
    let mut centre = FS as usize;
    while centre + half < n {
        for k in centre - half..=centre + half {
            let t = (k as f64 - centre as f64) / sigma;
            signal[k] += 1000.0 * (-0.5 * t * t).exp();
        }
        centre += interval;
    }
    signal
}

fn status(n: usize, first: usize, last: usize) -> Vec<f64> {
    (0..n)
        .map(|i| if (first..=last).contains(&i) { 1.0 } else { 0.0 })
        .collect()
}

fn write_session(path: &Path, seconds: usize) -> Result<()> {
    let n = FS as usize * seconds;
    let half_second = FS as usize / 2;
    let channels = vec![
        Channel::new("EXG1", FS, synthetic_ecg(n, 4015)),
        Channel::new("EXG2", FS, synthetic_ecg(n, 3960)),
        Channel::new("EXG3", FS, synthetic_ecg(n, 2628)),
        Channel::new("Status", FS, status(n, half_second, n - half_second)),
    ];
    write_recording(path, &channels, 1, Variant::Bdf)?;
    Ok(())
}

#[test]
fn test_bdf_round_trip_header() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.bdf");
    write_session(&path, 4)?;

    let reader = EdfReader::open(&path)?;
    assert_eq!(reader.header().variant, Variant::Bdf);
    assert_eq!(reader.labels(), ["EXG1", "EXG2", "EXG3", "Status"]);
    for i in 0..4 {
        assert_eq!(reader.sample_frequency(i), FS);
        assert_eq!(reader.samples_in_file(i), 4 * 4818);
    }
    Ok(())
}

#[test]
fn test_decode_status_window() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("window.bdf");
    let fs = 512.0;
    let ramp: Vec<f64> = (0..6144).map(|i| (i % 1000) as f64).collect();
    write_recording(
        &path,
        &[
            Channel::new("EXG3", fs, ramp),
            Channel::new("Status", fs, status(6144, 100, 5099)),
        ],
        1,
        Variant::Bdf,
    )?;

    let waveform = decode(&path, "EXG3", None, None)?;
    assert_eq!(waveform.len(), 4999);
    assert_eq!(waveform.sample_frequency(), fs);
    assert!((waveform.samples()[0] - 100.0).abs() < 1e-3);
    assert!((waveform.samples()[900] - 0.0).abs() < 1e-3);

    let trimmed = decode(&path, "EXG3", Some(1.0), Some(2.0))?;
    assert_eq!(trimmed.len(), 512);
    assert!((trimmed.samples()[0] - 612.0).abs() < 1e-3);
    Ok(())
}

#[test]
fn test_decode_errors() -> Result<()> {
    let dir = tempfile::tempdir()?;

    let missing = decode(dir.path().join("missing.bdf"), "EXG1", None, None);
    assert!(matches!(missing, Err(Error::NotFound(_))));

    let path = dir.path().join("session.bdf");
    write_session(&path, 4)?;
    let bad_channel = decode(&path, "EXG4", None, None);
    assert!(matches!(bad_channel, Err(Error::InvalidChannel { .. })));

    let idle = dir.path().join("idle.bdf");
    write_recording(
        &idle,
        &[
            Channel::new("EXG1", 256.0, vec![1.0; 1024]),
            Channel::new("Status", 256.0, vec![0.0; 1024]),
        ],
        1,
        Variant::Bdf,
    )?;
    let empty = decode(&idle, "EXG1", None, None);
    assert!(matches!(empty, Err(Error::EmptySignal { .. })));
    Ok(())
}

#[test]
fn test_single_channel_estimate() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("session.bdf");
    write_session(&path, 12)?;

    let rate = estimate(&decode(&path, "EXG3", None, None)?);
    assert!(rate.peaks.len() >= 15, "only {} peaks", rate.peaks.len());
    assert!((rate.average_bpm - 110.0).abs() < 0.5, "{}", rate.average_bpm);
    Ok(())
}

#[test]
fn test_sample_heart_rate() -> Result<()> {
    let root = tempfile::tempdir()?;
    let sample = SampleRecord::new(
        "Sessions/2",
        "Part_1_S_Trial1_emotion",
        "P1-Rec1-C1 trigger",
        12,
    );
    let path = sample.recording_path(root.path());
    fs::create_dir_all(path.parent().unwrap())?;
    write_session(&path, 12)?;

    let bpm = sample.estimate_heart_rate(root.path())?;
    assert!((bpm - 72.5).abs() < 0.5, "{bpm}");
    assert_eq!(estimate_heart_rate(&sample, root.path())?, bpm);

    let report = sample.explain(root.path(), &EstimatorConfig::default())?;
    assert_eq!(report.rule, Rule::ExcludeLast);
    let rates = report.rates();
    for (rate, expected) in rates.iter().zip([72.0, 73.0, 110.0]) {
        assert!((rate - expected).abs() < 0.5, "{rates:?}");
    }
    Ok(())
}

#[test]
fn test_sample_video_path() -> Result<()> {
    let root = tempfile::tempdir()?;
    let sample = SampleRecord::new("Sessions/4", "Part_2_S_Trial2_emotion", "P2-Rec1-C1", 30);
    assert!(matches!(
        sample.video_path(root.path()),
        Err(Error::NotFound(_))
    ));

    let expected = root.path().join("Sessions/4/P2-Rec1-C1.avi");
    fs::create_dir_all(expected.parent().unwrap())?;
    fs::write(&expected, b"")?;
    assert_eq!(sample.video_path(root.path())?, expected);
    Ok(())
}

#[test]
fn test_sample_missing_recording() {
    let root = tempfile::tempdir().unwrap();
    let sample = SampleRecord::new("Sessions/3", "absent", "absent", 0);
    assert!(matches!(
        sample.estimate_heart_rate(root.path()),
        Err(Error::NotFound(_))
    ));
}
