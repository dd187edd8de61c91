use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use pico_args::Arguments;

use hci_heartrate::channel_extract::{active_window, decode};
use hci_heartrate::config::{EstimatorConfig, ECG_CHANNELS, STATUS_CHANNEL};
use hci_heartrate::edf_read::{EdfReader, Variant};
use hci_heartrate::edf_write::write_recording;
use hci_heartrate::recording::{Channel, Recording};
use hci_heartrate::sample::SampleRecord;

const HELP: &str = "\
hci-heartrate: heart rate of HCI-Tagging samples from their ECG sensors

USAGE:
  hci-heartrate channels <FILE>
  hci-heartrate window <FILE>
  hci-heartrate decode <FILE> <CHANNEL> [--start SECS] [--end SECS]
  hci-heartrate estimate --root DIR --basedir DIR --stem STEM [--video STEM]
                         [--agreement BPM]
  hci-heartrate explain --root DIR --basedir DIR --stem STEM [--video STEM]
                        [--agreement BPM]
  hci-heartrate synth <FILE> [--bpm A,B,C] [--seconds N]

--video checks that the session's video exists before estimating.

Set RUST_LOG=debug for details on windows and per-channel estimates.
";

fn main() -> Result<()> {
    env_logger::init();

    let mut args = Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        print!("{HELP}");
        return Ok(());
    }

    match args.subcommand()?.as_deref() {
        Some("channels") => channels(args),
        Some("window") => window(args),
        Some("decode") => decode_channel(args),
        Some("estimate") => estimate(args, false),
        Some("explain") => estimate(args, true),
        Some("synth") => synth(args),
        Some(other) => Err(anyhow!("unknown command `{other}'\n\n{HELP}")),
        None => {
            print!("{HELP}");
            Ok(())
        }
    }
}

fn finish(args: Arguments) -> Result<()> {
    let rest = args.finish();
    if !rest.is_empty() {
        bail!("unexpected arguments: {rest:?}");
    }
    Ok(())
}

fn channels(mut args: Arguments) -> Result<()> {
    let path: PathBuf = args.free_from_str()?;
    finish(args)?;

    let reader = EdfReader::open(&path)?;
    println!("{} ({:?})", path.display(), reader.header().variant);
    for (i, label) in reader.labels().iter().enumerate() {
        println!(
            "{:>3} {:<16} {:>8.1} Hz {:>10} samples",
            i,
            label,
            reader.sample_frequency(i),
            reader.samples_in_file(i)
        );
    }
    Ok(())
}

fn window(mut args: Arguments) -> Result<()> {
    let path: PathBuf = args.free_from_str()?;
    finish(args)?;

    let mut reader = EdfReader::open(&path)?;
    let window = active_window(&mut reader, STATUS_CHANNEL)?;
    let index = reader.channel_index(STATUS_CHANNEL)?;
    let fs = reader.sample_frequency(index);
    println!(
        "Video window: samples [{}, {}] ({:.2}s to {:.2}s at {} Hz)",
        window.start,
        window.end,
        window.start as f64 / fs,
        window.end as f64 / fs,
        fs
    );
    Ok(())
}

fn decode_channel(mut args: Arguments) -> Result<()> {
    let start: Option<f64> = args.opt_value_from_str("--start")?;
    let end: Option<f64> = args.opt_value_from_str("--end")?;
    let path: PathBuf = args.free_from_str()?;
    let channel: String = args.free_from_str()?;
    finish(args)?;

    let waveform = decode(&path, &channel, start, end)?;
    let min_v = waveform.samples().iter().cloned().fold(f64::INFINITY, f64::min);
    let max_v = waveform
        .samples()
        .iter()
        .cloned()
        .fold(f64::NEG_INFINITY, f64::max);

    println!("Channel: {}", channel);
    println!("Samples: {}", waveform.len());
    println!("Duration: {:.2} seconds", waveform.duration());
    println!("Sampling rate: {} Hz", waveform.sample_frequency());
    println!("Range: [{:.3}, {:.3}]", min_v, max_v);
    Ok(())
}

fn estimate(mut args: Arguments, verbose: bool) -> Result<()> {
    let root: PathBuf = args.value_from_str("--root")?;
    let basedir: PathBuf = args.value_from_str("--basedir")?;
    let stem: String = args.value_from_str("--stem")?;
    let video: Option<String> = args.opt_value_from_str("--video")?;
    let agreement: Option<f64> = args.opt_value_from_str("--agreement")?;
    finish(args)?;

    let mut config = EstimatorConfig::default();
    if let Some(agreement) = agreement {
        config.agreement_bpm = agreement;
    }

    let sample = SampleRecord::new(basedir, stem, video.clone().unwrap_or_default(), 0);
    let video_path = match video {
        Some(_) => Some(sample.video_path(&root)?),
        None => None,
    };
    let report = sample
        .explain(&root, &config)
        .with_context(|| format!("estimating heart rate of {}", sample.key()))?;

    if verbose {
        if let Some(path) = &video_path {
            println!("Video: {}", path.display());
        }
        for channel in &report.channels {
            println!(
                "{:<6} {:>4} peaks  {:>7.2} bpm  ({} Hz)",
                channel.channel,
                channel.estimate.peaks.len(),
                channel.estimate.average_bpm,
                channel.sample_frequency
            );
        }
        println!("Rule: {:?}", report.rule);
    }
    println!("{:.2}", report.consensus_bpm);
    Ok(())
}

/// Gaussian QRS-like pulses at `bpm`, starting one second in.
fn synthetic_ecg(fs: f64, n: usize, bpm: f64) -> Vec<f64> {
    let interval = (60.0 * fs / bpm).round().max(1.0) as usize;
    let sigma = 0.008 * fs;
    let half = (4.0 * sigma) as usize;
    let mut signal = vec![0.0; n];
    let mut centre = fs as usize;
    while centre + half < n {
        for k in centre.saturating_sub(half)..=centre + half {
            let t = (k as f64 - centre as f64) / sigma;
            signal[k] += 1000.0 * (-0.5 * t * t).exp();
        }
        centre += interval;
    }
    signal
}

fn synth(mut args: Arguments) -> Result<()> {
    let bpm: Option<String> = args.opt_value_from_str("--bpm")?;
    let seconds: usize = args.opt_value_from_str("--seconds")?.unwrap_or(30);
    let path: PathBuf = args.free_from_str()?;
    finish(args)?;

    let sample_rate: usize = 256;
    let rates: Vec<f64> = bpm
        .as_deref()
        .unwrap_or("72,73,110")
        .split(',')
        .map(|s| s.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .context("--bpm expects three comma separated numbers")?;
    if seconds < 3 {
        bail!("--seconds must be at least 3, got {seconds}");
    }
    if rates.len() != ECG_CHANNELS.len() || rates.iter().any(|r| *r <= 0.0) {
        bail!("--bpm expects three positive rates, got {:?}", rates);
    }

    let fs = sample_rate as f64;
    let n = sample_rate * seconds;
    // Video runs from the first to the last second.
    let status = (0..n)
        .map(|i| if i >= sample_rate && i < n - sample_rate { 1.0 } else { 0.0 })
        .collect();

    let mut channels: Vec<Channel> = ECG_CHANNELS
        .iter()
        .zip(&rates)
        .map(|(label, bpm)| Channel::new(*label, fs, synthetic_ecg(fs, n, *bpm)))
        .collect();
    channels.push(Channel::new(STATUS_CHANNEL, fs, status));

    write_recording(&path, &channels, 1, Variant::Bdf)?;

    let file_size = std::fs::metadata(&path)?.len();
    println!("BDF file written: {}", path.display());
    println!("File size: {} bytes", file_size);
    Ok(())
}
