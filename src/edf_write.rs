use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::edf_read::Variant;
use crate::error::{Error, Result};
use crate::recording::Channel;

/// Write a space-padded ASCII field of exact width.
fn write_field<W: Write>(out: &mut W, value: &str, width: usize) -> Result<()> {
    let mut buf = value.as_bytes().to_vec();
    buf.resize(width, b' '); // right-pad with spaces
    buf.truncate(width); // ensure exact width
    out.write_all(&buf)?;
    Ok(())
}

fn digital_range(variant: Variant) -> (i32, i32) {
    match variant {
        Variant::Bdf => (-8_388_608, 8_388_607),
        Variant::Edf => (-32768, 32767),
    }
}

/// Convert a physical value to a digital value of the variant's width.
fn physical_to_digital(value: f64, phys_min: f64, phys_max: f64, variant: Variant) -> i32 {
    let (dig_min, dig_max) = digital_range(variant);
    let (dig_min, dig_max) = (dig_min as f64, dig_max as f64);
    let scaled = dig_min + (value - phys_min) / (phys_max - phys_min) * (dig_max - dig_min);
    scaled.round().clamp(dig_min, dig_max) as i32
}

fn write_sample<W: Write>(out: &mut W, digital: i32, variant: Variant) -> Result<()> {
    let bytes = digital.to_le_bytes();
    match variant {
        Variant::Bdf => out.write_all(&bytes[..3])?,
        Variant::Edf => out.write_all(&bytes[..2])?,
    }
    Ok(())
}

/// Build EDF+ TAL (Time-stamped Annotation List) bytes for a data record.
fn make_annotation_bytes(onset_seconds: usize, annotation_samples: usize) -> Vec<u8> {
    let tal = format!("+{}\x14\x14", onset_seconds);
    let mut bytes = tal.into_bytes();
    let total_bytes = annotation_samples * 2;
    bytes.resize(total_bytes, 0); // null-pad to fill annotation channel
    bytes
}

/// Per-channel layout worked out before anything is written.
struct ChannelLayout {
    samples_per_record: usize,
    phys_min: String,
    phys_max: String,
}

impl ChannelLayout {
    fn new(channel: &Channel, record_duration: usize) -> Result<Self> {
        let per_record = channel.sample_frequency * record_duration as f64;
        if per_record < 1.0 || per_record.fract() != 0.0 {
            return Err(Error::Format(format!(
                "channel `{}' at {} Hz does not fill a {}s record with whole samples",
                channel.label, channel.sample_frequency, record_duration
            )));
        }

        // Physical range with margin, so rounding in the 8-char field keeps
        // every sample inside it.
        let min = channel.samples.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = channel
            .samples
            .iter()
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        let (min, max) = if min.is_finite() && max.is_finite() {
            (min - 0.1, max + 0.1)
        } else {
            (-1.0, 1.0)
        };

        Ok(Self {
            samples_per_record: per_record as usize,
            phys_min: format_edf_num(min),
            phys_max: format_edf_num(max),
        })
    }

    /// The physical range exactly as a reader will parse it back.
    fn physical_range(&self) -> (f64, f64) {
        let min = self.phys_min.parse().unwrap_or(-1.0);
        let max = self.phys_max.parse().unwrap_or(1.0);
        (min, max)
    }
}

/// Write `channels` as a BDF or EDF+ file.
///
/// Every channel's frequency times `record_duration` must be a whole number of
/// samples. Shorter channels are zero-padded to the last data record. EDF+
/// output gets a trailing `EDF Annotations` signal carrying record onsets.
pub fn write_recording(
    path: impl AsRef<Path>,
    channels: &[Channel],
    record_duration: usize,
    variant: Variant,
) -> Result<()> {
    let layouts = channels
        .iter()
        .map(|c| ChannelLayout::new(c, record_duration))
        .collect::<Result<Vec<_>>>()?;

    let n_records = channels
        .iter()
        .zip(&layouts)
        .map(|(c, l)| c.samples.len().div_ceil(l.samples_per_record))
        .max()
        .unwrap_or(0);
    let annotation_samples: usize = 57; // matches pyedflib default
    let with_annotations = variant == Variant::Edf;
    let n_signals = channels.len() + usize::from(with_annotations);
    let header_bytes = 256 + n_signals * 256;
    let (dig_min, dig_max) = digital_range(variant);

    let mut file = BufWriter::new(File::create(path)?);

    // === Main header (256 bytes) ===
    match variant {
        Variant::Bdf => {
            file.write_all(&[0xFF])?;
            write_field(&mut file, "BIOSEMI", 7)?;
        }
        Variant::Edf => write_field(&mut file, "0", 8)?,
    }
    write_field(&mut file, "X X X X", 80)?; // patient ID (EDF+)
    write_field(&mut file, "Startdate X X X X", 80)?; // recording ID
    write_field(&mut file, "01.01.85", 8)?; // start date
    write_field(&mut file, "00.00.00", 8)?; // start time
    write_field(&mut file, &header_bytes.to_string(), 8)?; // header size
    match variant {
        Variant::Bdf => write_field(&mut file, "24BIT", 44)?,
        Variant::Edf => write_field(&mut file, "EDF+C", 44)?, // EDF+ continuous
    }
    write_field(&mut file, &n_records.to_string(), 8)?; // num data records
    write_field(&mut file, &record_duration.to_string(), 8)?; // record duration
    write_field(&mut file, &n_signals.to_string(), 4)?; // num signals

    // === Signal headers (interleaved: all labels, then all transducers, etc.) ===
    let annotation = |file: &mut BufWriter<File>, value: &str, width: usize| -> Result<()> {
        if with_annotations {
            write_field(file, value, width)?;
        }
        Ok(())
    };

    for channel in channels {
        write_field(&mut file, &channel.label, 16)?;
    }
    annotation(&mut file, "EDF Annotations", 16)?;

    for _ in channels {
        write_field(&mut file, "Active electrode", 80)?;
    }
    annotation(&mut file, "", 80)?;

    for _ in channels {
        write_field(&mut file, "uV", 8)?;
    }
    annotation(&mut file, "", 8)?;

    for layout in &layouts {
        write_field(&mut file, &layout.phys_min, 8)?;
    }
    annotation(&mut file, "-1", 8)?;

    for layout in &layouts {
        write_field(&mut file, &layout.phys_max, 8)?;
    }
    annotation(&mut file, "1", 8)?;

    for _ in channels {
        write_field(&mut file, &dig_min.to_string(), 8)?;
    }
    annotation(&mut file, "-32768", 8)?;

    for _ in channels {
        write_field(&mut file, &dig_max.to_string(), 8)?;
    }
    annotation(&mut file, "32767", 8)?;

    for _ in channels {
        write_field(&mut file, "", 80)?;
    }
    annotation(&mut file, "", 80)?;

    for layout in &layouts {
        write_field(&mut file, &layout.samples_per_record.to_string(), 8)?;
    }
    annotation(&mut file, &annotation_samples.to_string(), 8)?;

    for _ in channels {
        write_field(&mut file, "", 32)?;
    }
    annotation(&mut file, "", 32)?;

    // === Data records ===
    for rec in 0..n_records {
        for (channel, layout) in channels.iter().zip(&layouts) {
            let (phys_min, phys_max) = layout.physical_range();
            let start = rec * layout.samples_per_record;
            for i in 0..layout.samples_per_record {
                let phys_val = channel.samples.get(start + i).copied().unwrap_or(0.0);
                let dig_val = physical_to_digital(phys_val, phys_min, phys_max, variant);
                write_sample(&mut file, dig_val, variant)?;
            }
        }

        if with_annotations {
            let annotation_bytes = make_annotation_bytes(rec * record_duration, annotation_samples);
            file.write_all(&annotation_bytes)?;
        }
    }

    file.flush()?;
    Ok(())
}

/// Format a floating point number for an EDF header field (max 8 chars).
fn format_edf_num(val: f64) -> String {
    // Try full precision, progressively reduce if too long
    for precision in (0..=6).rev() {
        let s = format!("{:.prec$}", val, prec = precision);
        if s.len() <= 8 {
            return s;
        }
    }
    format!("{:.0}", val)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edf_read::EdfReader;
    use crate::recording::Recording;

    #[test]
    fn test_format_edf_num() {
        assert_eq!(format_edf_num(-0.1), "-0.10000");
        assert_eq!(format_edf_num(1234.56789), "1234.568");
        assert_eq!(format_edf_num(-1000000.1), "-1000000");
    }

    #[test]
    fn test_rejects_fractional_record() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Channel::new("EXG1", 100.5, vec![0.0; 10]);
        let err = write_recording(dir.path().join("x.bdf"), &[channel], 1, Variant::Bdf).err();
        assert!(matches!(err, Some(Error::Format(_))));
    }

    #[test]
    fn test_edf_plus_carries_annotations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecg.edf");
        let samples: Vec<f64> = (0..300).map(|i| (i as f64 * 0.1).sin()).collect();
        write_recording(&path, &[Channel::new("EKG I", 100.0, samples.clone())], 1, Variant::Edf)
            .unwrap();

        let mut reader = EdfReader::open(&path).unwrap();
        assert_eq!(reader.labels(), ["EKG I", "EDF Annotations"]);
        assert_eq!(reader.header().variant, Variant::Edf);
        let back = reader.read(0, 0, 300).unwrap();
        for (a, b) in samples.iter().zip(&back) {
            assert!((a - b).abs() < 1e-3, "{a} vs {b}");
        }
    }
}
