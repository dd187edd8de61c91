//! Reading BDF (BioSemi 24-bit) and EDF/EDF+ (16-bit) recordings.
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use log::debug;

use crate::error::{Error, Result};
use crate::recording::Recording;

/// Sample encoding of the data records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// BioSemi Data Format, 24-bit little-endian samples.
    Bdf,
    /// European Data Format (and EDF+), 16-bit little-endian samples.
    Edf,
}

impl Variant {
    pub fn sample_width(self) -> usize {
        match self {
            Variant::Bdf => 3,
            Variant::Edf => 2,
        }
    }
}

/// Per-signal header fields needed to decode samples.
#[derive(Debug, Clone)]
pub struct SignalHeader {
    pub label: String,
    pub physical_dimension: String,
    pub physical_min: f64,
    pub physical_max: f64,
    pub digital_min: f64,
    pub digital_max: f64,
    pub samples_per_record: usize,
}

impl SignalHeader {
    fn gain(&self) -> f64 {
        (self.physical_max - self.physical_min) / (self.digital_max - self.digital_min)
    }

    /// Map a stored digital value to its physical value.
    pub fn to_physical(&self, digital: i32) -> f64 {
        self.physical_min + (digital as f64 - self.digital_min) * self.gain()
    }
}

#[derive(Debug, Clone)]
pub struct Header {
    pub variant: Variant,
    pub header_bytes: u64,
    pub num_records: usize,
    pub record_duration: f64,
    pub signals: Vec<SignalHeader>,
}

impl Header {
    /// Bytes taken by one data record across all signals.
    ///
    /// Headers from [`EdfReader`] are checked so that this and every data
    /// offset fit their types.
    pub fn record_bytes(&self) -> u64 {
        let samples: usize = self.signals.iter().map(|s| s.samples_per_record).sum();
        (samples * self.variant.sample_width()) as u64
    }

    /// Byte offset of signal `index` inside a data record.
    fn signal_offset(&self, index: usize) -> u64 {
        let samples: usize = self.signals[..index]
            .iter()
            .map(|s| s.samples_per_record)
            .sum();
        (samples * self.variant.sample_width()) as u64
    }
}

/// Pull a fixed-width ASCII field out of a header block.
fn take_field<R: Read>(reader: &mut R, width: usize) -> Result<String> {
    let mut buf = vec![0u8; width];
    reader.read_exact(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).trim().to_string())
}

fn parse_num<T: std::str::FromStr>(value: &str, field: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Format(format!("{field} is not a number: `{value}'")))
}

fn read_header<R: Read + Seek>(reader: &mut R) -> Result<Header> {
    let mut version = [0u8; 8];
    reader.read_exact(&mut version)?;
    let variant = if version[0] == 0xFF && &version[1..] == b"BIOSEMI" {
        Variant::Bdf
    } else if version[0] == b'0' {
        Variant::Edf
    } else {
        return Err(Error::Format(format!("unknown version field {version:?}")));
    };

    let _patient = take_field(reader, 80)?;
    let _recording = take_field(reader, 80)?;
    let _start_date = take_field(reader, 8)?;
    let _start_time = take_field(reader, 8)?;
    let header_bytes: u64 = parse_num(&take_field(reader, 8)?, "header size")?;
    let _reserved = take_field(reader, 44)?;
    let num_records: i64 = parse_num(&take_field(reader, 8)?, "number of records")?;
    let record_duration: f64 = parse_num(&take_field(reader, 8)?, "record duration")?;
    let num_signals: usize = parse_num(&take_field(reader, 4)?, "number of signals")?;

    if header_bytes != 256 + 256 * num_signals as u64 {
        return Err(Error::Format(format!(
            "header size {header_bytes} does not match {num_signals} signals"
        )));
    }
    if record_duration <= 0.0 {
        return Err(Error::Format(format!(
            "record duration must be positive, got {record_duration}"
        )));
    }

    // Signal headers are stored field by field: all labels, then all
    // transducers, and so on.
    let mut columns = |width: usize| -> Result<Vec<String>> {
        (0..num_signals)
            .map(|_| take_field(&mut *reader, width))
            .collect()
    };
    let labels = columns(16)?;
    let _transducers = columns(80)?;
    let dimensions = columns(8)?;
    let phys_min = columns(8)?;
    let phys_max = columns(8)?;
    let dig_min = columns(8)?;
    let dig_max = columns(8)?;
    let _prefilter = columns(80)?;
    let samples = columns(8)?;
    let _reserved = columns(32)?;

    let mut signals = Vec::with_capacity(num_signals);
    for i in 0..num_signals {
        let signal = SignalHeader {
            label: labels[i].clone(),
            physical_dimension: dimensions[i].clone(),
            physical_min: parse_num(&phys_min[i], "physical minimum")?,
            physical_max: parse_num(&phys_max[i], "physical maximum")?,
            digital_min: parse_num(&dig_min[i], "digital minimum")?,
            digital_max: parse_num(&dig_max[i], "digital maximum")?,
            samples_per_record: parse_num(&samples[i], "samples per record")?,
        };
        if signal.digital_max <= signal.digital_min {
            return Err(Error::Format(format!(
                "signal `{}' has an empty digital range",
                signal.label
            )));
        }
        signals.push(signal);
    }

    let mut header = Header {
        variant,
        header_bytes,
        num_records: 0,
        record_duration,
        signals,
    };

    // Record layout first, then again once the record count is known.
    check_sizes(&header)?;
    // EDF allows -1 records while a recording is still being written.
    header.num_records = if num_records < 0 {
        let file_len = reader.seek(SeekFrom::End(0))?;
        let record_bytes = header.record_bytes().max(1);
        (file_len.saturating_sub(header_bytes) / record_bytes) as usize
    } else {
        num_records as usize
    };

    check_sizes(&header)?;
    Ok(header)
}

/// Reject headers whose sample counts or data size overflow.
fn check_sizes(header: &Header) -> Result<()> {
    let overflow = || Error::Format("declared data size overflows".to_string());
    let width = header.variant.sample_width();
    let mut record_samples: usize = 0;
    for signal in &header.signals {
        signal
            .samples_per_record
            .checked_mul(header.num_records)
            .ok_or_else(overflow)?;
        record_samples = record_samples
            .checked_add(signal.samples_per_record)
            .ok_or_else(overflow)?;
    }
    let record_bytes = record_samples.checked_mul(width).ok_or_else(overflow)? as u64;
    record_bytes
        .checked_mul(header.num_records as u64)
        .and_then(|data| data.checked_add(header.header_bytes))
        .ok_or_else(overflow)?;
    Ok(())
}

/// Decode one little-endian two's-complement sample of `width` bytes.
fn decode_sample(bytes: &[u8], width: usize) -> i32 {
    match width {
        3 => {
            let raw = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]);
            (raw << 8) >> 8
        }
        _ => i16::from_le_bytes([bytes[0], bytes[1]]) as i32,
    }
}

pub struct EdfReader<R> {
    reader: R,
    header: Header,
    labels: Vec<String>,
}

impl EdfReader<BufReader<File>> {
    /// Open the recording at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        let file = File::open(path)?;
        let reader = Self::from_reader(BufReader::new(file))?;
        debug!(
            "opened {} ({:?}, {} signals, {} records)",
            path.display(),
            reader.header.variant,
            reader.header.signals.len(),
            reader.header.num_records
        );
        Ok(reader)
    }
}

impl<R> EdfReader<R>
where
    R: Read + Seek,
{
    pub fn from_reader(mut reader: R) -> Result<Self> {
        reader.seek(SeekFrom::Start(0))?;
        let header = read_header(&mut reader)?;
        let labels = header.signals.iter().map(|s| s.label.clone()).collect();
        Ok(Self {
            reader,
            header,
            labels,
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }
}

impl<R> Recording for EdfReader<R>
where
    R: Read + Seek,
{
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn sample_frequency(&self, index: usize) -> f64 {
        self.header.signals[index].samples_per_record as f64 / self.header.record_duration
    }

    fn samples_in_file(&self, index: usize) -> usize {
        self.header.signals[index].samples_per_record * self.header.num_records
    }

    fn read(&mut self, index: usize, start: usize, count: usize) -> Result<Vec<f64>> {
        let available = self.samples_in_file(index);
        let end = match start.checked_add(count) {
            Some(end) if end <= available => end,
            _ => {
                return Err(Error::OutOfRange {
                    channel: index,
                    start,
                    end: start.saturating_add(count),
                    available,
                });
            }
        };

        let width = self.header.variant.sample_width();
        let signal = &self.header.signals[index];
        let per_record = signal.samples_per_record;
        let record_bytes = self.header.record_bytes();
        let offset = self.header.signal_offset(index);

        let mut out = Vec::with_capacity(count);
        let mut buf = Vec::new();
        let mut pos = start;
        while pos < end {
            let record = pos / per_record;
            let first = pos % per_record;
            let take = (per_record - first).min(end - pos);

            let at = self.header.header_bytes
                + record as u64 * record_bytes
                + offset
                + (first * width) as u64;
            self.reader.seek(SeekFrom::Start(at))?;
            buf.resize(take * width, 0);
            self.reader.read_exact(&mut buf)?;

            out.extend(
                buf.chunks_exact(width)
                    .map(|b| signal.to_physical(decode_sample(b, width))),
            );
            pos += take;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_sample_24bit_sign() {
        assert_eq!(decode_sample(&[0xFF, 0xFF, 0xFF], 3), -1);
        assert_eq!(decode_sample(&[0x00, 0x00, 0x80], 3), -8_388_608);
        assert_eq!(decode_sample(&[0xFF, 0xFF, 0x7F], 3), 8_388_607);
        assert_eq!(decode_sample(&[0x01, 0x00], 2), 1);
        assert_eq!(decode_sample(&[0x00, 0x80], 2), -32768);
    }

    #[test]
    fn test_to_physical() {
        let signal = SignalHeader {
            label: "EXG1".into(),
            physical_dimension: "uV".into(),
            physical_min: -262144.0,
            physical_max: 262143.0,
            digital_min: -8388608.0,
            digital_max: 8388607.0,
            samples_per_record: 256,
        };
        assert!((signal.to_physical(-8388608) - -262144.0).abs() < 1e-9);
        assert!((signal.to_physical(8388607) - 262143.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_unknown_version() {
        let bytes = vec![b'X'; 512];
        let err = EdfReader::from_reader(std::io::Cursor::new(bytes)).err();
        assert!(matches!(err, Some(Error::Format(_))));
    }

    /// A header block with `signals` identical signals and no data records
    /// behind it.
    fn header_block(num_records: &str, signals: usize, samples_per_record: &str) -> Vec<u8> {
        fn field(out: &mut Vec<u8>, value: &str, width: usize) {
            out.extend(format!("{value:<width$}").bytes());
        }
        let mut out = vec![0xFF];
        out.extend(b"BIOSEMI");
        field(&mut out, "", 80 + 80 + 8 + 8);
        field(&mut out, &(256 + 256 * signals).to_string(), 8);
        field(&mut out, "24BIT", 44);
        field(&mut out, num_records, 8);
        field(&mut out, "1", 8);
        field(&mut out, &signals.to_string(), 4);
        for (value, width) in [
            ("EXG1", 16),
            ("", 80),
            ("uV", 8),
            ("-262144", 8),
            ("262143", 8),
            ("-8388608", 8),
            ("8388607", 8),
            ("", 80),
            (samples_per_record, 8),
            ("", 32),
        ] {
            for _ in 0..signals {
                field(&mut out, value, width);
            }
        }
        out
    }

    #[test]
    fn test_header_without_data() {
        let reader =
            EdfReader::from_reader(std::io::Cursor::new(header_block("2", 1, "256"))).unwrap();
        assert_eq!(reader.header().record_bytes(), 768);
        assert_eq!(reader.samples_in_file(0), 512);
    }

    #[test]
    fn test_rejects_overflowing_data_size() {
        let block = header_block("99999999", 9999, "99999999");
        let err = EdfReader::from_reader(std::io::Cursor::new(block)).err();
        assert!(matches!(err, Some(Error::Format(_))));
    }

    #[test]
    fn test_read_past_usize_is_out_of_range() {
        let mut reader =
            EdfReader::from_reader(std::io::Cursor::new(header_block("2", 1, "256"))).unwrap();
        assert!(matches!(
            reader.read(0, usize::MAX, 2),
            Err(Error::OutOfRange { end: usize::MAX, .. })
        ));
        assert!(matches!(
            reader.read(0, 500, 13),
            Err(Error::OutOfRange { end: 513, available: 512, .. })
        ));
    }

    #[test]
    fn test_open_missing_file() {
        let err = EdfReader::open("/nonexistent/Part_1_S_Trial1_emotion.bdf").err();
        assert!(matches!(err, Some(Error::NotFound(_))));
    }
}
