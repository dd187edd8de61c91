//! Average heart rate of HCI-Tagging samples from their ECG sensors.
//!
//! Each sample pairs a face video with a BDF physiology recording. The three
//! ECG channels are cut to the stretch during which the video was running
//! (marked on the `Status` channel), each is run through a QRS detector to
//! get an average rate, and the three rates are reconciled into one value.

pub mod channel_extract;
pub mod config;
pub mod ecg_process;
pub mod edf_read;
pub mod edf_write;
pub mod error;
pub mod qrs_detect;
pub mod recording;
pub mod sample;
pub mod sensor_reconcile;

pub use channel_extract::{decode, ActiveWindow};
pub use config::EstimatorConfig;
pub use ecg_process::{estimate, PeakSet, RateEstimate, Waveform};
pub use error::{Error, Result};
pub use recording::Recording;
pub use sample::{estimate_heart_rate, HeartRateReport, SampleRecord};
pub use sensor_reconcile::reconcile;
