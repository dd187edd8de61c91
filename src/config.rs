use crate::ecg_process::RateBand;
use crate::qrs_detect::QrsConfig;
use crate::sensor_reconcile::AGREEMENT_BPM;

/// Name of the digital channel flagging when video capture was running.
pub const STATUS_CHANNEL: &str = "Status";

/// The three ECG sensors, in the order the reconciler expects them:
/// upper right chest, upper left chest, left abdomen.
pub const ECG_CHANNELS: [&str; 3] = ["EXG1", "EXG2", "EXG3"];

/// Knobs of the heart-rate estimation, with the values used to produce the
/// reference results as defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorConfig {
    pub channels: [String; 3],
    pub status_channel: String,
    pub band: RateBand,
    /// Two sensors agree when their estimates are closer than this, in bpm.
    pub agreement_bpm: f64,
    pub qrs: QrsConfig,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            channels: ECG_CHANNELS.map(String::from),
            status_channel: STATUS_CHANNEL.to_string(),
            band: RateBand::default(),
            agreement_bpm: AGREEMENT_BPM,
            qrs: QrsConfig::default(),
        }
    }
}
