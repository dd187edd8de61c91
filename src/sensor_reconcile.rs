//! Picking one heart rate out of three redundant ECG sensor estimates.

/// Default agreement threshold between two sensors, in bpm.
pub const AGREEMENT_BPM: f64 = 3.0;

/// Which branch of the reconciliation produced the consensus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Every sensor reported zero (or a non-finite value).
    NoSensor,
    SingleSensor,
    /// Two usable sensors that agree: their mean.
    PairAgrees,
    /// Two usable sensors that disagree: the lower one.
    PairDisagrees,
    /// All three agree: their mean.
    AllAgree,
    /// Sensors 0 and 1 agree, sensor 2 is excluded.
    ExcludeLast,
    /// Sensors 1 and 2 agree, sensor 0 is excluded.
    ExcludeFirst,
    /// No pair agrees: the median.
    Median,
}

/// Mean of finite, non-empty `values` that stays finite.
fn mean(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let sum: f64 = values.iter().sum();
    let mean = if sum.is_finite() {
        sum / n
    } else {
        values.iter().map(|v| v / n).sum()
    };
    // Near f64::MAX the scaled sum can still round past the inputs.
    mean.clamp(lo, hi)
}

/// A reading whose integer part is zero means the sensor could not
/// determine a rate.
fn is_usable(rate: f64) -> bool {
    rate.is_finite() && rate.trunc() != 0.0
}

/// Consensus of three sensor estimates with the default 3 bpm agreement.
pub fn reconcile(rates: [f64; 3]) -> f64 {
    reconcile_with(rates, AGREEMENT_BPM).0
}

/// Consensus of three sensor estimates and the rule that decided it.
///
/// Returns `0.0` when no sensor is usable. Never fails.
pub fn reconcile_with(rates: [f64; 3], agreement: f64) -> (f64, Rule) {
    let agree = |a: f64, b: f64| (a - b).abs() < agreement;
    let usable: Vec<f64> = rates.iter().cloned().filter(|&r| is_usable(r)).collect();

    match usable.as_slice() {
        [] => (0.0, Rule::NoSensor),
        [only] => (*only, Rule::SingleSensor),
        [a, b] if agree(*a, *b) => (mean(&usable), Rule::PairAgrees),
        [a, b] => (a.min(*b), Rule::PairDisagrees),
        _ => {
            // Sensors 0 and 2 are never compared directly.
            let r01 = agree(rates[0], rates[1]);
            let r12 = agree(rates[1], rates[2]);
            match (r01, r12) {
                (true, true) => (mean(&rates), Rule::AllAgree),
                (true, false) => (mean(&rates[..2]), Rule::ExcludeLast),
                (false, true) => (mean(&rates[1..]), Rule::ExcludeFirst),
                (false, false) => {
                    let mut sorted = rates;
                    sorted.sort_by(f64::total_cmp);
                    (sorted[1], Rule::Median)
                }
            }
        }
    }
}
