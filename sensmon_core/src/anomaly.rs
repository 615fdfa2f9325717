//! Baseline-relative deviation of each channel.
//!
//! Pure functions over an acquisition snapshot. A channel is compared with
//! its share of the battery current; deviations are not trusted while the
//! channels carry very little current overall, except for a single channel
//! that is clearly loaded on its own.

use crate::acquisition::Snapshot;
use crate::config::{AnomalyCfg, ThresholdCfg};

/// Deviation of one channel from its baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub channel_id: String,
    /// Percent, always >= 0.
    pub deviation_percent: f64,
    /// Threshold the deviation is to be checked against.
    pub threshold: f64,
    /// True when the low-activity override forced 100%.
    pub forced: bool,
}

impl Evaluation {
    pub fn exceeds(&self) -> bool {
        self.deviation_percent > self.threshold
    }
}

/// `|value - baseline| / |baseline| * 100`; a zero baseline gives 0.
pub fn deviation_percent(value: f64, baseline: f64) -> f64 {
    if baseline == 0.0 {
        return 0.0;
    }
    (value - baseline).abs() / baseline.abs() * 100.0
}

/// Mean |value| across channels that currently expose a value.
pub fn aggregate_magnitude(snapshot: &Snapshot) -> Option<f64> {
    let (sum, n) = snapshot
        .values()
        .filter_map(|c| c.value)
        .fold((0.0, 0_u32), |(sum, n), v| (sum + v.abs(), n + 1));
    (n > 0).then(|| sum / f64::from(n))
}

/// Evaluate every channel of `snapshot` in id order.
///
/// Channels with a threshold of 0 or without a value are skipped. While the
/// aggregate magnitude is below `low_activity_cutoff` a channel is skipped
/// unless its own |value| exceeds `high_magnitude_cutoff`, which forces 100%.
pub fn evaluate(snapshot: &Snapshot, thresholds: &ThresholdCfg, cfg: &AnomalyCfg) -> Vec<Evaluation> {
    let Some(aggregate) = aggregate_magnitude(snapshot) else {
        return Vec::new();
    };
    let low_activity = aggregate < cfg.low_activity_cutoff;

    snapshot
        .iter()
        .filter_map(|(id, ch)| {
            let threshold = thresholds.diff_threshold(id);
            if threshold == 0.0 {
                return None;
            }
            let value = ch.value?;
            if low_activity {
                if value.abs() > cfg.high_magnitude_cutoff {
                    tracing::debug!(channel = %id, value, aggregate, "low activity but channel loaded; forcing deviation");
                    return Some(Evaluation {
                        channel_id: id.clone(),
                        deviation_percent: 100.0,
                        threshold,
                        forced: true,
                    });
                }
                return None;
            }
            Some(Evaluation {
                channel_id: id.clone(),
                deviation_percent: deviation_percent(value, ch.baseline),
                threshold,
                forced: false,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::ChannelSnapshot;

    fn snap(entries: &[(&str, Option<f64>, f64)]) -> Snapshot {
        entries
            .iter()
            .map(|&(id, value, baseline)| {
                (
                    id.to_string(),
                    ChannelSnapshot {
                        value,
                        quality: if value.is_some() { 100.0 } else { 0.0 },
                        baseline,
                        reference_voltage: 12.6,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn deviation_basics() {
        assert_eq!(deviation_percent(6.0, 4.0), 50.0);
        assert_eq!(deviation_percent(2.0, 4.0), 50.0);
        assert_eq!(deviation_percent(4.0, 0.0), 0.0);
        assert_eq!(deviation_percent(-6.0, -4.0), 50.0);
    }

    #[test]
    fn aggregate_ignores_missing_values() {
        let s = snap(&[("1", Some(-4.0), 4.0), ("2", None, 4.0), ("3", Some(2.0), 4.0)]);
        assert_eq!(aggregate_magnitude(&s), Some(3.0));
        assert_eq!(aggregate_magnitude(&snap(&[("1", None, 0.0)])), None);
    }

    #[test]
    fn evaluates_in_id_order() {
        let s = snap(&[("2", Some(4.0), 4.0), ("1", Some(6.0), 4.0)]);
        let ev = evaluate(&s, &ThresholdCfg::default(), &AnomalyCfg::default());
        let ids: Vec<_> = ev.iter().map(|e| e.channel_id.as_str()).collect();
        assert_eq!(ids, ["1", "2"]);
        assert_eq!(ev[0].deviation_percent, 50.0);
        assert_eq!(ev[1].deviation_percent, 0.0);
        assert!(!ev[0].exceeds());
    }
}
