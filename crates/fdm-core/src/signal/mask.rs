//! Length ("binarate") and ripple-trim masks.

use super::Signal;
use crate::error::{Error, Result};
use crate::util::nearest_power_of_two;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Which part of the signal a power-of-two length mask keeps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BinarateMode {
    /// Keep the prefix
    Start,
    /// Keep a centered subsequence
    #[default]
    Middle,
    /// Keep the suffix
    End,
}

impl FromStr for BinarateMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "start" => Ok(BinarateMode::Start),
            "middle" | "center" => Ok(BinarateMode::Middle),
            "end" => Ok(BinarateMode::End),
            _ => Err(Error::invalid(format!(
                "unknown binarate mode `{s}`; use start, middle, or end"
            ))),
        }
    }
}

impl fmt::Display for BinarateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinarateMode::Start => "start",
            BinarateMode::Middle => "middle",
            BinarateMode::End => "end",
        };
        f.write_str(s)
    }
}

/// Boolean mask selecting a power-of-two-length run `[start, stop)`
#[derive(Debug, Clone, PartialEq)]
pub struct LengthMask {
    pub mask: Vec<bool>,
    pub start: usize,
    pub stop: usize,
    pub mode: BinarateMode,
}

impl LengthMask {
    /// Number of kept samples
    pub fn kept(&self) -> usize {
        self.stop - self.start
    }
}

/// Boolean mask dropping `dead_samples` from each end of an axis
#[derive(Debug, Clone, PartialEq)]
pub struct RippleMask {
    pub mask: Vec<bool>,
    pub dead_samples: usize,
    pub dead_time_target: f64,
    pub dead_time_actual: f64,
}

/// `[start, stop)` mask over `n` indices
fn range_mask(n: usize, start: usize, stop: usize) -> Vec<bool> {
    (0..n).map(|i| i >= start && i < stop).collect()
}

impl Signal {
    /// Mask the signal down to the largest power-of-two length not exceeding
    /// its current length.
    ///
    /// The original samples and time axis are retained; the masked time axis
    /// is stored alongside them.
    pub fn binarate(&mut self, mode: BinarateMode) -> Result<&LengthMask> {
        let n = self.samples.len();
        let n2 = nearest_power_of_two(n);
        let (start, stop) = match mode {
            BinarateMode::Start => (0, n2),
            BinarateMode::Middle => {
                let start = (n - n2) / 2;
                (start, start + n2)
            }
            BinarateMode::End => (n - n2, n),
        };

        let mask = range_mask(n, start, stop);
        self.time_masked = Some(self.time[start..stop].to_vec());
        self.report.push(format!(
            "Make a mask to truncate the signal to {n2} points (a power of two), \
             keeping the {mode} of the record. The truncated array starts at point \
             {start} and stops before point {stop}."
        ));
        debug!(%mode, n, kept = n2, start, stop, "length mask");

        Ok(self.length_mask.insert(LengthMask {
            mask,
            start,
            stop,
            mode,
        }))
    }

    /// Mask that removes `dead_time` seconds (rounded up to whole samples)
    /// from both ends of the active time axis, hiding the edge ripple left
    /// by the window and the bandpass filter.
    pub fn ripple_trim(&mut self, dead_time: f64) -> Result<&RippleMask> {
        if !(dead_time >= 0.0 && dead_time.is_finite()) {
            return Err(Error::invalid(format!(
                "dead time must be non-negative and finite, got {dead_time}"
            )));
        }

        let dead_samples = (dead_time / self.dt).ceil() as usize;
        let axis = self.axis(self.active_axis());
        let n = axis.len();
        if dead_samples.saturating_mul(2) >= n {
            return Err(Error::invalid(format!(
                "dead time of {dead_samples} samples at each end leaves nothing of {n} samples"
            )));
        }

        let dead_time_actual = dead_samples as f64 * self.dt;
        let mask = range_mask(n, dead_samples, n - dead_samples);
        let trimmed = axis[dead_samples..n - dead_samples].to_vec();

        self.time_trimmed = Some(trimmed);
        self.report.push(format!(
            "Make a mask to remove leading and trailing ripple. The dead time is \
             {:.3} us ({dead_samples} points at each end).",
            1e6 * dead_time_actual
        ));
        debug!(dead_samples, dead_time_actual, n, "ripple trim mask");

        Ok(self.ripple.insert(RippleMask {
            mask,
            dead_samples,
            dead_time_target: dead_time,
            dead_time_actual,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Signal {
        Signal::new((0..n).map(|k| k as f64).collect(), 10e-6, "x", "nm").unwrap()
    }

    #[test]
    fn test_binarate_lengths() {
        for mode in [BinarateMode::Start, BinarateMode::Middle, BinarateMode::End] {
            let mut s = ramp(60_000);
            let mask = s.binarate(mode).unwrap();
            assert_eq!(mask.mask.iter().filter(|&&m| m).count(), 32 * 1024);
            assert_eq!(mask.mask.len(), 60_000);
            assert_eq!(s.time_masked().unwrap().len(), 32 * 1024);
            assert_eq!(s.len(), 60_000);
        }
    }

    #[test]
    fn test_binarate_alignment() {
        let mut s = ramp(10);
        assert_eq!(s.binarate(BinarateMode::Start).unwrap().start, 0);
        let m = s.binarate(BinarateMode::Middle).unwrap();
        assert_eq!((m.start, m.stop), (1, 9));
        let m = s.binarate(BinarateMode::End).unwrap();
        assert_eq!((m.start, m.stop), (2, 10));
        assert!((s.time_masked().unwrap()[0] - 20e-6).abs() < 1e-15);
    }

    #[test]
    fn test_binarate_absent_until_called() {
        let mut s = ramp(100);
        assert!(s.length_mask().is_none());
        s.binarate(BinarateMode::Middle).unwrap();
        assert!(s.length_mask().is_some());
    }

    #[test]
    fn test_binarate_mode_parse() {
        assert_eq!("Middle".parse::<BinarateMode>().unwrap(), BinarateMode::Middle);
        assert!("sideways".parse::<BinarateMode>().is_err());
    }

    #[test]
    fn test_ripple_trim_uses_active_axis() {
        let mut s = ramp(1000);
        s.binarate(BinarateMode::Start).unwrap();
        let mask = s.ripple_trim(25e-6).unwrap();
        assert_eq!(mask.dead_samples, 3);
        assert_eq!(mask.mask.len(), 512);
        assert_eq!(mask.mask.iter().filter(|&&m| m).count(), 512 - 6);
        assert!((mask.dead_time_actual - 30e-6).abs() < 1e-15);
        assert_eq!(s.time_trimmed().unwrap().len(), 506);
    }

    #[test]
    fn test_ripple_trim_too_long() {
        let mut s = ramp(100);
        let before = s.report().len();
        assert!(matches!(
            s.ripple_trim(500e-6),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(s.ripple_mask().is_none());
        assert_eq!(s.report().len(), before);
        assert!(s.ripple_trim(-1.0).is_err());
    }
}
