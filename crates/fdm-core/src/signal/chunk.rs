//! Chunked linear fit of phase against time.
//!
//! The phase record is cut into consecutive chunks of `m` points. Within each
//! chunk the time and phase are shifted to start at zero and the slope of the
//! least-squares line is
//!
//! ```text
//!     m Sxy - Sx Sy
//! f = -------------
//!     m Sxx - Sx^2
//! ```
//!
//! With equally spaced samples `Sx = dt m (m - 1) / 2` and
//! `Sxx = dt^2 m (m - 1) (2m - 1) / 6` are known in closed form; only `Sy`
//! and `Sxy` are summed.

use super::Signal;
use crate::error::{Error, Result};
use std::time::Instant;
use tracing::debug;

/// Frequency against time from the chunked phase fit
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkFit {
    /// Mean time of each chunk [s]
    pub time: Vec<f64>,
    /// Best-fit slope of each chunk [Hz]
    pub frequency: Vec<f64>,
    pub samples_per_chunk: usize,
    /// Realized chunk duration `samples_per_chunk * dt` [s]
    pub chunk_duration: f64,
    pub chunk_target: f64,
    pub chunk_count: usize,
}

/// Slopes of `phase` against `time` over consecutive chunks of `m` points.
///
/// Returns `(midpoint_times, slopes)`. A trailing partial chunk is dropped.
/// `time` must be equally spaced by `dt`.
pub fn chunked_slopes(time: &[f64], phase: &[f64], dt: f64, m: usize) -> (Vec<f64>, Vec<f64>) {
    let n = time.len().min(phase.len());
    if m == 0 {
        return (Vec::new(), Vec::new());
    }
    let count = n / m;
    let mf = m as f64;
    let sx = dt * 0.5 * mf * (mf - 1.0);
    let sxx = dt * dt * mf * (mf - 1.0) * (2.0 * mf - 1.0) / 6.0;
    let denominator = mf * sxx - sx * sx;

    let mut midpoints = Vec::with_capacity(count);
    let mut slopes = Vec::with_capacity(count);
    for (t, p) in time[..count * m]
        .chunks_exact(m)
        .zip(phase[..count * m].chunks_exact(m))
    {
        let (t0, p0) = (t[0], p[0]);
        let (sy, sxy) = t
            .iter()
            .zip(p.iter())
            .fold((0.0, 0.0), |(sy, sxy), (&ti, &pi)| {
                let y = pi - p0;
                (sy + y, sxy + (ti - t0) * y)
            });
        slopes.push((mf * sxy - sx * sy) / denominator);
        midpoints.push(t.iter().sum::<f64>() / mf);
    }
    (midpoints, slopes)
}

impl Signal {
    /// Fit the unwrapped phase to a line in chunks of about `chunk_target`
    /// seconds; the slopes are the instantaneous frequency.
    ///
    /// `chunk_target` rounds to `m = round(chunk_target / dt)` samples per
    /// chunk. A one-point chunk has no slope, so `m < 2` is an
    /// [`Error::InvalidConfiguration`], as is a chunk longer than the record.
    pub fn fit_phase(&mut self, chunk_target: f64) -> Result<&ChunkFit> {
        let (phase, time) = match (self.phase.as_deref(), self.analytic_time()) {
            (Some(p), Some(t)) => (p, t),
            _ => {
                return Err(Error::PrerequisiteMissing {
                    stage: "fit_phase",
                    requires: "ifft",
                })
            }
        };
        if !(chunk_target > 0.0 && chunk_target.is_finite()) {
            return Err(Error::invalid(format!(
                "chunk duration must be positive and finite, got {chunk_target}"
            )));
        }

        let m = ((chunk_target / self.dt).round() as usize).max(1);
        if m < 2 {
            return Err(Error::invalid(format!(
                "chunk of {chunk_target} s holds {m} point; a slope needs at least two"
            )));
        }
        let n = phase.len();
        let chunk_count = n / m;
        if chunk_count == 0 {
            return Err(Error::invalid(format!(
                "chunk of {m} points is longer than the {n}-point phase record"
            )));
        }

        let start = Instant::now();
        let (fit_time, frequency) = chunked_slopes(time, phase, self.dt, m);
        let elapsed = start.elapsed();
        let chunk_duration = m as f64 * self.dt;

        self.report.push(format!(
            "Curve fit the phase data. The target chunk duration is {:.3} us; the actual \
             chunk duration is {:.3} us ({m} points). The associated Nyquist frequency is \
             {:.3} kHz. A total of {chunk_count} chunks were curve fit, corresponding to \
             {:.3} ms of data. It took {:.1} ms to perform the curve fit and obtain the \
             frequency.",
            1e6 * chunk_target,
            1e6 * chunk_duration,
            1.0 / (2e3 * chunk_duration),
            1e3 * self.dt * (m * chunk_count) as f64,
            elapsed.as_secs_f64() * 1e3
        ));
        debug!(m, chunk_count, chunk_duration, "chunked phase fit");

        Ok(self.chunk_fit.insert(ChunkFit {
            time: fit_time,
            frequency,
            samples_per_chunk: m,
            chunk_duration,
            chunk_target,
            chunk_count,
        }))
    }
}
