//! Delay estimation.
//!
//! Two estimators are kept deliberately separate. The tricoupler measures the
//! full complex coherence, so the delay can be found by rotating phasors and
//! looking for the white-light fringe ([`phasor`]). The AC coupler only
//! measures the real part, so its delay is found by fitting the
//! dispersion-shifted cosine model over every trial delay ([`chi_squared`]).
//!
//! Both scans break ties the same way: the *first* best score in trial-delay
//! order wins, and NaN scores are never selected. If every score is NaN the
//! first trial delay is returned.

pub mod chi_squared;
pub mod phasor;

pub use chi_squared::{chi_squared_curve, find_delay_ac, refine_delay_ac, ChiSquaredAc};
pub use phasor::{find_delay, group_delay_envelope, white_fringe_intensity};

use ndarray::ArrayView1;
use vec1::Vec1;

use crate::ConfigError;

/// The candidate delays swept during estimation \[m\]. Never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct TrialDelays(Vec1<f64>);

impl TrialDelays {
    pub fn new(delays: Vec<f64>) -> Result<TrialDelays, ConfigError> {
        Vec1::try_from_vec(delays)
            .map(TrialDelays)
            .map_err(|_| ConfigError::NoTrialDelays)
    }

    /// `num` evenly-spaced delays from `start` to `end` inclusive.
    pub fn linspace(start: f64, end: f64, num: usize) -> Result<TrialDelays, ConfigError> {
        let delays = match num {
            0 => vec![],
            1 => vec![start],
            _ => {
                let step = (end - start) / (num - 1) as f64;
                (0..num).map(|i| start + i as f64 * step).collect()
            }
        };
        TrialDelays::new(delays)
    }

    /// Delays `scale * k / Δσ` for integer `k` from `-num/2 + 1` up to (but not
    /// including) `num/2`, where `Δσ = 1/start_wavelength - 1/end_wavelength`
    /// is the wavenumber width of the band. `scale` sets the sampling relative
    /// to the coherence length of the whole band.
    pub fn for_band(
        num: usize,
        scale: f64,
        start_wavelength: f64,
        end_wavelength: f64,
    ) -> Result<TrialDelays, ConfigError> {
        let wavenumber_bandpass = 1.0 / start_wavelength - 1.0 / end_wavelength;
        let half = num as f64 / 2.0;
        let mut delays = vec![];
        let mut k = -half + 1.0;
        while k < half {
            delays.push(scale * k / wavenumber_bandpass);
            k += 1.0;
        }
        TrialDelays::new(delays)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn first(&self) -> f64 {
        *self.0.first()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Something that wants to see a full delay envelope or chi-squared curve,
/// e.g. a plotter. Never needed for the estimate itself.
pub trait EnvelopeSink {
    fn show(&mut self, trial_delays: &[f64], scores: &[f64]);
}

impl<F: FnMut(&[f64], &[f64])> EnvelopeSink for F {
    fn show(&mut self, trial_delays: &[f64], scores: &[f64]) {
        (*self)(trial_delays, scores)
    }
}

/// The index of the first score that `better` prefers to all earlier
/// non-NaN scores.
fn first_best_index(scores: ArrayView1<f64>, better: impl Fn(f64, f64) -> bool) -> usize {
    let mut best: Option<(usize, f64)> = None;
    for (i, &score) in scores.iter().enumerate() {
        if score.is_nan() {
            continue;
        }
        match best {
            Some((_, best_score)) if !better(score, best_score) => (),
            _ => best = Some((i, score)),
        }
    }
    best.map(|(i, _)| i).unwrap_or(0)
}
