//! Group-delay estimation by chi-squared minimisation (AC coupler path).

use std::f64::consts::TAU;

use argmin::core::{CostFunction, Error, Executor, State};
use argmin::solver::neldermead::NelderMead;
use log::trace;
use ndarray::prelude::*;

use super::{first_best_index, EnvelopeSink, TrialDelays};
use crate::{combiner::GlassImbalance, ChannelSet};

/// The squared misfit between a measured real coherence and the
/// dispersion-shifted cosine model, as a function of trial delay.
#[derive(Debug, Clone)]
pub struct ChiSquaredAc {
    gamma_r: Array1<f64>,
    wavelengths: Vec<f64>,
    dispersion_phases: Vec<f64>,
}

impl ChiSquaredAc {
    pub fn new(
        gamma_r: ArrayView1<f64>,
        channels: &ChannelSet,
        glass: &GlassImbalance,
    ) -> ChiSquaredAc {
        assert_eq!(
            gamma_r.len(),
            channels.len(),
            "coherence and channels must be index-aligned"
        );
        ChiSquaredAc {
            gamma_r: gamma_r.to_owned(),
            wavelengths: channels.wavelengths().to_vec(),
            dispersion_phases: glass.phases(channels),
        }
    }

    /// `Σ (cos(2π delay / λ - φ_glass(λ)) - γ_r)²` over channels.
    pub fn chi_squared(&self, trial_delay: f64) -> f64 {
        self.wavelengths
            .iter()
            .zip(self.dispersion_phases.iter())
            .zip(self.gamma_r.iter())
            .map(|((&lam, &disp), &g)| {
                let model = (TAU * trial_delay / lam - disp).cos();
                (model - g).powi(2)
            })
            .sum()
    }
}

impl CostFunction for ChiSquaredAc {
    type Param = f64;
    type Output = f64;

    fn cost(&self, trial_delay: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.chi_squared(*trial_delay))
    }
}

/// The chi-squared value at every trial delay, in trial-delay order.
pub fn chi_squared_curve(chi_squared: &ChiSquaredAc, trial_delays: &TrialDelays) -> Array1<f64> {
    trial_delays
        .as_slice()
        .iter()
        .map(|&delay| chi_squared.chi_squared(delay))
        .collect()
}

/// Scan every trial delay and return the one with the smallest chi-squared.
/// Only a strictly smaller value replaces the current best, so the first of
/// several equal minima wins. The whole curve is handed to `sink` if one is
/// given.
pub fn find_delay_ac(
    gamma_r: ArrayView1<f64>,
    trial_delays: &TrialDelays,
    channels: &ChannelSet,
    glass: &GlassImbalance,
    sink: Option<&mut dyn EnvelopeSink>,
) -> f64 {
    let chi_squared = ChiSquaredAc::new(gamma_r, channels, glass);
    let curve = chi_squared_curve(&chi_squared, trial_delays);
    if let (Some(sink), Some(scores)) = (sink, curve.as_slice()) {
        sink.show(trial_delays.as_slice(), scores);
    }

    let i = first_best_index(curve.view(), |chi2, best| chi2 < best);
    trace!("Minimum chi^2 {} at trial delay index {i}", curve[i]);
    trial_delays.as_slice()[i]
}

/// Polish a grid estimate of the delay with a Nelder-Mead search. `step` sets
/// the size of the initial simplex and should be about one trial-delay step.
pub fn refine_delay_ac(
    chi_squared: ChiSquaredAc,
    initial_delay: f64,
    step: f64,
    max_iters: u64,
) -> Result<f64, Error> {
    let solver = NelderMead::new(vec![initial_delay, initial_delay + step])
        .with_sd_tolerance(1e-20)?;
    let res = Executor::new(chi_squared, solver)
        .configure(|state| state.max_iters(max_iters))
        .run()?;

    Ok(res.state.get_best_param().copied().unwrap_or(initial_delay))
}
