//! Group-delay estimation by phasor rotation (tricoupler path).

use std::f64::consts::TAU;

use ndarray::prelude::*;
use num_complex::Complex64;
use rayon::prelude::*;

use super::{first_best_index, TrialDelays};

/// The intensity of the "white-light fringe" at `trial_delay`: rotate each
/// channel's coherence phasor by `exp(i 2π trial_delay / λ)`, sum across
/// channels and take `|sum|²`. This peaks when `trial_delay` matches the group
/// delay in the coherence.
pub fn white_fringe_intensity(
    gamma: ArrayView1<Complex64>,
    trial_delay: f64,
    wavelengths: &[f64],
) -> f64 {
    gamma
        .iter()
        .zip(wavelengths)
        .map(|(g, &lam)| g * Complex64::from_polar(1.0, TAU * trial_delay / lam))
        .sum::<Complex64>()
        .norm_sqr()
}

/// [`white_fringe_intensity`] for every trial delay, in trial-delay order.
pub fn group_delay_envelope(
    gamma: ArrayView1<Complex64>,
    trial_delays: &TrialDelays,
    wavelengths: &[f64],
) -> Array1<f64> {
    assert_eq!(
        gamma.len(),
        wavelengths.len(),
        "coherence and wavelengths must be index-aligned"
    );
    let envelope = trial_delays
        .as_slice()
        .par_iter()
        .map(|&delay| white_fringe_intensity(gamma, delay, wavelengths))
        .collect::<Vec<_>>();
    Array1::from_vec(envelope)
}

/// The trial delay at the maximum of `delay_envelope`. Ties go to the first
/// maximum; NaN entries are skipped.
pub fn find_delay(delay_envelope: ArrayView1<f64>, trial_delays: &TrialDelays) -> f64 {
    assert_eq!(
        delay_envelope.len(),
        trial_delays.len(),
        "envelope and trial delays must be index-aligned"
    );
    let i = first_best_index(delay_envelope, |score, best| score > best);
    trial_delays.as_slice()[i]
}
