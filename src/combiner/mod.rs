//! Simulated beam combiners.
//!
//! Each combiner turns the residual delay (atmospheric delay minus the
//! currently-applied correction) into noisy per-channel counts on each of its
//! outputs, and knows how to turn those counts back into a coherence
//! measurement.

pub mod ac;
pub mod tricoupler;

pub use ac::{AcCoupler, GlassImbalance};
pub use tricoupler::Tricoupler;

use ndarray::prelude::*;
use rand::Rng;
use rand_distr::{Distribution, Normal, Poisson};
use thiserror::Error;

use crate::{fringe::fringe_intensities, ChannelSet, SourceParams};

/// The default detector read noise \[e-\].
pub const DEFAULT_READ_NOISE: f64 = 1.6;

#[derive(Error, Debug)]
pub enum NoiseError {
    #[error("Read noise standard deviation must be finite and non-negative; got {0}")]
    BadReadNoise(f64),
}

/// How expected detector intensities become measured counts.
#[derive(Debug, Clone, Copy)]
pub enum NoiseModel {
    /// Counts are exactly the expected intensities. Not rounded.
    Noiseless,

    /// Poisson shot noise on the expected intensity, plus Gaussian read noise,
    /// rounded to the nearest integer. Counts below zero are kept.
    ShotAndRead { read_noise: Normal<f64> },
}

impl NoiseModel {
    pub fn shot_and_read(read_noise_std: f64) -> Result<NoiseModel, NoiseError> {
        if !read_noise_std.is_finite() || read_noise_std < 0.0 {
            return Err(NoiseError::BadReadNoise(read_noise_std));
        }
        let read_noise =
            Normal::new(0.0, read_noise_std).map_err(|_| NoiseError::BadReadNoise(read_noise_std))?;
        Ok(NoiseModel::ShotAndRead { read_noise })
    }

    /// Draw one measured count for a pixel expecting `expected` photons.
    pub fn sample<R: Rng + ?Sized>(&self, expected: f64, rng: &mut R) -> f64 {
        match self {
            NoiseModel::Noiseless => expected,
            NoiseModel::ShotAndRead { read_noise } => {
                // A non-positive expectation can't be Poisson distributed; such
                // a pixel sees no photons.
                let shot: f64 = match Poisson::new(expected) {
                    Ok(poisson) => poisson.sample(rng),
                    Err(_) => 0.0,
                };
                (shot + read_noise.sample(rng)).round()
            }
        }
    }
}

impl Default for NoiseModel {
    fn default() -> Self {
        NoiseModel::ShotAndRead {
            read_noise: Normal::new(0.0, DEFAULT_READ_NOISE).expect("constant is valid"),
        }
    }
}

/// A beam combiner that can be simulated and demodulated.
pub trait Combiner {
    /// What the combiner's outputs can be demodulated into; complex for the
    /// tricoupler, real for the AC coupler.
    type Coherence;

    fn channels(&self) -> &ChannelSet;

    /// Simulate one integration's noisy counts. The returned array has shape
    /// `(num_outputs, num_channels)`.
    fn simulate_fluxes<R: Rng + ?Sized>(
        &self,
        atmospheric_delay: f64,
        correction_delay: f64,
        source: &SourceParams,
        rng: &mut R,
    ) -> Array2<f64>;

    /// Demodulate the counts from [`Combiner::simulate_fluxes`]. A channel with
    /// zero total counts gives a non-finite coherence.
    fn coherence(&self, fluxes: ArrayView2<f64>) -> Self::Coherence;

    /// Simulate an integration and demodulate it. Each call draws fresh noise
    /// from `rng`.
    fn measure_coherence<R: Rng + ?Sized>(
        &self,
        atmospheric_delay: f64,
        correction_delay: f64,
        source: &SourceParams,
        rng: &mut R,
    ) -> Self::Coherence {
        let fluxes = self.simulate_fluxes(atmospheric_delay, correction_delay, source, rng);
        self.coherence(fluxes.view())
    }
}

/// Fill one row per output phase offset with noisy counts.
fn simulate_outputs<R: Rng + ?Sized>(
    output_offsets: &[f64],
    residual_delay: f64,
    channels: &ChannelSet,
    source: &SourceParams,
    dispersion_phases: Option<&[f64]>,
    noise: &NoiseModel,
    rng: &mut R,
) -> Array2<f64> {
    let mut fluxes = Array2::zeros((output_offsets.len(), channels.len()));
    for (mut row, &offset) in fluxes.outer_iter_mut().zip(output_offsets) {
        let expected =
            fringe_intensities(residual_delay, channels, source, dispersion_phases, offset);
        for (count, &e) in row.iter_mut().zip(expected.iter()) {
            *count = noise.sample(e, rng);
        }
    }
    fluxes
}
