//! A three-output ("tricoupler") beam combiner.

use std::f64::consts::PI;

use itertools::izip;
use ndarray::prelude::*;
use num_complex::Complex64;
use rand::Rng;

use super::{simulate_outputs, Combiner, NoiseModel};
use crate::{ChannelSet, SourceParams};

/// The phase offsets of the three outputs, in output order A, B, C.
pub const TRICOUPLER_OFFSETS: [f64; 3] = [0.0, 2.0 * PI / 3.0, 4.0 * PI / 3.0];

/// A symmetric three-output combiner. No dispersion is applied, and the full
/// complex coherence can be recovered from its outputs.
#[derive(Debug, Clone)]
pub struct Tricoupler {
    pub channels: ChannelSet,
    pub noise: NoiseModel,
}

impl Tricoupler {
    pub fn new(channels: ChannelSet, noise: NoiseModel) -> Tricoupler {
        Tricoupler { channels, noise }
    }
}

impl Combiner for Tricoupler {
    type Coherence = Array1<Complex64>;

    fn channels(&self) -> &ChannelSet {
        &self.channels
    }

    fn simulate_fluxes<R: Rng + ?Sized>(
        &self,
        atmospheric_delay: f64,
        correction_delay: f64,
        source: &SourceParams,
        rng: &mut R,
    ) -> Array2<f64> {
        simulate_outputs(
            &TRICOUPLER_OFFSETS,
            atmospheric_delay - correction_delay,
            &self.channels,
            source,
            None,
            &self.noise,
            rng,
        )
    }

    fn coherence(&self, fluxes: ArrayView2<f64>) -> Array1<Complex64> {
        complex_coherence(fluxes)
    }
}

/// Demodulate tricoupler counts (shape `(3, num_channels)`, rows in offset
/// order) into a complex coherence per channel:
///
/// `γ = (3 F_A + i √3 (F_C - F_B)) / (F_A + F_B + F_C) - 1`
///
/// A zero total gives a non-finite value for that channel only.
pub fn complex_coherence(fluxes: ArrayView2<f64>) -> Array1<Complex64> {
    assert_eq!(fluxes.nrows(), 3, "a tricoupler has three outputs");
    let sqrt_3 = 3.0_f64.sqrt();
    izip!(fluxes.row(0), fluxes.row(1), fluxes.row(2))
        .map(|(&a, &b, &c)| {
            let total = a + b + c;
            Complex64::new(3.0 * a, sqrt_3 * (c - b)) / total - 1.0
        })
        .collect()
}
