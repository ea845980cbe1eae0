//! A two-output ("AC") beam combiner with a deliberate glass imbalance
//! between its arms.

use std::f64::consts::PI;

use ndarray::prelude::*;
use rand::Rng;

use super::{simulate_outputs, Combiner, NoiseModel};
use crate::{dispersion::glass_dispersion_phase, ChannelSet, SourceParams};

/// The phase offsets of the two outputs, in output order A, C.
pub const AC_OFFSETS: [f64; 2] = [0.0, PI];

/// The extra glass in one arm of the AC coupler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GlassImbalance {
    /// How much more glass one arm has than the other \[m\].
    pub length: f64,

    /// The wavelength whose group index defines zero dispersive delay \[m\].
    pub reference_wavelength: f64,
}

impl GlassImbalance {
    /// The dispersive phase for each channel, index-aligned with `channels`.
    pub fn phases(&self, channels: &ChannelSet) -> Vec<f64> {
        channels
            .wavelengths()
            .iter()
            .map(|&lam| glass_dispersion_phase(lam, self.length, self.reference_wavelength))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct AcCoupler {
    channels: ChannelSet,
    noise: NoiseModel,

    /// [`GlassImbalance::phases`] for `channels`, which never change.
    dispersion_phases: Vec<f64>,
}

impl AcCoupler {
    pub fn new(channels: ChannelSet, glass: GlassImbalance, noise: NoiseModel) -> AcCoupler {
        let dispersion_phases = glass.phases(&channels);
        AcCoupler {
            channels,
            noise,
            dispersion_phases,
        }
    }

    pub fn dispersion_phases(&self) -> &[f64] {
        &self.dispersion_phases
    }
}

impl Combiner for AcCoupler {
    type Coherence = Array1<f64>;

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
            &AC_OFFSETS,
            atmospheric_delay - correction_delay,
            &self.channels,
            source,
            Some(&self.dispersion_phases),
            &self.noise,
            rng,
        )
    }

    fn coherence(&self, fluxes: ArrayView2<f64>) -> Array1<f64> {
        real_coherence(fluxes)
    }
}

/// Demodulate AC counts (shape `(2, num_channels)`) into the real part of the
/// coherence per channel, `γ_r = (F_A - F_C) / (F_A + F_C)`.
pub fn real_coherence(fluxes: ArrayView2<f64>) -> Array1<f64> {
    assert_eq!(fluxes.nrows(), 2, "an AC coupler has two outputs");
    let a = fluxes.row(0);
    let c = fluxes.row(1);
    (&a - &c) / (&a + &c)
}
