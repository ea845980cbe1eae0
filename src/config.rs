//! Simulation configuration.
//!
//! [`ObservingSetup`] holds the physical description of an observation (star
//! brightness, telescope, turbulence, spectrograph), most of which is only
//! needed to derive the values in [`TrackerConfig`], which is what the
//! tracking loop actually consumes.

use std::f64::consts::PI;

use thiserror::Error;

use crate::{
    averaging::frames_per_incoherent_integration,
    combiner::{GlassImbalance, DEFAULT_READ_NOISE},
    delay::TrialDelays,
    tracking::DelayUpdatePolicy,
    ChannelSet, SourceParams,
};

/// R-band zero-magnitude flux density \[W/m²/nm\].
const R_BAND_FLUX: f64 = 2.19e-11;
/// R-band width \[nm\].
const R_BAND_WIDTH: f64 = 133.0;
/// Representative R-band photon frequency \[Hz\].
const R_BAND_FREQUENCY: f64 = 4.28e14;
/// Planck's constant \[J s\].
const PLANCK: f64 = 6.62607015e-34;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Got {wavelengths} channel wavelengths but {bandpasses} bandpasses; these must be index-aligned")]
    ChannelLengthMismatch {
        wavelengths: usize,
        bandpasses: usize,
    },

    #[error("Can't make channels from {start} to {end} with a bandpass of {bandpass}")]
    BadBand { start: f64, end: f64, bandpass: f64 },

    #[error("No wavelength channels fit in the band")]
    NoChannels,

    #[error("The trial delays must not be empty")]
    NoTrialDelays,

    #[error("Integration times must be positive; got coherent {coherent} s and incoherent {incoherent} s")]
    BadIntegrationTime { coherent: f64, incoherent: f64 },

    #[error("The incoherent integration time ({incoherent} s) must be at least one coherent integration ({coherent} s)")]
    IncoherentShorterThanCoherent { coherent: f64, incoherent: f64 },

    #[error("The delay error bound must be finite and non-negative; got {0}")]
    BadDelayErrorBound(f64),

    #[error("The number of frames must be positive")]
    NoFrames,
}

/// The mean number of photons per pixel per integration from a star of R
/// magnitude `r_mag` seen through a circular aperture of diameter
/// `aperture_diameter` \[m\] for `integration_time` \[s\], after a fraction
/// `throughput` survives the instrument.
pub fn photons_per_integration(
    r_mag: f64,
    aperture_diameter: f64,
    integration_time: f64,
    throughput: f64,
) -> f64 {
    let star_flux = R_BAND_FLUX * 10_f64.powf(-0.4 * r_mag) * R_BAND_WIDTH;
    let aperture_area = PI * (aperture_diameter / 2.0).powi(2);
    let energy = aperture_area * integration_time * star_flux;
    energy / (PLANCK * R_BAND_FREQUENCY) * throughput
}

/// A simple description of atmospheric turbulence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Turbulence {
    /// \[arcsec\]
    pub seeing: f64,

    /// The speed of the turbulent layer \[m/s\].
    pub wind_speed: f64,

    /// The wavelength the seeing is quoted at \[m\].
    pub wavelength: f64,
}

impl Turbulence {
    /// The Fried parameter r0 \[m\].
    pub fn fried_parameter(&self) -> f64 {
        0.98 * self.wavelength / (self.seeing / 3600.0).to_radians()
    }

    /// The atmospheric coherence time t0 \[s\].
    pub fn coherence_time(&self) -> f64 {
        0.31 * self.fried_parameter() / self.wind_speed
    }
}

/// Everything the tracking loop needs.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub channels: ChannelSet,

    /// The glass imbalance of the AC coupler. The tracking loop's tricoupler
    /// has none.
    pub glass: GlassImbalance,

    pub source: SourceParams,

    pub trial_delays: TrialDelays,

    /// \[s\]
    pub coherent_integration_time: f64,

    /// \[s\]
    pub incoherent_integration_time: f64,

    /// Detector read noise standard deviation \[e-\].
    pub read_noise: f64,

    /// The number of frames to track for.
    pub num_frames: usize,

    /// The number of zero-visibility frames used to measure the
    /// squared-visibility bias.
    pub num_bias_frames: usize,

    /// Atmospheric delay errors are drawn uniformly from `±delay_error_bound`
    /// \[m\].
    pub delay_error_bound: f64,

    pub delay_update_policy: DelayUpdatePolicy,

    /// Whether the simulated combiner sees the current correction delay, so
    /// that it measures only the residual delay. If not, every frame is
    /// simulated as if no correction had been applied.
    pub feed_back_correction: bool,

    /// Seed for the random number generator. If not given, one is drawn from
    /// the OS.
    pub seed: Option<u64>,
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let coherent = self.coherent_integration_time;
        let incoherent = self.incoherent_integration_time;
        if !(coherent > 0.0) || !(incoherent > 0.0) {
            return Err(ConfigError::BadIntegrationTime {
                coherent,
                incoherent,
            });
        }
        if frames_per_incoherent_integration(coherent, incoherent) == 0 {
            return Err(ConfigError::IncoherentShorterThanCoherent {
                coherent,
                incoherent,
            });
        }
        if !self.delay_error_bound.is_finite() || self.delay_error_bound < 0.0 {
            return Err(ConfigError::BadDelayErrorBound(self.delay_error_bound));
        }
        if self.num_frames == 0 || self.num_bias_frames == 0 {
            return Err(ConfigError::NoFrames);
        }
        Ok(())
    }

    pub fn frames_per_incoherent_integration(&self) -> usize {
        frames_per_incoherent_integration(
            self.coherent_integration_time,
            self.incoherent_integration_time,
        )
    }
}

/// The physical description of a simulated observation.
#[derive(Debug, Clone)]
pub struct ObservingSetup {
    /// Shortest wavelength of the band \[m\].
    pub start_wavelength: f64,
    /// Longest wavelength of the band \[m\].
    pub end_wavelength: f64,
    /// Width of each channel \[m\].
    pub bandpass: f64,

    pub r_mag: f64,
    /// \[m\]
    pub aperture_diameter: f64,
    /// Instrument throughput, before the light is split between the combiner
    /// outputs and channels.
    pub instrument_throughput: f64,
    /// How many outputs the light is split between.
    pub num_outputs: usize,

    pub visibility: f64,
    /// \[rad\]
    pub coherence_phase: f64,

    pub seeing: f64,
    pub wind_speed: f64,

    /// Coherent integration time in units of the atmospheric coherence time.
    pub coherent_time_factor: f64,
    /// Incoherent integration time in units of the atmospheric coherence time.
    pub incoherent_time_factor: f64,

    pub num_trial_delays: usize,
    /// Trial-delay spacing in units of the band's coherence length.
    pub trial_delay_scale: f64,

    /// \[m\]
    pub glass_length: f64,
    /// \[m\]
    pub glass_reference_wavelength: f64,

    pub read_noise: f64,
    pub num_frames: usize,
    pub num_bias_frames: usize,
    pub delay_error_bound: f64,
    pub delay_update_policy: DelayUpdatePolicy,
    pub feed_back_correction: bool,
    pub seed: Option<u64>,
}

impl Default for ObservingSetup {
    fn default() -> Self {
        ObservingSetup {
            start_wavelength: 600e-9,
            end_wavelength: 750e-9,
            bandpass: 15e-9,
            r_mag: 5.0,
            aperture_diameter: 0.1,
            instrument_throughput: 0.5,
            num_outputs: 3,
            visibility: 0.5,
            coherence_phase: PI / 6.0,
            seeing: 1.0,
            wind_speed: 20.0,
            coherent_time_factor: 1.6,
            incoherent_time_factor: 30.0,
            num_trial_delays: 200,
            trial_delay_scale: 0.1,
            glass_length: 5e-2,
            glass_reference_wavelength: 675e-9,
            read_noise: DEFAULT_READ_NOISE,
            num_frames: 100,
            num_bias_frames: 100,
            delay_error_bound: 2e-5,
            delay_update_policy: DelayUpdatePolicy::FirstIncoherentPeriod,
            feed_back_correction: true,
            seed: None,
        }
    }
}

impl ObservingSetup {
    pub fn turbulence(&self) -> Turbulence {
        Turbulence {
            seeing: self.seeing,
            wind_speed: self.wind_speed,
            wavelength: self.start_wavelength,
        }
    }

    /// Derive the tracking-loop configuration.
    pub fn build(&self) -> Result<TrackerConfig, ConfigError> {
        let channels =
            ChannelSet::evenly_spaced(self.start_wavelength, self.end_wavelength, self.bandpass)?;

        let t0 = self.turbulence().coherence_time();
        let coherent_integration_time = self.coherent_time_factor * t0;
        let incoherent_integration_time = self.incoherent_time_factor * t0;

        let throughput =
            self.instrument_throughput / self.num_outputs as f64 / channels.len() as f64;
        let flux = photons_per_integration(
            self.r_mag,
            self.aperture_diameter,
            coherent_integration_time,
            throughput,
        );

        let trial_delays = TrialDelays::for_band(
            self.num_trial_delays,
            self.trial_delay_scale,
            self.start_wavelength,
            self.end_wavelength,
        )?;

        let config = TrackerConfig {
            channels,
            glass: GlassImbalance {
                length: self.glass_length,
                reference_wavelength: self.glass_reference_wavelength,
            },
            source: SourceParams {
                flux,
                visibility: self.visibility,
                coherence_phase: self.coherence_phase,
            },
            trial_delays,
            coherent_integration_time,
            incoherent_integration_time,
            read_noise: self.read_noise,
            num_frames: self.num_frames,
            num_bias_frames: self.num_bias_frames,
            delay_error_bound: self.delay_error_bound,
            delay_update_policy: self.delay_update_policy,
            feed_back_correction: self.feed_back_correction,
            seed: self.seed,
        };
        config.validate()?;
        Ok(config)
    }
}
