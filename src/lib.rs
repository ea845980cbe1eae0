//! Simulation of a fiber-fed interferometer fringe tracker.
//!
//! Noisy, wavelength-dispersed combiner outputs are turned into coherence
//! measurements, from which the optical path delay is estimated and fed back
//! to a delay-correction loop.

pub mod averaging;
pub mod combiner;
pub mod config;
pub mod delay;
pub mod dispersion;
pub mod fringe;
pub mod tracking;

use vec1::Vec1;

pub use config::ConfigError;

/// The wavelength channels of the spectrograph. All per-channel arrays in this
/// crate are index-aligned with these channels.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSet {
    /// The central wavelength of each channel \[m\]. Order is significant but
    /// the channels need not be evenly spaced.
    wavelengths: Vec1<f64>,

    /// The width of each channel \[m\].
    bandpasses: Vec1<f64>,
}

impl ChannelSet {
    /// Pair up channel centres with their widths. The two must have the same
    /// length.
    pub fn new(
        wavelengths: Vec1<f64>,
        bandpasses: Vec1<f64>,
    ) -> Result<ChannelSet, ConfigError> {
        if wavelengths.len() != bandpasses.len() {
            return Err(ConfigError::ChannelLengthMismatch {
                wavelengths: wavelengths.len(),
                bandpasses: bandpasses.len(),
            });
        }
        Ok(ChannelSet {
            wavelengths,
            bandpasses,
        })
    }

    /// Every channel shares the same width.
    pub fn with_uniform_bandpass(wavelengths: Vec1<f64>, bandpass: f64) -> ChannelSet {
        let bandpasses = wavelengths.mapped_ref(|_| bandpass);
        ChannelSet {
            wavelengths,
            bandpasses,
        }
    }

    /// Tile the band from `start` to `end` with channels of width `bandpass`.
    /// The number of channel edges is `ceil((end - start) / bandpass)` and the
    /// last edge is not used as a channel, so e.g. 600 to 750 nm with 15 nm
    /// channels (where floating-point rounding gives 11 edges) yields 10
    /// channels centred on 607.5 ... 742.5 nm.
    pub fn evenly_spaced(start: f64, end: f64, bandpass: f64) -> Result<ChannelSet, ConfigError> {
        if !(bandpass > 0.0) || !(end > start) {
            return Err(ConfigError::BadBand {
                start,
                end,
                bandpass,
            });
        }

        let num_edges = ((end - start) / bandpass).ceil() as usize;
        let centres = (0..num_edges.saturating_sub(1))
            .map(|i| start + i as f64 * bandpass + 0.5 * bandpass)
            .collect::<Vec<_>>();
        let wavelengths = Vec1::try_from_vec(centres).map_err(|_| ConfigError::NoChannels)?;
        Ok(ChannelSet::with_uniform_bandpass(wavelengths, bandpass))
    }

    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    pub fn bandpasses(&self) -> &[f64] {
        &self.bandpasses
    }

    /// Iterate over `(wavelength, bandpass)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.wavelengths
            .iter()
            .copied()
            .zip(self.bandpasses.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.wavelengths.len()
    }

    /// Always false; a channel set has at least one channel.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// The "true" parameters of the astronomical source for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceParams {
    /// Mean number of photons per detector pixel per integration (already
    /// reduced by throughput).
    pub flux: f64,

    /// The visibility modulus, in \[0, 1\].
    pub visibility: f64,

    /// The phase of the complex coherence \[rad\], including any atmospheric
    /// turbulence contribution.
    pub coherence_phase: f64,
}

impl SourceParams {
    /// The same source with no fringe contrast. Used to measure the noise
    /// floor of squared-visibility estimates.
    pub fn unresolved_noise_floor(&self) -> SourceParams {
        SourceParams {
            visibility: 0.0,
            ..*self
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use vec1::vec1;

    use super::*;

    #[test]
    fn evenly_spaced_drops_the_last_edge() {
        let channels = ChannelSet::evenly_spaced(600e-9, 750e-9, 15e-9).unwrap();
        assert_eq!(channels.len(), 10);
        assert_abs_diff_eq!(channels.wavelengths()[0], 607.5e-9, epsilon = 1e-15);
        assert_abs_diff_eq!(channels.wavelengths()[9], 742.5e-9, epsilon = 1e-15);
        assert!(channels.bandpasses().iter().all(|&b| b == 15e-9));
    }

    #[test]
    fn mismatched_channel_lengths_are_rejected() {
        let result = ChannelSet::new(vec1![600e-9, 700e-9], vec1![15e-9]);
        assert!(matches!(
            result,
            Err(ConfigError::ChannelLengthMismatch {
                wavelengths: 2,
                bandpasses: 1
            })
        ));
    }

    #[test]
    fn band_too_narrow_for_a_channel() {
        let result = ChannelSet::evenly_spaced(600e-9, 610e-9, 15e-9);
        assert!(matches!(result, Err(ConfigError::NoChannels)));
    }
}
