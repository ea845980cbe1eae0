//! The noiseless polychromatic fringe model.

use std::f64::consts::{PI, TAU};

use ndarray::prelude::*;

use crate::{ChannelSet, SourceParams};

/// The normalised sinc function, `sin(πx) / (πx)`, with `sinc(0) = 1`.
pub fn sinc(x: f64) -> f64 {
    if x == 0.0 {
        1.0
    } else {
        let pi_x = PI * x;
        pi_x.sin() / pi_x
    }
}

/// The coherence envelope of a fringe packet seen through a channel of width
/// `bandpass` centred on `wavelength`.
pub fn fringe_envelope(delay: f64, wavelength: f64, bandpass: f64) -> f64 {
    sinc(delay * bandpass / (wavelength * wavelength))
}

/// The expected (noiseless) intensity of a polychromatic fringe at `delay` in
/// one wavelength channel.
///
/// `dispersion_phase` is any extra chromatic phase (e.g. from
/// [`crate::dispersion::glass_dispersion_phase`]) and `output_offset` is the
/// phase offset of the combiner output being modelled. Both are zero for a
/// plain two-beam fringe.
///
/// Nothing stops the result from going slightly negative for degenerate
/// inputs; that isn't treated as an error.
pub fn fringe_intensity(
    delay: f64,
    wavelength: f64,
    bandpass: f64,
    source: &SourceParams,
    dispersion_phase: f64,
    output_offset: f64,
) -> f64 {
    let envelope = fringe_envelope(delay, wavelength, bandpass);
    let phase =
        TAU * delay / wavelength - source.coherence_phase - dispersion_phase - output_offset;
    source.flux * (1.0 + envelope * source.visibility * phase.cos())
}

/// [`fringe_intensity`] for every channel in `channels`. If provided,
/// `dispersion_phases` must be index-aligned with the channels.
pub fn fringe_intensities(
    delay: f64,
    channels: &ChannelSet,
    source: &SourceParams,
    dispersion_phases: Option<&[f64]>,
    output_offset: f64,
) -> Array1<f64> {
    channels
        .iter()
        .enumerate()
        .map(|(i, (wavelength, bandpass))| {
            let dispersion_phase = dispersion_phases.map(|d| d[i]).unwrap_or(0.0);
            fringe_intensity(
                delay,
                wavelength,
                bandpass,
                source,
                dispersion_phase,
                output_offset,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use vec1::vec1;

    use super::*;

    const SOURCE: SourceParams = SourceParams {
        flux: 1000.0,
        visibility: 1.0,
        coherence_phase: PI / 6.0,
    };

    #[test]
    fn sinc_is_normalised() {
        assert_eq!(sinc(0.0), 1.0);
        assert_abs_diff_eq!(sinc(1.0), 0.0, epsilon = 1e-15);
        assert_abs_diff_eq!(sinc(0.5), 2.0 / PI, epsilon = 1e-15);
        assert_abs_diff_eq!(sinc(-0.5), sinc(0.5));
    }

    #[test]
    fn zero_delay_intensity() {
        let i = fringe_intensity(0.0, 650e-9, 15e-9, &SOURCE, 0.3, 2.0 * PI / 3.0);
        let expected = SOURCE.flux * (1.0 + (-PI / 6.0 - 0.3 - 2.0 * PI / 3.0).cos());
        assert_abs_diff_eq!(i, expected, epsilon = 1e-9);
    }

    #[test]
    fn cosine_repeats_every_wavelength() {
        // With no bandpass there is no envelope, so every integer multiple of
        // the wavelength gives the zero-delay intensity back.
        let lam = 650e-9;
        let i0 = fringe_intensity(0.0, lam, 0.0, &SOURCE, 0.0, 0.0);
        for n in [1.0, 2.0, -3.0] {
            let i = fringe_intensity(n * lam, lam, 0.0, &SOURCE, 0.0, 0.0);
            assert_abs_diff_eq!(i, i0, epsilon = 1e-6);
        }
    }

    #[test]
    fn envelope_kills_fringes_at_its_first_null() {
        let lam = 650e-9;
        let bandpass = 15e-9;
        let null = lam * lam / bandpass;
        let i = fringe_intensity(null, lam, bandpass, &SOURCE, 0.0, 0.0);
        assert_abs_diff_eq!(i, SOURCE.flux, epsilon = 1e-9);
    }

    #[test]
    fn intensities_are_index_aligned() {
        let channels = ChannelSet::new(vec1![600e-9, 700e-9], vec1![15e-9, 10e-9]).unwrap();
        let phases = [0.1, 0.2];
        let all = fringe_intensities(2e-6, &channels, &SOURCE, Some(&phases), PI);
        for (i, (lam, bp)) in channels.iter().enumerate() {
            assert_eq!(all[i], fringe_intensity(2e-6, lam, bp, &SOURCE, phases[i], PI));
        }
    }
}
