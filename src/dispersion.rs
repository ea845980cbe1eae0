//! Glass dispersion.
//!
//! The AC coupler puts an extra length of BK7 glass in one arm of the
//! interferometer. The chromatic phase this introduces breaks the sign
//! degeneracy of the real-only coherence it measures.

use std::f64::consts::TAU;

/// Sellmeier `(B, C)` coefficient pairs for BK7 glass, tabulated for
/// wavelengths in µm. The equation is written in the `B λ² / (C² - λ²)` form
/// and, like everything else in this crate, is evaluated with wavelengths in
/// metres. The resonance terms are then tiny: both indices sit just above one
/// and the dispersion phase of a few centimetres of glass is only milliradians.
const BK7_SELLMEIER: [(f64, f64); 3] = [
    (1.03961212, 6.00069867e-3),
    (0.231792344, 2.00179144e-2),
    (1.01046945, 103.560653),
];

/// The (phase) refractive index of BK7 glass at `wavelength`.
///
/// No bounds checking is done; callers should stay within the visible/near-IR
/// band the coefficients describe.
pub fn refractive_index(wavelength: f64) -> f64 {
    let lam2 = wavelength * wavelength;
    let n2 = BK7_SELLMEIER
        .iter()
        .fold(1.0, |acc, &(b, c)| acc + b * lam2 / (c * c - lam2));
    n2.sqrt()
}

/// The group index of BK7 glass at `wavelength`, i.e. the phase index minus a
/// wavelength-weighted derivative correction built from the same Sellmeier
/// terms.
pub fn group_index(wavelength: f64) -> f64 {
    let n = refractive_index(wavelength);
    let lam2 = wavelength * wavelength;
    let correction = BK7_SELLMEIER.iter().fold(0.0, |acc, &(b, c)| {
        let denom = c * c - lam2;
        acc + b * lam2 / (denom * denom) + b / denom
    });

    n - lam2 * correction / n
}

/// The phase shift \[rad\] at `wavelength` caused by `extra_glass_length` more
/// glass in one arm than the other, relative to the group delay at
/// `reference_wavelength`.
///
/// This is not zero at the reference wavelength, because the phase and group
/// indices differ there.
pub fn glass_dispersion_phase(
    wavelength: f64,
    extra_glass_length: f64,
    reference_wavelength: f64,
) -> f64 {
    let opd = (refractive_index(wavelength) - group_index(reference_wavelength))
        * extra_glass_length;
    opd * TAU / wavelength
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn index_is_one_without_glass_response() {
        // Far below every resonance the terms vanish.
        assert_abs_diff_eq!(refractive_index(0.0), 1.0);
        assert_abs_diff_eq!(group_index(0.0), 1.0);
    }

    #[test]
    fn group_index_differs_from_phase_index() {
        let lam = 675e-9;
        assert!((refractive_index(lam) - group_index(lam)).abs() > 0.0);
    }

    #[test]
    fn phase_at_reference_wavelength_is_the_index_difference() {
        let lam_0 = 675e-9;
        let length = 5e-2;
        let expected = (refractive_index(lam_0) - group_index(lam_0)) * length * TAU / lam_0;
        assert_eq!(glass_dispersion_phase(lam_0, length, lam_0), expected);
        assert!(expected != 0.0);
    }

    #[test]
    fn phase_scales_with_glass_length() {
        let lam = 620e-9;
        let lam_0 = 675e-9;
        let one = glass_dispersion_phase(lam, 1e-2, lam_0);
        let five = glass_dispersion_phase(lam, 5e-2, lam_0);
        assert_abs_diff_eq!(five, 5.0 * one, epsilon = 1e-9 * five.abs());
        assert_eq!(glass_dispersion_phase(lam, 0.0, lam_0), 0.0);
    }
}
