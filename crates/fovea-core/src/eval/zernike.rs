//! Zernike decomposition of a wavefront.
//!
//! OSA/ANSI single-index convention: term $j$ maps to $(n, m)$ with
//! $n = \lfloor(-1 + \sqrt{1 + 8j})/2\rfloor$ and
//! $m = -n + 2(j - n(n+1)/2)$, normalised so that
//! $\langle Z_j, Z_j \rangle = \pi$ over the unit disc,
//! $N_n^m = \sqrt{2(n+1)/(1+\delta_{m0})}$.
//!
//! Coefficients are fitted by weighted least squares over the sampled
//! pupil: the normal matrix $G = A^T W A$ is solved with a Cholesky
//! factorisation via `faer`. Piston and the two tilts are excluded from
//! the fit by default (they carry alignment, not image quality) and
//! re-inserted as zeros so the output vector stays indexed by $j$; see
//! [`Exclusion`] for the other policies.

use std::sync::OnceLock;

use faer::linalg::solvers::SpSolver;
use ndarray::Array2;

use super::opd::OpdMap;
use super::EvalError;

/// Low-order terms excluded from a fit and pinned to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Exclusion {
    /// Exclude piston and both tilts, j = 0..2 (the default).
    #[default]
    PistonAndTilts,
    /// Exclude piston only.
    Piston,
    /// Fit every term, tilts included.
    None,
}

impl Exclusion {
    /// First OSA term that enters the fit.
    pub fn first_term(self) -> usize {
        match self {
            Exclusion::PistonAndTilts => 3,
            Exclusion::Piston => 1,
            Exclusion::None => 0,
        }
    }
}

fn factorial(k: usize) -> f64 {
    static TABLE: OnceLock<Vec<f64>> = OnceLock::new();
    let table = TABLE.get_or_init(|| {
        let mut t = Vec::with_capacity(171);
        let mut acc = 1.0_f64;
        t.push(1.0);
        for i in 1..=170 {
            acc *= i as f64;
            t.push(acc);
        }
        t
    });
    table[k]
}

/// OSA/ANSI single index to radial order and azimuthal frequency.
pub fn osa_index(j: usize) -> (usize, i32) {
    let n = ((-1.0 + (1.0 + 8.0 * j as f64).sqrt()) / 2.0).floor() as usize;
    let m = -(n as i32) + 2 * (j - n * (n + 1) / 2) as i32;
    (n, m)
}

/// Number of terms through radial order `n` inclusive.
pub fn term_count(max_order: usize) -> usize {
    (max_order + 1) * (max_order + 2) / 2
}

/// Noll-style normalisation for the OSA ordering.
fn normalisation(n: usize, m: i32) -> f64 {
    let delta = if m == 0 { 2.0 } else { 1.0 };
    (2.0 * (n as f64 + 1.0) / delta).sqrt()
}

/// Radial polynomial $R_n^{|m|}(\rho)$ as the standard finite sum.
fn radial(n: usize, m_abs: usize, rho: f64) -> f64 {
    if (n - m_abs) % 2 != 0 {
        return 0.0;
    }
    let half = (n - m_abs) / 2;
    let mut sum = 0.0;
    for s in 0..=half {
        let sign = if s % 2 == 0 { 1.0 } else { -1.0 };
        let num = factorial(n - s);
        let den = factorial(s) * factorial((n + m_abs) / 2 - s) * factorial(half - s);
        sum += sign * num / den * rho.powi((n - 2 * s) as i32);
    }
    sum
}

/// Evaluate the normalised Zernike term `j` at polar pupil coordinates.
pub fn zernike(j: usize, rho: f64, theta: f64) -> f64 {
    let (n, m) = osa_index(j);
    let m_abs = m.unsigned_abs() as usize;
    let angular = if m > 0 {
        (m_abs as f64 * theta).cos()
    } else if m < 0 {
        (m_abs as f64 * theta).sin()
    } else {
        1.0
    };
    normalisation(n, m) * radial(n, m_abs, rho) * angular
}

/// Result of a weighted Zernike fit.
#[derive(Debug, Clone, PartialEq)]
pub struct ZernikeFit {
    pub wavelength_um: f64,
    pub field_id: usize,
    /// Maximum radial order included in the fit.
    pub max_order: usize,
    /// Coefficients in waves, indexed by OSA j. Excluded low-order terms
    /// are pinned to zero.
    pub coefficients: Vec<f64>,
    /// Weighted RMS of the fit residual (waves).
    pub residual_rms_waves: f64,
    /// Peak-to-valley of the fit residual (waves).
    pub residual_pv_waves: f64,
    /// Pupil samples that entered the fit.
    pub samples_used: usize,
}

impl ZernikeFit {
    /// Coefficient for OSA term `j`, zero beyond the fitted order.
    pub fn coefficient(&self, j: usize) -> f64 {
        self.coefficients.get(j).copied().unwrap_or(0.0)
    }
}

/// Fit Zernike coefficients to an OPD map by weighted least squares.
///
/// Samples outside the annulus `obscuration < ρ ≤ 1` or with zero weight
/// are discarded. The fit needs at least as many usable samples as free
/// terms; a rank-deficient pattern (all samples on one line, say) fails
/// the Cholesky factorisation and reports
/// [`EvalError::NotPositiveDefinite`].
pub fn fit_zernike(
    map: &OpdMap,
    max_order: usize,
    obscuration: f64,
) -> Result<ZernikeFit, EvalError> {
    fit_zernike_with(map, max_order, obscuration, Exclusion::default())
}

/// [`fit_zernike`] with an explicit low-order exclusion policy.
pub fn fit_zernike_with(
    map: &OpdMap,
    max_order: usize,
    obscuration: f64,
    exclude: Exclusion,
) -> Result<ZernikeFit, EvalError> {
    let first = exclude.first_term();
    let n_terms = term_count(max_order);
    if n_terms <= first {
        return Err(EvalError::SingularFit);
    }
    let n_free = n_terms - first;

    // Usable samples in polar pupil coordinates.
    let mut rho_theta_w_opd: Vec<(f64, f64, f64, f64)> = Vec::new();
    for s in &map.samples {
        if s.weight <= 0.0 || s.vignetted {
            continue;
        }
        let rho = (s.pupil[0] * s.pupil[0] + s.pupil[1] * s.pupil[1]).sqrt();
        if rho <= obscuration || rho > 1.0 + 1e-12 {
            continue;
        }
        let theta = s.pupil[1].atan2(s.pupil[0]);
        rho_theta_w_opd.push((rho, theta, s.weight, s.opd_waves));
    }
    if rho_theta_w_opd.is_empty() {
        return Err(EvalError::NoSamples);
    }
    if rho_theta_w_opd.len() < n_free {
        return Err(EvalError::SingularFit);
    }

    // Design matrix, one row per sample, one column per free term.
    let n_samples = rho_theta_w_opd.len();
    let design = Array2::from_shape_fn((n_samples, n_free), |(i, k)| {
        let (rho, theta, _, _) = rho_theta_w_opd[i];
        zernike(first + k, rho, theta)
    });

    // Normal equations G c = r with G = AᵀWA, solved by Cholesky.
    let g = faer::Mat::<f64>::from_fn(n_free, n_free, |a, b| {
        let mut acc = 0.0;
        for (i, &(_, _, w, _)) in rho_theta_w_opd.iter().enumerate() {
            acc += w * design[[i, a]] * design[[i, b]];
        }
        acc
    });
    let rhs = faer::Col::<f64>::from_fn(n_free, |a| {
        let mut acc = 0.0;
        for (i, &(_, _, w, opd)) in rho_theta_w_opd.iter().enumerate() {
            acc += w * design[[i, a]] * opd;
        }
        acc
    });

    let llt = g
        .cholesky(faer::Side::Lower)
        .map_err(|_| EvalError::NotPositiveDefinite)?;
    let sol = llt.solve(&rhs);

    let mut coefficients = vec![0.0; n_terms];
    for k in 0..n_free {
        coefficients[first + k] = sol[k];
    }

    // Residual statistics over the fitted samples.
    let mut wsum = 0.0;
    let mut acc = 0.0;
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for (i, &(_, _, w, opd)) in rho_theta_w_opd.iter().enumerate() {
        let mut model = 0.0;
        for k in 0..n_free {
            model += sol[k] * design[[i, k]];
        }
        let r = opd - model;
        wsum += w;
        acc += w * r * r;
        lo = lo.min(r);
        hi = hi.max(r);
    }

    Ok(ZernikeFit {
        wavelength_um: map.wavelength_um,
        field_id: map.field_id,
        max_order,
        coefficients,
        residual_rms_waves: (acc / wsum).sqrt(),
        residual_pv_waves: hi - lo,
        samples_used: n_samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::opd::OpdSample;
    use approx::assert_relative_eq;

    #[test]
    fn osa_mapping_matches_convention() {
        assert_eq!(osa_index(0), (0, 0)); // piston
        assert_eq!(osa_index(1), (1, -1)); // y tilt
        assert_eq!(osa_index(2), (1, 1)); // x tilt
        assert_eq!(osa_index(3), (2, -2)); // oblique astigmatism
        assert_eq!(osa_index(4), (2, 0)); // defocus
        assert_eq!(osa_index(11), (4, 0)); // primary spherical
        assert_eq!(osa_index(12), (4, 2));
    }

    #[test]
    fn defocus_has_textbook_form() {
        // Z4 = √3 (2ρ² − 1).
        for &rho in &[0.0, 0.3, 0.7, 1.0] {
            assert_relative_eq!(
                zernike(4, rho, 0.9),
                3.0_f64.sqrt() * (2.0 * rho * rho - 1.0),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn spherical_has_textbook_form() {
        // Z11 = √5 (6ρ⁴ − 6ρ² + 1).
        let rho = 0.6_f64;
        assert_relative_eq!(
            zernike(11, rho, 0.0),
            5.0_f64.sqrt() * (6.0 * rho.powi(4) - 6.0 * rho * rho + 1.0),
            epsilon = 1e-12
        );
    }

    #[test]
    fn terms_are_orthonormal_on_the_disc() {
        // ⟨Z_j, Z_k⟩ = π δ_jk, checked by midpoint quadrature.
        let steps_r = 400;
        let steps_t = 400;
        for &(j, k) in &[(4usize, 4usize), (4, 11), (11, 11), (3, 5), (5, 5)] {
            let mut acc = 0.0;
            for ir in 0..steps_r {
                let rho = (ir as f64 + 0.5) / steps_r as f64;
                for it in 0..steps_t {
                    let theta = 2.0 * std::f64::consts::PI * (it as f64 + 0.5) / steps_t as f64;
                    acc += zernike(j, rho, theta) * zernike(k, rho, theta) * rho;
                }
            }
            acc *= (1.0 / steps_r as f64) * (2.0 * std::f64::consts::PI / steps_t as f64);
            let expected = if j == k { std::f64::consts::PI } else { 0.0 };
            assert_relative_eq!(acc, expected, epsilon = 1e-3);
        }
    }

    fn synthetic_map(coeffs: &[(usize, f64)]) -> OpdMap {
        let mut samples = Vec::new();
        let n = 15;
        for iy in 0..n {
            for ix in 0..n {
                let px = -1.0 + 2.0 * ix as f64 / (n - 1) as f64;
                let py = -1.0 + 2.0 * iy as f64 / (n - 1) as f64;
                if px * px + py * py > 1.0 {
                    continue;
                }
                let rho = (px * px + py * py).sqrt();
                let theta = py.atan2(px);
                let opd_waves: f64 = coeffs
                    .iter()
                    .map(|&(j, c)| c * zernike(j, rho, theta))
                    .sum();
                samples.push(OpdSample {
                    pupil: [px, py],
                    opd_mm: opd_waves * 0.5876e-3,
                    opd_waves,
                    weight: 1.0,
                    vignetted: false,
                });
            }
        }
        OpdMap {
            wavelength_um: 0.5876,
            field_id: 0,
            samples,
        }
    }

    #[test]
    fn fit_recovers_defocus_and_spherical() {
        let map = synthetic_map(&[(4, 1.5), (11, -0.8)]);
        let fit = fit_zernike(&map, 6, 0.0).unwrap();
        assert_relative_eq!(fit.coefficient(4), 1.5, epsilon = 1e-6);
        assert_relative_eq!(fit.coefficient(11), -0.8, epsilon = 1e-6);
        for j in Exclusion::default().first_term()..fit.coefficients.len() {
            if j != 4 && j != 11 {
                assert!(
                    fit.coefficient(j).abs() < 1e-6,
                    "term {j} leaked: {}",
                    fit.coefficient(j)
                );
            }
        }
        assert!(fit.residual_rms_waves < 1e-9);
    }

    #[test]
    fn piston_and_tilts_are_never_fitted() {
        let map = synthetic_map(&[(4, 0.25)]);
        let fit = fit_zernike(&map, 4, 0.0).unwrap();
        assert_eq!(fit.coefficient(0), 0.0);
        assert_eq!(fit.coefficient(1), 0.0);
        assert_eq!(fit.coefficient(2), 0.0);
    }

    #[test]
    fn unexcluded_fit_recovers_piston_and_tilts() {
        let map = synthetic_map(&[(0, 0.4), (2, -0.6), (4, 1.0)]);
        let fit = fit_zernike_with(&map, 4, 0.0, Exclusion::None).unwrap();
        assert_relative_eq!(fit.coefficient(0), 0.4, epsilon = 1e-6);
        assert_relative_eq!(fit.coefficient(2), -0.6, epsilon = 1e-6);
        assert_relative_eq!(fit.coefficient(4), 1.0, epsilon = 1e-6);
        assert!(fit.residual_rms_waves < 1e-9);
    }

    #[test]
    fn piston_only_exclusion_fits_the_tilts() {
        let map = synthetic_map(&[(1, 0.3), (4, 0.25)]);
        let fit = fit_zernike_with(&map, 4, 0.0, Exclusion::Piston).unwrap();
        assert_eq!(fit.coefficient(0), 0.0);
        assert_relative_eq!(fit.coefficient(1), 0.3, epsilon = 1e-6);
        assert_relative_eq!(fit.coefficient(4), 0.25, epsilon = 1e-6);
    }

    #[test]
    fn obscured_samples_are_discarded() {
        let map = synthetic_map(&[(4, 1.0)]);
        let all = fit_zernike(&map, 4, 0.0).unwrap();
        let annular = fit_zernike(&map, 4, 0.5).unwrap();
        assert!(annular.samples_used < all.samples_used);
        // The basis stays the full-disc one; the fit still recovers the
        // coefficient because the data is exactly in the basis.
        assert_relative_eq!(annular.coefficient(4), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn too_few_samples_is_an_error() {
        let mut map = synthetic_map(&[(4, 1.0)]);
        map.samples.truncate(3);
        assert!(fit_zernike(&map, 6, 0.0).is_err());
    }
}
