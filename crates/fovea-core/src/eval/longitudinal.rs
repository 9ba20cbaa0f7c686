//! Longitudinal (spherical) aberration.
//!
//! For an axial bundle at each wavelength, every ray's axial focus is
//! estimated from its traced path: the transverse radius `r(z)` is fitted
//! with weighted linear least squares over the last few path points and
//! solved for `r = 0`. The result is a sorted `(ρ, Δz)` table per
//! wavelength, for the meridional and sagittal pupil arms, plus the
//! paraxial chromatic shift `BFL(λ) − BFL(λ_primary)`.

use fovea_materials::IndexResolver;

use crate::bundle::{aim_ray, cross_heights, AimError, FieldPoint};
use crate::paraxial;
use crate::ray::RayPath;
use crate::surface::{stop_index, Surface};
use crate::trace::{trace, TraceOptions};

use super::EvalError;

/// Minimum z separation between focus-fit points (mm).
const FIT_MIN_SEPARATION: f64 = 0.01;

/// Maximum path points entering the focus fit.
const FIT_MAX_POINTS: usize = 5;

/// Reject a fitted focus further than this from the paraxial image (mm).
const FOCUS_REJECT_DISTANCE: f64 = 1000.0;

/// One fitted point of the aberration curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LsaPoint {
    /// Normalized stop height the ray was aimed at.
    pub rho: f64,
    /// Axial focus shift from the paraxial image plane (mm).
    pub delta_z: f64,
}

/// A ray that produced no finite focus, kept as a data-quality flag.
#[derive(Debug, Clone, PartialEq)]
pub struct LsaFailure {
    pub rho: f64,
    pub meridional: bool,
    pub reason: String,
}

/// Longitudinal aberration at one wavelength.
#[derive(Debug, Clone, PartialEq)]
pub struct LsaCurve {
    pub wavelength_um: f64,
    /// Sorted `(ρ, Δz)` along the +y pupil arm.
    pub meridional: Vec<LsaPoint>,
    /// Sorted `(ρ, Δz)` along the +x pupil arm.
    pub sagittal: Vec<LsaPoint>,
    /// Paraxial chromatic component `BFL(λ) − BFL(λ_primary)` (mm).
    pub chromatic_shift: f64,
    /// Rays with no finite focus; flagged, never fabricated.
    pub failures: Vec<LsaFailure>,
}

/// Compute longitudinal aberration curves for an axial field.
///
/// `samples` controls the stop-height ladder (see
/// [`cross_heights`]): heights include a near-axis anchor at 0.001 and the
/// pupil rim at 1.0.
pub fn longitudinal_aberration(
    surfaces: &[Surface],
    wavelengths: &[f64],
    primary_wavelength_um: f64,
    samples: usize,
    resolver: &dyn IndexResolver,
) -> Result<Vec<LsaCurve>, EvalError> {
    let stop = stop_index(surfaces).ok_or(AimError::NoStop)?;
    let stop_semidia = surfaces[stop].semidia.ok_or(AimError::NoStopAperture)?;
    let infinite = !surfaces[0].thickness.is_finite();
    let field = FieldPoint::on_axis(infinite);

    let z_paraxial = paraxial::paraxial_image_z(surfaces, primary_wavelength_um, resolver)?;
    let bfl_primary = paraxial::bfl(surfaces, primary_wavelength_um, resolver)?;

    let mut curves = Vec::with_capacity(wavelengths.len());
    for &wl in wavelengths {
        let bfl = paraxial::bfl(surfaces, wl, resolver)?;
        let mut curve = LsaCurve {
            wavelength_um: wl,
            meridional: Vec::new(),
            sagittal: Vec::new(),
            chromatic_shift: bfl - bfl_primary,
            failures: Vec::new(),
        };

        for &rho in &cross_heights(samples) {
            for meridional in [true, false] {
                let target = if meridional {
                    [0.0, rho * stop_semidia]
                } else {
                    [rho * stop_semidia, 0.0]
                };
                match focus_for_target(surfaces, &field, target, wl, z_paraxial, resolver) {
                    Ok(z_focus) => {
                        let point = LsaPoint {
                            rho,
                            delta_z: z_focus - z_paraxial,
                        };
                        if meridional {
                            curve.meridional.push(point);
                        } else {
                            curve.sagittal.push(point);
                        }
                    }
                    Err(reason) => curve.failures.push(LsaFailure {
                        rho,
                        meridional,
                        reason,
                    }),
                }
            }
        }
        curve
            .meridional
            .sort_by(|a, b| a.rho.partial_cmp(&b.rho).expect("finite rho"));
        curve
            .sagittal
            .sort_by(|a, b| a.rho.partial_cmp(&b.rho).expect("finite rho"));
        curves.push(curve);
    }
    Ok(curves)
}

/// Aim, trace, and fit the axial focus for one stop target.
fn focus_for_target(
    surfaces: &[Surface],
    field: &FieldPoint,
    target: [f64; 2],
    wavelength_um: f64,
    z_paraxial: f64,
    resolver: &dyn IndexResolver,
) -> Result<f64, String> {
    let ray = aim_ray(surfaces, field, target, wavelength_um, resolver)
        .map_err(|e| e.to_string())?;
    let path = trace(surfaces, &ray, 1.0, resolver, &TraceOptions::default())
        .map_err(|e| e.to_string())?;
    let z = fit_axial_focus(&path).map_err(|e| e.to_string())?;
    if (z - z_paraxial).abs() > FOCUS_REJECT_DISTANCE {
        return Err(format!("focus {z:.1} mm is too far from the paraxial image"));
    }
    Ok(z)
}

/// Estimate the z at which a traced ray crosses the axis.
///
/// Fits `r(z) = a + b·z` with weighted linear least squares over the last
/// up-to-five path points separated by at least [`FIT_MIN_SEPARATION`],
/// weighting later points exponentially more (`exp(−0.5·i)` counting back
/// from the final point), and solves `r = 0`. Rejects fits that would
/// extrapolate beyond twice the fitted z range.
pub fn fit_axial_focus(path: &RayPath) -> Result<f64, EvalError> {
    // Select fit points from the end, enforcing the z separation.
    let mut picked: Vec<(f64, f64)> = Vec::with_capacity(FIT_MAX_POINTS);
    for p in path.points.iter().rev() {
        let z = p.position[2];
        let r = (p.position[0] * p.position[0] + p.position[1] * p.position[1]).sqrt();
        if picked
            .last()
            .map_or(true, |(zp, _)| (z - zp).abs() >= FIT_MIN_SEPARATION)
        {
            picked.push((z, r));
        }
        if picked.len() == FIT_MAX_POINTS {
            break;
        }
    }
    if picked.len() < 2 {
        return Err(EvalError::NoSamples);
    }

    // picked[0] is the latest point; weight exp(−0.5·i) decays backwards.
    let mut sw = 0.0;
    let mut swz = 0.0;
    let mut swr = 0.0;
    let mut swzz = 0.0;
    let mut swzr = 0.0;
    for (i, &(z, r)) in picked.iter().enumerate() {
        let w = (-0.5 * i as f64).exp();
        sw += w;
        swz += w * z;
        swr += w * r;
        swzz += w * z * z;
        swzr += w * z * r;
    }
    let denom = sw * swzz - swz * swz;
    if denom.abs() < 1e-14 {
        return Err(EvalError::SingularFit);
    }
    let b = (sw * swzr - swz * swr) / denom;
    let a = (swr - b * swz) / sw;
    if b.abs() < 1e-14 {
        return Err(EvalError::SingularFit);
    }
    let z_focus = -a / b;

    // Extrapolation guard: stay within twice the fitted range of the
    // latest point.
    let z_lo = picked.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let z_hi = picked.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    let range = (z_hi - z_lo).max(FIT_MIN_SEPARATION);
    if (z_focus - picked[0].0).abs() > 2.0 * range {
        return Err(EvalError::SingularFit);
    }
    Ok(z_focus)
}
