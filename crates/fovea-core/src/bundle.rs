//! Stop-aimed ray bundles.
//!
//! A bundle samples the pupil with one of three patterns (cross, annular,
//! grid) for a single field point and wavelength. Every ray is aimed so it
//! pierces the stop surface at its target pupil coordinate:
//!
//! - **Finite object**: the origin is the object point; a Newton iteration
//!   on the two launch slopes drives the stop-plane residual below
//!   [`AIM_TOLERANCE_MM`].
//! - **Infinite object**: the direction is fixed by the field angles; the
//!   iteration instead moves the launch origin in the object-space
//!   reference plane.
//!
//! Both solvers share the same contract: ≤ 6 iterations, millimetre-level
//! stop-plane tolerance, clamped parameters, and a damped fallback step
//! when the finite-difference Jacobian turns ill-conditioned.

use nalgebra::{Point3, Vector3};
use thiserror::Error;

use fovea_materials::IndexResolver;

use crate::ray::Ray;
use crate::surface::{stop_index, Surface};
use crate::trace::{launch_z, trace_with_local, TraceError, TraceOptions};

/// Stop-plane residual tolerance for the aim solvers (mm).
pub const AIM_TOLERANCE_MM: f64 = 1e-3;

/// Iteration cap shared by both aim solvers.
const AIM_MAX_ITER: usize = 6;

/// Slope clamp for the finite-object solver.
const SLOPE_CLAMP: f64 = 2.5;

/// Per-step origin clamp for the infinite-object solver (mm).
const ORIGIN_STEP_CLAMP: f64 = 5.0;

/// Finite-difference perturbation for the aim Jacobian.
const JACOBIAN_DELTA: f64 = 1e-6;

/// A field point in object space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldPoint {
    /// Point source at `(x, y)` on the object plane (mm).
    Finite { x: f64, y: f64 },
    /// Angular field for an infinite conjugate (radians).
    Infinite { angle_x: f64, angle_y: f64 },
}

impl FieldPoint {
    /// The on-axis field for the given conjugate kind.
    pub fn on_axis(infinite: bool) -> FieldPoint {
        if infinite {
            FieldPoint::Infinite {
                angle_x: 0.0,
                angle_y: 0.0,
            }
        } else {
            FieldPoint::Finite { x: 0.0, y: 0.0 }
        }
    }
}

/// A field point with its workbench-visible id.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Field {
    pub id: usize,
    pub point: FieldPoint,
}

/// Pupil sampling pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Pattern {
    /// Horizontal and vertical pupil diameters, `samples` heights per half
    /// arm including the rim, with a near-axis anchor at ρ = 0.001.
    Cross { samples: usize },
    /// Uniform rings × spokes with an optional central obscuration ratio.
    Annular {
        rings: usize,
        spokes: usize,
        obscuration: f64,
    },
    /// Square lattice clipped to the unit pupil circle.
    Grid { n: usize },
}

/// Role annotation on a bundle ray.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RayRole {
    Chief,
    UpperMarginal,
    LowerMarginal,
    LeftMarginal,
    RightMarginal,
    /// Interior pupil sample at the given normalized coordinate.
    Pupil,
}

/// One aimed ray of a bundle.
#[derive(Debug, Clone)]
pub struct AimedRay {
    pub ray: Ray,
    pub role: RayRole,
    pub field_id: usize,
    /// Normalized pupil coordinate the ray was aimed at.
    pub pupil: [f64; 2],
    /// Quadrature weight (pupil-area weights for rings, unity for grids,
    /// zero for the chief reference ray).
    pub weight: f64,
}

/// Failures while building a bundle.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AimError {
    #[error("Surface table has no stop surface")]
    NoStop,

    #[error("Stop surface has no semi-diameter; cannot aim pupil coordinates")]
    NoStopAperture,

    #[error("Aim solver did not converge: residual {residual_mm:.3e} mm in the stop plane")]
    DidNotConverge { residual_mm: f64 },

    #[error("Trace failed while aiming: {0}")]
    Trace(#[from] TraceError),
}

/// Aim one ray from a field point at a stop-local target coordinate (mm).
pub fn aim_ray(
    surfaces: &[Surface],
    field: &FieldPoint,
    stop_target: [f64; 2],
    wavelength_um: f64,
    resolver: &dyn IndexResolver,
) -> Result<Ray, AimError> {
    let stop = stop_index(surfaces).ok_or(AimError::NoStop)?;
    // Axial stop estimate for the initial guess: tilt-free accumulation.
    let z_stop: f64 = surfaces[1..stop].iter().map(|s| s.spacing()).sum();
    let z0 = launch_z(surfaces);

    match field {
        FieldPoint::Finite { x, y } => {
            let origin = Point3::new(*x, *y, z0);
            let reach = (z_stop - z0).max(1.0);
            let mut sx = (stop_target[0] - x) / reach;
            let mut sy = (stop_target[1] - y) / reach;

            let eval = |sx: f64, sy: f64| -> Result<[f64; 2], AimError> {
                let ray = Ray::new(origin, Vector3::new(sx, sy, 1.0), wavelength_um);
                stop_residual(surfaces, &ray, stop, stop_target, resolver)
            };

            let mut residual = eval(sx, sy)?;
            for _ in 0..AIM_MAX_ITER {
                if norm2(residual) < AIM_TOLERANCE_MM {
                    return Ok(Ray::new(origin, Vector3::new(sx, sy, 1.0), wavelength_um));
                }
                let rx = eval(sx + JACOBIAN_DELTA, sy)?;
                let ry = eval(sx, sy + JACOBIAN_DELTA)?;
                let (dx, dy) = newton_step(residual, rx, ry);
                sx = (sx + dx).clamp(-SLOPE_CLAMP, SLOPE_CLAMP);
                sy = (sy + dy).clamp(-SLOPE_CLAMP, SLOPE_CLAMP);
                residual = eval(sx, sy)?;
            }
            if norm2(residual) < AIM_TOLERANCE_MM {
                Ok(Ray::new(origin, Vector3::new(sx, sy, 1.0), wavelength_um))
            } else {
                Err(AimError::DidNotConverge {
                    residual_mm: norm2(residual),
                })
            }
        }
        FieldPoint::Infinite { angle_x, angle_y } => {
            let direction = Vector3::new(angle_x.tan(), angle_y.tan(), 1.0);
            let dnorm = direction.normalize();
            // Straight-line guess to the stop plane.
            let travel = (z_stop - z0) / dnorm.z;
            let mut ox = stop_target[0] - dnorm.x * travel;
            let mut oy = stop_target[1] - dnorm.y * travel;

            let eval = |ox: f64, oy: f64| -> Result<[f64; 2], AimError> {
                let ray = Ray::new(Point3::new(ox, oy, z0), direction, wavelength_um);
                stop_residual(surfaces, &ray, stop, stop_target, resolver)
            };

            let mut residual = eval(ox, oy)?;
            for _ in 0..AIM_MAX_ITER {
                if norm2(residual) < AIM_TOLERANCE_MM {
                    return Ok(Ray::new(Point3::new(ox, oy, z0), direction, wavelength_um));
                }
                let rx = eval(ox + JACOBIAN_DELTA, oy)?;
                let ry = eval(ox, oy + JACOBIAN_DELTA)?;
                let (dx, dy) = newton_step(residual, rx, ry);
                ox += dx.clamp(-ORIGIN_STEP_CLAMP, ORIGIN_STEP_CLAMP);
                oy += dy.clamp(-ORIGIN_STEP_CLAMP, ORIGIN_STEP_CLAMP);
                residual = eval(ox, oy)?;
            }
            if norm2(residual) < AIM_TOLERANCE_MM {
                Ok(Ray::new(Point3::new(ox, oy, z0), direction, wavelength_um))
            } else {
                Err(AimError::DidNotConverge {
                    residual_mm: norm2(residual),
                })
            }
        }
    }
}

/// The chief ray: aimed at the stop centre.
pub fn chief_ray(
    surfaces: &[Surface],
    field: &FieldPoint,
    wavelength_um: f64,
    resolver: &dyn IndexResolver,
) -> Result<Ray, AimError> {
    aim_ray(surfaces, field, [0.0, 0.0], wavelength_um, resolver)
}

/// Build an aimed bundle for a field point.
///
/// Aiming runs with vignetting disabled; evaluators re-trace with apertures
/// on and translate per-ray failures into flags.
pub fn generate_bundle(
    surfaces: &[Surface],
    field: &Field,
    pattern: &Pattern,
    wavelength_um: f64,
    resolver: &dyn IndexResolver,
) -> Result<Vec<AimedRay>, AimError> {
    let stop = stop_index(surfaces).ok_or(AimError::NoStop)?;
    let stop_semidia = surfaces[stop].semidia.ok_or(AimError::NoStopAperture)?;

    let samples = pattern_samples(pattern);
    let mut out = Vec::with_capacity(samples.len());
    for (pupil, role, weight) in samples {
        let target = [pupil[0] * stop_semidia, pupil[1] * stop_semidia];
        let ray = aim_ray(surfaces, &field.point, target, wavelength_um, resolver)?;
        out.push(AimedRay {
            ray,
            role,
            field_id: field.id,
            pupil,
            weight,
        });
    }
    Ok(out)
}

/// Normalized pupil heights for one half arm of the cross pattern:
/// a near-axis anchor at 0.001 plus `samples` uniform heights ending at the
/// rim. Shared with the longitudinal-aberration evaluator.
pub fn cross_heights(samples: usize) -> Vec<f64> {
    let n = samples.max(2);
    let mut rhos = vec![0.001];
    for k in 1..=n {
        rhos.push(k as f64 / n as f64);
    }
    rhos
}

/// Expand a pattern into `(pupil, role, weight)` triples.
fn pattern_samples(pattern: &Pattern) -> Vec<([f64; 2], RayRole, f64)> {
    let mut out = Vec::new();
    match *pattern {
        Pattern::Cross { samples } => {
            out.push(([0.0, 0.0], RayRole::Chief, 0.0));
            for &rho in &cross_heights(samples) {
                let rim = (rho - 1.0).abs() < 1e-12;
                let role_pos_y = if rim { RayRole::UpperMarginal } else { RayRole::Pupil };
                let role_neg_y = if rim { RayRole::LowerMarginal } else { RayRole::Pupil };
                let role_pos_x = if rim { RayRole::RightMarginal } else { RayRole::Pupil };
                let role_neg_x = if rim { RayRole::LeftMarginal } else { RayRole::Pupil };
                out.push(([0.0, rho], role_pos_y, 1.0));
                out.push(([0.0, -rho], role_neg_y, 1.0));
                out.push(([rho, 0.0], role_pos_x, 1.0));
                out.push(([-rho, 0.0], role_neg_x, 1.0));
            }
        }
        Pattern::Annular {
            rings,
            spokes,
            obscuration,
        } => {
            let rings = rings.max(1);
            let spokes = spokes.max(3);
            let eps = obscuration.clamp(0.0, 0.999);
            out.push(([0.0, 0.0], RayRole::Chief, 0.0));
            for j in 1..=rings {
                let rho = eps + (1.0 - eps) * j as f64 / rings as f64;
                // Pupil-area weight: an annulus at ρ carries area ∝ ρ.
                let weight = rho;
                for i in 0..spokes {
                    let theta = 2.0 * std::f64::consts::PI * i as f64 / spokes as f64;
                    out.push((
                        [rho * theta.cos(), rho * theta.sin()],
                        RayRole::Pupil,
                        weight,
                    ));
                }
            }
        }
        Pattern::Grid { n } => {
            let n = n.max(2);
            let mut has_centre = false;
            for iy in 0..n {
                for ix in 0..n {
                    let px = -1.0 + 2.0 * ix as f64 / (n - 1) as f64;
                    let py = -1.0 + 2.0 * iy as f64 / (n - 1) as f64;
                    if px * px + py * py > 1.0 {
                        continue;
                    }
                    let centre = px.abs() < 1e-12 && py.abs() < 1e-12;
                    has_centre |= centre;
                    let role = if centre { RayRole::Chief } else { RayRole::Pupil };
                    out.push(([px, py], role, 1.0));
                }
            }
            if !has_centre {
                out.push(([0.0, 0.0], RayRole::Chief, 0.0));
            }
        }
    }
    out
}

/// Residual of a trial ray in the stop-local plane (mm).
fn stop_residual(
    surfaces: &[Surface],
    ray: &Ray,
    stop: usize,
    target: [f64; 2],
    resolver: &dyn IndexResolver,
) -> Result<[f64; 2], AimError> {
    let options = TraceOptions {
        vignetting: false,
        to_surface: Some(stop),
    };
    let (_, local) = trace_with_local(surfaces, ray, 1.0, resolver, &options)?;
    Ok([local[0] - target[0], local[1] - target[1]])
}

/// Solve the 2×2 Newton update from one residual and two perturbed
/// residuals. Falls back to a short damped step along the raw residual when
/// the finite-difference Jacobian is ill-conditioned.
fn newton_step(r: [f64; 2], rx: [f64; 2], ry: [f64; 2]) -> (f64, f64) {
    let j00 = (rx[0] - r[0]) / JACOBIAN_DELTA;
    let j10 = (rx[1] - r[1]) / JACOBIAN_DELTA;
    let j01 = (ry[0] - r[0]) / JACOBIAN_DELTA;
    let j11 = (ry[1] - r[1]) / JACOBIAN_DELTA;
    let det = j00 * j11 - j01 * j10;
    let scale = j00.abs().max(j01.abs()).max(j10.abs()).max(j11.abs());
    if det.abs() < 1e-12 * scale.max(1.0) {
        // Damped fallback: walk opposite the residual at a conservative rate.
        return (-0.1 * r[0], -0.1 * r[1]);
    }
    let dx = (-r[0] * j11 + r[1] * j01) / det;
    let dy = (-r[1] * j00 + r[0] * j10) / det;
    (dx, dy)
}

fn norm2(v: [f64; 2]) -> f64 {
    (v[0] * v[0] + v[1] * v[1]).sqrt()
}
