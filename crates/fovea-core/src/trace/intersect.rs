//! Ray–surface intersection in the surface-local frame.
//!
//! Spheres and planes are solved analytically. Aspheric surfaces first step
//! to the spherical approximation, then refine `f(t) = z_ray(t) − sag(r(t))`
//! with a damped Newton iteration driven by the analytic sag gradient.

use nalgebra::{Point3, Vector3};

use crate::ray::Ray;
use crate::surface::{Radius, SurfaceShape, ASPHERIC_COEF_COUNT};

/// Minimum positive travel accepted for an intersection, to reject the
/// surface the ray just left.
const T_MIN: f64 = 1e-9;

/// Newton iteration cap for aspheric refinement.
const NEWTON_MAX_ITER: usize = 20;

/// Convergence tolerance on the axial residual (mm).
const NEWTON_TOL: f64 = 1e-11;

/// Outcome of a local intersection: travel distance, hit point, and the
/// outward surface normal oriented against the incident direction.
#[derive(Debug, Clone, Copy)]
pub struct Intersection {
    pub t: f64,
    pub point: Point3<f64>,
    pub normal: Vector3<f64>,
}

/// Why a local intersection failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntersectFailure {
    /// No real intersection in front of the ray.
    Miss,
    /// The aspheric Newton iteration did not converge.
    Diverge,
}

/// Intersect a local-frame ray with a surface shape.
pub fn intersect(
    ray: &Ray,
    radius: Radius,
    shape: &SurfaceShape,
) -> Result<Intersection, IntersectFailure> {
    match shape {
        SurfaceShape::Spherical => match radius {
            Radius::Flat => intersect_plane(ray),
            Radius::Curved(r) => intersect_sphere(ray, r),
        },
        SurfaceShape::AsphericEven { conic, coefs } => {
            intersect_aspheric(ray, radius, *conic, coefs, false)
        }
        SurfaceShape::AsphericOdd { conic, coefs } => {
            intersect_aspheric(ray, radius, *conic, coefs, true)
        }
        // Coordinate breaks never intersect; the tracer filters them out.
        SurfaceShape::CoordBreak(_) => Err(IntersectFailure::Miss),
    }
}

/// Plane z = 0.
fn intersect_plane(ray: &Ray) -> Result<Intersection, IntersectFailure> {
    let dz = ray.direction.z;
    if dz.abs() < 1e-14 {
        return Err(IntersectFailure::Miss);
    }
    let t = -ray.origin.z / dz;
    if t < T_MIN {
        return Err(IntersectFailure::Miss);
    }
    let point = ray.at(t);
    Ok(Intersection {
        t,
        point,
        normal: orient_against(Vector3::z(), ray),
    })
}

/// Sphere of radius `r` with its vertex at the local origin (centre at
/// `(0, 0, r)`).
///
/// Both roots are computed; among the positive ones the hit nearest the
/// vertex plane is kept, which selects the optically active near branch for
/// both signs of `r` and both propagation directions.
fn intersect_sphere(ray: &Ray, r: f64) -> Result<Intersection, IntersectFailure> {
    let centre = Vector3::new(0.0, 0.0, r);
    let oc = ray.origin.coords - centre;
    let b = ray.direction.dot(&oc);
    let c = oc.dot(&oc) - r * r;
    let disc = b * b - c;
    if disc < 0.0 {
        return Err(IntersectFailure::Miss);
    }
    let sq = disc.sqrt();
    let candidates = [-b - sq, -b + sq];
    let mut best: Option<(f64, Point3<f64>)> = None;
    for &t in &candidates {
        if t < T_MIN {
            continue;
        }
        let p = ray.at(t);
        if best.map_or(true, |(_, bp)| p.z.abs() < bp.z.abs()) {
            best = Some((t, p));
        }
    }
    let (t, point) = best.ok_or(IntersectFailure::Miss)?;
    let normal = (point.coords - centre) / r;
    Ok(Intersection {
        t,
        point,
        normal: orient_against(normal, ray),
    })
}

/// Aspheric surface: sphere step, then damped Newton on the sag residual.
fn intersect_aspheric(
    ray: &Ray,
    radius: Radius,
    conic: f64,
    coefs: &[f64; ASPHERIC_COEF_COUNT],
    odd: bool,
) -> Result<Intersection, IntersectFailure> {
    // Analytic step to the base sphere (or plane) as the starting guess.
    let base = match radius {
        Radius::Flat => intersect_plane(ray),
        Radius::Curved(r) => intersect_sphere(ray, r).or_else(|_| intersect_plane(ray)),
    };
    let mut t = base.map(|i| i.t).unwrap_or(T_MIN);

    let curv = radius.curvature();
    let mut f_prev = f64::INFINITY;
    for _ in 0..NEWTON_MAX_ITER {
        let p = ray.at(t);
        let r2 = p.x * p.x + p.y * p.y;
        let rr = r2.sqrt();
        let (sag, dsag_dr) = sag_and_slope(curv, conic, coefs, odd, rr)
            .ok_or(IntersectFailure::Diverge)?;
        let f = p.z - sag;
        if f.abs() < NEWTON_TOL {
            let normal = sag_normal(curv, conic, coefs, odd, p.x, p.y)
                .ok_or(IntersectFailure::Diverge)?;
            return Ok(Intersection {
                t,
                point: p,
                normal: orient_against(normal, ray),
            });
        }
        // d f / d t = dz − (dsag/dr) · d(r)/dt
        let dr_dt = if rr > 1e-14 {
            (p.x * ray.direction.x + p.y * ray.direction.y) / rr
        } else {
            0.0
        };
        let df = ray.direction.z - dsag_dr * dr_dt;
        if df.abs() < 1e-14 {
            return Err(IntersectFailure::Diverge);
        }
        let mut step = -f / df;
        // Damping: halve the step while it overshoots the previous residual.
        if f.abs() > f_prev {
            step *= 0.5;
        }
        f_prev = f.abs();
        t += step;
        if !t.is_finite() || t < 0.0 {
            return Err(IntersectFailure::Miss);
        }
    }
    Err(IntersectFailure::Diverge)
}

/// Sag and radial slope of the aspheric profile at radial distance `r`.
///
/// The polynomial tail is accumulated Horner-style: `r²` (even) or the
/// running odd power is multiplied up incrementally, never recomputed with
/// a general power call.
fn sag_and_slope(
    curv: f64,
    conic: f64,
    coefs: &[f64; ASPHERIC_COEF_COUNT],
    odd: bool,
    r: f64,
) -> Option<(f64, f64)> {
    let r2 = r * r;
    // Conic contribution.
    let arg = 1.0 - (1.0 + conic) * curv * curv * r2;
    if arg < 0.0 {
        return None; // outside the conic's domain
    }
    let root = arg.sqrt();
    let denom = 1.0 + root;
    let sag_conic = curv * r2 / denom;
    let slope_conic = if curv == 0.0 { 0.0 } else { curv * r / root };

    // Polynomial contribution.
    let mut sag_poly = 0.0;
    let mut slope_poly = 0.0;
    if odd {
        // Exponents 3, 5, 7, …: start from r³ and multiply by r² per term.
        let mut power = r2 * r;
        let mut exponent = 3.0;
        for &a in coefs.iter() {
            sag_poly += a * power;
            if r > 0.0 {
                slope_poly += a * exponent * power / r;
            }
            power *= r2;
            exponent += 2.0;
        }
    } else {
        // Exponents 2, 4, 6, …: start from r² and multiply by r² per term.
        let mut power = r2;
        let mut exponent = 2.0;
        for &a in coefs.iter() {
            sag_poly += a * power;
            if r > 0.0 {
                slope_poly += a * exponent * power / r;
            }
            power *= r2;
            exponent += 2.0;
        }
    }
    Some((sag_conic + sag_poly, slope_conic + slope_poly))
}

/// Unnormalized surface normal of the sag profile at `(x, y)`.
fn sag_normal(
    curv: f64,
    conic: f64,
    coefs: &[f64; ASPHERIC_COEF_COUNT],
    odd: bool,
    x: f64,
    y: f64,
) -> Option<Vector3<f64>> {
    let r = (x * x + y * y).sqrt();
    let (_, dsag_dr) = sag_and_slope(curv, conic, coefs, odd, r)?;
    if r < 1e-14 {
        return Some(Vector3::z());
    }
    let nx = -dsag_dr * x / r;
    let ny = -dsag_dr * y / r;
    Some(Vector3::new(nx, ny, 1.0).normalize())
}

/// Flip the normal so it points into the incident half-space.
fn orient_against(normal: Vector3<f64>, ray: &Ray) -> Vector3<f64> {
    let n = normal.normalize();
    if n.dot(ray.direction.as_ref()) > 0.0 {
        -n
    } else {
        n
    }
}

/// Sag of a shape at radial distance `r`; used by the expander's preview
/// and by tests. Zero for coordinate breaks.
pub fn sag_at(radius: Radius, shape: &SurfaceShape, r: f64) -> f64 {
    let curv = radius.curvature();
    match shape {
        SurfaceShape::Spherical => {
            sag_and_slope(curv, 0.0, &[0.0; ASPHERIC_COEF_COUNT], false, r)
                .map(|(s, _)| s)
                .unwrap_or(f64::NAN)
        }
        SurfaceShape::AsphericEven { conic, coefs } => {
            sag_and_slope(curv, *conic, coefs, false, r)
                .map(|(s, _)| s)
                .unwrap_or(f64::NAN)
        }
        SurfaceShape::AsphericOdd { conic, coefs } => {
            sag_and_slope(curv, *conic, coefs, true, r)
                .map(|(s, _)| s)
                .unwrap_or(f64::NAN)
        }
        SurfaceShape::CoordBreak(_) => 0.0,
    }
}
