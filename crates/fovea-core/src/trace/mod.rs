//! Sequential real-ray tracer.
//!
//! Rays advance surface-by-surface through the expanded table: the running
//! [`frame::Frame`] composes thicknesses and coordinate breaks, each hit
//! surface intersects the ray in its local frame, and vector Snell or mirror
//! reflection bends the direction. The global frame is anchored at the
//! vertex of surface 1; the object plane sits at `z = −t_object` (finite
//! conjugates) or at infinity.
//!
//! Every failure carries the index of the surface that produced it, so a
//! partially traced bundle can still be scored ray-by-ray.

pub mod frame;
pub mod intersect;
pub mod refract;

use thiserror::Error;

use fovea_materials::{IndexResolver, MaterialError};

use crate::ray::{PathPoint, Ray, RayPath};
use crate::surface::{ApertureShape, Surface, SurfaceRole, SurfaceShape};
use frame::Frame;
use intersect::IntersectFailure;

/// Ray-trace failure taxonomy. Each variant names the surface at fault.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TraceError {
    #[error("TIR@{surface}")]
    Tir { surface: usize },

    #[error("MISS@{surface}")]
    Miss { surface: usize },

    #[error("DIVERGE@{surface}")]
    Diverge { surface: usize },

    #[error("VIGNETTED@{surface}")]
    Vignetted { surface: usize },

    #[error("COORD_BAD@{surface}")]
    CoordBad { surface: usize },

    #[error("Glass@{surface}: {source}")]
    Glass {
        surface: usize,
        source: MaterialError,
    },
}

impl TraceError {
    /// The surface index the failure is attributed to.
    pub fn surface(&self) -> usize {
        match self {
            TraceError::Tir { surface }
            | TraceError::Miss { surface }
            | TraceError::Diverge { surface }
            | TraceError::Vignetted { surface }
            | TraceError::CoordBad { surface }
            | TraceError::Glass { surface, .. } => *surface,
        }
    }
}

/// Options for a single trace call.
#[derive(Debug, Clone, Copy)]
pub struct TraceOptions {
    /// Test hits against surface apertures. An absent semi-diameter is
    /// unconstrained either way.
    pub vignetting: bool,
    /// Trace through this surface index and stop; `None` traces the full
    /// table (through the image row).
    pub to_surface: Option<usize>,
}

impl Default for TraceOptions {
    fn default() -> Self {
        TraceOptions {
            vignetting: true,
            to_surface: None,
        }
    }
}

/// Global z of the object plane: `−t_object`, or `−∞` for an infinite
/// conjugate. Surface 1's vertex defines `z = 0`.
pub fn object_z(surfaces: &[Surface]) -> f64 {
    let t = surfaces[0].thickness;
    if t.is_finite() {
        -t
    } else {
        f64::NEG_INFINITY
    }
}

/// Trace a ray through the surface table.
///
/// `start_n` is the index of the medium the ray starts in (1.0 for an
/// object in air). The returned path owns its points; the input ray and
/// table are untouched.
pub fn trace(
    surfaces: &[Surface],
    ray: &Ray,
    start_n: f64,
    resolver: &dyn IndexResolver,
    options: &TraceOptions,
) -> Result<RayPath, TraceError> {
    trace_with_local(surfaces, ray, start_n, resolver, options).map(|(path, _)| path)
}

/// Like [`trace`], additionally returning the transverse hit coordinate on
/// the final traced surface in that surface's local frame. The aim-through-
/// stop solver uses this to measure its residual in the stop plane.
pub fn trace_with_local(
    surfaces: &[Surface],
    ray: &Ray,
    start_n: f64,
    resolver: &dyn IndexResolver,
    options: &TraceOptions,
) -> Result<(RayPath, [f64; 2]), TraceError> {
    let target = options.to_surface.unwrap_or(surfaces.len() - 1);
    debug_assert!(target >= 1 && target < surfaces.len());

    let mut frame = Frame::at_z(0.0);
    let mut current = *ray;
    let mut n_current = start_n;
    let mut path = RayPath {
        start: [ray.origin.x, ray.origin.y, ray.origin.z],
        exit_direction: [ray.direction.x, ray.direction.y, ray.direction.z],
        wavelength_um: ray.wavelength_um,
        points: Vec::with_capacity(target),
        optical_path_length: 0.0,
    };
    let mut last_local = [0.0, 0.0];

    for (i, surface) in surfaces.iter().enumerate().take(target + 1).skip(1) {
        // Spacing from the previous row; surface 1 sits at the global origin.
        if i >= 2 {
            frame.advance(surfaces[i - 1].spacing());
        }

        if let SurfaceShape::CoordBreak(ct) = &surface.shape {
            let comps = [
                ct.decenter_x,
                ct.decenter_y,
                ct.decenter_z,
                ct.tilt_x,
                ct.tilt_y,
                ct.tilt_z,
            ];
            if comps.iter().any(|v| !v.is_finite()) {
                return Err(TraceError::CoordBad { surface: i });
            }
            frame.apply_break(ct);
            continue;
        }

        let local_ray = frame.to_local_ray(&current);
        let hit = intersect::intersect(&local_ray, surface.radius, &surface.shape).map_err(
            |failure| match failure {
                IntersectFailure::Miss => TraceError::Miss { surface: i },
                IntersectFailure::Diverge => TraceError::Diverge { surface: i },
            },
        )?;

        if options.vignetting {
            check_aperture(surface, hit.point.x, hit.point.y)
                .map_err(|_| TraceError::Vignetted { surface: i })?;
        }
        last_local = [hit.point.x, hit.point.y];

        let hit_global = frame.to_global_point(&hit.point);
        path.optical_path_length += n_current * (hit_global - current.origin).norm();

        // Bend the direction: mirrors reflect, the image row records only,
        // everything else refracts with the resolver's indices.
        let normal_global = frame.to_global_dir(&hit.normal);
        if surface.material.is_mirror() {
            current.direction = refract::reflect(&current.direction, &normal_global);
        } else if surface.role != SurfaceRole::Image {
            let n_next = resolver
                .refractive_index(&surface.material, current.wavelength_um)
                .map_err(|source| TraceError::Glass { surface: i, source })?;
            current.direction = refract::refract(
                &current.direction,
                &normal_global,
                n_current,
                n_next,
            )
            .ok_or(TraceError::Tir { surface: i })?;
            n_current = n_next;
        }

        current.origin = hit_global;
        path.points.push(PathPoint {
            surface: i,
            position: [hit_global.x, hit_global.y, hit_global.z],
            n_after: n_current,
        });
    }

    path.exit_direction = [
        current.direction.x,
        current.direction.y,
        current.direction.z,
    ];
    Ok((path, last_local))
}

/// Slack on aperture edges (mm) so rays aimed exactly at the rim are not
/// clipped by rounding. Well below the aim tolerance.
const APERTURE_SLACK: f64 = 1e-6;

/// Aperture test in the surface-local frame. `Err(())` means clipped.
fn check_aperture(surface: &Surface, x: f64, y: f64) -> Result<(), ()> {
    match surface.aperture_shape {
        ApertureShape::Circular => {
            if let Some(sd) = surface.semidia {
                let limit = sd + APERTURE_SLACK;
                if x * x + y * y > limit * limit {
                    return Err(());
                }
            }
        }
        ApertureShape::Square { half_width } => {
            let limit = half_width + APERTURE_SLACK;
            if x.abs() > limit || y.abs() > limit {
                return Err(());
            }
        }
        ApertureShape::Rectangular {
            half_width,
            half_height,
        } => {
            if x.abs() > half_width + APERTURE_SLACK || y.abs() > half_height + APERTURE_SLACK {
                return Err(());
            }
        }
    }
    Ok(())
}

/// Convenience: trace and return the `(x, y)` hit on the image plane.
pub fn image_hit(
    surfaces: &[Surface],
    ray: &Ray,
    resolver: &dyn IndexResolver,
    options: &TraceOptions,
) -> Result<(f64, f64), TraceError> {
    let path = trace(surfaces, ray, 1.0, resolver, options)?;
    let p = path.last_hit().expect("trace records at least one hit");
    Ok((p.position[0], p.position[1]))
}

/// Build a ray launch point for a trace entering surface 1.
///
/// For finite conjugates the ray starts on the object plane; for infinite
/// conjugates it starts on a reference plane a fixed clearance before
/// surface 1.
pub fn launch_z(surfaces: &[Surface]) -> f64 {
    const INFINITE_CLEARANCE: f64 = 10.0;
    let z = object_z(surfaces);
    if z.is_finite() {
        z
    } else {
        -INFINITE_CLEARANCE
    }
}
