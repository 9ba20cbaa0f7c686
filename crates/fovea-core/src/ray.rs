//! Rays and traced ray paths.

use nalgebra::{Point3, Unit, Vector3};
use serde::{Deserialize, Serialize};

/// A single ray: position, unit direction, wavelength.
///
/// Positions are millimetres in the global frame; wavelengths are
/// micrometres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Point3<f64>,
    pub direction: Unit<Vector3<f64>>,
    pub wavelength_um: f64,
}

impl Ray {
    /// Construct from raw components, normalizing the direction.
    pub fn new(origin: Point3<f64>, direction: Vector3<f64>, wavelength_um: f64) -> Ray {
        Ray {
            origin,
            direction: Unit::new_normalize(direction),
            wavelength_um,
        }
    }

    /// An axial ray travelling +z from `(0, 0, z)`.
    pub fn axial(z: f64, wavelength_um: f64) -> Ray {
        Ray::new(Point3::new(0.0, 0.0, z), Vector3::z(), wavelength_um)
    }

    /// The point at parameter `t` along the ray.
    pub fn at(&self, t: f64) -> Point3<f64> {
        self.origin + self.direction.as_ref() * t
    }
}

/// One recorded intersection along a traced ray.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PathPoint {
    /// Index of the surface row that produced this hit.
    pub surface: usize,
    /// Hit point in the global frame (mm).
    pub position: [f64; 3],
    /// Refractive index of the medium *entered* at this surface.
    pub n_after: f64,
}

/// The start point of a ray followed by one hit per intersected surface.
///
/// Object and coordinate-break rows contribute no point. The path also
/// accumulates the optical path length so OPD falls out of two traces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RayPath {
    /// Launch position (global frame, mm).
    pub start: [f64; 3],
    /// Direction after the final traced surface.
    pub exit_direction: [f64; 3],
    /// Wavelength the ray was traced at (µm).
    pub wavelength_um: f64,
    /// Recorded hits, in surface order.
    pub points: Vec<PathPoint>,
    /// Optical path length from `start` to the last hit (mm, index-weighted).
    pub optical_path_length: f64,
}

impl RayPath {
    /// Hit recorded for a given surface index, if the ray reached it.
    pub fn hit_on(&self, surface: usize) -> Option<&PathPoint> {
        self.points.iter().find(|p| p.surface == surface)
    }

    /// The final hit (usually on the image plane).
    pub fn last_hit(&self) -> Option<&PathPoint> {
        self.points.last()
    }

    /// Transverse `(x, y)` of the final hit.
    pub fn last_xy(&self) -> Option<(f64, f64)> {
        self.last_hit().map(|p| (p.position[0], p.position[1]))
    }
}
