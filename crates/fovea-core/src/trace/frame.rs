//! Surface reference frames.
//!
//! The tracer composes a running rigid transform while walking the surface
//! table: thicknesses advance the frame origin along its local z axis, and
//! coordinate-break rows apply a decenter + three-axis tilt. Rays stay in
//! the global frame; each surface transforms the ray into its local frame
//! for intersection and back out for propagation.

use nalgebra::{Matrix3, Point3, Rotation3, Unit, Vector3};

use crate::ray::Ray;
use crate::surface::{CoordTransform, TransformOrder};

/// A rigid frame: rotation from local to global axes, plus a global origin.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Local → global rotation.
    pub rotation: Matrix3<f64>,
    /// Global position of the frame origin (the surface vertex).
    pub origin: Point3<f64>,
}

impl Default for Frame {
    fn default() -> Self {
        Frame {
            rotation: Matrix3::identity(),
            origin: Point3::origin(),
        }
    }
}

impl Frame {
    /// Frame at a global z position with unrotated axes.
    pub fn at_z(z: f64) -> Frame {
        Frame {
            rotation: Matrix3::identity(),
            origin: Point3::new(0.0, 0.0, z),
        }
    }

    /// Advance the origin by `distance` along the local z axis.
    pub fn advance(&mut self, distance: f64) {
        self.origin += self.rotation * Vector3::new(0.0, 0.0, distance);
    }

    /// Apply a coordinate-break transform.
    ///
    /// `DecenterThenTilt` (legacy flag 0) shifts the origin in the current
    /// axes and then rotates; `TiltThenDecenter` (flag 1) rotates first so
    /// the decenter happens along the tilted axes.
    pub fn apply_break(&mut self, ct: &CoordTransform) {
        let d = Vector3::new(ct.decenter_x, ct.decenter_y, ct.decenter_z);
        let tilt = tilt_rotation(ct.tilt_x, ct.tilt_y, ct.tilt_z);
        match ct.order {
            TransformOrder::DecenterThenTilt => {
                self.origin += self.rotation * d;
                self.rotation *= tilt;
            }
            TransformOrder::TiltThenDecenter => {
                self.rotation *= tilt;
                self.origin += self.rotation * d;
            }
        }
    }

    /// Transform a global point into this frame.
    pub fn to_local_point(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation.transpose() * (p - self.origin))
    }

    /// Transform a global direction into this frame.
    pub fn to_local_dir(&self, d: &Unit<Vector3<f64>>) -> Unit<Vector3<f64>> {
        Unit::new_unchecked(self.rotation.transpose() * d.as_ref())
    }

    /// Transform a local point back to the global frame.
    pub fn to_global_point(&self, p: &Point3<f64>) -> Point3<f64> {
        self.origin + self.rotation * p.coords
    }

    /// Transform a local direction back to the global frame.
    pub fn to_global_dir(&self, d: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * d
    }

    /// The ray expressed in this frame.
    pub fn to_local_ray(&self, ray: &Ray) -> Ray {
        Ray {
            origin: self.to_local_point(&ray.origin),
            direction: self.to_local_dir(&ray.direction),
            wavelength_um: ray.wavelength_um,
        }
    }
}

/// Tilt rotation from degrees about x, then y, then z, in the local axes.
fn tilt_rotation(tilt_x_deg: f64, tilt_y_deg: f64, tilt_z_deg: f64) -> Matrix3<f64> {
    let rx = Rotation3::from_axis_angle(&Vector3::x_axis(), tilt_x_deg.to_radians());
    let ry = Rotation3::from_axis_angle(&Vector3::y_axis(), tilt_y_deg.to_radians());
    let rz = Rotation3::from_axis_angle(&Vector3::z_axis(), tilt_z_deg.to_radians());
    (rx * ry * rz).into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ct(dx: f64, dy: f64, tilt_x: f64, order: TransformOrder) -> CoordTransform {
        CoordTransform {
            decenter_x: dx,
            decenter_y: dy,
            decenter_z: 0.0,
            tilt_x,
            tilt_y: 0.0,
            tilt_z: 0.0,
            order,
        }
    }

    #[test]
    fn advance_moves_along_local_z() {
        let mut f = Frame::default();
        f.advance(10.0);
        assert_relative_eq!(f.origin.z, 10.0);
        assert_relative_eq!(f.origin.x, 0.0);
    }

    #[test]
    fn pure_decenter_shifts_origin() {
        let mut f = Frame::at_z(5.0);
        f.apply_break(&ct(2.0, -1.0, 0.0, TransformOrder::DecenterThenTilt));
        assert_relative_eq!(f.origin.x, 2.0);
        assert_relative_eq!(f.origin.y, -1.0);
        assert_relative_eq!(f.origin.z, 5.0);
    }

    #[test]
    fn order_flag_changes_where_the_decenter_lands() {
        // 90° about x maps local +y to global +z. With tilt first, a +y
        // decenter therefore moves the origin along global z instead of y.
        let mut first_decenter = Frame::default();
        first_decenter.apply_break(&ct(0.0, 1.0, 90.0, TransformOrder::DecenterThenTilt));
        assert_relative_eq!(first_decenter.origin.y, 1.0, epsilon = 1e-12);
        assert_relative_eq!(first_decenter.origin.z, 0.0, epsilon = 1e-12);

        let mut first_tilt = Frame::default();
        first_tilt.apply_break(&ct(0.0, 1.0, 90.0, TransformOrder::TiltThenDecenter));
        assert_relative_eq!(first_tilt.origin.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(first_tilt.origin.z, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn local_global_round_trip() {
        let mut f = Frame::at_z(3.0);
        f.apply_break(&ct(1.0, 2.0, 30.0, TransformOrder::DecenterThenTilt));
        let p = Point3::new(0.4, -0.7, 1.3);
        let back = f.to_global_point(&f.to_local_point(&p));
        assert_relative_eq!((back - p).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn tilted_frame_advances_along_tilted_axis() {
        let mut f = Frame::default();
        f.apply_break(&ct(0.0, 0.0, 90.0, TransformOrder::DecenterThenTilt));
        f.advance(4.0);
        // Rx(90°): y → z, z → −y, so the local z axis now points along −y.
        assert_relative_eq!(f.origin.y, -4.0, epsilon = 1e-12);
        assert_relative_eq!(f.origin.z, 0.0, epsilon = 1e-12);
    }
}
