//! Vector Snell refraction and mirror reflection.

use nalgebra::{Unit, Vector3};

/// Refract a unit direction at an interface.
///
/// `normal` must be unit length and oriented against the incident direction
/// (`d · n̂ < 0`). Returns `None` on total internal reflection.
///
/// Vector form: with $\eta = n_1 / n_2$ and $\cos\theta_i = -\mathbf{d}\cdot\hat{\mathbf{n}}$,
/// $\mathbf{t} = \eta\,\mathbf{d} + (\eta\cos\theta_i - \cos\theta_t)\,\hat{\mathbf{n}}$.
pub fn refract(
    direction: &Unit<Vector3<f64>>,
    normal: &Vector3<f64>,
    n_before: f64,
    n_after: f64,
) -> Option<Unit<Vector3<f64>>> {
    let eta = n_before / n_after;
    let cos_i = -direction.dot(normal);
    let sin2_t = eta * eta * (1.0 - cos_i * cos_i);
    if sin2_t > 1.0 {
        return None; // total internal reflection
    }
    let cos_t = (1.0 - sin2_t).sqrt();
    let refracted = direction.as_ref() * eta + normal * (eta * cos_i - cos_t);
    Some(Unit::new_normalize(refracted))
}

/// Reflect a unit direction across a surface normal.
pub fn reflect(direction: &Unit<Vector3<f64>>, normal: &Vector3<f64>) -> Unit<Vector3<f64>> {
    let d = direction.as_ref();
    Unit::new_normalize(d - 2.0 * d.dot(normal) * normal)
}
