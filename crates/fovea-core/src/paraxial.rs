//! Paraxial (y-nu) trace.
//!
//! First-order quantities for the operand layer: effective focal length,
//! back focal length, and total track. The trace walks the surface table
//! with the classic signed-index convention: a mirror negates the running
//! index, which combines with the sign-flipped thicknesses the expander
//! writes after a mirror.
//!
//! Coordinate breaks carry no paraxial power; their tilts and decenters are
//! ignored here, which is the usual first-order treatment of folded
//! systems.

use fovea_materials::{IndexResolver, MaterialError};

use crate::surface::{Surface, SurfaceRole};

/// First-order summary of a system at one wavelength.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParaxialSummary {
    /// Effective focal length (mm).
    pub effl: f64,
    /// Back focal length: last refracting vertex to the paraxial focus (mm).
    pub bfl: f64,
    /// Total track: accumulated |spacing| from surface 1 to the image (mm).
    pub totr: f64,
}

/// Paraxial marginal trace from infinity: `y = 1, u = 0` entering surface 1.
///
/// Returns `(y_last, nu_last)` after the final refracting surface, where
/// `nu` is the reduced angle `n·u`. `None` when the table has no refracting
/// surface.
fn marginal_from_infinity(
    surfaces: &[Surface],
    wavelength_um: f64,
    resolver: &dyn IndexResolver,
) -> Result<Option<(f64, f64)>, MaterialError> {
    let mut y = 1.0;
    let mut n = 1.0_f64;
    let mut nu = 0.0_f64; // n·u
    let mut refracted = false;
    let mut pending_transfer = 0.0_f64;

    for surface in surfaces.iter().skip(1) {
        if surface.role == SurfaceRole::Image {
            break;
        }
        if surface.shape.is_coord_break() {
            pending_transfer += surface.spacing();
            continue;
        }
        // Transfer to this surface.
        y += (nu / n) * pending_transfer;
        pending_transfer = surface.spacing();

        let c = surface.radius.curvature();
        if surface.material.is_mirror() {
            // Reflection: n' = −n, power = −2nc.
            let power = -2.0 * n * c;
            nu -= y * power;
            n = -n;
            refracted = true;
        } else {
            let n_next = resolver.refractive_index(&surface.material, wavelength_um)?;
            // Preserve the propagation sign across the surface.
            let n_signed = n_next.copysign(n);
            let power = (n_signed - n) * c;
            nu -= y * power;
            n = n_signed;
            if power != 0.0 || !surface.material.is_air() {
                refracted = true;
            }
        }
    }

    if !refracted {
        return Ok(None);
    }
    Ok(Some((y, nu / n)))
}

/// Effective focal length at a wavelength. Infinite for an afocal system.
pub fn effl(
    surfaces: &[Surface],
    wavelength_um: f64,
    resolver: &dyn IndexResolver,
) -> Result<f64, MaterialError> {
    match marginal_from_infinity(surfaces, wavelength_um, resolver)? {
        Some((_, u)) if u.abs() > 1e-14 => Ok(-1.0 / u),
        _ => Ok(f64::INFINITY),
    }
}

/// Back focal length at a wavelength: from the last refracting vertex to
/// the axial crossing of the paraxial marginal ray.
pub fn bfl(
    surfaces: &[Surface],
    wavelength_um: f64,
    resolver: &dyn IndexResolver,
) -> Result<f64, MaterialError> {
    match marginal_from_infinity(surfaces, wavelength_um, resolver)? {
        Some((y, u)) if u.abs() > 1e-14 => Ok(-y / u),
        _ => Ok(f64::INFINITY),
    }
}

/// Total track length: accumulated |spacing| from surface 1 through the row
/// before the image. Mirror folds count their geometric length once.
pub fn totr(surfaces: &[Surface]) -> f64 {
    surfaces
        .iter()
        .skip(1)
        .take_while(|s| s.role != SurfaceRole::Image)
        .map(|s| s.spacing().abs())
        .sum()
}

/// Global z of the paraxial focus for an unfolded system: the axial
/// position of the last refracting vertex plus the BFL.
pub fn paraxial_image_z(
    surfaces: &[Surface],
    wavelength_um: f64,
    resolver: &dyn IndexResolver,
) -> Result<f64, MaterialError> {
    let bfl = bfl(surfaces, wavelength_um, resolver)?;
    // Axial position of the last non-image hit surface (tilt-free).
    let mut z = 0.0;
    let mut z_last_vertex = 0.0;
    for (i, surface) in surfaces.iter().enumerate().skip(1) {
        if surface.role == SurfaceRole::Image {
            break;
        }
        if i >= 2 {
            z += surfaces[i - 1].spacing();
        }
        if !surface.shape.is_coord_break() {
            z_last_vertex = z;
        }
    }
    Ok(z_last_vertex + bfl)
}

/// Full first-order summary at one wavelength.
pub fn summary(
    surfaces: &[Surface],
    wavelength_um: f64,
    resolver: &dyn IndexResolver,
) -> Result<ParaxialSummary, MaterialError> {
    Ok(ParaxialSummary {
        effl: effl(surfaces, wavelength_um, resolver)?,
        bfl: bfl(surfaces, wavelength_um, resolver)?,
        totr: totr(surfaces),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{Radius, Surface};
    use approx::assert_relative_eq;
    use fovea_materials::{resolver::FixedIndex, Material};

    fn plano_convex(n: f64) -> (Vec<Surface>, FixedIndex) {
        let mut object = Surface::object();
        object.thickness = f64::INFINITY;

        let mut front = Surface::blank(1);
        front.radius = Radius::Curved(50.0);
        front.thickness = 5.0;
        front.material = Material::Glass("N-BK7".into());

        let mut back = Surface::blank(2);
        back.thickness = 95.0;

        let image = Surface::image(3);
        (vec![object, front, back, image], FixedIndex(n))
    }

    #[test]
    fn plano_convex_effl_matches_lensmaker() {
        let (surfaces, resolver) = plano_convex(1.5168);
        let f = effl(&surfaces, 0.5876, &resolver).unwrap();
        // Flat rear: EFL = R/(n−1) exactly, thickness-independent.
        assert_relative_eq!(f, 50.0 / 0.5168, epsilon = 1e-9);
    }

    #[test]
    fn plano_convex_bfl_accounts_for_thickness() {
        let (surfaces, resolver) = plano_convex(1.5168);
        let f = effl(&surfaces, 0.5876, &resolver).unwrap();
        let b = bfl(&surfaces, 0.5876, &resolver).unwrap();
        // BFL = EFL − t/n for a flat-rear singlet.
        assert_relative_eq!(b, f - 5.0 / 1.5168, epsilon = 1e-9);
    }

    #[test]
    fn total_track_sums_spacings() {
        let (surfaces, _) = plano_convex(1.5168);
        assert_relative_eq!(totr(&surfaces), 100.0);
    }

    #[test]
    fn afocal_table_reports_infinite_focal_length() {
        let mut object = Surface::object();
        object.thickness = f64::INFINITY;
        let mut flat = Surface::blank(1);
        flat.thickness = 10.0;
        let surfaces = vec![object, flat, Surface::image(2)];
        let f = effl(&surfaces, 0.5876, &FixedIndex(1.5)).unwrap();
        assert!(f.is_infinite());
    }

    #[test]
    fn single_mirror_focal_length() {
        // Concave mirror R = −100 focuses at |R|/2 = 50.
        let mut object = Surface::object();
        object.thickness = f64::INFINITY;
        let mut mirror = Surface::blank(1);
        mirror.radius = Radius::Curved(-100.0);
        mirror.material = Material::Mirror;
        mirror.thickness = -50.0;
        let surfaces = vec![object, mirror, Surface::image(2)];
        let f = effl(&surfaces, 0.5876, &FixedIndex(1.0)).unwrap();
        assert_relative_eq!(f.abs(), 50.0, epsilon = 1e-9);
    }
}
