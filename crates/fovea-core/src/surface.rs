//! The expanded surface table.
//!
//! A lens design is evaluated against an ordered list of [`Surface`] rows:
//! one `Object` row at index 0, one `Image` row at the end, and refractive,
//! reflective, stop, and coordinate-break rows in between. The block
//! expander owns production of this table; everything in this crate only
//! borrows it.

use serde::{Deserialize, Serialize};

use fovea_materials::Material;

/// Number of aspheric polynomial coefficients carried per surface.
pub const ASPHERIC_COEF_COUNT: usize = 10;

/// Radius of curvature of a surface.
///
/// `Flat` is the canonical form of an infinite radius; `|r| < 1e-12` on
/// input is also canonicalized to `Flat` so near-zero garbage never reaches
/// the intersection code.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Radius {
    Flat,
    Curved(f64),
}

impl Radius {
    /// Canonicalize a raw radius value. Non-finite and near-zero values
    /// both denote a plane.
    pub fn from_value(r: f64) -> Radius {
        if !r.is_finite() || r.abs() < 1e-12 {
            Radius::Flat
        } else {
            Radius::Curved(r)
        }
    }

    /// Curvature `1/R`, zero for a plane.
    pub fn curvature(&self) -> f64 {
        match self {
            Radius::Flat => 0.0,
            Radius::Curved(r) => 1.0 / r,
        }
    }

    /// The signed radius, infinite for a plane.
    pub fn value(&self) -> f64 {
        match self {
            Radius::Flat => f64::INFINITY,
            Radius::Curved(r) => *r,
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(self, Radius::Flat)
    }
}

impl Default for Radius {
    fn default() -> Self {
        Radius::Flat
    }
}

/// Role of a row in the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SurfaceRole {
    /// The object plane, always row 0.
    Object,
    /// An ordinary refractive or reflective surface.
    Interior,
    /// The aperture stop.
    Stop,
    /// The image plane, always the last row.
    Image,
}

/// The six components of a coordinate-break transform plus its ordering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct CoordTransform {
    /// Decenter along the local axes (mm).
    pub decenter_x: f64,
    pub decenter_y: f64,
    pub decenter_z: f64,
    /// Tilts about the local axes (degrees, applied x then y then z).
    pub tilt_x: f64,
    pub tilt_y: f64,
    pub tilt_z: f64,
    /// Application order: `DecenterThenTilt` is flag 0 in legacy tables,
    /// `TiltThenDecenter` is flag 1.
    pub order: TransformOrder,
}

/// Which of decenter and tilt is applied first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TransformOrder {
    #[default]
    DecenterThenTilt,
    TiltThenDecenter,
}

impl TransformOrder {
    /// Legacy flag value (0 or 1).
    pub fn from_flag(flag: i64) -> TransformOrder {
        if flag == 0 {
            TransformOrder::DecenterThenTilt
        } else {
            TransformOrder::TiltThenDecenter
        }
    }

    pub fn to_flag(self) -> i64 {
        match self {
            TransformOrder::DecenterThenTilt => 0,
            TransformOrder::TiltThenDecenter => 1,
        }
    }
}

/// Geometric shape of a surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SurfaceShape {
    /// Sphere (or plane when the radius is flat).
    Spherical,
    /// Even asphere: coefficient *i* (1-based) multiplies `r^(2i)`.
    AsphericEven {
        conic: f64,
        coefs: [f64; ASPHERIC_COEF_COUNT],
    },
    /// Odd asphere: coefficient *i* (1-based) multiplies `r^(2i+1)`.
    AsphericOdd {
        conic: f64,
        coefs: [f64; ASPHERIC_COEF_COUNT],
    },
    /// Coordinate break: no intersection, only a frame transform.
    CoordBreak(CoordTransform),
}

impl Default for SurfaceShape {
    fn default() -> Self {
        SurfaceShape::Spherical
    }
}

impl SurfaceShape {
    pub fn is_coord_break(&self) -> bool {
        matches!(self, SurfaceShape::CoordBreak(_))
    }
}

/// Aperture outline of a surface; `Circular` covers ordinary lens faces,
/// the rectangular shapes exist for fold mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum ApertureShape {
    #[default]
    Circular,
    /// Square with the given half-width.
    Square { half_width: f64 },
    /// Rectangle with the given half-extents.
    Rectangular { half_width: f64, half_height: f64 },
}

/// One row of the expanded surface table.
///
/// `semidia = None` means "unconstrained": the tracer must not vignette on
/// this surface, and no default aperture is ever invented for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    /// Final index of this row in the table.
    pub id: usize,
    /// Object / Interior / Stop / Image.
    pub role: SurfaceRole,
    /// Spherical, aspheric, or coordinate break.
    pub shape: SurfaceShape,
    pub radius: Radius,
    /// Signed spacing to the next row (mm). Negative after an odd number of
    /// mirrors. Infinite only on the Object row.
    pub thickness: f64,
    /// Clear semi-diameter (mm); `None` = unconstrained.
    pub semidia: Option<f64>,
    /// Aperture outline; only consulted when `semidia` (or the shape's own
    /// extents) constrain the surface.
    pub aperture_shape: ApertureShape,
    /// Medium after this surface.
    pub material: Material,
    /// Cached d-line index of `material` (1.0 for air).
    pub nd: f64,
    /// Cached Abbe number, 0 when not applicable.
    pub abbe: f64,
    /// Identifier of the block this row was expanded from.
    pub block_id: Option<String>,
    /// Block type tag, e.g. "Lens".
    pub block_type: Option<String>,
    /// Block-local role of this row, e.g. "front", "s2", "stop".
    pub surface_role: Option<String>,
    /// True when the outer optimizer may vary this row's parameters.
    pub variable: bool,
    /// Auto-update marker for the Image row's semi-diameter.
    pub auto_semidia: bool,
    /// Gap thickness stored out-of-band for coordinate-break rows, so the
    /// break's transform fields stay untouched by gap attachment.
    pub sideband_gap: Option<SidebandGap>,
}

/// Gap storage for coordinate-break rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidebandGap {
    pub thickness: f64,
    pub material: Material,
}

impl Surface {
    /// A blank interior air surface: flat, zero thickness.
    pub fn blank(id: usize) -> Surface {
        Surface {
            id,
            role: SurfaceRole::Interior,
            shape: SurfaceShape::Spherical,
            radius: Radius::Flat,
            thickness: 0.0,
            semidia: None,
            aperture_shape: ApertureShape::Circular,
            material: Material::Air,
            nd: 1.0,
            abbe: 0.0,
            block_id: None,
            block_type: None,
            surface_role: None,
            variable: false,
            auto_semidia: false,
            sideband_gap: None,
        }
    }

    /// The object row with the default 100 mm front distance.
    pub fn object() -> Surface {
        let mut s = Surface::blank(0);
        s.role = SurfaceRole::Object;
        s.thickness = 100.0;
        s
    }

    /// The image row.
    pub fn image(id: usize) -> Surface {
        let mut s = Surface::blank(id);
        s.role = SurfaceRole::Image;
        s
    }

    /// Effective spacing to the next row. Coordinate breaks keep their gap
    /// in the sideband so the transform columns stay clean.
    pub fn spacing(&self) -> f64 {
        match &self.sideband_gap {
            Some(gap) => gap.thickness,
            None => self.thickness,
        }
    }

    /// True for rows the tracer must intersect (everything except Object
    /// and coordinate breaks).
    pub fn is_hit_surface(&self) -> bool {
        self.role != SurfaceRole::Object && !self.shape.is_coord_break()
    }
}

/// Locate the stop row, if the table has one.
pub fn stop_index(surfaces: &[Surface]) -> Option<usize> {
    surfaces.iter().position(|s| s.role == SurfaceRole::Stop)
}

/// Index of the image row (the last row by invariant).
pub fn image_index(surfaces: &[Surface]) -> usize {
    surfaces.len() - 1
}
