//! Wavefront optical path difference.
//!
//! For each pupil sample the OPD is the optical path length of the sampled
//! ray minus that of the chief ray, both accumulated through the full
//! system. For infinite conjugates the launch origins differ, so each
//! ray's path is first referenced to the common phase front through the
//! chief origin (the plane perpendicular to the shared field direction).

use fovea_materials::IndexResolver;

use crate::bundle::{chief_ray, generate_bundle, Field, Pattern};
use crate::surface::Surface;
use crate::trace::{trace, TraceOptions};

use super::EvalError;

/// One pupil sample of an OPD map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpdSample {
    /// Normalized pupil coordinate of the sample.
    pub pupil: [f64; 2],
    /// Optical path difference against the chief ray (mm). Zero for
    /// vignetted samples, which carry zero weight instead.
    pub opd_mm: f64,
    /// The same OPD in waves at the map's wavelength.
    pub opd_waves: f64,
    /// Fit weight: the bundle weight, zeroed when the ray vignettes or
    /// fails to trace.
    pub weight: f64,
    /// True when the sample was clipped or failed and carries no OPD.
    pub vignetted: bool,
}

/// OPD over a pupil pattern for one field and wavelength.
#[derive(Debug, Clone, PartialEq)]
pub struct OpdMap {
    pub wavelength_um: f64,
    pub field_id: usize,
    pub samples: Vec<OpdSample>,
}

impl OpdMap {
    /// Weighted RMS of the OPD in waves.
    pub fn rms_waves(&self) -> f64 {
        let mut wsum = 0.0;
        let mut acc = 0.0;
        for s in &self.samples {
            wsum += s.weight;
            acc += s.weight * s.opd_waves * s.opd_waves;
        }
        if wsum > 0.0 {
            (acc / wsum).sqrt()
        } else {
            f64::NAN
        }
    }

    /// Peak-to-valley of the unvignetted OPD in waves.
    pub fn pv_waves(&self) -> f64 {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for s in self.samples.iter().filter(|s| !s.vignetted) {
            lo = lo.min(s.opd_waves);
            hi = hi.max(s.opd_waves);
        }
        if hi >= lo {
            hi - lo
        } else {
            f64::NAN
        }
    }
}

/// Build the OPD map for a field point over a pupil pattern.
pub fn opd_map(
    surfaces: &[Surface],
    field: &Field,
    pattern: &Pattern,
    wavelength_um: f64,
    resolver: &dyn IndexResolver,
) -> Result<OpdMap, EvalError> {
    let chief = chief_ray(surfaces, &field.point, wavelength_um, resolver)?;
    let unvignetted = TraceOptions {
        vignetting: false,
        ..Default::default()
    };
    let chief_path = trace(surfaces, &chief, 1.0, resolver, &unvignetted)
        .map_err(crate::bundle::AimError::Trace)?;
    let chief_opl = chief_path.optical_path_length;

    let bundle = generate_bundle(surfaces, field, pattern, wavelength_um, resolver)?;
    let options = TraceOptions::default();
    let waves_per_mm = 1.0 / (wavelength_um * 1e-3);

    let mut samples = Vec::with_capacity(bundle.len());
    for aimed in &bundle {
        match trace(surfaces, &aimed.ray, 1.0, resolver, &options) {
            Ok(path) => {
                // Reference to the phase front through the chief origin:
                // subtract the head start of this ray's launch point along
                // the propagation direction (object space is index 1).
                let offset = [
                    aimed.ray.origin.x - chief.origin.x,
                    aimed.ray.origin.y - chief.origin.y,
                    aimed.ray.origin.z - chief.origin.z,
                ];
                let head_start = aimed.ray.direction.x * offset[0]
                    + aimed.ray.direction.y * offset[1]
                    + aimed.ray.direction.z * offset[2];
                let opd_mm = (path.optical_path_length - head_start) - chief_opl;
                samples.push(OpdSample {
                    pupil: aimed.pupil,
                    opd_mm,
                    opd_waves: opd_mm * waves_per_mm,
                    weight: aimed.weight,
                    vignetted: false,
                });
            }
            Err(_) => samples.push(OpdSample {
                pupil: aimed.pupil,
                opd_mm: 0.0,
                opd_waves: 0.0,
                weight: 0.0,
                vignetted: true,
            }),
        }
    }

    Ok(OpdMap {
        wavelength_um,
        field_id: field.id,
        samples,
    })
}
