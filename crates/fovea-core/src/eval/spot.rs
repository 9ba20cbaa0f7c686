//! Spot diagrams.
//!
//! Traces a bundle to a target surface (the image plane by default) and
//! reduces the transverse hit cloud to RMS and GEO spot diameters about the
//! weighted centroid.

use fovea_materials::IndexResolver;

use crate::bundle::AimedRay;
use crate::surface::Surface;
use crate::trace::{trace, TraceError, TraceOptions};

/// Reduced spot statistics for one bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct SpotResult {
    /// Weighted RMS spot *diameter* (mm).
    pub rms_diameter: f64,
    /// Geometric spot diameter: twice the largest centroid distance (mm).
    pub geo_diameter: f64,
    /// Weighted centroid of the hits (mm).
    pub centroid: [f64; 2],
    /// Hits that contributed to the statistics.
    pub rays_used: usize,
    /// Per-ray failures (vignetting included), with the failing surface.
    pub failures: Vec<TraceError>,
}

/// Trace a bundle and reduce it to spot statistics.
///
/// Rays with zero weight (the chief reference ray) are traced but excluded
/// from the statistics; failed rays are collected, never fabricated.
pub fn spot_diagram(
    surfaces: &[Surface],
    bundle: &[AimedRay],
    resolver: &dyn IndexResolver,
) -> SpotResult {
    let options = TraceOptions::default();
    let mut hits: Vec<(f64, f64, f64)> = Vec::with_capacity(bundle.len());
    let mut failures = Vec::new();

    for aimed in bundle {
        match trace(surfaces, &aimed.ray, 1.0, resolver, &options) {
            Ok(path) => {
                if aimed.weight > 0.0 {
                    if let Some((x, y)) = path.last_xy() {
                        hits.push((x, y, aimed.weight));
                    }
                }
            }
            Err(e) => failures.push(e),
        }
    }

    if hits.is_empty() {
        return SpotResult {
            rms_diameter: f64::NAN,
            geo_diameter: f64::NAN,
            centroid: [f64::NAN, f64::NAN],
            rays_used: 0,
            failures,
        };
    }

    let wsum: f64 = hits.iter().map(|h| h.2).sum();
    let cx = hits.iter().map(|h| h.0 * h.2).sum::<f64>() / wsum;
    let cy = hits.iter().map(|h| h.1 * h.2).sum::<f64>() / wsum;

    let mut second_moment = 0.0;
    let mut max_r2 = 0.0_f64;
    for &(x, y, w) in &hits {
        let dx = x - cx;
        let dy = y - cy;
        let r2 = dx * dx + dy * dy;
        second_moment += w * r2;
        max_r2 = max_r2.max(r2);
    }

    SpotResult {
        rms_diameter: 2.0 * (second_moment / wsum).sqrt(),
        geo_diameter: 2.0 * max_r2.sqrt(),
        centroid: [cx, cy],
        rays_used: hits.len(),
        failures,
    }
}
