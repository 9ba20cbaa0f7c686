//! Command implementations: load a design, expand it, evaluate it.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};

use fovea_core::bundle::{generate_bundle, Field, FieldPoint, Pattern};
use fovea_core::eval::opd::opd_map;
use fovea_core::eval::spot::spot_diagram;
use fovea_core::eval::zernike::fit_zernike;
use fovea_core::merit::{
    evaluate_requirements, MeritContext, MeritError, Requirement, RequirementStatus,
};
use fovea_core::paraxial;
use fovea_core::progress::Progress;
use fovea_core::surface::{Surface, SurfaceRole};
use fovea_core::trace::{trace, TraceOptions};
use fovea_materials::GlassCatalog;
use fovea_schema::{expand_configuration, has_fatal, Configuration, Issue};

/// Expand a design and print the flat surface table.
pub fn expand(design: &Path) -> Result<ExitCode> {
    let catalog = GlassCatalog::with_builtin();
    let (surfaces, issues) = load_design(design, &catalog)?;
    print_issues(&issues);
    if has_fatal(&issues) {
        return Ok(ExitCode::from(1));
    }

    println!("Expanded surface table ({} rows):", surfaces.len());
    println!(
        "{:>4}  {:<8} {:>12} {:>12} {:>9}  {:<10} {:<}",
        "#", "role", "radius", "thickness", "semidia", "material", "block"
    );
    for s in &surfaces {
        let provenance = match (&s.block_id, &s.surface_role) {
            (Some(id), Some(role)) => format!("{id}/{role}"),
            (Some(id), None) => id.clone(),
            _ => String::new(),
        };
        println!(
            "{:>4}  {:<8} {:>12} {:>12} {:>9}  {:<10} {:<}",
            s.id,
            role_name(s),
            format_mm(s.radius.value()),
            format_mm(s.thickness),
            s.semidia.map_or_else(|| "-".into(), |v| format!("{v:.3}")),
            s.material.to_token(),
            provenance
        );
    }

    match paraxial::summary(&surfaces, 0.5876, &catalog) {
        Ok(sum) => println!(
            "EFFL={:.4} mm  BFL={:.4} mm  TOTR={:.4} mm (d-line)",
            sum.effl, sum.bfl, sum.totr
        ),
        Err(e) => eprintln!("Warning: paraxial summary unavailable: {e}"),
    }
    Ok(ExitCode::SUCCESS)
}

/// Score a requirements file against a design.
pub fn evaluate(
    design: &Path,
    requirements: &Path,
    wavelengths: &[f64],
    fields: &[String],
    show_progress: bool,
    max_failure_rate: f64,
) -> Result<ExitCode> {
    let catalog = GlassCatalog::with_builtin();
    let (surfaces, issues) = load_design(design, &catalog)?;
    print_issues(&issues);
    if has_fatal(&issues) {
        return Ok(ExitCode::from(1));
    }

    let text = std::fs::read_to_string(requirements)
        .with_context(|| format!("Failed to read requirements file: {}", requirements.display()))?;
    let requirements: Vec<Requirement> = serde_json::from_str(&text)
        .with_context(|| "Failed to parse requirements JSON")?;

    let context = MeritContext {
        primary_wavelength_um: *wavelengths.first().unwrap_or(&0.5876),
        fields: parse_fields(fields, &surfaces)?,
    };

    let callback = |percent: f64, label: &str| {
        eprintln!("  [{percent:5.1}%] {label}");
    };
    let progress = if show_progress {
        Progress::with_callback(&callback)
    } else {
        Progress::default()
    };

    let report = match evaluate_requirements(&surfaces, &requirements, &context, &catalog, &progress)
    {
        Ok(report) => report,
        Err(MeritError::Cancelled { partial, .. }) => partial,
        Err(e) => return Err(e.into()),
    };

    println!(
        "{:<20} {:>14} {:>12} {:>12}  {}",
        "operand", "current", "amount", "contrib", "status"
    );
    for r in &report.results {
        println!(
            "{:<20} {:>14} {:>12.6} {:>12.4}  {:?}{}",
            r.operand,
            r.current.map_or_else(|| "-".into(), |v| format!("{v:.6}")),
            r.amount,
            r.contribution,
            r.status,
            r.diagnostic
                .as_deref()
                .map_or_else(String::new, |d| format!("  ({d})"))
        );
    }
    println!("Merit: {:.6e}", report.merit);

    let scored = report
        .results
        .iter()
        .filter(|r| r.status != RequirementStatus::Off)
        .count();
    let failed = report
        .results
        .iter()
        .filter(|r| r.status == RequirementStatus::Ng)
        .count();
    if scored > 0 && failed as f64 / scored as f64 > max_failure_rate {
        eprintln!("{failed}/{scored} requirements NG, above the failure threshold");
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}

/// Trace a bundle through the design and summarise the image-plane spot.
pub fn trace_bundle(
    design: &Path,
    field: &str,
    pattern: &str,
    rays: usize,
    wavelengths: &[f64],
    max_order: usize,
) -> Result<ExitCode> {
    let catalog = GlassCatalog::with_builtin();
    let (surfaces, issues) = load_design(design, &catalog)?;
    print_issues(&issues);
    if has_fatal(&issues) {
        return Ok(ExitCode::from(1));
    }

    let infinite = surfaces
        .first()
        .map(|s| s.thickness.is_infinite())
        .unwrap_or(true);
    let field = Field {
        id: 0,
        point: parse_field_point(field, infinite)?,
    };
    let pattern = parse_pattern(pattern, rays)?;

    let mut traced = 0usize;
    let mut failed = 0usize;
    for &wl in wavelengths {
        let bundle = generate_bundle(&surfaces, &field, &pattern, wl, &catalog)
            .map_err(|e| anyhow::anyhow!("Bundle aiming failed at λ={wl:.4} µm: {e}"))?;
        let spot = spot_diagram(&surfaces, &bundle, &catalog);
        traced += bundle.len();
        failed += spot.failures.len();
        println!(
            "λ={:.4} µm: {} rays, {} failed, RMS spot {:.4} mm, GEO {:.4} mm, centroid ({:.4}, {:.4})",
            wl,
            bundle.len(),
            spot.failures.len(),
            spot.rms_diameter,
            spot.geo_diameter,
            spot.centroid[0],
            spot.centroid[1]
        );
        for failure in &spot.failures {
            eprintln!("  ray lost: {failure}");
        }

        let options = TraceOptions::default();
        println!("  {:>8} {:>8} {:>12} {:>12}", "px", "py", "x_mm", "y_mm");
        for aimed in &bundle {
            if let Ok(path) = trace(&surfaces, &aimed.ray, 1.0, &catalog, &options) {
                if let Some((x, y)) = path.last_xy() {
                    println!(
                        "  {:>8.3} {:>8.3} {:>12.6} {:>12.6}",
                        aimed.pupil[0], aimed.pupil[1], x, y
                    );
                }
            }
        }
    }

    // Wavefront summary at the primary wavelength.
    let primary = *wavelengths.first().unwrap_or(&0.5876);
    let wf_pattern = Pattern::Annular {
        rings: 6,
        spokes: 12,
        obscuration: 0.0,
    };
    match opd_map(&surfaces, &field, &wf_pattern, primary, &catalog) {
        Ok(map) => {
            println!(
                "Wavefront: RMS {:.4} waves, PV {:.4} waves",
                map.rms_waves(),
                map.pv_waves()
            );
            match fit_zernike(&map, max_order, 0.0) {
                Ok(fit) => {
                    for (j, c) in fit.coefficients.iter().enumerate() {
                        if c.abs() > 1e-4 {
                            println!("  Z_{j} = {c:+.4} waves");
                        }
                    }
                    println!(
                        "  residual RMS {:.4} waves over {} samples",
                        fit.residual_rms_waves, fit.samples_used
                    );
                }
                Err(e) => eprintln!("Warning: Zernike fit failed: {e}"),
            }
        }
        Err(e) => eprintln!("Warning: wavefront map failed: {e}"),
    }

    if traced > 0 && failed as f64 / traced as f64 > 0.5 {
        eprintln!("{failed}/{traced} rays failed to reach the image plane");
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}

/// Read and expand a design document.
fn load_design(
    path: &Path,
    catalog: &GlassCatalog,
) -> Result<(Vec<Surface>, Vec<Issue>)> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read design file: {}", path.display()))?;
    let config: Configuration = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse design JSON: {}", path.display()))?;
    Ok(expand_configuration(&config, catalog))
}

fn print_issues(issues: &[Issue]) {
    for issue in issues {
        eprintln!("{issue}");
    }
}

/// Parse `--field x,y` pairs into field points, defaulting to on-axis.
fn parse_fields(specs: &[String], surfaces: &[Surface]) -> Result<Vec<Field>> {
    let infinite = surfaces
        .first()
        .map(|s| s.thickness.is_infinite())
        .unwrap_or(true);
    if specs.is_empty() {
        return Ok(vec![Field {
            id: 0,
            point: FieldPoint::on_axis(infinite),
        }]);
    }
    specs
        .iter()
        .enumerate()
        .map(|(id, spec)| {
            Ok(Field {
                id,
                point: parse_field_point(spec, infinite)?,
            })
        })
        .collect()
}

/// Parse one `x,y` field specifier. Angles in degrees for an infinite
/// conjugate, object heights in millimetres otherwise.
fn parse_field_point(spec: &str, infinite: bool) -> Result<FieldPoint> {
    let (x, y) = spec
        .split_once(',')
        .with_context(|| format!("Field '{spec}' is not an 'x,y' pair"))?;
    let x: f64 = x
        .trim()
        .parse()
        .with_context(|| format!("Field '{spec}': bad x component"))?;
    let y: f64 = y
        .trim()
        .parse()
        .with_context(|| format!("Field '{spec}': bad y component"))?;
    Ok(if infinite {
        FieldPoint::Infinite {
            angle_x: x.to_radians(),
            angle_y: y.to_radians(),
        }
    } else {
        FieldPoint::Finite { x, y }
    })
}

fn parse_pattern(name: &str, rays: usize) -> Result<Pattern> {
    match name {
        "cross" => Ok(Pattern::Cross { samples: rays.max(2) }),
        "annular" => Ok(Pattern::Annular {
            rings: rays.max(1),
            spokes: (2 * rays).max(6),
            obscuration: 0.0,
        }),
        "grid" => Ok(Pattern::Grid { n: rays.max(2) }),
        other => anyhow::bail!("Unknown pattern '{other}'. Valid patterns: cross, annular, grid"),
    }
}

fn role_name(s: &Surface) -> &'static str {
    if s.shape.is_coord_break() {
        return "break";
    }
    match s.role {
        SurfaceRole::Object => "object",
        SurfaceRole::Stop => "stop",
        SurfaceRole::Image => "image",
        SurfaceRole::Interior => "surface",
    }
}

fn format_mm(v: f64) -> String {
    if v.is_infinite() {
        "INF".into()
    } else {
        format!("{v:.4}")
    }
}
