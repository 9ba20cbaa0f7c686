//! Zernike round-trip on a dense synthetic pupil, and chief-ray behaviour
//! through coordinate breaks.

use fovea_core::bundle::{chief_ray, FieldPoint};
use fovea_core::eval::opd::{OpdMap, OpdSample};
use fovea_core::eval::zernike::{fit_zernike, zernike};
use fovea_core::surface::{
    CoordTransform, Radius, Surface, SurfaceRole, SurfaceShape, TransformOrder,
};
use fovea_core::trace::{trace, TraceOptions};
use fovea_materials::{GlassCatalog, Material};

const D_LINE: f64 = 0.5876;

#[test]
fn test_zernike_round_trip_dense_disc() {
    // 2000 sunflower-spiral points over the unit disc, unit weight.
    let golden = std::f64::consts::PI * (3.0 - 5.0_f64.sqrt());
    let n_points = 2000;
    let samples: Vec<OpdSample> = (0..n_points)
        .map(|i| {
            let rho = (((i as f64) + 0.5) / n_points as f64).sqrt();
            let theta = golden * i as f64;
            let opd_waves = 1.5 * zernike(4, rho, theta) - 0.8 * zernike(11, rho, theta);
            OpdSample {
                pupil: [rho * theta.cos(), rho * theta.sin()],
                opd_mm: opd_waves * D_LINE * 1e-3,
                opd_waves,
                weight: 1.0,
                vignetted: false,
            }
        })
        .collect();
    let map = OpdMap {
        wavelength_um: D_LINE,
        field_id: 0,
        samples,
    };

    let fit = fit_zernike(&map, 6, 0.0).unwrap();
    eprintln!(
        "c4 = {:.9}, c11 = {:.9}, residual RMS = {:.3e}",
        fit.coefficient(4),
        fit.coefficient(11),
        fit.residual_rms_waves
    );
    assert!((fit.coefficient(4) - 1.5).abs() <= 1e-6);
    assert!((fit.coefficient(11) + 0.8).abs() <= 1e-6);
    for (j, &c) in fit.coefficients.iter().enumerate() {
        if j != 4 && j != 11 {
            assert!(c.abs() <= 1e-6, "term {j} leaked: {c:.3e}");
        }
    }
    assert!(fit.residual_rms_waves <= 1e-6);
}

/// Stop, optional coordinate break, then a plano-convex singlet with its
/// image row at the paraxial focus of the (undecentered) lens.
fn singlet_with_break(transform: Option<CoordTransform>) -> Vec<Surface> {
    let catalog = GlassCatalog::with_builtin();
    let mut object = Surface::object();
    object.thickness = f64::INFINITY;

    let mut stop = Surface::blank(1);
    stop.role = SurfaceRole::Stop;
    stop.semidia = Some(5.0);
    stop.thickness = 5.0;

    let mut id = 2;
    let mut surfaces = vec![object, stop];
    if let Some(ct) = transform {
        let mut cb = Surface::blank(id);
        cb.shape = SurfaceShape::CoordBreak(ct);
        cb.thickness = 0.0;
        surfaces.push(cb);
        id += 1;
    }

    let mut front = Surface::blank(id);
    front.radius = Radius::Curved(50.0);
    front.thickness = 5.0;
    front.material = Material::Glass("N-BK7".into());
    surfaces.push(front);

    let mut back = Surface::blank(id + 1);
    back.thickness = 90.0;
    surfaces.push(back);
    surfaces.push(Surface::image(id + 2));

    let bfl = fovea_core::paraxial::bfl(&surfaces, D_LINE, &catalog).unwrap();
    let back_index = surfaces.len() - 2;
    surfaces[back_index].thickness = bfl;
    surfaces
}

fn chief_image_hit(surfaces: &[Surface]) -> (f64, f64) {
    let catalog = GlassCatalog::with_builtin();
    let chief = chief_ray(surfaces, &FieldPoint::on_axis(true), D_LINE, &catalog).unwrap();
    let options = TraceOptions {
        vignetting: false,
        ..Default::default()
    };
    let path = trace(surfaces, &chief, 1.0, &catalog, &options).unwrap();
    path.last_xy().unwrap()
}

#[test]
fn test_decenter_carries_the_chief_ray_with_it() {
    let decenter = CoordTransform {
        decenter_x: 0.0,
        decenter_y: 2.0,
        decenter_z: 0.0,
        tilt_x: 0.0,
        tilt_y: 0.0,
        tilt_z: 0.0,
        order: TransformOrder::TiltThenDecenter,
    };
    let (x, y) = chief_image_hit(&singlet_with_break(Some(decenter)));
    eprintln!("decentred chief hit: ({x:.6}, {y:.6})");
    // The axial chief enters the shifted lens 2 mm below its axis and is
    // bent back onto it at the focal plane: global y ≈ the decenter.
    assert!(x.abs() < 1e-9);
    assert!((y - 2.0).abs() < 0.01, "hit y = {y}");
}

#[test]
fn test_tilt_adds_a_field_like_shift() {
    let tilted = CoordTransform {
        decenter_x: 0.0,
        decenter_y: 2.0,
        decenter_z: 0.0,
        tilt_x: 5.0,
        tilt_y: 0.0,
        tilt_z: 0.0,
        order: TransformOrder::TiltThenDecenter,
    };
    let (_, y_tilted) = chief_image_hit(&singlet_with_break(Some(tilted)));
    eprintln!("tilted chief hit y = {y_tilted:.4}");
    // A 5° tilt about x looks like a 5° field angle to the lens: the hit
    // moves by roughly f·tan(5°) ≈ 8.5 mm on top of the decenter.
    assert!(
        (y_tilted - 2.0).abs() > 1.0,
        "tilt must displace the hit, got y = {y_tilted}"
    );
}

#[test]
fn test_removing_the_break_restores_the_axis() {
    let (x, y) = chief_image_hit(&singlet_with_break(None));
    eprintln!("axial chief hit: ({x:.3e}, {y:.3e})");
    assert!(x.abs() <= 1e-9 && y.abs() <= 1e-9);
}
