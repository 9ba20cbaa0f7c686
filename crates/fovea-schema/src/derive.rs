//! Best-effort derivation of blocks from a legacy flat surface table.
//!
//! The inverse of expansion: walk the rows between Object and Image,
//! classify glass runs into `Lens`/`Doublet`/`Triplet` blocks, and re-emit
//! stops, mirrors, coordinate breaks, and gaps. Everything lossy or
//! heuristic (numeric material tokens, over-long glass runs) is reported
//! as an [`Issue`].

use fovea_core::surface::{Surface, SurfaceRole, SurfaceShape};
use fovea_materials::{GlassCatalog, Material};
use log::debug;
use serde_json::json;

use crate::intent::{Block, BlockType};
use crate::issue::{Issue, Phase};

/// Derive a block list from a flat surface table.
///
/// `catalog` backs the numeric-material heuristic: a legacy
/// refractive-index-as-name token is mapped to the nearest real glass by
/// weighted `(nd, vd)` distance when the row carries an Abbe number, and
/// kept as a synthetic constant-index glass otherwise.
pub fn derive_from_flat(
    surfaces: &[Surface],
    catalog: &GlassCatalog,
) -> (Vec<Block>, Vec<Issue>) {
    let mut issues = Vec::new();
    let mut blocks = Vec::new();

    if surfaces.first().map(|s| s.role) != Some(SurfaceRole::Object)
        || surfaces.last().map(|s| s.role) != Some(SurfaceRole::Image)
    {
        issues.push(Issue::fatal(
            Phase::Parse,
            "flat table must start with an Object row and end with an Image row",
        ));
        return (blocks, issues);
    }

    // Object row.
    let object = &surfaces[0];
    let mut object_block = Block::new("b0", BlockType::ObjectPlane);
    if object.thickness.is_finite() {
        object_block = object_block.with("objectDistance", object.thickness);
    } else {
        object_block = object_block.with("objectDistanceMode", "INF");
    }
    blocks.push(object_block);

    // Interior rows. `z_sign` undoes the mirror sign flips the expander
    // will re-apply.
    let mut z_sign = 1.0;
    let mut next_id = 1;
    let interior = &surfaces[1..surfaces.len() - 1];
    let mut i = 0;
    while i < interior.len() {
        let row = &interior[i];
        let id = format!("b{next_id}");
        next_id += 1;

        if row.role == SurfaceRole::Stop {
            let mut block = Block::new(&id, BlockType::Stop);
            if let Some(sd) = row.semidia {
                block = block.with("semiDiameter", sd);
            }
            blocks.push(block);
            push_gap(&mut blocks, &mut next_id, row.spacing(), z_sign);
            i += 1;
            continue;
        }

        if let SurfaceShape::CoordBreak(t) = &row.shape {
            blocks.push(
                Block::new(&id, BlockType::CoordTrans)
                    .with("decenterX", t.decenter_x)
                    .with("decenterY", t.decenter_y)
                    .with("decenterZ", t.decenter_z)
                    .with("tiltX", t.tilt_x)
                    .with("tiltY", t.tilt_y)
                    .with("tiltZ", t.tilt_z)
                    .with("order", t.order.to_flag()),
            );
            push_gap(&mut blocks, &mut next_id, row.spacing(), z_sign);
            i += 1;
            continue;
        }

        if row.material.is_mirror() {
            let mut block = Block::new(&id, BlockType::Mirror);
            if let Some(r) = radius_param(row) {
                block = block.with("radius", r);
            }
            if let Some(sd) = row.semidia {
                block = block.with("semiDiameter", sd);
            }
            blocks.push(block);
            z_sign = -z_sign;
            push_gap(&mut blocks, &mut next_id, row.spacing(), z_sign);
            i += 1;
            continue;
        }

        if is_glass_row(row) {
            // A run of consecutive glass rows terminated by its exit row.
            let mut run = 1;
            while i + run < interior.len() && is_glass_row(&interior[i + run]) {
                run += 1;
            }
            if i + run >= interior.len() {
                issues.push(
                    Issue::fatal(Phase::Parse, "glass run does not terminate before the image")
                        .at_surface(surfaces[1 + i].id),
                );
                return (blocks, issues);
            }
            let exit = &interior[i + run];

            match run {
                1 => {
                    let front = row;
                    let mut block = Block::new(&id, BlockType::Lens)
                        .with("centerThickness", z_sign * front.thickness)
                        .with("material", material_token(front, catalog, &mut issues, &id));
                    if let Some(r) = radius_param(front) {
                        block = block.with("frontRadius", r);
                    }
                    if let Some(r) = radius_param(exit) {
                        block = block.with("backRadius", r);
                    }
                    carry_asphere(&mut block, front);
                    carry_aperture(&mut block, "front", front);
                    carry_aperture(&mut block, "back", exit);
                    blocks.push(block);
                }
                2 | 3 => {
                    let block_type = if run == 2 {
                        BlockType::Doublet
                    } else {
                        BlockType::Triplet
                    };
                    let mut block = Block::new(&id, block_type);
                    for k in 0..run {
                        let s = &interior[i + k];
                        if let Some(r) = radius_param(s) {
                            block = block.with(&format!("radius{}", k + 1), r);
                        }
                        block = block
                            .with(&format!("thickness{}", k + 1), z_sign * s.thickness)
                            .with(
                                &format!("material{}", k + 1),
                                material_token(s, catalog, &mut issues, &id),
                            );
                        carry_aperture(&mut block, &format!("s{}", k + 1), s);
                    }
                    if let Some(r) = radius_param(exit) {
                        block = block.with(&format!("radius{}", run + 1), r);
                    }
                    carry_aperture(&mut block, &format!("s{}", run + 1), exit);
                    blocks.push(block);
                }
                _ => {
                    issues.push(
                        Issue::fatal(
                            Phase::Parse,
                            format!("glass run of {run} consecutive media exceeds Triplet"),
                        )
                        .at_surface(surfaces[1 + i].id),
                    );
                    return (blocks, issues);
                }
            }
            push_gap(&mut blocks, &mut next_id, exit.spacing(), z_sign);
            i += run + 1;
            continue;
        }

        // A bare air row: its spacing becomes a Gap block.
        push_gap(&mut blocks, &mut next_id, row.spacing(), z_sign);
        i += 1;
    }

    // Image row.
    let image = surfaces.last().expect("checked above");
    let mut image_block = Block::new(format!("b{next_id}"), BlockType::ImagePlane);
    if let Some(sd) = image.semidia {
        image_block = image_block.with("semiDiameter", sd);
    }
    if image.auto_semidia {
        image_block = image_block.with("optimizeSemiDia", "A");
    }
    blocks.push(image_block);

    debug!("derived {} blocks from {} surfaces", blocks.len(), surfaces.len());
    (blocks, issues)
}

fn is_glass_row(surface: &Surface) -> bool {
    matches!(
        surface.material,
        Material::Glass(_) | Material::ConstantIndex(_)
    )
}

/// Radius as a block parameter; `None` keeps the implicit `INF`.
fn radius_param(surface: &Surface) -> Option<f64> {
    match surface.radius {
        fovea_core::surface::Radius::Curved(r) => Some(r),
        fovea_core::surface::Radius::Flat => None,
    }
}

/// Material token for a block, resolving legacy numeric names against the
/// catalog where an Abbe number gives the heuristic something to match.
fn material_token(
    surface: &Surface,
    catalog: &GlassCatalog,
    issues: &mut Vec<Issue>,
    block_id: &str,
) -> String {
    match &surface.material {
        Material::ConstantIndex(n) => {
            if surface.abbe > 0.0 {
                if let Some(record) = catalog.nearest_by_index(*n, surface.abbe) {
                    issues.push(
                        Issue::warning(
                            Phase::Parse,
                            format!(
                                "numeric material {n} matched to nearest glass {} (nd {}, vd {})",
                                record.name, record.nd, record.vd
                            ),
                        )
                        .for_block(block_id)
                        .at_surface(surface.id),
                    );
                    return record.name.clone();
                }
            }
            issues.push(
                Issue::warning(
                    Phase::Parse,
                    format!("numeric material {n} kept as a synthetic constant-index glass"),
                )
                .for_block(block_id)
                .at_surface(surface.id),
            );
            surface.material.to_token()
        }
        other => other.to_token(),
    }
}

fn carry_asphere(block: &mut Block, surface: &Surface) {
    let (name, conic, coefs) = match &surface.shape {
        SurfaceShape::AsphericEven { conic, coefs } => ("Aspheric even", conic, coefs),
        SurfaceShape::AsphericOdd { conic, coefs } => ("Aspheric odd", conic, coefs),
        _ => return,
    };
    block
        .parameters
        .insert("surfType".to_owned(), json!(name));
    block.parameters.insert("conic".to_owned(), json!(conic));
    for (i, &c) in coefs.iter().enumerate() {
        if c != 0.0 {
            block.parameters.insert(format!("coef{}", i + 1), json!(c));
        }
    }
}

fn carry_aperture(block: &mut Block, role: &str, surface: &Surface) {
    if let Some(sd) = surface.semidia {
        block.aperture.insert(role.to_owned(), json!(sd));
    }
}

/// Gap block for a nonzero post-spacing. `z_sign` undoes the mirror sign
/// the expander re-applies.
fn push_gap(blocks: &mut Vec<Block>, next_id: &mut usize, spacing: f64, z_sign: f64) {
    if spacing == 0.0 {
        return;
    }
    let block = Block::new(format!("b{next_id}"), BlockType::Gap)
        .with("thickness", z_sign * spacing);
    *next_id += 1;
    blocks.push(block);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::expand;
    use crate::issue::has_fatal;
    use fovea_core::surface::Radius;

    fn catalog() -> GlassCatalog {
        GlassCatalog::with_builtin()
    }

    fn singlet_table() -> Vec<Surface> {
        let mut object = Surface::object();
        object.thickness = f64::INFINITY;

        let mut front = Surface::blank(1);
        front.radius = Radius::Curved(50.0);
        front.thickness = 5.0;
        front.material = Material::Glass("N-BK7".into());
        front.nd = 1.5168;
        front.abbe = 64.17;

        let mut back = Surface::blank(2);
        back.thickness = 95.0;

        vec![object, front, back, Surface::image(3)]
    }

    #[test]
    fn singlet_round_trips_through_blocks() {
        let cat = catalog();
        let (blocks, issues) = derive_from_flat(&singlet_table(), &cat);
        assert!(!has_fatal(&issues), "issues: {issues:?}");
        let kinds: Vec<BlockType> = blocks.iter().map(|b| b.block_type).collect();
        assert_eq!(
            kinds,
            vec![
                BlockType::ObjectPlane,
                BlockType::Lens,
                BlockType::Gap,
                BlockType::ImagePlane
            ]
        );

        let (expanded, issues) = expand(&blocks, &cat);
        assert!(!has_fatal(&issues));
        let original = singlet_table();
        assert_eq!(expanded.len(), original.len());
        for (a, b) in expanded.iter().zip(original.iter()) {
            assert_eq!(a.radius, b.radius, "surface {}", a.id);
            assert_eq!(a.thickness, b.thickness, "surface {}", a.id);
            assert_eq!(a.material, b.material, "surface {}", a.id);
        }
    }

    #[test]
    fn cemented_doublet_is_recognized() {
        let cat = catalog();
        let mut table = singlet_table();
        // Insert a flint element cemented to the crown.
        let mut flint = Surface::blank(2);
        flint.radius = Radius::Curved(-43.65);
        flint.thickness = 2.5;
        flint.material = Material::Glass("N-SF2".into());
        flint.nd = 1.64769;
        flint.abbe = 33.82;
        table.insert(2, flint);
        table[3].radius = Radius::Curved(-128.3);

        let (blocks, issues) = derive_from_flat(&table, &cat);
        assert!(!has_fatal(&issues));
        let doublet = blocks
            .iter()
            .find(|b| b.block_type == BlockType::Doublet)
            .expect("two cemented glasses derive a Doublet");
        assert_eq!(doublet.number("radius2"), Some(-43.65));
        assert_eq!(doublet.string("material2").as_deref(), Some("N-SF2"));
        assert_eq!(doublet.number("thickness1"), Some(5.0));
    }

    #[test]
    fn four_glass_run_is_fatal() {
        let cat = catalog();
        let mut table = vec![Surface::object()];
        for k in 1..=4 {
            let mut s = Surface::blank(k);
            s.thickness = 2.0;
            s.material = Material::Glass("N-BK7".into());
            table.push(s);
        }
        let mut exit = Surface::blank(5);
        exit.thickness = 50.0;
        table.push(exit);
        table.push(Surface::image(6));

        let (_, issues) = derive_from_flat(&table, &cat);
        assert!(has_fatal(&issues));
        assert!(issues.iter().any(|i| i.message.contains("exceeds Triplet")));
    }

    #[test]
    fn numeric_material_with_abbe_maps_to_nearest_glass() {
        let cat = catalog();
        let mut table = singlet_table();
        table[1].material = Material::ConstantIndex(1.5168);
        table[1].abbe = 64.0;

        let (blocks, issues) = derive_from_flat(&table, &cat);
        let lens = blocks
            .iter()
            .find(|b| b.block_type == BlockType::Lens)
            .unwrap();
        assert_eq!(lens.string("material").as_deref(), Some("N-BK7"));
        assert!(issues.iter().any(|i| i.message.contains("nearest glass")));
    }

    #[test]
    fn numeric_material_without_abbe_stays_synthetic() {
        let cat = catalog();
        let mut table = singlet_table();
        table[1].material = Material::ConstantIndex(1.62);
        table[1].abbe = 0.0;

        let (blocks, issues) = derive_from_flat(&table, &cat);
        let lens = blocks
            .iter()
            .find(|b| b.block_type == BlockType::Lens)
            .unwrap();
        let token = lens.string("material").unwrap();
        assert!(token.starts_with("1.62"), "token {token}");
        assert!(issues.iter().any(|i| i.message.contains("synthetic")));
    }

    #[test]
    fn mirror_spacing_derives_positive_gap() {
        let cat = catalog();
        let mut object = Surface::object();
        object.thickness = f64::INFINITY;
        let mut mirror = Surface::blank(1);
        mirror.radius = Radius::Curved(-100.0);
        mirror.material = Material::Mirror;
        mirror.thickness = -50.0;
        let table = vec![object, mirror, Surface::image(2)];

        let (blocks, issues) = derive_from_flat(&table, &cat);
        assert!(!has_fatal(&issues));
        let gap = blocks
            .iter()
            .find(|b| b.block_type == BlockType::Gap)
            .expect("mirror post-spacing derives a gap");
        assert_eq!(gap.number("thickness"), Some(50.0));

        // Re-expansion restores the signed thickness.
        let (expanded, _) = expand(&blocks, &cat);
        assert_eq!(expanded[1].thickness, -50.0);
    }

    #[test]
    fn aspheric_fields_are_carried_faithfully() {
        let cat = catalog();
        let mut table = singlet_table();
        let mut coefs = [0.0; fovea_core::surface::ASPHERIC_COEF_COUNT];
        coefs[0] = 1e-6;
        coefs[3] = -2e-10;
        table[1].shape = SurfaceShape::AsphericEven { conic: -1.0, coefs };

        let (blocks, issues) = derive_from_flat(&table, &cat);
        assert!(!has_fatal(&issues));
        let (expanded, _) = expand(&blocks, &cat);
        assert_eq!(expanded[1].shape, table[1].shape);
    }
}
