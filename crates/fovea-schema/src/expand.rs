//! Validation and deterministic expansion of block lists.
//!
//! Expansion walks the blocks in order with a running propagation sign,
//! emitting flat [`Surface`] rows. Gaps attach their thickness to the
//! previously emitted row; mirrors flip the sign for everything that
//! follows; an `ImagePlane` block stops processing. The result is always
//! `Object` first, `Image` last, with `id = index` on every row.
//!
//! All diagnostics are collected as [`Issue`] records; a fatal validation
//! issue yields an empty surface list and no expansion output.

use fovea_core::surface::{
    ApertureShape, CoordTransform, Radius, SidebandGap, Surface, SurfaceRole, SurfaceShape,
    TransformOrder, ASPHERIC_COEF_COUNT,
};
use fovea_materials::{IndexResolver, Material};
use log::debug;

use crate::intent::{Block, BlockType, Configuration};
use crate::issue::{has_fatal, Issue, Phase};

/// Stop semi-diameter when the block specifies none.
pub const STOP_DEFAULT_SEMIDIA: f64 = 5.0;

/// Index used for an unknown glass with no catalog record.
const UNKNOWN_GLASS_ND: f64 = 1.5;

/// Check structural rules without expanding.
///
/// A block list with no fatal issues here is guaranteed to expand into a
/// non-empty table with `Object` first and `Image` last.
pub fn validate(blocks: &[Block]) -> Vec<Issue> {
    let mut issues = Vec::new();

    let mut seen_ids: Vec<&str> = Vec::new();
    for block in blocks {
        if seen_ids.contains(&block.block_id.as_str()) {
            issues.push(
                Issue::fatal(Phase::Validate, "duplicate block id").for_block(&block.block_id),
            );
        }
        seen_ids.push(&block.block_id);

        // Block-local coordinates only: a variable key naming another
        // block or a surface index is a schema violation.
        for key in block.variables.keys() {
            if key.contains('|') || key.contains(':') {
                issues.push(
                    Issue::fatal(
                        Phase::Validate,
                        format!("variable key `{key}` references outside the block"),
                    )
                    .for_block(&block.block_id),
                );
            }
        }
    }

    let object_planes = blocks
        .iter()
        .filter(|b| b.block_type == BlockType::ObjectPlane)
        .count();
    if object_planes > 1 {
        issues.push(Issue::fatal(
            Phase::Validate,
            "more than one ObjectPlane block in the configuration",
        ));
    }

    // A Gap needs a previously emitted surface row to attach to.
    let mut emits_seen = false;
    for block in blocks {
        match block.block_type {
            BlockType::ObjectPlane | BlockType::ImagePlane => {}
            BlockType::Gap => {
                if !emits_seen {
                    issues.push(
                        Issue::fatal(
                            Phase::Validate,
                            "Gap cannot attach to the Object row; it needs a preceding surface",
                        )
                        .for_block(&block.block_id),
                    );
                }
            }
            _ => emits_seen = true,
        }
        if block.block_type == BlockType::ImagePlane {
            break;
        }
    }

    if !blocks.iter().any(|b| b.block_type == BlockType::ImagePlane) {
        issues.push(Issue::warning(
            Phase::Validate,
            "no ImagePlane block; the image row is appended with defaults",
        ));
    }

    issues
}

/// Expand a configuration document, applying its `semidiaOverrides`.
pub fn expand_configuration(
    config: &Configuration,
    resolver: &dyn IndexResolver,
) -> (Vec<Surface>, Vec<Issue>) {
    let (mut surfaces, issues) = expand(&config.blocks, resolver);
    for surface in &mut surfaces {
        if let (Some(block_id), Some(role)) = (&surface.block_id, &surface.surface_role) {
            if let Some(value) = config.semidia_override(block_id, role) {
                surface.semidia = Some(value);
            }
        }
    }
    (surfaces, issues)
}

/// Deterministic expansion of a block list into a flat surface table.
///
/// Fatal validation issues short-circuit to an empty table. Expansion
/// itself only adds warnings (unknown glass, ignored trailing blocks).
pub fn expand(blocks: &[Block], resolver: &dyn IndexResolver) -> (Vec<Surface>, Vec<Issue>) {
    let mut issues = validate(blocks);
    if has_fatal(&issues) {
        return (Vec::new(), issues);
    }

    let mut state = Expander {
        resolver,
        surfaces: vec![Surface::object()],
        issues: &mut issues,
        z_sign: 1.0,
        gap_on_last: false,
        image_reached: false,
        image_semidia: None,
        image_auto: false,
    };

    for block in blocks {
        if state.image_reached {
            state.issues.push(
                Issue::warning(Phase::Expand, "block after ImagePlane ignored")
                    .for_block(&block.block_id),
            );
            continue;
        }
        match block.block_type {
            BlockType::ObjectPlane => state.object_plane(block),
            BlockType::Lens => state.lens(block),
            BlockType::Doublet => state.multiplet(block, 2),
            BlockType::Triplet => state.multiplet(block, 3),
            BlockType::Gap => state.gap(block),
            BlockType::Stop => state.stop(block),
            BlockType::CoordTrans => state.coord_trans(block),
            BlockType::Mirror => state.mirror(block),
            BlockType::ImagePlane => state.image_plane(block),
        }
    }

    let mut image = Surface::image(state.surfaces.len());
    image.semidia = state.image_semidia;
    image.auto_semidia = state.image_auto;
    state.surfaces.push(image);

    let mut surfaces = state.surfaces;
    for (index, surface) in surfaces.iter_mut().enumerate() {
        surface.id = index;
    }
    surfaces[0].role = SurfaceRole::Object;
    let last = surfaces.len() - 1;
    surfaces[last].role = SurfaceRole::Image;

    debug!("expanded {} blocks into {} surfaces", blocks.len(), surfaces.len());
    (surfaces, issues)
}

struct Expander<'a> {
    resolver: &'a dyn IndexResolver,
    surfaces: Vec<Surface>,
    issues: &'a mut Vec<Issue>,
    /// Propagation sign: −1 after an odd number of mirrors.
    z_sign: f64,
    /// Whether a Gap has already written onto the last emitted row.
    gap_on_last: bool,
    image_reached: bool,
    image_semidia: Option<f64>,
    image_auto: bool,
}

impl Expander<'_> {
    fn push(&mut self, surface: Surface) {
        self.surfaces.push(surface);
        self.gap_on_last = false;
    }

    /// New interior row tagged with block provenance.
    fn row(&mut self, block: &Block, role: &str) -> Surface {
        let mut s = Surface::blank(self.surfaces.len());
        s.block_id = Some(block.block_id.clone());
        s.block_type = Some(block_type_name(block.block_type).to_owned());
        s.surface_role = Some(role.to_owned());
        s.variable = block.any_variable();
        s
    }

    /// Resolve a material token to `(material, nd, vd)` for caching on a
    /// row, warning once per unknown glass.
    fn resolve_material(&mut self, block: &Block, token: Option<String>) -> (Material, f64, f64) {
        let material = Material::parse(token.as_deref().unwrap_or(""));
        let (nd, vd) = match &material {
            Material::Glass(name) => match self.resolver.nd_vd(name) {
                Some(pair) => pair,
                None => {
                    self.issues.push(
                        Issue::warning(
                            Phase::Expand,
                            format!(
                                "unknown glass `{name}`; using n = {UNKNOWN_GLASS_ND} with no dispersion"
                            ),
                        )
                        .for_block(&block.block_id),
                    );
                    (UNKNOWN_GLASS_ND, 0.0)
                }
            },
            Material::ConstantIndex(n) => (*n, 0.0),
            _ => (1.0, 0.0),
        };
        (material, nd, vd)
    }

    fn object_plane(&mut self, block: &Block) {
        let mode_inf = block
            .string("objectDistanceMode")
            .map(|m| m.eq_ignore_ascii_case("inf"))
            .unwrap_or(false);
        let distance = block.number("objectDistance");
        if mode_inf {
            self.surfaces[0].thickness = f64::INFINITY;
        } else {
            match distance {
                Some(d) if d.is_finite() => self.surfaces[0].thickness = d,
                Some(_) => self.issues.push(
                    Issue::warning(
                        Phase::Expand,
                        "infinite objectDistance requires objectDistanceMode = INF; keeping the default",
                    )
                    .for_block(&block.block_id),
                ),
                None => {}
            }
        }
        self.surfaces[0].block_id = Some(block.block_id.clone());
        self.surfaces[0].block_type = Some("ObjectPlane".to_owned());
        self.surfaces[0].surface_role = Some("object".to_owned());
    }

    fn lens(&mut self, block: &Block) {
        let mut front = self.row(block, "front");
        front.radius = Radius::from_value(block.number("frontRadius").unwrap_or(f64::INFINITY));
        front.thickness = self.z_sign * block.number("centerThickness").unwrap_or(0.0);
        (front.material, front.nd, front.abbe) =
            self.resolve_material(block, block.string("material"));
        front.shape = self.asphere_shape(block);
        front.semidia = block.aperture_for("front");
        self.push(front);

        let mut back = self.row(block, "back");
        back.radius = Radius::from_value(block.number("backRadius").unwrap_or(f64::INFINITY));
        back.thickness = 0.0;
        back.semidia = block.aperture_for("back");
        self.push(back);
    }

    /// Shared Doublet/Triplet emission: `glasses + 1` surfaces.
    fn multiplet(&mut self, block: &Block, glasses: usize) {
        for k in 1..=glasses {
            let mut s = self.row(block, &format!("s{k}"));
            s.radius = Radius::from_value(
                block.number(&format!("radius{k}")).unwrap_or(f64::INFINITY),
            );
            s.thickness = self.z_sign * block.number(&format!("thickness{k}")).unwrap_or(0.0);
            (s.material, s.nd, s.abbe) =
                self.resolve_material(block, block.string(&format!("material{k}")));
            s.semidia = block.aperture_for(&format!("s{k}"));
            self.push(s);
        }
        let exit = glasses + 1;
        let mut last = self.row(block, &format!("s{exit}"));
        last.radius = Radius::from_value(
            block
                .number(&format!("radius{exit}"))
                .unwrap_or(f64::INFINITY),
        );
        last.thickness = 0.0;
        last.semidia = block.aperture_for(&format!("s{exit}"));
        self.push(last);
    }

    fn gap(&mut self, block: &Block) {
        let thickness = self.z_sign * block.number("thickness").unwrap_or(0.0);
        let material_token = block.string("material");

        if self.gap_on_last {
            // Two consecutive gaps: insert a blank air surface so the
            // second gap does not overwrite the first.
            let mut blank = Surface::blank(self.surfaces.len());
            blank.block_id = Some(block.block_id.clone());
            blank.block_type = Some("Gap".to_owned());
            blank.surface_role = Some("blank".to_owned());
            blank.semidia = self.inherited_semidia();
            self.push(blank);
        }

        if self.surfaces.last().map(|s| s.role) == Some(SurfaceRole::Object) {
            // validate() rejects this; guard for direct callers.
            self.issues.push(
                Issue::fatal(Phase::Expand, "Gap cannot attach to the Object row")
                    .for_block(&block.block_id),
            );
            return;
        }
        if self.surfaces.last().is_some_and(|s| s.shape.is_coord_break()) {
            // Keep the break's transform row clean; the spacing rides in
            // the sideband.
            let material = Material::parse(material_token.as_deref().unwrap_or(""));
            let last = self.surfaces.last_mut().expect("non-empty table");
            last.sideband_gap = Some(SidebandGap {
                thickness,
                material,
            });
        } else {
            let resolved = material_token.map(|token| self.resolve_material(block, Some(token)));
            let last = self.surfaces.last_mut().expect("non-empty table");
            last.thickness = thickness;
            if let Some((material, nd, vd)) = resolved {
                last.material = material;
                last.nd = nd;
                last.abbe = vd;
            }
        }
        self.gap_on_last = true;
    }

    /// Last row's semi-diameter, skipping Stop and Coord Break rows whose
    /// apertures have special semantics.
    fn inherited_semidia(&self) -> Option<f64> {
        self.surfaces
            .iter()
            .rev()
            .find(|s| {
                s.role != SurfaceRole::Stop
                    && s.role != SurfaceRole::Object
                    && !s.shape.is_coord_break()
            })
            .and_then(|s| s.semidia)
    }

    fn stop(&mut self, block: &Block) {
        let mut s = self.row(block, "stop");
        s.role = SurfaceRole::Stop;
        s.semidia = Some(
            block
                .number("semiDiameter")
                .or_else(|| block.aperture_for("stop"))
                .unwrap_or(STOP_DEFAULT_SEMIDIA),
        );
        self.push(s);
    }

    fn coord_trans(&mut self, block: &Block) {
        let transform = CoordTransform {
            decenter_x: block.number("decenterX").unwrap_or(0.0),
            decenter_y: block.number("decenterY").unwrap_or(0.0),
            decenter_z: block.number("decenterZ").unwrap_or(0.0),
            tilt_x: block.number("tiltX").unwrap_or(0.0),
            tilt_y: block.number("tiltY").unwrap_or(0.0),
            tilt_z: block.number("tiltZ").unwrap_or(0.0),
            order: TransformOrder::from_flag(block.number("order").unwrap_or(0.0) as i64),
        };
        let mut s = self.row(block, "ct");
        s.shape = SurfaceShape::CoordBreak(transform);
        self.push(s);
    }

    fn mirror(&mut self, block: &Block) {
        let mut s = self.row(block, "mirror");
        s.radius = Radius::from_value(block.number("radius").unwrap_or(f64::INFINITY));
        s.material = Material::Mirror;
        s.semidia = block
            .number("semiDiameter")
            .or_else(|| block.aperture_for("mirror"));
        s.aperture_shape = match block.string("apertureShape").as_deref() {
            Some("Square") => ApertureShape::Square {
                half_width: block.number("halfWidth").unwrap_or(0.0),
            },
            Some("Rectangular") => ApertureShape::Rectangular {
                half_width: block.number("halfWidth").unwrap_or(0.0),
                half_height: block.number("halfHeight").unwrap_or(0.0),
            },
            _ => ApertureShape::Circular,
        };
        s.shape = self.asphere_shape(block);
        self.push(s);
        self.z_sign = -self.z_sign;
    }

    fn image_plane(&mut self, block: &Block) {
        self.image_reached = true;
        self.image_semidia = block
            .number("semiDiameter")
            .or_else(|| block.aperture_for("image"));
        self.image_auto = block
            .string("optimizeSemiDia")
            .map(|m| m.eq_ignore_ascii_case("a"))
            .unwrap_or(false);
    }

    /// Asphere inference for a block's leading surface. An explicit
    /// `surfType = Spherical` wins over non-zero asphere fields; an
    /// explicit aspheric type or any non-zero conic/coefficient infers an
    /// even asphere.
    fn asphere_shape(&mut self, block: &Block) -> SurfaceShape {
        let conic = block.number("conic").unwrap_or(0.0);
        let mut coefs = [0.0; ASPHERIC_COEF_COUNT];
        for (i, coef) in coefs.iter_mut().enumerate() {
            *coef = block.number(&format!("coef{}", i + 1)).unwrap_or(0.0);
        }
        let any_aspheric = conic != 0.0 || coefs.iter().any(|&c| c != 0.0);

        match block.string("surfType").as_deref() {
            Some("Spherical") => {
                if any_aspheric {
                    self.issues.push(
                        Issue::warning(
                            Phase::Expand,
                            "explicit surfType Spherical discards non-zero asphere fields",
                        )
                        .for_block(&block.block_id),
                    );
                }
                SurfaceShape::Spherical
            }
            Some("Aspheric odd") => SurfaceShape::AsphericOdd { conic, coefs },
            Some("Aspheric even") => SurfaceShape::AsphericEven { conic, coefs },
            _ if any_aspheric => SurfaceShape::AsphericEven { conic, coefs },
            _ => SurfaceShape::Spherical,
        }
    }
}

fn block_type_name(block_type: BlockType) -> &'static str {
    match block_type {
        BlockType::ObjectPlane => "ObjectPlane",
        BlockType::Lens => "Lens",
        BlockType::Doublet => "Doublet",
        BlockType::Triplet => "Triplet",
        BlockType::Gap => "Gap",
        BlockType::Stop => "Stop",
        BlockType::CoordTrans => "CoordTrans",
        BlockType::Mirror => "Mirror",
        BlockType::ImagePlane => "ImagePlane",
    }
}
