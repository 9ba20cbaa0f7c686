//! Requirements, operands, and the aggregate merit function.
//!
//! A [`Requirement`] compares one scalar *operand* of the design against a
//! target with a tolerance band. The merit is the weighted sum of squared
//! violations over all enabled requirements. Evaluation is stateless: every
//! call reads the expanded surface table and the glass resolver, nothing
//! else, so scoring the same design twice gives bit-identical results.
//!
//! A failed operand never aborts a batch. Its current value is reported as
//! `None`, the requirement is marked `NG`, and the merit contribution is
//! `+∞` so the outer optimiser rejects the candidate.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fovea_materials::IndexResolver;

use crate::bundle::{chief_ray, generate_bundle, Field, Pattern};
use crate::eval::opd::opd_map;
use crate::eval::spot::spot_diagram;
use crate::eval::zernike::{fit_zernike, term_count};
use crate::eval::EvalError;
use crate::paraxial;
use crate::progress::Progress;
use crate::surface::{Surface, SurfaceShape};
use crate::trace::{trace, TraceOptions};

/// Default Zernike radial order when a WFE requirement leaves it unset.
const DEFAULT_MAX_ORDER: usize = 6;

/// Comparison operator of a requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = ">=")]
    GreaterOrEqual,
}

/// Scalar operand families the merit layer can evaluate.
///
/// `param1..param4` of the owning requirement parameterize the operand;
/// the meaning of each slot is documented per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// Effective focal length at the primary wavelength.
    Effl,
    /// Back focal length at the primary wavelength.
    Bfl,
    /// Total track length.
    Totr,
    /// RMS spot diameter for an annular bundle.
    /// `param1` = field index, `param2` = rings, `param3` = spokes,
    /// `param4` = obscuration ratio.
    SpotSizeAnnular,
    /// RMS spot diameter for a grid bundle.
    /// `param1` = field index, `param2` = grid size per side.
    SpotSizeGrid,
    /// Fitted Zernike coefficient, in waves. The OSA index rides on the
    /// operand name (`Z_11`); `param1` = field index, `param2` = radial
    /// fit order.
    Zernike(usize),
    /// Weighted RMS wavefront error in waves.
    /// `param1` = field index, `param3` = rings, `param4` = spokes.
    RmsWfe,
    /// Peak-to-valley wavefront error in waves. Same parameters.
    PvWfe,
    /// Conic constant of surface `param1`.
    Conic,
    /// Thickness (row spacing) of surface `param1`.
    Thickness,
    /// d-line index recorded on surface `param1`.
    GlassNd,
    /// Abbe number recorded on surface `param1`.
    GlassVd,
}

impl FromStr for Operand {
    type Err = MeritError;

    fn from_str(s: &str) -> Result<Operand, MeritError> {
        let token = s.trim().to_ascii_uppercase();
        if let Some(j) = token.strip_prefix("Z_") {
            let j = j
                .parse::<usize>()
                .map_err(|_| MeritError::UnknownOperand(s.to_owned()))?;
            return Ok(Operand::Zernike(j));
        }
        match token.as_str() {
            "EFFL" => Ok(Operand::Effl),
            "BFL" => Ok(Operand::Bfl),
            "TOTR" => Ok(Operand::Totr),
            "SPOT_SIZE_ANNULAR" => Ok(Operand::SpotSizeAnnular),
            "SPOT_SIZE_GRID" => Ok(Operand::SpotSizeGrid),
            "RMS_WFE" => Ok(Operand::RmsWfe),
            "PV_WFE" => Ok(Operand::PvWfe),
            "CONIC" => Ok(Operand::Conic),
            "THIC" => Ok(Operand::Thickness),
            "GLASS_ND" => Ok(Operand::GlassNd),
            "GLASS_VD" => Ok(Operand::GlassVd),
            _ => Err(MeritError::UnknownOperand(s.to_owned())),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Effl => write!(f, "EFFL"),
            Operand::Bfl => write!(f, "BFL"),
            Operand::Totr => write!(f, "TOTR"),
            Operand::SpotSizeAnnular => write!(f, "SPOT_SIZE_ANNULAR"),
            Operand::SpotSizeGrid => write!(f, "SPOT_SIZE_GRID"),
            Operand::Zernike(j) => write!(f, "Z_{j}"),
            Operand::RmsWfe => write!(f, "RMS_WFE"),
            Operand::PvWfe => write!(f, "PV_WFE"),
            Operand::Conic => write!(f, "CONIC"),
            Operand::Thickness => write!(f, "THIC"),
            Operand::GlassNd => write!(f, "GLASS_ND"),
            Operand::GlassVd => write!(f, "GLASS_VD"),
        }
    }
}

/// One declarative constraint from the requirements list.
///
/// Unknown JSON fields are preserved verbatim in `extra` so a round trip
/// through the core never loses data a newer tool wrote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub operand: String,
    #[serde(default)]
    pub config_id: usize,
    #[serde(default)]
    pub param1: Option<f64>,
    #[serde(default)]
    pub param2: Option<f64>,
    #[serde(default)]
    pub param3: Option<f64>,
    #[serde(default)]
    pub param4: Option<f64>,
    pub op: ComparisonOp,
    pub target: f64,
    #[serde(default)]
    pub tol: f64,
    #[serde(default = "default_one")]
    pub weight: f64,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}

fn default_one() -> f64 {
    1.0
}

/// Outcome status of one requirement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequirementStatus {
    Ok,
    Ng,
    Off,
}

/// Scored requirement with its diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementResult {
    pub operand: String,
    /// Evaluated operand value; `None` when the evaluator failed.
    pub current: Option<f64>,
    /// Tolerance-exceeding violation amount; `+∞` on failure.
    pub amount: f64,
    pub status: RequirementStatus,
    /// `weight · amount²`.
    pub contribution: f64,
    /// Diagnostic attached to a failed evaluation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
}

/// Aggregate of a full requirements pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeritReport {
    /// `Σ weightᵢ · amountᵢ²` over enabled requirements.
    pub merit: f64,
    pub results: Vec<RequirementResult>,
}

/// Errors from the merit layer.
#[derive(Debug, Error)]
pub enum MeritError {
    #[error("Unknown operand `{0}`")]
    UnknownOperand(String),

    #[error("Operand references field index {0}, but only {1} fields are defined")]
    FieldOutOfRange(usize, usize),

    #[error("Operand references surface {0}, which is not in the table")]
    SurfaceOutOfRange(usize),

    #[error("Operand {0} needs parameter {1}")]
    MissingParameter(Operand, &'static str),

    #[error("Z_{j} is beyond the fitted maximum order {max_order}; raise param2")]
    ZernikeOutOfRange { j: usize, max_order: usize },

    #[error("Evaluation cancelled after {completed} of {total} requirements")]
    Cancelled {
        completed: usize,
        total: usize,
        partial: MeritReport,
    },
}

/// Wavelengths and fields shared by a whole merit pass.
#[derive(Debug, Clone, PartialEq)]
pub struct MeritContext {
    pub primary_wavelength_um: f64,
    pub fields: Vec<Field>,
}

impl MeritContext {
    fn field(&self, index: usize) -> Result<&Field, MeritError> {
        self.fields
            .get(index)
            .ok_or(MeritError::FieldOutOfRange(index, self.fields.len()))
    }
}

/// Violation amount for a single comparison: how far `current` sits outside
/// the tolerance band around `target`. Zero inside the band.
pub fn violation_amount(op: ComparisonOp, current: f64, target: f64, tol: f64) -> f64 {
    if !current.is_finite() {
        return f64::INFINITY;
    }
    match op {
        ComparisonOp::LessOrEqual => (current - (target + tol)).max(0.0),
        ComparisonOp::GreaterOrEqual => ((target - tol) - current).max(0.0),
        ComparisonOp::Equal => ((current - target).abs() - tol).max(0.0),
    }
}

/// Evaluate a single operand to its current scalar value.
pub fn evaluate_operand(
    surfaces: &[Surface],
    operand: Operand,
    requirement: &Requirement,
    context: &MeritContext,
    resolver: &dyn IndexResolver,
) -> Result<f64, OperandFailure> {
    let wl = context.primary_wavelength_um;
    match operand {
        Operand::Effl => Ok(paraxial::effl(surfaces, wl, resolver)?),
        Operand::Bfl => Ok(paraxial::bfl(surfaces, wl, resolver)?),
        Operand::Totr => Ok(paraxial::totr(surfaces)),
        Operand::SpotSizeAnnular => {
            let field = context.field(param_index(requirement.param1, operand, "param1")?)?;
            let pattern = Pattern::Annular {
                rings: requirement.param2.map_or(5, |v| v.max(1.0) as usize),
                spokes: requirement.param3.map_or(8, |v| v.max(3.0) as usize),
                obscuration: requirement.param4.unwrap_or(0.0),
            };
            let bundle = generate_bundle(surfaces, field, &pattern, wl, resolver)?;
            Ok(spot_diagram(surfaces, &bundle, resolver).rms_diameter)
        }
        Operand::SpotSizeGrid => {
            let field = context.field(param_index(requirement.param1, operand, "param1")?)?;
            let pattern = Pattern::Grid {
                n: requirement.param2.map_or(7, |v| v.max(2.0) as usize),
            };
            let bundle = generate_bundle(surfaces, field, &pattern, wl, resolver)?;
            Ok(spot_diagram(surfaces, &bundle, resolver).rms_diameter)
        }
        Operand::Zernike(j) => {
            let (map, order) = wavefront_map(surfaces, requirement, operand, context, resolver)?;
            if j >= term_count(order) {
                return Err(MeritError::ZernikeOutOfRange { j, max_order: order }.into());
            }
            let fit = fit_zernike(&map, order, 0.0)?;
            Ok(fit.coefficient(j))
        }
        Operand::RmsWfe => {
            let (map, _) = wavefront_map(surfaces, requirement, operand, context, resolver)?;
            Ok(map.rms_waves())
        }
        Operand::PvWfe => {
            let (map, _) = wavefront_map(surfaces, requirement, operand, context, resolver)?;
            Ok(map.pv_waves())
        }
        Operand::Conic => {
            let surface = param_surface(surfaces, requirement.param1, operand)?;
            match surface.shape {
                SurfaceShape::AsphericEven { conic, .. }
                | SurfaceShape::AsphericOdd { conic, .. } => Ok(conic),
                _ => Ok(0.0),
            }
        }
        Operand::Thickness => {
            Ok(param_surface(surfaces, requirement.param1, operand)?.thickness)
        }
        Operand::GlassNd => Ok(param_surface(surfaces, requirement.param1, operand)?.nd),
        Operand::GlassVd => Ok(param_surface(surfaces, requirement.param1, operand)?.abbe),
    }
}

/// Why a single operand evaluation failed; feeds the `NG` diagnostic.
#[derive(Debug, Error)]
pub enum OperandFailure {
    #[error(transparent)]
    Merit(#[from] MeritError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Material(#[from] fovea_materials::MaterialError),
}

impl From<crate::bundle::AimError> for OperandFailure {
    fn from(e: crate::bundle::AimError) -> OperandFailure {
        OperandFailure::Eval(EvalError::Aim(e))
    }
}

fn param_index(
    param: Option<f64>,
    operand: Operand,
    name: &'static str,
) -> Result<usize, MeritError> {
    match param {
        Some(v) if v >= 0.0 => Ok(v as usize),
        _ => Err(MeritError::MissingParameter(operand, name)),
    }
}

fn param_surface<'a>(
    surfaces: &'a [Surface],
    param: Option<f64>,
    operand: Operand,
) -> Result<&'a Surface, MeritError> {
    let index = param_index(param, operand, "param1")?;
    surfaces
        .get(index)
        .ok_or(MeritError::SurfaceOutOfRange(index))
}

fn wavefront_map(
    surfaces: &[Surface],
    requirement: &Requirement,
    operand: Operand,
    context: &MeritContext,
    resolver: &dyn IndexResolver,
) -> Result<(crate::eval::opd::OpdMap, usize), OperandFailure> {
    let field = context.field(param_index(requirement.param1, operand, "param1")?)?;
    let pattern = Pattern::Annular {
        rings: requirement.param3.map_or(6, |v| v.max(1.0) as usize),
        spokes: requirement.param4.map_or(12, |v| v.max(3.0) as usize),
        obscuration: 0.0,
    };
    let order = requirement
        .param2
        .map_or(DEFAULT_MAX_ORDER, |v| v.max(2.0) as usize);
    let map = opd_map(
        surfaces,
        field,
        &pattern,
        context.primary_wavelength_um,
        resolver,
    )?;
    Ok((map, order))
}

/// Score one requirement, translating evaluator failures into `NG`.
pub fn score_requirement(
    surfaces: &[Surface],
    requirement: &Requirement,
    context: &MeritContext,
    resolver: &dyn IndexResolver,
) -> RequirementResult {
    let off = !requirement.enabled || requirement.weight <= 0.0;

    let evaluated = Operand::from_str(&requirement.operand)
        .map_err(OperandFailure::from)
        .and_then(|op| evaluate_operand(surfaces, op, requirement, context, resolver));

    match evaluated {
        Ok(current) => {
            let amount = violation_amount(
                requirement.op,
                current,
                requirement.target,
                requirement.tol.max(0.0),
            );
            let (status, contribution) = if off {
                (RequirementStatus::Off, 0.0)
            } else if amount > 0.0 {
                (RequirementStatus::Ng, requirement.weight * amount * amount)
            } else {
                (RequirementStatus::Ok, 0.0)
            };
            RequirementResult {
                operand: requirement.operand.clone(),
                current: current.is_finite().then_some(current),
                amount,
                status,
                contribution,
                diagnostic: (!current.is_finite())
                    .then(|| format!("operand evaluated to {current}")),
            }
        }
        Err(failure) => RequirementResult {
            operand: requirement.operand.clone(),
            current: None,
            amount: f64::INFINITY,
            status: if off {
                RequirementStatus::Off
            } else {
                RequirementStatus::Ng
            },
            contribution: if off { 0.0 } else { f64::INFINITY },
            diagnostic: Some(failure.to_string()),
        },
    }
}

/// Score a full requirements list into a merit report.
///
/// Progress is reported and cancellation polled between requirements; on
/// cancel the partial report rides inside [`MeritError::Cancelled`].
pub fn evaluate_requirements(
    surfaces: &[Surface],
    requirements: &[Requirement],
    context: &MeritContext,
    resolver: &dyn IndexResolver,
    progress: &Progress<'_>,
) -> Result<MeritReport, MeritError> {
    let total = requirements.len();
    let mut results = Vec::with_capacity(total);
    let mut merit = 0.0;

    for (i, requirement) in requirements.iter().enumerate() {
        if progress.cancelled() {
            return Err(MeritError::Cancelled {
                completed: i,
                total,
                partial: MeritReport { merit, results },
            });
        }
        progress.report(
            100.0 * i as f64 / total.max(1) as f64,
            &requirement.operand,
        );
        let result = score_requirement(surfaces, requirement, context, resolver);
        debug!(
            "requirement {} ({}): amount {:.6}, {:?}",
            i, result.operand, result.amount, result.status
        );
        merit += result.contribution;
        results.push(result);
    }
    progress.report(100.0, "merit complete");
    Ok(MeritReport { merit, results })
}

/// Maximum chief-ray image height over the requested fields, for writing
/// back into an image row marked for automatic semi-diameter update.
pub fn auto_update_image_semidia(
    surfaces: &[Surface],
    fields: &[Field],
    wavelength_um: f64,
    resolver: &dyn IndexResolver,
) -> Result<f64, OperandFailure> {
    let options = TraceOptions {
        vignetting: false,
        ..Default::default()
    };
    let mut max_r = 0.0_f64;
    for field in fields {
        let chief = chief_ray(surfaces, &field.point, wavelength_um, resolver)?;
        let path = trace(surfaces, &chief, 1.0, resolver, &options)
            .map_err(crate::bundle::AimError::Trace)?;
        if let Some((x, y)) = path.last_xy() {
            max_r = max_r.max((x * x + y * y).sqrt());
        }
    }
    Ok(max_r)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::FieldPoint;
    use crate::surface::Radius;
    use approx::assert_relative_eq;
    use fovea_materials::{resolver::FixedIndex, Material};

    fn plano_convex() -> Vec<Surface> {
        let mut object = Surface::object();
        object.thickness = f64::INFINITY;

        let mut front = Surface::blank(1);
        front.role = crate::surface::SurfaceRole::Stop;
        front.semidia = Some(5.0);
        front.radius = Radius::Curved(50.0);
        front.thickness = 5.0;
        front.material = Material::Glass("N-BK7".into());

        let mut back = Surface::blank(2);
        back.thickness = 95.0;

        vec![object, front, back, Surface::image(3)]
    }

    fn context() -> MeritContext {
        MeritContext {
            primary_wavelength_um: 0.5876,
            fields: vec![Field {
                id: 0,
                point: FieldPoint::on_axis(true),
            }],
        }
    }

    fn effl_requirement(op: ComparisonOp, target: f64, tol: f64, weight: f64) -> Requirement {
        Requirement {
            enabled: true,
            operand: "EFFL".into(),
            config_id: 0,
            param1: None,
            param2: None,
            param3: None,
            param4: None,
            op,
            target,
            tol,
            weight,
            extra: BTreeMap::new(),
        }
    }

    #[test]
    fn operand_names_round_trip() {
        for name in [
            "EFFL",
            "BFL",
            "TOTR",
            "SPOT_SIZE_ANNULAR",
            "SPOT_SIZE_GRID",
            "Z_11",
            "RMS_WFE",
            "PV_WFE",
            "CONIC",
            "THIC",
            "GLASS_ND",
            "GLASS_VD",
        ] {
            let op: Operand = name.parse().unwrap();
            assert_eq!(op.to_string(), name);
        }
        assert!("BOGUS".parse::<Operand>().is_err());
    }

    #[test]
    fn violation_respects_tolerance_band() {
        assert_eq!(violation_amount(ComparisonOp::LessOrEqual, 96.75, 100.0, 0.5), 0.0);
        assert_relative_eq!(
            violation_amount(ComparisonOp::LessOrEqual, 96.75, 80.0, 0.5),
            16.25
        );
        assert_relative_eq!(
            violation_amount(ComparisonOp::GreaterOrEqual, 10.0, 20.0, 1.0),
            9.0
        );
        assert_relative_eq!(violation_amount(ComparisonOp::Equal, 10.0, 12.0, 0.5), 1.5);
        assert_eq!(violation_amount(ComparisonOp::Equal, 12.2, 12.0, 0.5), 0.0);
        assert_eq!(
            violation_amount(ComparisonOp::Equal, f64::NAN, 0.0, 0.0),
            f64::INFINITY
        );
    }

    #[test]
    fn singlet_effl_requirement_passes_then_fails() {
        let surfaces = plano_convex();
        let resolver = FixedIndex(1.5168);
        let context = context();

        let ok = score_requirement(
            &surfaces,
            &effl_requirement(ComparisonOp::LessOrEqual, 100.0, 0.5, 1.0),
            &context,
            &resolver,
        );
        assert_eq!(ok.status, RequirementStatus::Ok);
        assert_relative_eq!(ok.current.unwrap(), 50.0 / 0.5168, epsilon = 1e-9);
        assert_eq!(ok.amount, 0.0);

        let ng = score_requirement(
            &surfaces,
            &effl_requirement(ComparisonOp::LessOrEqual, 80.0, 0.5, 1.0),
            &context,
            &resolver,
        );
        assert_eq!(ng.status, RequirementStatus::Ng);
        assert_relative_eq!(ng.amount, 50.0 / 0.5168 - 80.5, epsilon = 1e-9);
        assert_relative_eq!(ng.contribution, ng.amount * ng.amount, epsilon = 1e-9);
    }

    #[test]
    fn zero_weight_requirement_is_off() {
        let surfaces = plano_convex();
        let result = score_requirement(
            &surfaces,
            &effl_requirement(ComparisonOp::LessOrEqual, 1.0, 0.0, 0.0),
            &context(),
            &FixedIndex(1.5168),
        );
        assert_eq!(result.status, RequirementStatus::Off);
        assert_eq!(result.contribution, 0.0);
        // The current value is still reported for display.
        assert!(result.current.is_some());
    }

    #[test]
    fn unknown_operand_scores_ng_with_diagnostic() {
        let surfaces = plano_convex();
        let mut requirement = effl_requirement(ComparisonOp::Equal, 0.0, 0.0, 1.0);
        requirement.operand = "FROB".into();
        let result = score_requirement(&surfaces, &requirement, &context(), &FixedIndex(1.5));
        assert_eq!(result.status, RequirementStatus::Ng);
        assert_eq!(result.current, None);
        assert!(result.contribution.is_infinite());
        assert!(result.diagnostic.unwrap().contains("FROB"));
    }

    #[test]
    fn zernike_term_beyond_the_fitted_order_scores_ng() {
        let surfaces = plano_convex();
        let mut requirement = effl_requirement(ComparisonOp::Equal, 0.0, 0.0, 1.0);
        // Order 4 fits 15 terms; Z_99 does not exist in that expansion.
        requirement.operand = "Z_99".into();
        requirement.param1 = Some(0.0);
        requirement.param2 = Some(4.0);
        let result = score_requirement(&surfaces, &requirement, &context(), &FixedIndex(1.5168));
        assert_eq!(result.status, RequirementStatus::Ng);
        assert_eq!(result.current, None);
        assert!(result.diagnostic.unwrap().contains("beyond the fitted"));
    }

    #[test]
    fn merit_sums_weighted_squared_violations() {
        let surfaces = plano_convex();
        let requirements = vec![
            effl_requirement(ComparisonOp::LessOrEqual, 80.0, 0.5, 2.0),
            effl_requirement(ComparisonOp::LessOrEqual, 100.0, 0.5, 1.0),
        ];
        let report = evaluate_requirements(
            &surfaces,
            &requirements,
            &context(),
            &FixedIndex(1.5168),
            &Progress::default(),
        )
        .unwrap();
        let amount = 50.0 / 0.5168 - 80.5;
        assert_relative_eq!(report.merit, 2.0 * amount * amount, epsilon = 1e-9);
        assert_eq!(report.results.len(), 2);
    }

    #[test]
    fn cancellation_returns_partial_report() {
        let surfaces = plano_convex();
        let requirements = vec![
            effl_requirement(ComparisonOp::LessOrEqual, 100.0, 0.5, 1.0),
            effl_requirement(ComparisonOp::LessOrEqual, 100.0, 0.5, 1.0),
        ];
        let progress = Progress::default();
        progress.cancel.cancel();
        let err = evaluate_requirements(
            &surfaces,
            &requirements,
            &context(),
            &FixedIndex(1.5168),
            &progress,
        )
        .unwrap_err();
        match err {
            MeritError::Cancelled {
                completed,
                total,
                partial,
            } => {
                assert_eq!(completed, 0);
                assert_eq!(total, 2);
                assert!(partial.results.is_empty());
            }
            other => panic!("expected Cancelled, got {other}"),
        }
    }

    #[test]
    fn requirement_json_preserves_unknown_fields() {
        let json = r#"{
            "operand": "EFFL",
            "op": "<=",
            "target": 100.0,
            "tol": 0.5,
            "note": "from the 2024 tolerance study"
        }"#;
        let requirement: Requirement = serde_json::from_str(json).unwrap();
        assert!(requirement.enabled);
        assert_relative_eq!(requirement.weight, 1.0);
        assert_eq!(
            requirement.extra.get("note").unwrap().as_str().unwrap(),
            "from the 2024 tolerance study"
        );
        let back = serde_json::to_value(&requirement).unwrap();
        assert_eq!(back.get("note").unwrap().as_str().unwrap(), "from the 2024 tolerance study");
    }

    #[test]
    fn thickness_and_glass_operands_read_the_table() {
        let surfaces = plano_convex();
        let resolver = FixedIndex(1.5168);
        let context = context();
        let mut requirement = effl_requirement(ComparisonOp::Equal, 5.0, 0.0, 1.0);
        requirement.operand = "THIC".into();
        requirement.param1 = Some(1.0);
        let result = score_requirement(&surfaces, &requirement, &context, &resolver);
        assert_eq!(result.status, RequirementStatus::Ok);
        assert_relative_eq!(result.current.unwrap(), 5.0);

        requirement.operand = "THIC".into();
        requirement.param1 = Some(99.0);
        let result = score_requirement(&surfaces, &requirement, &context, &resolver);
        assert_eq!(result.status, RequirementStatus::Ng);
        assert!(result.diagnostic.is_some());
    }

    #[test]
    fn image_semidia_follows_the_widest_chief_ray() {
        let surfaces = plano_convex();
        let resolver = FixedIndex(1.5168);
        let fields = vec![
            Field {
                id: 0,
                point: FieldPoint::on_axis(true),
            },
            Field {
                id: 1,
                point: FieldPoint::Infinite {
                    angle_x: 0.0,
                    angle_y: 3.0_f64.to_radians(),
                },
            },
        ];
        let r = auto_update_image_semidia(&surfaces, &fields, 0.5876, &resolver).unwrap();
        // The 3° chief ray lands well off axis; the axial one at the centre.
        assert!(r > 1.0, "max image height {r}");
    }
}
