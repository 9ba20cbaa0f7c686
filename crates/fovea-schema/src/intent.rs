//! Design-Intent document types.
//!
//! The JSON layout is bit-stable: unknown block parameters ride in the
//! heterogeneous `parameters` map, `metadata` is preserved verbatim, and
//! per-surface aperture overrides can live either on the block or in the
//! configuration-level `semidiaOverrides` map keyed `"p:<blockId>|<role>"`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Schema version written by this crate.
pub const BLOCK_SCHEMA_VERSION: &str = "0.1";

/// Top-level Design-Intent configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    #[serde(
        rename = "block_schema_version",
        default = "default_schema_version"
    )]
    pub block_schema_version: String,
    pub blocks: Vec<Block>,
    /// Optional cached expanded surface list; regenerable from `blocks`.
    #[serde(
        rename = "opticalSystem",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub optical_system: Option<Vec<fovea_core::surface::Surface>>,
    /// Per-surface aperture values keyed `"p:<blockId>|<role>"`, persisted
    /// independently of block order.
    #[serde(
        rename = "semidiaOverrides",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub semidia_overrides: BTreeMap<String, Value>,
}

fn default_schema_version() -> String {
    BLOCK_SCHEMA_VERSION.to_owned()
}

impl Configuration {
    pub fn new(blocks: Vec<Block>) -> Configuration {
        Configuration {
            block_schema_version: default_schema_version(),
            blocks,
            optical_system: None,
            semidia_overrides: BTreeMap::new(),
        }
    }

    /// Aperture override for a block-local role, if one is stored.
    pub fn semidia_override(&self, block_id: &str, role: &str) -> Option<f64> {
        value_as_number(self.semidia_overrides.get(&format!("p:{block_id}|{role}"))?)
    }
}

/// The block kinds the expander understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockType {
    ObjectPlane,
    #[serde(alias = "PositiveLens")]
    Lens,
    Doublet,
    Triplet,
    #[serde(alias = "AirGap")]
    Gap,
    Stop,
    CoordTrans,
    Mirror,
    ImagePlane,
}

/// One optimizer-visible value on a block. Only `optimize.mode` is
/// inspected by the core, to set the surface `variable` flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimize: Option<Optimize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Optimize {
    pub mode: String,
}

/// One declarative design element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub block_id: String,
    pub block_type: BlockType,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, Variable>,
    /// Per-surface semi-diameter overrides keyed by block-local role
    /// (`front`, `back`, `s1`..`s4`, `stop`, `mirror`, `ct`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub aperture: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl Block {
    pub fn new(block_id: impl Into<String>, block_type: BlockType) -> Block {
        Block {
            block_id: block_id.into(),
            block_type,
            parameters: BTreeMap::new(),
            variables: BTreeMap::new(),
            aperture: BTreeMap::new(),
            metadata: Value::Null,
        }
    }

    /// Builder-style parameter insertion.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Block {
        self.parameters.insert(key.to_owned(), value.into());
        self
    }

    /// Numeric parameter lookup. A variable entry for the same key wins
    /// over the fixed parameter; `"INF"` parses to `f64::INFINITY`, and
    /// numeric strings are accepted.
    pub fn number(&self, key: &str) -> Option<f64> {
        if let Some(variable) = self.variables.get(key) {
            if let Some(v) = value_as_number(&variable.value) {
                return Some(v);
            }
        }
        value_as_number(self.parameters.get(key)?)
    }

    /// String parameter lookup (variables win, as for [`Block::number`]).
    pub fn string(&self, key: &str) -> Option<String> {
        if let Some(variable) = self.variables.get(key) {
            if let Some(s) = variable.value.as_str() {
                return Some(s.to_owned());
            }
        }
        self.parameters.get(key)?.as_str().map(str::to_owned)
    }

    /// True when the outer optimizer may vary this key (`optimize.mode`
    /// is `V`).
    pub fn is_variable(&self, key: &str) -> bool {
        self.variables
            .get(key)
            .and_then(|v| v.optimize.as_ref())
            .map(|o| o.mode.eq_ignore_ascii_case("v"))
            .unwrap_or(false)
    }

    /// True when any key on this block is marked variable.
    pub fn any_variable(&self) -> bool {
        self.variables.keys().any(|k| self.is_variable(k))
    }

    /// Block-local aperture override for a role.
    pub fn aperture_for(&self, role: &str) -> Option<f64> {
        value_as_number(self.aperture.get(role)?)
    }
}

/// Lenient numeric extraction: JSON numbers, numeric strings, and the
/// `"INF"` sentinel. Empty strings and nulls are "unset".
pub(crate) fn value_as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else if s.eq_ignore_ascii_case("inf") || s.eq_ignore_ascii_case("infinity") {
                Some(f64::INFINITY)
            } else {
                s.parse().ok()
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn variables_override_parameters() {
        let mut block = Block::new("lens-1", BlockType::Lens).with("centerThickness", 5.0);
        block.variables.insert(
            "centerThickness".to_owned(),
            Variable {
                value: json!(6.5),
                optimize: Some(Optimize { mode: "V".into() }),
            },
        );
        assert_eq!(block.number("centerThickness"), Some(6.5));
        assert!(block.is_variable("centerThickness"));
        assert!(block.any_variable());
    }

    #[test]
    fn inf_and_numeric_strings_parse() {
        let block = Block::new("g", BlockType::Gap)
            .with("thickness", "12.5")
            .with("backRadius", "INF");
        assert_eq!(block.number("thickness"), Some(12.5));
        assert_eq!(block.number("backRadius"), Some(f64::INFINITY));
        assert_eq!(block.number("missing"), None);
    }

    #[test]
    fn configuration_json_round_trips() {
        let json = json!({
            "block_schema_version": "0.1",
            "blocks": [
                {
                    "blockId": "obj",
                    "blockType": "ObjectPlane",
                    "parameters": {"objectDistanceMode": "INF"}
                },
                {
                    "blockId": "l1",
                    "blockType": "Lens",
                    "parameters": {
                        "frontRadius": 50.0,
                        "backRadius": "INF",
                        "centerThickness": 5.0,
                        "material": "N-BK7"
                    },
                    "aperture": {"front": 12.0},
                    "metadata": {"author": "fovea"}
                }
            ],
            "semidiaOverrides": {"p:l1|back": 11.0}
        });
        let config: Configuration = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(config.blocks.len(), 2);
        assert_eq!(config.blocks[1].aperture_for("front"), Some(12.0));
        assert_eq!(config.semidia_override("l1", "back"), Some(11.0));
        assert_eq!(config.blocks[1].metadata["author"], "fovea");

        let back = serde_json::to_value(&config).unwrap();
        assert_eq!(back, json);
    }

    #[test]
    fn positive_lens_alias_parses() {
        let block: Block = serde_json::from_value(json!({
            "blockId": "l", "blockType": "PositiveLens"
        }))
        .unwrap();
        assert_eq!(block.block_type, BlockType::Lens);
    }
}
