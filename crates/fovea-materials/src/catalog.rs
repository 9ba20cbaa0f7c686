//! Composable glass catalog.
//!
//! A [`GlassCatalog`] holds one or more named databases and resolves glass
//! names against them in insertion order. Databases are injectable as JSON
//! documents (an array of glass records); the built-in curated subset is
//! available via [`GlassCatalog::with_builtin`].

use std::collections::HashMap;

use crate::builtin;
use crate::glass::{GlassRecord, Material};
use crate::resolver::{IndexResolver, MaterialError};

/// A named glass database inside a catalog.
#[derive(Debug, Clone)]
struct Database {
    name: String,
    /// Canonical (upper-case) glass name → record index in `records`.
    by_name: HashMap<String, usize>,
    records: Vec<GlassRecord>,
}

/// An ordered composition of glass databases.
///
/// Lookup tries databases in the order they were added, so a workbench can
/// shadow built-in records by inserting a vendor database first.
#[derive(Debug, Clone, Default)]
pub struct GlassCatalog {
    databases: Vec<Database>,
}

impl GlassCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog seeded with the embedded curated database.
    pub fn with_builtin() -> Self {
        let mut cat = Self::new();
        cat.add_database("schott-subset", builtin::schott_subset());
        cat
    }

    /// Append a named database; later databases lose lookup ties.
    pub fn add_database(&mut self, name: impl Into<String>, records: Vec<GlassRecord>) {
        let by_name = records
            .iter()
            .enumerate()
            .map(|(i, r)| (r.name.to_ascii_uppercase(), i))
            .collect();
        self.databases.push(Database {
            name: name.into(),
            by_name,
            records,
        });
    }

    /// Parse a JSON array of glass records and append it as a database.
    pub fn add_json_database(
        &mut self,
        name: impl Into<String>,
        json: &str,
    ) -> Result<usize, serde_json::Error> {
        let records: Vec<GlassRecord> = serde_json::from_str(json)?;
        let count = records.len();
        self.add_database(name, records);
        Ok(count)
    }

    /// Names of the composed databases, in lookup order.
    pub fn database_names(&self) -> Vec<&str> {
        self.databases.iter().map(|d| d.name.as_str()).collect()
    }

    /// Total record count across databases.
    pub fn len(&self) -> usize {
        self.databases.iter().map(|d| d.records.len()).sum()
    }

    /// True when no database holds any record.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Find a glass record by name (case-insensitive), first match wins.
    pub fn lookup(&self, name: &str) -> Option<&GlassRecord> {
        let key = name.trim().to_ascii_uppercase();
        self.databases
            .iter()
            .find_map(|db| db.by_name.get(&key).map(|&i| &db.records[i]))
    }

    /// Nearest catalog glass to a target (nd, vd) point.
    ///
    /// Distance is weighted so that an index difference of 0.01 counts as
    /// much as an Abbe difference of 1.0, matching how designers read a
    /// glass map. Used by the legacy importer to replace numeric material
    /// tokens with real glasses.
    pub fn nearest_by_index(&self, nd: f64, vd: f64) -> Option<&GlassRecord> {
        const ND_WEIGHT: f64 = 100.0;
        let mut best: Option<(&GlassRecord, f64)> = None;
        for db in &self.databases {
            for rec in &db.records {
                let dn = (rec.nd - nd) * ND_WEIGHT;
                let dv = rec.vd - vd;
                let dist = dn * dn + dv * dv;
                if best.map_or(true, |(_, d)| dist < d) {
                    best = Some((rec, dist));
                }
            }
        }
        best.map(|(rec, _)| rec)
    }
}

impl IndexResolver for GlassCatalog {
    fn refractive_index(
        &self,
        material: &Material,
        wavelength_um: f64,
    ) -> Result<f64, MaterialError> {
        match material {
            Material::Air | Material::Vacuum => Ok(1.0),
            Material::ConstantIndex(n) => Ok(*n),
            Material::Mirror => Err(MaterialError::MirrorHasNoIndex),
            Material::Glass(name) => match self.lookup(name) {
                Some(rec) => rec.index_at(wavelength_um),
                None => Err(MaterialError::UnknownGlass(name.clone())),
            },
        }
    }

    fn nd_vd(&self, name: &str) -> Option<(f64, f64)> {
        self.lookup(name).map(|rec| (rec.nd, rec.vd))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn builtin_lookup_is_case_insensitive() {
        let cat = GlassCatalog::with_builtin();
        assert!(cat.lookup("n-bk7").is_some());
        assert!(cat.lookup("N-BK7").is_some());
        assert!(cat.lookup("UNOBTAINIUM").is_none());
    }

    #[test]
    fn air_and_constant_index_bypass_the_catalog() {
        let cat = GlassCatalog::new();
        assert_eq!(cat.refractive_index(&Material::Air, 0.55).unwrap(), 1.0);
        assert_eq!(
            cat.refractive_index(&Material::ConstantIndex(1.7), 0.4).unwrap(),
            1.7
        );
    }

    #[test]
    fn mirror_index_is_rejected() {
        let cat = GlassCatalog::with_builtin();
        assert!(matches!(
            cat.refractive_index(&Material::Mirror, 0.55),
            Err(MaterialError::MirrorHasNoIndex)
        ));
    }

    #[test]
    fn earlier_database_shadows_later() {
        let mut cat = GlassCatalog::new();
        cat.add_database(
            "vendor",
            vec![GlassRecord {
                name: "N-BK7".into(),
                nd: 1.9,
                vd: 20.0,
                formula: crate::glass::DispersionFormula::Sellmeier,
                coeffs: vec![2.61, 0.0, 0.0, 0.01, 0.02, 100.0],
            }],
        );
        cat.add_database("builtin", builtin::schott_subset());
        // Vendor record wins the tie.
        assert_relative_eq!(cat.lookup("N-BK7").unwrap().nd, 1.9);
    }

    #[test]
    fn nearest_glass_matches_bk7_like_index() {
        let cat = GlassCatalog::with_builtin();
        let rec = cat.nearest_by_index(1.517, 64.0).unwrap();
        assert!(rec.name.contains("BK7"), "expected a BK7-family match, got {}", rec.name);
    }

    #[test]
    fn json_database_round_trip() {
        let json = r#"[
            {"name": "TEST-1", "nd": 1.6, "vd": 40.0, "formula": "sellmeier",
             "coeffs": [1.3, 0.2, 0.9, 0.01, 0.05, 110.0]}
        ]"#;
        let mut cat = GlassCatalog::new();
        let count = cat.add_json_database("vendor", json).unwrap();
        assert_eq!(count, 1);
        assert!(cat.lookup("test-1").is_some());
    }
}
