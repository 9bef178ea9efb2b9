//! Astronomical concepts → ADQL conditions
//!
//! Qualitative terms ("hot jupiter", "habitable zone") resolve to a fixed
//! column condition. Lookups go through an alias table first and fall back
//! to a punctuation-insensitive match, so "Hot-Jupiter", "hot jupiter" and
//! "hotjupiter" all land on the same entry.

use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConceptMapping {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub condition: &'static str,
    pub description: &'static str,
}

const fn concept(
    name: &'static str,
    columns: &'static [&'static str],
    condition: &'static str,
    description: &'static str,
) -> ConceptMapping {
    ConceptMapping {
        name,
        columns,
        condition,
        description,
    }
}

pub const CONCEPTS: &[ConceptMapping] = &[
    // Planet size
    concept("earth-sized", &["pl_rade"], "pl_rade >= 0.8 AND pl_rade <= 1.25", "Planets with radius 0.8-1.25 Earth radii"),
    concept("earth-like", &["pl_rade", "pl_bmasse"], "pl_rade >= 0.8 AND pl_rade <= 1.5 AND pl_bmasse <= 2", "Planets with Earth-like radius and mass"),
    concept("super-earth", &["pl_rade"], "pl_rade > 1.25 AND pl_rade <= 2.0", "Planets with radius 1.25-2.0 Earth radii"),
    concept("mini-neptune", &["pl_rade"], "pl_rade > 2.0 AND pl_rade <= 4.0", "Planets with radius 2.0-4.0 Earth radii"),
    concept("neptune-sized", &["pl_rade"], "pl_rade >= 3.0 AND pl_rade <= 6.0", "Planets with radius 3.0-6.0 Earth radii"),
    concept("jupiter-sized", &["pl_rade"], "pl_rade >= 9.0 AND pl_rade <= 13.0", "Planets with radius 9.0-13.0 Earth radii"),
    // Giant planet temperature classes
    concept("hot-jupiter", &["pl_rade", "pl_orbper"], "pl_rade >= 9.0 AND pl_orbper < 10", "Large planets with very short orbital periods"),
    concept("warm-jupiter", &["pl_rade", "pl_orbper"], "pl_rade >= 9.0 AND pl_orbper >= 10 AND pl_orbper <= 100", "Large planets with moderate orbital periods"),
    concept("cold-jupiter", &["pl_rade", "pl_orbper"], "pl_rade >= 9.0 AND pl_orbper > 100", "Large planets with long orbital periods"),
    // Orbits
    concept("close-in", &["pl_orbper"], "pl_orbper < 1", "Planets with orbital period less than 1 day"),
    concept("ultra-short-period", &["pl_orbper"], "pl_orbper < 1", "Planets with orbital period less than 1 day"),
    // Habitability
    concept("habitable-zone", &["pl_eqt"], "pl_eqt >= 200 AND pl_eqt <= 320", "Planets with equilibrium temperature 200-320 K"),
    concept("habitable", &["pl_eqt"], "pl_eqt >= 200 AND pl_eqt <= 320", "Planets in approximate habitable zone"),
    // Observation
    concept("transiting", &["pl_tranflag"], "pl_tranflag = 1", "Planets that transit their host star"),
    // Systems
    concept("multi-planet", &["sy_pnum"], "sy_pnum >= 2", "Systems with 2 or more planets"),
    concept("multi-planet-system", &["sy_pnum"], "sy_pnum >= 2", "Systems with 2 or more planets"),
    // Distance
    concept("nearby", &["sy_dist"], "sy_dist <= 30", "Stars within 30 parsecs"),
    concept("close", &["sy_dist"], "sy_dist <= 30", "Stars within 30 parsecs"),
];

const ALIASES: &[(&str, &str)] = &[
    ("earth sized", "earth-sized"),
    ("earth like", "earth-like"),
    ("super earth", "super-earth"),
    ("mini neptune", "mini-neptune"),
    ("sub neptune", "mini-neptune"),
    ("sub-neptune", "mini-neptune"),
    ("neptune sized", "neptune-sized"),
    ("jupiter sized", "jupiter-sized"),
    ("hot jupiter", "hot-jupiter"),
    ("warm jupiter", "warm-jupiter"),
    ("cold jupiter", "cold-jupiter"),
    ("usp", "ultra-short-period"),
    ("ultra short period", "ultra-short-period"),
    ("habitable zone", "habitable-zone"),
    ("goldilocks zone", "habitable-zone"),
    ("multi planet", "multi-planet"),
    ("multiplanet", "multi-planet"),
];

/// Canonical concept name for user text (lowercased, alias-resolved)
pub fn normalize_concept(concept: &str) -> String {
    let normalized = concept.trim().to_lowercase();
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or(normalized)
}

fn compact(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).collect()
}

pub fn lookup(concept: &str) -> Option<&'static ConceptMapping> {
    let normalized = normalize_concept(concept);
    if let Some(mapping) = CONCEPTS.iter().find(|c| c.name == normalized) {
        return Some(mapping);
    }

    let key = compact(&normalized);
    if key.is_empty() {
        return None;
    }
    CONCEPTS.iter().find(|c| compact(c.name) == key).or_else(|| {
        ALIASES
            .iter()
            .find(|(alias, _)| compact(alias) == key)
            .and_then(|(_, canonical)| CONCEPTS.iter().find(|c| c.name == *canonical))
    })
}

/// Union of the columns the given concepts need; unknown concepts are skipped
pub fn required_columns<S: AsRef<str>>(concepts: &[S]) -> BTreeSet<&'static str> {
    concepts
        .iter()
        .filter_map(|c| lookup(c.as_ref()))
        .flat_map(|m| m.columns.iter().copied())
        .collect()
}

pub fn all() -> &'static [ConceptMapping] {
    CONCEPTS
}
