//! Growing-condition models: locations, mounts, sources and substrates

use serde::{Deserialize, Serialize};

use super::entity::EntityKind;

/// A growing spot (windowsill, tent, greenhouse bench)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Location {
    pub name: String,
    pub description: Option<String>,
    /// Light level label
    pub light_level: Option<String>,
    /// Typical relative humidity
    pub humidity_percent: Option<u8>,
}

impl EntityKind for Location {
    const TABLE: &'static str = "locations";

    fn name(&self) -> &str {
        &self.name
    }
}

/// A mount (cork slab, tree fern, driftwood)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Mount {
    pub name: String,
    pub description: Option<String>,
    pub material: Option<String>,
}

impl EntityKind for Mount {
    const TABLE: &'static str = "mounts";

    fn name(&self) -> &str {
        &self.name
    }
}

/// Where plants come from (nursery, society auction, division)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Source {
    pub name: String,
    pub description: Option<String>,
    pub website: Option<String>,
}

impl EntityKind for Source {
    const TABLE: &'static str = "sources";

    fn name(&self) -> &str {
        &self.name
    }
}

/// A potting medium
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Substrate {
    pub name: String,
    pub description: Option<String>,
    /// Mix components (e.g. "bark, perlite, sphagnum")
    pub components: Option<String>,
}

impl EntityKind for Substrate {
    const TABLE: &'static str = "substrates";

    fn name(&self) -> &str {
        &self.name
    }
}
