//! Taxonomy models: families, genera and species

use serde::{Deserialize, Serialize};

use super::entity::{EntityId, EntityKind};

/// A botanical family (e.g. Orchidaceae)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Family {
    /// Family name
    pub name: String,
    /// Free-form description
    pub description: Option<String>,
}

impl EntityKind for Family {
    const TABLE: &'static str = "families";

    fn name(&self) -> &str {
        &self.name
    }
}

/// A genus within a family
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Genus {
    /// Parent family
    pub family_id: Option<EntityId>,
    /// Genus name (e.g. Phalaenopsis)
    pub name: String,
    /// Free-form description
    pub description: Option<String>,
}

impl EntityKind for Genus {
    const TABLE: &'static str = "genera";

    fn name(&self) -> &str {
        &self.name
    }
}

/// A species or hybrid grex within a genus
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Species {
    /// Parent genus
    pub genus_id: Option<EntityId>,
    /// Display name
    pub name: String,
    /// Specific epithet, when botanical
    pub epithet: Option<String>,
    /// Free-form description
    pub description: Option<String>,
    /// Preferred light (e.g. "bright indirect")
    pub light_preference: Option<String>,
    /// Preferred temperature band (e.g. "intermediate")
    pub temperature_preference: Option<String>,
    /// Whether the flowers are scented
    pub fragrant: bool,
}

impl EntityKind for Species {
    const TABLE: &'static str = "species";

    fn name(&self) -> &str {
        &self.name
    }
}
