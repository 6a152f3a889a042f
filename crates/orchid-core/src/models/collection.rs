//! Collection models: plants and their care events

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::entity::{EntityId, EntityKind};

/// A plant in the collection
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Plant {
    /// Species of this plant
    pub species_id: Option<EntityId>,
    /// Where the plant is kept
    pub location_id: Option<EntityId>,
    /// Mount, if mounted rather than potted
    pub mount_id: Option<EntityId>,
    /// Potting substrate
    pub substrate_id: Option<EntityId>,
    /// Vendor or origin
    pub source_id: Option<EntityId>,
    /// Nickname or label
    pub name: String,
    /// Acquisition date
    pub acquired_on: Option<NaiveDate>,
    /// Free-form notes
    pub notes: Option<String>,
}

impl EntityKind for Plant {
    const TABLE: &'static str = "plants";

    fn name(&self) -> &str {
        &self.name
    }
}

/// Kind of care or lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Watering,
    Fertilizing,
    Repotting,
    Blooming,
    Treatment,
    #[default]
    Other,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Watering => "watering",
            Self::Fertilizing => "fertilizing",
            Self::Repotting => "repotting",
            Self::Blooming => "blooming",
            Self::Treatment => "treatment",
            Self::Other => "other",
        };
        f.write_str(label)
    }
}

/// A dated event in a plant's history
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    /// Plant the event belongs to
    pub plant_id: Option<EntityId>,
    /// Short summary
    pub name: String,
    /// Event category
    pub kind: EventKind,
    /// Day the event happened
    pub occurred_on: Option<NaiveDate>,
    /// Free-form notes
    pub notes: Option<String>,
}

impl EntityKind for Event {
    const TABLE: &'static str = "events";

    fn name(&self) -> &str {
        &self.name
    }
}
