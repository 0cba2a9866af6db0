use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::rooms::RoomType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckDefinition {
    /// 1-based position within the room's resolved check list.
    pub id: u32,
    pub key: String,
    pub name: String,
    pub assertion: String,
    pub positive_label: String,
    pub negative_label: String,
}

impl CheckDefinition {
    pub fn is_positive(&self, outcome_label: &str) -> bool {
        normalize_label(outcome_label) == normalize_label(&self.positive_label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check_id: u32,
    pub name: String,
    pub outcome_label: String,
    pub justification: Option<String>,
    pub passed: bool,
}

impl CheckResult {
    pub fn passed(check: &CheckDefinition, outcome_label: impl Into<String>) -> Self {
        Self {
            check_id: check.id,
            name: check.name.clone(),
            outcome_label: outcome_label.into(),
            justification: None,
            passed: true,
        }
    }

    pub fn failed(
        check: &CheckDefinition,
        outcome_label: impl Into<String>,
        justification: impl Into<String>,
    ) -> Self {
        Self {
            check_id: check.id,
            name: check.name.clone(),
            outcome_label: outcome_label.into(),
            justification: Some(justification.into()),
            passed: false,
        }
    }
}

pub fn normalize_label(raw: &str) -> String {
    raw.trim()
        .trim_matches(|ch: char| !ch.is_alphanumeric())
        .to_ascii_lowercase()
}

struct CheckSeed {
    key: &'static str,
    name: &'static str,
    assertion: &'static str,
    positive: &'static str,
    negative: &'static str,
}

const UNIVERSAL: [CheckSeed; 5] = [
    CheckSeed {
        key: "wall_lengths",
        name: "Wall lengths",
        assertion: "Compare the walls visible in both images. Every wall keeps the same length, \
height and relative proportions in the edited image; no wall has been extended, shortened, added \
or removed.",
        positive: "same",
        negative: "different",
    },
    CheckSeed {
        key: "doors_windows",
        name: "Doors and windows",
        assertion: "Compare the doors, windows and other wall openings. Each opening is present in \
the edited image at the same position, with the same size and shape, and no opening has been \
added, removed, covered over or moved.",
        positive: "same",
        negative: "different",
    },
    CheckSeed {
        key: "floorplan_shape",
        name: "Floorplan shape",
        assertion: "Compare the outline of the floor area. The edited image shows the same \
floorplan shape: corners, alcoves, steps and level changes are where they were in the original.",
        positive: "same",
        negative: "different",
    },
    CheckSeed {
        key: "circulation",
        name: "Circulation clearance",
        assertion: "Look at the walking paths in the edited image. Every door, window and \
passageway remains reachable and no furniture or object blocks a natural walking route.",
        positive: "clear",
        negative: "hindered",
    },
    CheckSeed {
        key: "camera_pose",
        name: "Camera pose",
        assertion: "Compare the camera viewpoint. The edited image is taken from the same camera \
position, height, angle and focal length as the original; the framing has not shifted, zoomed or \
rotated.",
        positive: "same",
        negative: "different",
    },
];

const OUTDOOR: [CheckSeed; 2] = [
    CheckSeed {
        key: "water_surface",
        name: "Water surface intersection",
        assertion: "Look at every pool, pond, fountain or other water surface. No furniture, \
planter or object in the edited image stands on, floats over or intersects a water surface.",
        positive: "clear",
        negative: "intersecting",
    },
    CheckSeed {
        key: "ground_surfaces",
        name: "Ground surfaces",
        assertion: "Compare paving, decking, lawn and planting beds. Each ground surface keeps the \
same material and outline in the edited image.",
        positive: "same",
        negative: "different",
    },
];

const KITCHEN: [CheckSeed; 2] = [
    CheckSeed {
        key: "counter_layout",
        name: "Counter layout",
        assertion: "Compare the countertops, islands and cabinetry runs. They have the same \
position, length and shape in the edited image.",
        positive: "same",
        negative: "different",
    },
    CheckSeed {
        key: "plumbing_fixtures",
        name: "Plumbing and appliances",
        assertion: "Compare sinks, taps, the cooktop, the oven and other built-in appliances. Each \
one is still present in the same place in the edited image.",
        positive: "same",
        negative: "different",
    },
];

/// Explicit per-room table of ordered fidelity checks.
#[derive(Debug, Clone)]
pub struct CheckCatalog {
    rooms: IndexMap<RoomType, Vec<CheckDefinition>>,
}

impl CheckCatalog {
    pub fn new(rooms: Option<IndexMap<RoomType, Vec<CheckDefinition>>>) -> Self {
        Self {
            rooms: rooms.unwrap_or_else(default_checks),
        }
    }

    pub fn for_room(&self, room: RoomType) -> Option<&[CheckDefinition]> {
        self.rooms.get(&room).map(Vec::as_slice)
    }

    pub fn total_checks(&self, room: RoomType) -> usize {
        self.for_room(room).map(<[CheckDefinition]>::len).unwrap_or(0)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &RoomType> {
        self.rooms.keys()
    }
}

impl Default for CheckCatalog {
    fn default() -> Self {
        Self::new(None)
    }
}

fn room_specific(room: RoomType) -> &'static [CheckSeed] {
    match room {
        RoomType::Outdoor => &OUTDOOR,
        RoomType::Kitchen => &KITCHEN,
        RoomType::LivingRoom
        | RoomType::Bedroom
        | RoomType::HomeOffice
        | RoomType::KidsBedroom
        | RoomType::BabyBedroom => &[],
    }
}

fn default_checks() -> IndexMap<RoomType, Vec<CheckDefinition>> {
    let mut map = IndexMap::new();
    for room in RoomType::ALL {
        let checks = UNIVERSAL
            .iter()
            .chain(room_specific(room))
            .enumerate()
            .map(|(idx, seed)| CheckDefinition {
                id: idx as u32 + 1,
                key: seed.key.to_string(),
                name: seed.name.to_string(),
                assertion: seed.assertion.to_string(),
                positive_label: seed.positive.to_string(),
                negative_label: seed.negative.to_string(),
            })
            .collect();
        map.insert(room, checks);
    }
    map
}
