use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    LivingRoom,
    Bedroom,
    Kitchen,
    Outdoor,
    HomeOffice,
    KidsBedroom,
    BabyBedroom,
}

/// Immutable instruction record for one room type.
///
/// `layout_brief` drives the first (description) turn, `edit_brief` the
/// second (image) turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTemplate {
    pub room_label: &'static str,
    pub layout_brief: &'static str,
    pub edit_brief: &'static str,
}

const LIVING_ROOM: LayoutTemplate = LayoutTemplate {
    room_label: "living room",
    layout_brief: "Plan a furniture layout for this living room: a primary seating group oriented \
toward the focal wall, a coffee table within reach of the seating, side tables, lighting and a rug \
that anchors the seating zone. Keep every walkway to doors and windows open.",
    edit_brief: "Furnish the living room according to the layout you described.",
};

const BEDROOM: LayoutTemplate = LayoutTemplate {
    room_label: "bedroom",
    layout_brief: "Plan a furniture layout for this bedroom: a bed with its headboard against a solid \
wall, nightstands on both sides where space allows, a dresser or storage piece, soft lighting and \
textiles. Leave clear access to both sides of the bed and to every door.",
    edit_brief: "Furnish the bedroom according to the layout you described.",
};

const KITCHEN: LayoutTemplate = LayoutTemplate {
    room_label: "kitchen",
    layout_brief: "Plan a staging for this kitchen: keep the existing counters, cabinetry runs, sink \
and appliances exactly where they are. Add only movable items such as bar stools, a dining set if \
there is floor space, countertop accessories, plants and pendant-friendly decor.",
    edit_brief: "Stage the kitchen according to the plan you described without moving fixed \
cabinetry, counters, sinks or appliances.",
};

const OUTDOOR: LayoutTemplate = LayoutTemplate {
    room_label: "outdoor space",
    layout_brief: "Plan a staging for this outdoor space: lounge seating, an outdoor dining set \
where the ground is level, planters and outdoor lighting. Nothing may be placed on or intersect any \
pool, pond or other water surface, and paving, decking and lawn areas keep their outlines.",
    edit_brief: "Stage the outdoor space according to the plan you described.",
};

const HOME_OFFICE: LayoutTemplate = LayoutTemplate {
    room_label: "home office",
    layout_brief: "Plan a furniture layout for this home office: a desk placed to use natural light \
without glare on the screen, an ergonomic chair, shelving or storage, task lighting and a small \
reading or meeting corner if the floor area allows.",
    edit_brief: "Furnish the home office according to the layout you described.",
};

const KIDS_BEDROOM: LayoutTemplate = LayoutTemplate {
    room_label: "kids bedroom",
    layout_brief: "Plan a furniture layout for this child's bedroom: a single or bunk bed, a study \
desk, toy storage at reachable height, a play rug and playful but calm decor. Keep an open play \
area in the middle of the floor.",
    edit_brief: "Furnish the kids bedroom according to the layout you described.",
};

const BABY_BEDROOM: LayoutTemplate = LayoutTemplate {
    room_label: "nursery",
    layout_brief: "Plan a furniture layout for this nursery: a crib away from windows and cords, a \
changing table with storage, a nursing chair, soft lighting and a washable rug.",
    edit_brief: "Furnish the nursery according to the layout you described.",
};

impl RoomType {
    pub const ALL: [RoomType; 7] = [
        RoomType::LivingRoom,
        RoomType::Bedroom,
        RoomType::Kitchen,
        RoomType::Outdoor,
        RoomType::HomeOffice,
        RoomType::KidsBedroom,
        RoomType::BabyBedroom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoomType::LivingRoom => "living_room",
            RoomType::Bedroom => "bedroom",
            RoomType::Kitchen => "kitchen",
            RoomType::Outdoor => "outdoor",
            RoomType::HomeOffice => "home_office",
            RoomType::KidsBedroom => "kids_bedroom",
            RoomType::BabyBedroom => "baby_bedroom",
        }
    }

    /// Accepts `living_room`, `living-room` and `Living Room`.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw
            .trim()
            .to_ascii_lowercase()
            .replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|room| room.as_str() == normalized)
    }

    pub fn template(&self) -> &'static LayoutTemplate {
        match self {
            RoomType::LivingRoom => &LIVING_ROOM,
            RoomType::Bedroom => &BEDROOM,
            RoomType::Kitchen => &KITCHEN,
            RoomType::Outdoor => &OUTDOOR,
            RoomType::HomeOffice => &HOME_OFFICE,
            RoomType::KidsBedroom => &KIDS_BEDROOM,
            RoomType::BabyBedroom => &BABY_BEDROOM,
        }
    }
}

impl fmt::Display for RoomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomType {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw).ok_or_else(|| {
            let known = Self::ALL
                .iter()
                .map(RoomType::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            format!("unknown room type '{}' (expected one of: {known})", raw.trim())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::RoomType;

    #[test]
    fn parse_accepts_common_spellings() {
        assert_eq!(RoomType::parse("living_room"), Some(RoomType::LivingRoom));
        assert_eq!(RoomType::parse("Living Room"), Some(RoomType::LivingRoom));
        assert_eq!(RoomType::parse(" home-office "), Some(RoomType::HomeOffice));
        assert_eq!(RoomType::parse("garage"), None);
    }

    #[test]
    fn from_str_lists_known_rooms_on_error() {
        let err = "garage".parse::<RoomType>().unwrap_err();
        assert!(err.contains("garage"));
        assert!(err.contains("baby_bedroom"));
    }

    #[test]
    fn every_room_has_a_distinct_template() {
        let mut labels = RoomType::ALL
            .iter()
            .map(|room| room.template().room_label)
            .collect::<Vec<_>>();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), RoomType::ALL.len());
    }

    #[test]
    fn serde_uses_snake_case_names() -> anyhow::Result<()> {
        let encoded = serde_json::to_string(&RoomType::KidsBedroom)?;
        assert_eq!(encoded, "\"kids_bedroom\"");
        let decoded: RoomType = serde_json::from_str("\"outdoor\"")?;
        assert_eq!(decoded, RoomType::Outdoor);
        Ok(())
    }
}
