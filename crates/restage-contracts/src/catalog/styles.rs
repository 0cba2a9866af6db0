use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Named design presets injected into the layout instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DesignStyle {
    Modern,
    Scandinavian,
    Industrial,
    MidCenturyModern,
    Bohemian,
    Coastal,
    Farmhouse,
    Minimalist,
    Traditional,
    Japandi,
}

impl DesignStyle {
    pub const ALL: [DesignStyle; 10] = [
        DesignStyle::Modern,
        DesignStyle::Scandinavian,
        DesignStyle::Industrial,
        DesignStyle::MidCenturyModern,
        DesignStyle::Bohemian,
        DesignStyle::Coastal,
        DesignStyle::Farmhouse,
        DesignStyle::Minimalist,
        DesignStyle::Traditional,
        DesignStyle::Japandi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DesignStyle::Modern => "modern",
            DesignStyle::Scandinavian => "scandinavian",
            DesignStyle::Industrial => "industrial",
            DesignStyle::MidCenturyModern => "mid_century_modern",
            DesignStyle::Bohemian => "bohemian",
            DesignStyle::Coastal => "coastal",
            DesignStyle::Farmhouse => "farmhouse",
            DesignStyle::Minimalist => "minimalist",
            DesignStyle::Traditional => "traditional",
            DesignStyle::Japandi => "japandi",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            DesignStyle::Modern => "Modern",
            DesignStyle::Scandinavian => "Scandinavian",
            DesignStyle::Industrial => "Industrial",
            DesignStyle::MidCenturyModern => "Mid-Century Modern",
            DesignStyle::Bohemian => "Bohemian",
            DesignStyle::Coastal => "Coastal",
            DesignStyle::Farmhouse => "Modern Farmhouse",
            DesignStyle::Minimalist => "Minimalist",
            DesignStyle::Traditional => "Traditional",
            DesignStyle::Japandi => "Japandi",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DesignStyle::Modern => {
                "Clean lines, low-profile furniture, a neutral palette of white, grey and black with \
one or two saturated accents, polished metal and glass details."
            }
            DesignStyle::Scandinavian => {
                "Light oak and birch wood, white and soft grey textiles, cozy wool throws, simple \
functional forms and plenty of natural light."
            }
            DesignStyle::Industrial => {
                "Exposed metal frames, reclaimed wood, leather upholstery, Edison-bulb lighting and \
a palette of charcoal, rust and warm brown."
            }
            DesignStyle::MidCenturyModern => {
                "Tapered wooden legs, organic curves, walnut and teak finishes, mustard, teal and \
olive accents, iconic lounge chairs."
            }
            DesignStyle::Bohemian => {
                "Layered patterned rugs, rattan and wicker, abundant plants, macrame and a warm mix \
of terracotta, ochre and deep green."
            }
            DesignStyle::Coastal => {
                "Airy whites and sandy beige with ocean blues, linen slipcovers, weathered wood and \
natural fibers such as jute and seagrass."
            }
            DesignStyle::Farmhouse => {
                "Shaker profiles, painted and natural wood, linen and cotton textiles, black iron \
hardware and a calm cream and sage palette."
            }
            DesignStyle::Minimalist => {
                "Only essential pieces, hidden storage, monochrome surfaces, uncluttered floors and \
a strong sense of negative space."
            }
            DesignStyle::Traditional => {
                "Classic silhouettes, rolled arms and carved details, rich wood tones, symmetrical \
arrangements and damask or floral fabrics."
            }
            DesignStyle::Japandi => {
                "A blend of Japanese and Scandinavian restraint: low furniture, pale and charred \
wood, paper lighting, stone and ceramic accents, muted earth tones."
            }
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw
            .trim()
            .to_ascii_lowercase()
            .replace(['-', ' '], "_");
        Self::ALL
            .into_iter()
            .find(|style| style.as_str() == normalized)
    }
}

impl fmt::Display for DesignStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DesignStyle {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::parse(raw).ok_or_else(|| format!("unknown design style '{}'", raw.trim()))
    }
}
