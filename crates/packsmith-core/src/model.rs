use crate::error::{PackError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Axis-aligned rectangle (pixels). `x,y` is top-left; `w,h` are sizes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }
    /// Builds a rect from a `[left, top, right, bottom)` box; inverted boxes collapse to zero size.
    pub fn from_box(b: [u32; 4]) -> Self {
        Self {
            x: b[0],
            y: b[1],
            w: b[2].saturating_sub(b[0]),
            h: b[3].saturating_sub(b[1]),
        }
    }
    /// Scales every edge independently and rounds, so adjacent rects stay adjacent.
    pub fn scaled(&self, sx: f64, sy: f64) -> Self {
        let x0 = (self.x as f64 * sx).round() as u32;
        let y0 = (self.y as f64 * sy).round() as u32;
        let x1 = ((self.x + self.w) as f64 * sx).round() as u32;
        let y1 = ((self.y + self.h) as f64 * sy).round() as u32;
        Self::from_box([x0, y0, x1, y1])
    }
}

/// `TRUE`/`FALSE` policy flag as written in identifier tables.
///
/// Accepts JSON booleans as well as case-insensitive `"TRUE"`/`"FALSE"` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    True,
    False,
}

impl Serialize for Toggle {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(match self {
            Toggle::True => "TRUE",
            Toggle::False => "FALSE",
        })
    }
}

impl<'de> Deserialize<'de> for Toggle {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Bool(bool),
            Text(String),
        }
        match Raw::deserialize(d)? {
            Raw::Bool(true) => Ok(Toggle::True),
            Raw::Bool(false) => Ok(Toggle::False),
            Raw::Text(s) => match s.to_ascii_uppercase().as_str() {
                "TRUE" => Ok(Toggle::True),
                "FALSE" => Ok(Toggle::False),
                other => Err(serde::de::Error::custom(format!(
                    "expected TRUE or FALSE, got {other:?}"
                ))),
            },
        }
    }
}

/// Mirror applied after rotation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Flip {
    #[default]
    #[serde(alias = "none", alias = "None", alias = "")]
    NoFlip,
    Horizontal,
    Vertical,
}

/// One placement inside a stamp/tga atlas.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StampLayer {
    pub uid: String,
    /// Source crop as `[left, top, right, bottom]` in the texture's nominal pixels.
    #[serde(default)]
    pub copy: Option<[u32; 4]>,
    /// Destination top-left in nominal atlas pixels.
    #[serde(default)]
    pub position: Option<[i32; 2]>,
    /// Clockwise rotation in degrees.
    #[serde(default)]
    pub rotate: f32,
    #[serde(default)]
    pub flip: Flip,
    #[serde(default)]
    pub use_for_alpha: bool,
    #[serde(default)]
    pub alpha_add: Option<f32>,
}

impl StampLayer {
    pub fn copy_rect(&self) -> Option<Rect> {
        self.copy.map(Rect::from_box)
    }
    pub fn position(&self) -> (i32, i32) {
        self.position.map(|p| (p[0], p[1])).unwrap_or((0, 0))
    }
    /// Number of clockwise quarter turns when the angle is a multiple of 90.
    pub fn quarter_turns(&self) -> Option<i32> {
        let r = self.rotate.round();
        if (self.rotate - r).abs() > f32::EPSILON || (r as i32) % 90 != 0 {
            return None;
        }
        Some(((r as i32) / 90).rem_euclid(4))
    }
}

/// Flavour of a free-placement atlas. `Tga` differs only in background fill and output codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StampKind {
    Stamp,
    Tga,
}

impl StampKind {
    pub fn background(self) -> [u8; 4] {
        match self {
            StampKind::Stamp => [0, 0, 0, 0],
            StampKind::Tga => [1, 1, 1, 1],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AtlasLayout {
    /// Row-major uniform tiling of whole textures.
    Grid {
        grid_size: (u32, u32),
        members: Vec<String>,
    },
    /// Arbitrary rectangular placements with per-layer transforms.
    Stamp {
        kind: StampKind,
        canvas_size: (u32, u32),
        layers: Vec<StampLayer>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtlasRule {
    pub destination: String,
    pub layout: AtlasLayout,
}

impl AtlasRule {
    pub fn type_name(&self) -> &'static str {
        match &self.layout {
            AtlasLayout::Grid { .. } => "grid",
            AtlasLayout::Stamp {
                kind: StampKind::Stamp,
                ..
            } => "stamp",
            AtlasLayout::Stamp {
                kind: StampKind::Tga,
                ..
            } => "tga",
        }
    }

    /// Identifiers referenced by this atlas, in declaration order (may repeat).
    pub fn uids(&self) -> Vec<&str> {
        match &self.layout {
            AtlasLayout::Grid { members, .. } => members.iter().map(String::as_str).collect(),
            AtlasLayout::Stamp { layers, .. } => layers.iter().map(|l| l.uid.as_str()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectRule {
    pub source: String,
    pub destination: String,
}

/// One entry of a per-version rule file.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingRule {
    Direct(DirectRule),
    Atlas(AtlasRule),
}

impl MappingRule {
    /// Discriminates a raw rule object: a `type` key makes it an atlas rule, otherwise it is direct.
    pub fn from_value(value: Value) -> Result<Self> {
        let ty = value
            .get("type")
            .map(|t| t.as_str().map(str::to_string).unwrap_or_else(|| t.to_string()));
        let Some(ty) = ty else {
            let direct: DirectRule = serde_json::from_value(value)
                .map_err(|e| PackError::InvalidRule(format!("direct rule: {e}")))?;
            return Ok(MappingRule::Direct(direct));
        };
        match ty.as_str() {
            "grid" => {
                #[derive(Deserialize)]
                struct Raw {
                    destination: String,
                    grid_size: [u32; 2],
                    source: Vec<String>,
                }
                let raw: Raw = serde_json::from_value(value)
                    .map_err(|e| PackError::InvalidRule(format!("grid rule: {e}")))?;
                if raw.grid_size[0] == 0 || raw.grid_size[1] == 0 {
                    return Err(PackError::InvalidRule(format!(
                        "grid rule {} has zero grid_size",
                        raw.destination
                    )));
                }
                Ok(MappingRule::Atlas(AtlasRule {
                    destination: raw.destination,
                    layout: AtlasLayout::Grid {
                        grid_size: (raw.grid_size[0], raw.grid_size[1]),
                        members: raw.source,
                    },
                }))
            }
            "stamp" | "tga" => {
                #[derive(Deserialize)]
                #[serde(untagged)]
                enum Layers {
                    Many(Vec<StampLayer>),
                    One(StampLayer),
                }
                #[derive(Deserialize)]
                struct Raw {
                    destination: String,
                    canvas_size: [u32; 2],
                    source: Layers,
                }
                let raw: Raw = serde_json::from_value(value)
                    .map_err(|e| PackError::InvalidRule(format!("{ty} rule: {e}")))?;
                let layers = match raw.source {
                    Layers::Many(v) => v,
                    Layers::One(l) => vec![l],
                };
                let kind = if ty == "tga" {
                    StampKind::Tga
                } else {
                    StampKind::Stamp
                };
                Ok(MappingRule::Atlas(AtlasRule {
                    destination: raw.destination,
                    layout: AtlasLayout::Stamp {
                        kind,
                        canvas_size: (raw.canvas_size[0], raw.canvas_size[1]),
                        layers,
                    },
                }))
            }
            other => Err(PackError::UnknownAtlasType(other.to_string())),
        }
    }

    pub fn destination(&self) -> &str {
        match self {
            MappingRule::Direct(d) => &d.destination,
            MappingRule::Atlas(a) => &a.destination,
        }
    }

    /// Identifiers this rule reads, in declaration order (may repeat).
    pub fn uids(&self) -> Vec<&str> {
        match self {
            MappingRule::Direct(d) => vec![d.source.as_str()],
            MappingRule::Atlas(a) => a.uids(),
        }
    }
}
