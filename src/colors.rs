/*!
 # Named colors

 A fixed table of named colors, lookups by name, and nearest-name matching
 for colors read back from the device.
*/

use std::fmt;
use std::str::FromStr;

use crate::{Error, Result};

/// An RGB color, one byte per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Squared Euclidean distance in RGB space
    fn distance_sq(self, other: Rgb) -> u32 {
        let dr = i32::from(self.r) - i32::from(other.r);
        let dg = i32::from(self.g) - i32::from(other.g);
        let db = i32::from(self.b) - i32::from(other.b);
        (dr * dr + dg * dg + db * db) as u32
    }
}

impl From<(u8, u8, u8)> for Rgb {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        Self::new(r, g, b)
    }
}

impl From<Rgb> for (u8, u8, u8) {
    fn from(rgb: Rgb) -> Self {
        (rgb.r, rgb.g, rgb.b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RGB({}, {}, {})", self.r, self.g, self.b)
    }
}

/// One row of the color table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorEntry {
    pub name: &'static str,
    pub rgb: Rgb,
}

const fn entry(name: &'static str, r: u8, g: u8, b: u8) -> ColorEntry {
    ColorEntry {
        name,
        rgb: Rgb::new(r, g, b),
    }
}

/// All known colors. Order matters: nearest-match ties go to the earlier row.
pub static COLORS: &[ColorEntry] = &[
    entry("black", 0, 0, 0),
    entry("silver", 192, 192, 192),
    entry("gray", 128, 128, 128),
    entry("white", 255, 255, 255),
    entry("warm_white", 255, 166, 87),
    entry("cool_white", 255, 254, 250),
    entry("maroon", 128, 0, 0),
    entry("red", 255, 0, 0),
    entry("dark_red", 139, 0, 0),
    entry("light_red", 255, 99, 71),
    entry("orange", 255, 165, 0),
    entry("dark_orange", 255, 140, 0),
    entry("light_orange", 255, 179, 71),
    entry("purple", 128, 0, 128),
    entry("fuchsia", 255, 0, 255),
    entry("dark_fuchsia", 128, 0, 128),
    entry("light_fuchsia", 255, 182, 193),
    entry("dark_purple", 75, 0, 130),
    entry("light_purple", 218, 112, 214),
    entry("pink", 255, 182, 193),
    entry("dark_pink", 255, 20, 147),
    entry("light_pink", 255, 182, 193),
    entry("green", 0, 128, 0),
    entry("lime", 0, 255, 0),
    entry("dark_green", 0, 100, 0),
    entry("light_green", 144, 238, 144),
    entry("olive", 128, 128, 0),
    entry("yellow", 255, 255, 0),
    entry("dark_yellow", 184, 134, 11),
    entry("light_yellow", 255, 255, 224),
    entry("brown", 165, 42, 42),
    entry("dark_brown", 139, 69, 19),
    entry("light_brown", 205, 133, 63),
    entry("navy", 0, 0, 128),
    entry("blue", 0, 0, 255),
    entry("dark_blue", 0, 0, 139),
    entry("light_blue", 173, 216, 230),
    entry("teal", 0, 128, 128),
    entry("aqua", 0, 255, 255),
    entry("dark_aqua", 0, 139, 139),
    entry("light_aqua", 224, 255, 255),
];

/// Returns the name of the table color closest to `rgb`.
///
/// Scans the table in order and keeps the first entry with the smallest
/// distance, so exact matches always win and ties are stable.
pub fn nearest_color_name(rgb: Rgb) -> &'static str {
    let mut best = &COLORS[0];
    let mut best_distance = rgb.distance_sq(best.rgb);
    for candidate in &COLORS[1..] {
        let distance = rgb.distance_sq(candidate.rgb);
        if distance < best_distance {
            best = candidate;
            best_distance = distance;
        }
    }
    best.name
}

/// Case-insensitive lookup of a color by name
pub fn color_by_name(name: &str) -> Option<Rgb> {
    let name = name.trim();
    COLORS
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(name))
        .map(|c| c.rgb)
}

pub fn is_valid_color(name: &str) -> bool {
    color_by_name(name).is_some()
}

/// All color names in table order
pub fn color_names() -> impl Iterator<Item = &'static str> {
    COLORS.iter().map(|c| c.name)
}

/// A color as given by a caller: either a table name or raw channels.
///
/// Resolved to an [`Rgb`] once, before anything is encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorSpec {
    Named(String),
    Rgb(Rgb),
}

impl ColorSpec {
    /// Resolves the spec to channels, failing for names not in [`COLORS`].
    pub fn resolve(&self) -> Result<Rgb> {
        match self {
            ColorSpec::Rgb(rgb) => Ok(*rgb),
            ColorSpec::Named(name) => color_by_name(name).ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "unknown color {name:?}, valid colors are: {}",
                    color_names().collect::<Vec<_>>().join(", ")
                ))
            }),
        }
    }
}

impl From<Rgb> for ColorSpec {
    fn from(rgb: Rgb) -> Self {
        ColorSpec::Rgb(rgb)
    }
}

impl From<(u8, u8, u8)> for ColorSpec {
    fn from(rgb: (u8, u8, u8)) -> Self {
        ColorSpec::Rgb(rgb.into())
    }
}

impl From<&str> for ColorSpec {
    fn from(name: &str) -> Self {
        ColorSpec::Named(name.to_owned())
    }
}

impl From<String> for ColorSpec {
    fn from(name: String) -> Self {
        ColorSpec::Named(name)
    }
}

impl fmt::Display for ColorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorSpec::Named(name) => f.write_str(name),
            ColorSpec::Rgb(rgb) => write!(f, "{rgb}"),
        }
    }
}

/// Parses `r,g,b`, `#rrggbb`, or a color name.
///
/// Names are not checked here; an unknown name fails later in [`ColorSpec::resolve`].
impl FromStr for ColorSpec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();

        if let Some(digits) = s.strip_prefix('#') {
            let mut bytes = [0u8; 3];
            hex::decode_to_slice(digits, &mut bytes).map_err(|e| {
                Error::InvalidArgument(format!("invalid hex color {s:?}: {e}"))
            })?;
            let [r, g, b] = bytes;
            return Ok(ColorSpec::Rgb(Rgb::new(r, g, b)));
        }

        if s.contains(',') {
            let channels = s
                .split(',')
                .map(|part| part.trim().parse::<u8>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::InvalidArgument(format!("invalid color {s:?}: {e}")))?;
            return match channels[..] {
                [r, g, b] => Ok(ColorSpec::Rgb(Rgb::new(r, g, b))),
                _ => Err(Error::InvalidArgument(format!(
                    "invalid color {s:?}: expected R,G,B (e.g. 255,0,0)"
                ))),
            };
        }

        if s.is_empty() {
            return Err(Error::InvalidArgument("empty color".to_string()));
        }

        Ok(ColorSpec::Named(s.to_string()))
    }
}
