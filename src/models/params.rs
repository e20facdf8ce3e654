use crate::models::logo::LogoAsset;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

/// Smallest edge length (in pixels) a QR image is rendered at.
pub const MIN_SIZE: u32 = 100;

/// Largest edge length (in pixels) a QR image is rendered at.
pub const MAX_SIZE: u32 = 1024;

/// Size used when the size input cannot be parsed.
pub const DEFAULT_SIZE: u32 = 200;

/// Value encoded when the text input is blank.
pub const PLACEHOLDER_TEXT: &str = "https://";

static LEADING_INT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([+-]?\d+)").expect("valid integer regex"));

static HEX_COLOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#?([0-9a-fA-F]{3}|[0-9a-fA-F]{6}|[0-9a-fA-F]{8})$").expect("valid color regex")
});

/// An RGBA8 color, written as `#rgb`, `#rrggbb` or `#rrggbbaa`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid color '{0}': expected #rgb, #rrggbb or #rrggbbaa")]
pub struct ColorParseError(pub String);

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn is_opaque(&self) -> bool {
        self.a == 255
    }

    /// Lowercase hex form; the alpha pair is only written for translucent colors.
    pub fn to_hex(&self) -> String {
        if self.is_opaque() {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    pub fn to_rgba(&self) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, self.a])
    }
}

impl FromStr for Color {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let caps = HEX_COLOR
            .captures(trimmed)
            .ok_or_else(|| ColorParseError(s.to_string()))?;
        let digits = &caps[1];

        let pair = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16);
        let nibble = |i: usize| u8::from_str_radix(&digits[i..i + 1], 16).map(|v| v * 17);

        let parsed = match digits.len() {
            3 => (nibble(0), nibble(1), nibble(2), Ok(255)),
            6 => (pair(0), pair(2), pair(4), Ok(255)),
            _ => (pair(0), pair(2), pair(4), pair(6)),
        };

        match parsed {
            (Ok(r), Ok(g), Ok(b), Ok(a)) => Ok(Color { r, g, b, a }),
            _ => Err(ColorParseError(s.to_string())),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_hex()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Clamp any requested size into `[MIN_SIZE, MAX_SIZE]`.
pub fn clamp_size(size: i64) -> u32 {
    size.clamp(MIN_SIZE as i64, MAX_SIZE as i64) as u32
}

/// Interpret raw size input by its leading integer. Input without one (or
/// with a zero) falls back to [`DEFAULT_SIZE`] before clamping.
pub fn parse_size_input(input: &str) -> u32 {
    let Some(caps) = LEADING_INT.captures(input) else {
        return DEFAULT_SIZE;
    };
    let digits = &caps[1];

    match digits.parse::<i64>() {
        Ok(0) => DEFAULT_SIZE,
        Ok(value) => clamp_size(value),
        // Too many digits for i64; only the sign matters after clamping.
        Err(_) if digits.starts_with('-') => MIN_SIZE,
        Err(_) => MAX_SIZE,
    }
}

/// Text substituted with [`PLACEHOLDER_TEXT`] when blank.
pub fn effective_text(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        PLACEHOLDER_TEXT
    } else {
        trimmed
    }
}

/// Everything a render pass needs.
///
/// Owned by [`ParameterStore`](crate::state::ParameterStore); render passes
/// receive clones.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationParameters {
    pub text: String,
    pub size: u32,
    pub foreground: Color,
    pub background: Color,
    pub logo: Option<LogoAsset>,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            text: String::new(),
            size: DEFAULT_SIZE,
            foreground: Color::BLACK,
            background: Color::WHITE,
            logo: None,
        }
    }
}

impl GenerationParameters {
    pub fn effective_text(&self) -> &str {
        effective_text(&self.text)
    }

    pub fn effective_size(&self) -> u32 {
        clamp_size(self.size as i64)
    }

    pub fn has_logo(&self) -> bool {
        self.logo.is_some()
    }

    /// Same parameters without the logo.
    pub fn without_logo(&self) -> Self {
        Self {
            logo: None,
            ..self.clone()
        }
    }
}
