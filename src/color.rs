//! Conversions between CSS hex colors and KML's `aabbggrr` notation.
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref HEX_RE: Regex = Regex::new(r"^#?([0-9a-fA-F]{3}|[0-9a-fA-F]{6})$").unwrap();
    static ref KML_RE: Regex = Regex::new(r"^#?([0-9a-fA-F]{8})$").unwrap();
}

/// `#4da3ff`, the color used when a hex string is missing or invalid.
pub const DEFAULT_RGB: (u8, u8, u8) = (77, 163, 255);

/// Parses `#RRGGBB` or `#RGB` (the `#` is optional). Anything else yields [`DEFAULT_RGB`].
pub fn hex_to_rgb(hex: &str) -> (u8, u8, u8) {
    let Some(caps) = HEX_RE.captures(hex.trim()) else {
        return DEFAULT_RGB;
    };
    let digits = &caps[1];
    let expanded: String = if digits.len() == 3 {
        digits.chars().flat_map(|c| [c, c]).collect()
    } else {
        digits.to_string()
    };
    let channel = |i: usize| u8::from_str_radix(&expanded[i..i + 2], 16).unwrap_or(0);
    (channel(0), channel(2), channel(4))
}

/// Builds a KML color from a hex color and an opacity in `[0, 1]`.
pub fn kml_color(hex: &str, alpha: f64) -> String {
    let (r, g, b) = hex_to_rgb(hex);
    let alpha = if alpha.is_nan() { 1.0 } else { alpha.clamp(0.0, 1.0) };
    let a = (alpha * 255.0).round() as u8;
    format!("{a:02x}{b:02x}{g:02x}{r:02x}")
}

/// Splits a KML `aabbggrr` color into a lower-case `#rrggbb` and an opacity rounded to two
/// decimals.
pub fn parse_kml_color(kml: &str) -> Option<(String, f64)> {
    let caps = KML_RE.captures(kml.trim())?;
    let digits = caps[1].to_ascii_lowercase();
    let a = u8::from_str_radix(&digits[0..2], 16).ok()?;
    let (bb, gg, rr) = (&digits[2..4], &digits[4..6], &digits[6..8]);
    let opacity = (f64::from(a) / 255.0 * 100.0).round() / 100.0;
    Some((format!("#{rr}{gg}{bb}"), opacity))
}
