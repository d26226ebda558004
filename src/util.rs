use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use eframe::egui::Color32;

/// Formats a traffic volume the way the load panel prints it (`12.3k`, `4.1M`).
pub fn format_load(value: f64) -> String {
    let magnitude = value.abs();
    if magnitude >= 1_000_000.0 {
        format!("{:.1}M", value / 1_000_000.0)
    } else if magnitude >= 1_000.0 {
        format!("{:.1}k", value / 1_000.0)
    } else {
        format!("{value:.0}")
    }
}

/// `Server_0_3` -> `S0_3`, `Agg_Switch_2` -> `A2`, `Core_Switch` -> `C`.
pub fn short_label(id: &str) -> String {
    if let Some(rest) = id.strip_prefix("Server_") {
        return format!("S{rest}");
    }
    if let Some(rest) = id.strip_prefix("Agg_Switch_") {
        return format!("A{rest}");
    }
    if id == "Core_Switch" {
        return "C".to_owned();
    }
    id.rsplit_once('_')
        .map(|(_, rest)| rest.to_owned())
        .unwrap_or_else(|| id.to_owned())
}

/// Trailing numeric component of an id such as `Container_12`.
pub fn numeric_suffix(id: &str) -> Option<u64> {
    let digits_start = id
        .char_indices()
        .rev()
        .take_while(|(_, ch)| ch.is_ascii_digit())
        .last()
        .map(|(index, _)| index)?;
    id[digits_start..].parse().ok()
}

/// Deterministic pair in `[-1, 1]` derived from an id.
pub fn stable_pair(id: &str) -> (f32, f32) {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    let hash = hasher.finish();

    let x = ((hash & 0xffff_ffff) as f64 / u32::MAX as f64) as f32;
    let y = (((hash >> 32) & 0xffff_ffff) as f64 / u32::MAX as f64) as f32;
    ((x * 2.0) - 1.0, (y * 2.0) - 1.0)
}

/// Parses `#rrggbb` or `#rrggbbaa`.
pub fn parse_hex_color(value: &str) -> Option<Color32> {
    let hex = value.strip_prefix('#')?;
    let channel = |index: usize| u8::from_str_radix(hex.get(index..index + 2)?, 16).ok();

    match hex.len() {
        6 => Some(Color32::from_rgb(channel(0)?, channel(2)?, channel(4)?)),
        8 => Some(Color32::from_rgba_unmultiplied(
            channel(0)?,
            channel(2)?,
            channel(4)?,
            channel(6)?,
        )),
        _ => None,
    }
}

pub fn hex_color(color: Color32) -> String {
    format!("#{:02x}{:02x}{:02x}", color.r(), color.g(), color.b())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_labels_follow_topology_naming() {
        assert_eq!(short_label("Server_1_3"), "S1_3");
        assert_eq!(short_label("Agg_Switch_2"), "A2");
        assert_eq!(short_label("Core_Switch"), "C");
        assert_eq!(short_label("rack-7"), "rack-7");
    }

    #[test]
    fn numeric_suffix_reads_trailing_digits() {
        assert_eq!(numeric_suffix("Container_12"), Some(12));
        assert_eq!(numeric_suffix("c7"), Some(7));
        assert_eq!(numeric_suffix("Container_x"), None);
        assert_eq!(numeric_suffix(""), None);
    }

    #[test]
    fn stable_pair_is_deterministic_and_bounded() {
        let first = stable_pair("Server_0_0");
        assert_eq!(first, stable_pair("Server_0_0"));
        assert!((-1.0..=1.0).contains(&first.0));
        assert!((-1.0..=1.0).contains(&first.1));
    }

    #[test]
    fn hex_colors_parse_and_print() {
        let color = parse_hex_color("#3b82f6").unwrap();
        assert_eq!(color, Color32::from_rgb(0x3b, 0x82, 0xf6));
        assert_eq!(hex_color(color), "#3b82f6");
        assert!(parse_hex_color("3b82f6").is_none());
        assert!(parse_hex_color("#3b82").is_none());
        assert!(parse_hex_color("#zzzzzz").is_none());
    }

    #[test]
    fn loads_format_with_suffixes() {
        assert_eq!(format_load(950.0), "950");
        assert_eq!(format_load(12_340.0), "12.3k");
        assert_eq!(format_load(4_100_000.0), "4.1M");
    }
}
