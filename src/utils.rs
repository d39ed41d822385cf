use chrono::{TimeZone, Utc};
use log::warn;
use std::path::Path;

pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;
    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }
    format!("{:.1} {}", size, UNITS[unit_index])
}

pub fn format_epoch(seconds: i64) -> String {
    match Utc.timestamp_opt(seconds, 0).single() {
        Some(ts) => ts.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => format!("@{}", seconds),
    }
}

pub fn read_to_string_soft(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!("Failed to read {:?}: {}", path, e);
            None
        }
    }
}

pub fn parse_key_value_lines(content: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches('"');
            pairs.push((key.trim().to_string(), value.to_string()));
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_size(512), "512.0 B");
    }

    #[test]
    fn test_format_epoch() {
        assert_eq!(format_epoch(0), "1970-01-01 00:00:00 UTC");
    }

    #[test]
    fn test_parse_key_value_lines() {
        let content = "VERSION=1.0\n# comment\nNAME=\"Core system\"\n\nbad line\n";
        let pairs = parse_key_value_lines(content);
        assert_eq!(
            pairs,
            vec![
                ("VERSION".to_string(), "1.0".to_string()),
                ("NAME".to_string(), "Core system".to_string()),
            ]
        );
    }
}
