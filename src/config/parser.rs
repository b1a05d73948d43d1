//! INI-style settings file parser
//!
//! Section names and keys are case-insensitive and stored uppercased.
//! Values are kept verbatim (only trimmed), so comma-separated lists and
//! passwords survive untouched. A repeated key inside one section keeps
//! the last value, matching how the settings file is written back.

use std::collections::HashMap;
use std::path::Path;

/// Key-value pairs of one section (keys uppercased)
pub type ParsedSection = HashMap<String, String>;

/// A parsed settings file: uppercased section name (without brackets) to its contents
pub type ParsedFile = HashMap<String, ParsedSection>;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Section '{0}' appears more than once")]
    DuplicateSection(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed section header: {0}")]
    BadHeader(String),
}

/// Parse a settings file from a string
pub fn parse_file(content: &str) -> Result<ParsedFile, ParseError> {
    let mut sections = HashMap::new();
    let lines: Vec<&str> = content.lines().map(|s| s.trim()).collect();

    let mut lines_iter = lines.iter().peekable();

    // Skip lines before the first section
    while lines_iter.peek().map_or(false, |l| !l.starts_with('[')) {
        lines_iter.next();
    }

    let Some(first_section) = lines_iter.next() else {
        return Ok(sections);
    };

    let mut current_section_name = section_name(first_section)?;
    let mut current_section_lines = Vec::new();

    for line in lines_iter {
        if line.starts_with('[') {
            if sections.contains_key(&current_section_name) {
                return Err(ParseError::DuplicateSection(current_section_name));
            }
            sections.insert(
                current_section_name.clone(),
                parse_section(&current_section_lines),
            );
            current_section_name = section_name(line)?;
            current_section_lines.clear();
        } else {
            current_section_lines.push(*line);
        }
    }

    if sections.contains_key(&current_section_name) {
        return Err(ParseError::DuplicateSection(current_section_name));
    }
    sections.insert(current_section_name, parse_section(&current_section_lines));

    Ok(sections)
}

/// Extract the normalized name from a `[Header]` line
fn section_name(line: &str) -> Result<String, ParseError> {
    line.strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .map(|name| name.trim().to_uppercase())
        .ok_or_else(|| ParseError::BadHeader(line.to_string()))
}

/// Parse a single section's lines into key-value pairs
fn parse_section(lines: &[&str]) -> ParsedSection {
    let mut entries = ParsedSection::new();

    for line in lines {
        if line.starts_with('#') || line.starts_with(';') || line.is_empty() {
            continue;
        }

        let Some((name, value)) = line.split_once('=') else {
            continue;
        };

        entries.insert(name.trim().to_uppercase(), value.trim().to_string());
    }

    entries
}

/// Read and parse a settings file from disk
pub async fn parse_settings_file(path: &Path) -> Result<ParsedFile, ParseError> {
    let content = tokio::fs::read_to_string(path).await?;
    parse_file(&content)
}

/// Interpret a boolean setting the way the settings file writes them
pub fn string_to_bool(s: &str) -> bool {
    matches!(s.to_lowercase().as_str(), "yes" | "true" | "1" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manager_config() {
        let content = r#"
[Manager]
ServerPath = /srv/vein
KeepAlive = True

[Startup]
Map = /Game/Vein/Maps/ChamplainValley?listen
Port = 7779
"#;
        let parsed = parse_file(content).unwrap();

        assert!(parsed.contains_key("MANAGER"));
        assert!(parsed.contains_key("STARTUP"));
        assert_eq!(parsed["MANAGER"]["SERVERPATH"], "/srv/vein");
        assert_eq!(
            parsed["STARTUP"]["MAP"],
            "/Game/Vein/Maps/ChamplainValley?listen"
        );
    }

    #[test]
    fn test_string_to_bool() {
        assert!(string_to_bool("True"));
        assert!(string_to_bool("yes"));
        assert!(string_to_bool("1"));
        assert!(string_to_bool("on"));
        assert!(!string_to_bool("False"));
        assert!(!string_to_bool("0"));
        assert!(!string_to_bool(""));
    }

    #[test]
    fn test_empty_file() {
        assert!(parse_file("").unwrap().is_empty());
    }

    #[test]
    fn test_comments_only() {
        let parsed = parse_file("# comment\n; another\n").unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_comma_lists_kept_whole() {
        let content = "[Scheduler]\nDailyTime = 00:00, 04:00, 08:00\n";
        let parsed = parse_file(content).unwrap();
        assert_eq!(parsed["SCHEDULER"]["DAILYTIME"], "00:00, 04:00, 08:00");
    }

    #[test]
    fn test_value_with_equals() {
        let content = "[RCON]\nPassword=abc=def\n";
        let parsed = parse_file(content).unwrap();
        assert_eq!(parsed["RCON"]["PASSWORD"], "abc=def");
    }

    #[test]
    fn test_case_insensitive_sections_and_keys() {
        let content = "[discord]\nwebhookurl=https://example.invalid/hook\n";
        let parsed = parse_file(content).unwrap();
        assert_eq!(parsed["DISCORD"]["WEBHOOKURL"], "https://example.invalid/hook");
    }

    #[test]
    fn test_last_value_wins() {
        let content = "[Manager]\nKeepAlive=False\nKeepAlive=True\n";
        let parsed = parse_file(content).unwrap();
        assert_eq!(parsed["MANAGER"]["KEEPALIVE"], "True");
    }

    #[test]
    fn test_duplicate_section_error() {
        let content = "[Manager]\nA=1\n\n[manager]\nB=2\n";
        let result = parse_file(content);
        assert!(matches!(result.unwrap_err(), ParseError::DuplicateSection(_)));
    }

    #[test]
    fn test_bad_header() {
        let result = parse_file("[Manager\nA=1\n");
        assert!(matches!(result.unwrap_err(), ParseError::BadHeader(_)));
    }

    #[test]
    fn test_lines_before_first_section() {
        let content = "; written by the manager\n\n[Manager]\nServerPath=/srv\n";
        let parsed = parse_file(content).unwrap();
        assert_eq!(parsed["MANAGER"]["SERVERPATH"], "/srv");
    }
}
