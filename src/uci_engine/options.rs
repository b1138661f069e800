//! UCI option files.
//!
//! Each engine executable ships a sibling `<engine>.uci` file with INI-style
//! sections, typically named after ELO tiers:
//!
//! ```text
//! [1350]
//! UCI_LimitStrength = true
//! UCI_Elo = 1350
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;

static SECTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\[(?P<name>[^\]]+)\]\s*$").expect("section regex"));
static KEY_VALUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?P<key>[^=;#\[][^=]*?)\s*=\s*(?P<value>.*?)\s*$").expect("key regex")
});

/// Metadata keys that are not UCI options.
const NON_UCI_FIELDS: [&str; 1] = ["Description"];

fn parse_sections(content: &str) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut sections: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();
    let mut current = "DEFAULT".to_string();
    for line in content.lines() {
        if let Some(caps) = SECTION_RE.captures(line) {
            current = caps["name"].trim().to_string();
            sections.entry(current.clone()).or_default();
            continue;
        }
        if let Some(caps) = KEY_VALUE_RE.captures(line) {
            sections
                .entry(current.clone())
                .or_default()
                .insert(caps["key"].to_string(), caps["value"].to_string());
        }
    }
    sections
}

/// Load UCI options from the section of an option file.
///
/// Falls back to the `DEFAULT` section when the requested section is absent;
/// returns an empty map when the file cannot be read.
pub fn load_uci_options(path: &Path, section: &str) -> BTreeMap<String, String> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => {
            warn!(
                "[UciOptions.load] UCI file not found: {}",
                path.display()
            );
            return BTreeMap::new();
        }
    };

    let mut sections = parse_sections(&content);
    let mut options = match sections.remove(section) {
        Some(options) => {
            info!("[UciOptions.load] Loading UCI options from section: {}", section);
            options
        }
        None => {
            warn!(
                "[UciOptions.load] Section '{}' not found in {}, using DEFAULT",
                section,
                path.display()
            );
            sections.remove("DEFAULT").unwrap_or_default()
        }
    };

    for field in NON_UCI_FIELDS {
        options.remove(field);
    }
    options
}
