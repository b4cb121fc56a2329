//! `arbor.toml` loading and the persisted pieces of the dispatch core:
//! user keymap overlays, the macro map, and search limits.
//!
//! Configuration is best-effort: a missing file means defaults, and a file
//! that fails to parse logs a warning and falls back to defaults rather than
//! refusing to start. Individual bad keymap entries are skipped the same way.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use core_keymap::MappingTable;
use core_keys::KeyToken;
use core_session::Mode;

pub const CONFIG_FILE: &str = "arbor.toml";
const CONFIG_DIR: &str = "arbor";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    /// Result cap handed to the search menu.
    pub max_results: usize,
    pub case_sensitive: bool,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            max_results: 200,
            case_sensitive: false,
        }
    }
}

/// Keymap overlay: mode -> command name -> key sequence strings, merged on
/// top of the built-in bindings at startup.
pub type KeymapSection = HashMap<Mode, HashMap<String, Vec<String>>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: SearchSection,
    pub keymap: KeymapSection,
}

impl Config {
    /// Locate the config file: working directory first, then the platform
    /// config directory.
    pub fn discover() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.is_file() {
            return Some(local);
        }
        let global = dirs::config_dir()?.join(CONFIG_DIR).join(CONFIG_FILE);
        global.is_file().then_some(global)
    }

    pub fn load() -> Config {
        match Self::discover() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!(target: "config", "no_config_file");
                Config::default()
            }
        }
    }

    /// Load from a specific path, falling back to defaults on any failure.
    pub fn load_from(path: &Path) -> Config {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(target: "config", path = %path.display(), error = %err, "config_unreadable");
                return Config::default();
            }
        };
        match toml::from_str(&raw) {
            Ok(config) => {
                debug!(target: "config", path = %path.display(), "config_loaded");
                config
            }
            Err(err) => {
                warn!(target: "config", path = %path.display(), error = %err, "config_invalid");
                Config::default()
            }
        }
    }

    /// Build the user overlay table from the `[keymap.*]` sections. Entries
    /// that fail to parse are logged and skipped.
    pub fn overlay_table(&self) -> MappingTable {
        let mut table = MappingTable::new();
        for (mode, commands) in &self.keymap {
            for (name, specs) in commands {
                for spec in specs {
                    match spec.parse() {
                        Ok(sequence) => table.register_sequence(*mode, sequence, name),
                        Err(err) => warn!(
                            target: "config",
                            mode = mode.as_str(),
                            name,
                            spec = %spec,
                            error = %err,
                            "keymap_entry_skipped"
                        ),
                    }
                }
            }
        }
        table
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MacroFile {
    #[serde(default)]
    macros: HashMap<String, Vec<KeyToken>>,
}

/// Restore the persisted macro map. A missing file is an empty map; a
/// malformed one is an error, since silently dropping recorded macros would
/// lose user data.
pub fn load_macros(path: &Path) -> anyhow::Result<HashMap<KeyToken, Vec<KeyToken>>> {
    if !path.is_file() {
        return Ok(HashMap::new());
    }
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading macro file {}", path.display()))?;
    let file: MacroFile = toml::from_str(&raw)
        .with_context(|| format!("parsing macro file {}", path.display()))?;
    let mut macros = HashMap::new();
    for (register, tokens) in file.macros {
        let register: KeyToken = register
            .parse()
            .with_context(|| format!("macro register `{register}`"))?;
        macros.insert(register, tokens);
    }
    debug!(target: "config", count = macros.len(), "macros_loaded");
    Ok(macros)
}

pub fn save_macros(path: &Path, macros: &HashMap<KeyToken, Vec<KeyToken>>) -> anyhow::Result<()> {
    let file = MacroFile {
        macros: macros
            .iter()
            .map(|(register, tokens)| (register.to_string(), tokens.clone()))
            .collect(),
    };
    let raw = toml::to_string_pretty(&file).context("serializing macro map")?;
    fs::write(path, raw).with_context(|| format!("writing macro file {}", path.display()))?;
    debug!(target: "config", count = macros.len(), "macros_saved");
    Ok(())
}

/// Install the process-wide log subscriber. Safe to call more than once;
/// later calls are ignored.
pub fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_config(raw: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(&path, raw).unwrap();
        (dir, path)
    }

    #[test]
    fn full_config_round_trip() {
        let (_dir, path) = write_config(
            r#"
[search]
max_results = 50
case_sensitive = true

[keymap.normal]
delete = ["x x", "x <motion>"]

[keymap.visual]
yank = ["y"]
"#,
        );
        let config = Config::load_from(&path);
        assert_eq!(config.search.max_results, 50);
        assert!(config.search.case_sensitive);

        let table = config.overlay_table();
        let normal = table.mode_mapping(Mode::Normal).unwrap();
        assert_eq!(normal["delete"].len(), 2);
        assert!(normal["delete"][1].has_placeholder());
        assert!(table.mode_mapping(Mode::Visual).is_some());
    }

    #[test]
    fn missing_sections_take_defaults() {
        let (_dir, path) = write_config("[search]\nmax_results = 10\n");
        let config = Config::load_from(&path);
        assert_eq!(config.search.max_results, 10);
        assert!(!config.search.case_sensitive);
        assert!(config.keymap.is_empty());
    }

    #[test]
    fn unreadable_or_invalid_config_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join(CONFIG_FILE);
        assert_eq!(Config::load_from(&missing), Config::default());

        let (_dir, path) = write_config("search = not toml [");
        assert_eq!(Config::load_from(&path), Config::default());
    }

    #[test]
    fn bad_keymap_entries_are_skipped() {
        let (_dir, path) = write_config(
            r#"
[keymap.normal]
delete = ["x x", "<motion> x", "notakey+z"]
"#,
        );
        let table = Config::load_from(&path).overlay_table();
        let normal = table.mode_mapping(Mode::Normal).unwrap();
        assert_eq!(normal["delete"].len(), 1);
    }

    #[test]
    fn macro_map_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macros.toml");

        let mut macros = HashMap::new();
        macros.insert(
            KeyToken::ch('a'),
            core_keys::parse_token_run("3 d d ctrl+r").unwrap(),
        );
        macros.insert(KeyToken::ch('b'), vec![KeyToken::ch('u')]);
        save_macros(&path, &macros).unwrap();

        let restored = load_macros(&path).unwrap();
        assert_eq!(restored, macros);
    }

    #[test]
    fn missing_macro_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_macros(&dir.path().join("macros.toml")).unwrap().is_empty());
    }
}
