use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use log::error;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub journal: JournalSection,
    #[serde(default)]
    pub sinks: SinksSection,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JournalSection {
    pub capacity: usize,
    #[serde(default)]
    pub flush: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct SinksSection {
    #[serde(default)]
    pub file: Vec<FileSinkConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FileSinkConfig {
    pub id: String,
    pub path: String,
    #[serde(default)]
    pub enabled: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushMode {
    /// Flush sinks after every append that wrapped the buffer.
    OnWrap,
    /// Flush sinks only when the journal is closed.
    OnExit,
}

pub struct FlattenedConfig {
    pub capacity: usize,
    pub flush: FlushMode,
    pub file_sinks: Vec<FileSinkConfig>,
}

pub fn load_config(path: &str) -> Result<FlattenedConfig, Box<dyn std::error::Error>> {

    if !Path::new(path).exists() {
        return Err(format!("Config file not found: {}", path).into());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config file {}: {}", path, e))?;

    let flat = parse_config(&content)
        .map_err(|e| format!("Failed to parse TOML config {}: {}", path, e))?;

    log::info!("Config loaded from: {}", path);
    Ok(flat)
}

pub fn parse_config(content: &str) -> Result<FlattenedConfig, Box<dyn std::error::Error>> {
    let cfg: Config = toml::from_str(content)?;

    if cfg.journal.capacity == 0 {
        return Err("journal.capacity must be greater than 0".into());
    }

    let flush = match cfg.journal.flush.as_deref() {
        None => FlushMode::OnWrap,
        Some(m) if m.eq_ignore_ascii_case("on-wrap") => FlushMode::OnWrap,
        Some(m) if m.eq_ignore_ascii_case("on-exit") => FlushMode::OnExit,
        Some(m) => return Err(format!("Unknown flush mode '{}'", m).into()),
    };

    log::info!("Found {} file sinks in config", cfg.sinks.file.len());

    let mut file_sinks = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    for s in cfg.sinks.file.into_iter().filter(|s| s.enabled) {
        if !is_valid_id(&s.id) {
            error!("Invalid sink id '{}'. Use [a-z0-9][a-z0-9_-]*", s.id);
            continue;
        }
        if !seen_ids.insert(s.id.clone()) {
            error!("Duplicate sink id '{}' - skipping", s.id);
            continue;
        }
        file_sinks.push(s);
    }

    log::info!("Enabled sinks: {} file", file_sinks.len());
    if file_sinks.is_empty() {
        log::warn!("No enabled sinks found in config - journal contents will not be persisted");
    }

    Ok(FlattenedConfig { capacity: cfg.journal.capacity, flush, file_sinks })
}

fn is_valid_id(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if is_lc_alnum(c) => {},
        _ => return false,
    }
    for c in chars {
        if !(is_lc_alnum(c) || c == '-' || c == '_') { return false; }
    }
    true
}

fn is_lc_alnum(c: char) -> bool {
    matches!(c, 'a'..='z' | '0'..='9')
}
