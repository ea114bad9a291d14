use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tether::SessionConfig;

/// Reads a JSON session config. Absent keys keep their defaults, durations
/// are given in seconds.
pub fn load(path: &Path) -> Result<SessionConfig> {
    let text =
        fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
    parse(&text).with_context(|| format!("parsing config {}", path.display()))
}

pub fn parse(text: &str) -> Result<SessionConfig> {
    Ok(serde_json::from_str(text)?)
}

pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("tether"))
}
