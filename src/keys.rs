// src/keys.rs
use crate::error::ConfigurationError;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};

const KEY_FILE_TEMPLATE: &str = "# Your Gemini API keys (one per line)\n\
# Get them at: https://aistudio.google.com/app/apikey\n";

/// Extracts keys from a line-oriented source: blank lines and `#` comments are skipped.
pub fn parse_keys(source: &str) -> Vec<String> {
    source
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

/// Writes the instructional key file if nothing exists at `path`.
/// Returns `true` when a new file was created.
pub fn create_template(path: &Path) -> std::io::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    fs::write(path, KEY_FILE_TEMPLATE)?;
    info!(?path, "Created key file template");
    Ok(true)
}

/// Ordered API keys plus the position of the one currently in use.
#[derive(Debug, Clone)]
pub struct KeyPool {
    keys: Vec<String>,
    index: usize,
}

impl KeyPool {
    pub fn new(keys: Vec<String>) -> Result<Self, ConfigurationError> {
        if keys.is_empty() {
            return Err(ConfigurationError::NoKeys("key list".to_string()));
        }
        Ok(Self { keys, index: 0 })
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigurationError> {
        let contents = fs::read_to_string(path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => ConfigurationError::MissingKeySource(path.to_path_buf()),
            _ => ConfigurationError::UnreadableKeySource {
                path: path.to_path_buf(),
                source,
            },
        })?;
        let keys = parse_keys(&contents);
        debug!(count = keys.len(), ?path, "Parsed key file");
        if keys.is_empty() {
            return Err(ConfigurationError::NoKeys(path.display().to_string()));
        }
        Ok(Self { keys, index: 0 })
    }

    pub fn active(&self) -> &str {
        &self.keys[self.index]
    }

    /// Advances to the next key, wrapping after the last. Returns `(new_index, pool_size)`.
    pub fn rotate(&mut self) -> (usize, usize) {
        self.index = (self.index + 1) % self.keys.len();
        (self.index, self.keys.len())
    }

    /// Makes the key at 0-based `index` active. Out-of-range positions are rejected.
    pub fn select(&mut self, index: usize) -> bool {
        if index < self.keys.len() {
            self.index = index;
            true
        } else {
            false
        }
    }

    pub fn first(&self) -> &str {
        &self.keys[0]
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Keys in load order, masked for display.
    pub fn masked(&self) -> Vec<String> {
        self.keys.iter().map(|k| mask_key(k)).collect()
    }
}

pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
