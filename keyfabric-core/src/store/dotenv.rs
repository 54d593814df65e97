//! `.env` file backed configuration store.
//!
//! The file holds one `NAME=value` assignment per line. Blank lines and
//! `#` comments are preserved on rewrite; an `export ` prefix and matching
//! surrounding quotes are accepted when reading.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::{ConfigStore, ConfigValue, StoreError, validate_name};

/// Configuration store persisted to a dotenv-style file.
#[derive(Debug)]
pub struct DotenvStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl DotenvStore {
    /// Use the file at `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_contents(&self) -> Result<String, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Parse a single assignment line into `(name, value)`.
fn parse_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (name, value) = line.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    Some((name, unquote(value.trim())))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[async_trait]
impl ConfigStore for DotenvStore {
    async fn get(&self, name: &str) -> Result<Option<ConfigValue>, StoreError> {
        let contents = self.read_contents().await?;
        // Later assignments win, like shell sourcing.
        Ok(contents
            .lines()
            .filter_map(parse_line)
            .filter(|(n, _)| *n == name)
            .last()
            .map(|(_, v)| ConfigValue::new(v)))
    }

    async fn set(&self, name: &str, value: &ConfigValue) -> Result<(), StoreError> {
        validate_name(name)?;
        if value.expose().contains('\n') {
            return Err(StoreError::BackendError {
                message: format!("value for {} contains a newline", name),
            });
        }

        let _guard = self.write_lock.lock().await;
        let contents = self.read_contents().await?;

        let assignment = format!("{}={}", name, value.expose());
        let mut lines: Vec<&str> = contents
            .lines()
            .filter(|line| parse_line(line).map(|(n, _)| n != name).unwrap_or(true))
            .collect();
        lines.push(&assignment);

        let mut output = lines.join("\n");
        output.push('\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, output).await?;

        tracing::debug!("Updated {:?}: {}", self.path, name);
        Ok(())
    }

    async fn list_names(&self) -> Result<Vec<String>, StoreError> {
        let contents = self.read_contents().await?;
        let mut names: Vec<String> = contents
            .lines()
            .filter_map(parse_line)
            .map(|(n, _)| n.to_string())
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}
