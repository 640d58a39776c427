//! Actor configuration files
//!
//! Reads and writes `ActorConfig` as JSON. Writes are atomic via a temp file
//! and rename. Script paths in a config resolve against the config file's
//! directory.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::{ActorConfig, ScriptLocation};

/// Write data atomically to a file
///
/// Creates a temporary file, writes the data, syncs, then renames
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)
        .with_context(|| format!("Failed to create temp file: {:?}", temp_path))?;
    file.write_all(data).context("Failed to write data")?;
    file.sync_all().context("Failed to sync file")?;
    drop(file);

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        let dir = OpenOptions::new()
            .read(true)
            .open(parent)
            .with_context(|| format!("Failed to open directory: {:?}", parent))?;
        dir.sync_all().context("Failed to sync directory")?;
    }

    Ok(())
}

/// Write an actor configuration
pub fn write_config(path: &Path, config: &ActorConfig) -> Result<()> {
    let json = serde_json::to_vec_pretty(config).context("Failed to serialize config")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {:?}", parent))?;
    }
    write_atomic(path, &json)
}

/// Load an actor configuration
pub fn load_config(path: &Path) -> Result<ActorConfig> {
    let data = fs::read(path).with_context(|| format!("Failed to read config: {:?}", path))?;
    let config: ActorConfig =
        serde_json::from_slice(&data).context("Failed to deserialize config")?;
    Ok(config)
}

/// Where a path-based script lives, given the config file location
pub fn script_path(config: &ActorConfig, config_path: &Path) -> Option<PathBuf> {
    match &config.script {
        ScriptLocation::Inline(_) => None,
        ScriptLocation::Path(path) if path.is_absolute() => Some(path.clone()),
        ScriptLocation::Path(path) => Some(
            config_path
                .parent()
                .map(|dir| dir.join(path))
                .unwrap_or_else(|| path.clone()),
        ),
    }
}

/// Script text named by a configuration
pub fn load_script(config: &ActorConfig, config_path: &Path) -> Result<String> {
    if let ScriptLocation::Inline(text) = &config.script {
        return Ok(text.clone());
    }
    let path = script_path(config, config_path)
        .with_context(|| format!("No script path in config for actor '{}'", config.name))?;
    fs::read_to_string(&path).with_context(|| format!("Failed to read script: {:?}", path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::Value;
    use tempfile::TempDir;

    fn sample() -> ActorConfig {
        let mut config = ActorConfig::new("scale", "rhai", ScriptLocation::Path("scale.rhai".into()));
        config.class_name = "Scale".into();
        config.parameters.insert("factor".into(), Value::Integer(2));
        config.inputs.push("input".into());
        config.outputs.push("output".into());
        config.iterations = 3;
        config
    }

    #[test]
    fn test_write_and_read_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("actors/scale.json");

        write_config(&path, &sample()).unwrap();
        let loaded = load_config(&path).unwrap();

        assert_eq!(loaded, sample());
        assert!(!path.with_extension("tmp").exists());
    }

    #[test]
    fn test_relative_script_resolves_against_config_dir() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("scale.json");
        fs::write(temp.path().join("scale.rhai"), "fn fire() {}").unwrap();

        let config = sample();
        assert_eq!(
            script_path(&config, &path),
            Some(temp.path().join("scale.rhai"))
        );
        assert_eq!(load_script(&config, &path).unwrap(), "fn fire() {}");
    }

    #[test]
    fn test_inline_script_needs_no_file() {
        let config = ActorConfig::new("a", "rhai", ScriptLocation::Inline("fn fire() {}".into()));
        assert_eq!(
            load_script(&config, Path::new("/nonexistent/a.json")).unwrap(),
            "fn fire() {}"
        );
    }

    #[test]
    fn test_missing_script_reports_path() {
        let temp = TempDir::new().unwrap();
        let error = load_script(&sample(), &temp.path().join("scale.json")).unwrap_err();
        assert!(format!("{:#}", error).contains("scale.rhai"));
    }
}
