use std::{fs, path::PathBuf};

use anyhow::{Context, Result, bail};
use shared::config::Config;

/// Writes a configuration file with the default settings.
///
/// Without `output` the file lands in the current directory as
/// `config.yaml` or `config.json`.
///
/// # Errors
/// Returns an error if the format is unsupported or writing the file fails.
pub fn generate_config(format: &str, output: Option<PathBuf>) -> Result<PathBuf> {
    let config = Config::with_defaults();
    let (serialized, default_name) = match format {
        "yaml" | "yml" => (config.to_yaml()?, "config.yaml"),
        "json" => (config.to_json()?, "config.json"),
        _ => bail!("Unsupported format. Use 'yaml' or 'json'."),
    };

    let path = output.unwrap_or_else(|| PathBuf::from(default_name));
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(&path, serialized).with_context(|| format!("failed to write {}", path.display()))?;

    println!("Configuration file '{}' generated successfully.", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_yaml_that_loads_back() {
        let dir = TempDir::new().unwrap();
        let path = generate_config("yaml", Some(dir.path().join("unify/config.yaml"))).unwrap();

        let loaded: Config = serde_yml::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(loaded, Config::with_defaults());
    }

    #[test]
    fn rejects_unknown_format() {
        let dir = TempDir::new().unwrap();
        let err = generate_config("toml", Some(dir.path().join("c.toml"))).unwrap_err();
        assert!(err.to_string().contains("Unsupported format"));
    }
}
