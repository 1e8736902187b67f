use std::path::{Path, PathBuf};

use anyhow::Result;
use huddle_core::ClientConfig;

const CONFIG_DIR: &str = "huddle";
const CONFIG_FILE: &str = "config.json";

/// `<config dir>/huddle/config.json`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

/// Resolve the client config.
///
/// An explicit path must exist. The default path may be absent, in which
/// case built-in defaults apply. `base_url` overrides whatever the file says.
pub fn load_config(explicit: Option<&Path>, base_url: Option<&str>) -> Result<ClientConfig> {
    let mut config = match explicit {
        Some(path) => ClientConfig::load(path)?,
        None => match default_config_path() {
            Some(path) => ClientConfig::load_or_default(&path)?,
            None => ClientConfig::default(),
        },
    };

    if let Some(url) = base_url {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_explicit_config_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"baseUrl": "https://chat.test", "pollIntervalMs": 1000}}"#).unwrap();

        let config = load_config(Some(file.path()), None).unwrap();
        assert_eq!(config.base_url, "https://chat.test");
        assert_eq!(config.poll_interval_ms, 1000);
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(load_config(Some(&missing), None).is_err());
    }

    #[test]
    fn test_base_url_flag_wins() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"baseUrl": "https://chat.test"}}"#).unwrap();

        let config = load_config(Some(file.path()), Some("http://localhost:3000/")).unwrap();
        assert_eq!(config.base_url, "http://localhost:3000");
    }
}
