//! `keg.conf` loading and management

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// The remote every bare product name is resolved against.
pub const DEFAULT_REMOTE_PREFIX: &str = "http://us.patch.battle.net:1119/";

const CONFIG_VERSION: u32 = 1;

fn default_remote_prefix() -> String {
    DEFAULT_REMOTE_PREFIX.to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KegSection {
    config_version: u32,
    #[serde(
        rename = "default-remote-prefix",
        default = "default_remote_prefix"
    )]
    default_remote_prefix: String,
    #[serde(default)]
    preferred_cdns: Vec<String>,
    #[serde(rename = "verify-integrity", default = "default_true")]
    verify_integrity: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NgdpSection {
    hash_function: String,
}

/// Per-remote settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteSettings {
    #[serde(rename = "default-fetch", default)]
    pub default_fetch: bool,
    #[serde(default)]
    pub writeable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfFile {
    keg: KegSection,
    ngdp: NgdpSection,
    #[serde(default)]
    remotes: BTreeMap<String, RemoteSettings>,
}

impl Default for ConfFile {
    fn default() -> Self {
        Self {
            keg: KegSection {
                config_version: CONFIG_VERSION,
                default_remote_prefix: default_remote_prefix(),
                preferred_cdns: Vec::new(),
                verify_integrity: true,
            },
            ngdp: NgdpSection {
                hash_function: "md5".to_string(),
            },
            remotes: BTreeMap::new(),
        }
    }
}

/// The repository configuration file.
#[derive(Debug, Clone)]
pub struct KegConfig {
    path: PathBuf,
    file: ConfFile,
}

impl KegConfig {
    /// Load the config if the file exists, otherwise start from defaults.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = if path.exists() {
            let text = fs::read_to_string(&path)?;
            let file: ConfFile = toml::from_str(&text)?;

            if file.keg.config_version != CONFIG_VERSION {
                return Err(Error::InvalidConfig {
                    reason: format!("unsupported config_version {}", file.keg.config_version),
                });
            }
            if file.ngdp.hash_function != "md5" {
                return Err(Error::InvalidConfig {
                    reason: format!("unsupported hash_function {:?}", file.ngdp.hash_function),
                });
            }
            file
        } else {
            ConfFile::default()
        };

        Ok(Self { path, file })
    }

    /// Write the config file if it does not exist yet.
    pub fn initialize(&self) -> Result<()> {
        if !self.path.exists() {
            self.save()?;
        }
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, toml::to_string_pretty(&self.file)?)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn default_remote_prefix(&self) -> &str {
        &self.file.keg.default_remote_prefix
    }

    pub fn preferred_cdns(&self) -> &[String] {
        &self.file.keg.preferred_cdns
    }

    /// Whether fetched objects are hash-verified before publication.
    pub fn verify_integrity(&self) -> bool {
        self.file.keg.verify_integrity
    }

    pub fn remotes(&self) -> impl Iterator<Item = (&str, &RemoteSettings)> {
        self.file.remotes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Remotes that `fetch` without arguments should service.
    pub fn fetchable_remotes(&self) -> Vec<String> {
        self.file
            .remotes
            .iter()
            .filter(|(_, settings)| settings.default_fetch)
            .map(|(remote, _)| remote.clone())
            .collect()
    }

    pub fn has_remote(&self, remote: &str) -> bool {
        self.file.remotes.contains_key(remote)
    }

    pub fn add_remote(&mut self, remote: &str, default_fetch: bool, writeable: bool) -> Result<()> {
        self.file.remotes.insert(
            remote.to_string(),
            RemoteSettings {
                default_fetch,
                writeable,
            },
        );
        self.save()
    }

    pub fn remove_remote(&mut self, remote: &str) -> Result<()> {
        self.file.remotes.remove(remote);
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = KegConfig::load(dir.path().join("keg.conf")).unwrap();
        assert_eq!(config.default_remote_prefix(), DEFAULT_REMOTE_PREFIX);
        assert!(config.verify_integrity());
        assert!(config.fetchable_remotes().is_empty());
    }

    #[test]
    fn test_initialize_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keg.conf");

        let config = KegConfig::load(&path).unwrap();
        config.initialize().unwrap();
        assert!(path.exists());

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("config_version = 1"));
        assert!(text.contains("hash_function = \"md5\""));

        let reloaded = KegConfig::load(&path).unwrap();
        assert_eq!(reloaded.default_remote_prefix(), DEFAULT_REMOTE_PREFIX);
    }

    #[test]
    fn test_remotes_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keg.conf");

        let mut config = KegConfig::load(&path).unwrap();
        config
            .add_remote("http://us.patch.battle.net:1119/hsb", true, false)
            .unwrap();
        config
            .add_remote("ribbit://us.version.battle.net/wow", false, false)
            .unwrap();

        let reloaded = KegConfig::load(&path).unwrap();
        assert!(reloaded.has_remote("http://us.patch.battle.net:1119/hsb"));
        assert_eq!(
            reloaded.fetchable_remotes(),
            vec!["http://us.patch.battle.net:1119/hsb".to_string()]
        );

        let mut reloaded = reloaded;
        reloaded
            .remove_remote("http://us.patch.battle.net:1119/hsb")
            .unwrap();
        assert!(!reloaded.has_remote("http://us.patch.battle.net:1119/hsb"));
    }

    #[test]
    fn test_rejects_wrong_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keg.conf");
        fs::write(
            &path,
            "[keg]\nconfig_version = 2\n[ngdp]\nhash_function = \"md5\"\n",
        )
        .unwrap();
        assert!(matches!(
            KegConfig::load(&path),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_rejects_wrong_hash_function() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keg.conf");
        fs::write(
            &path,
            "[keg]\nconfig_version = 1\n[ngdp]\nhash_function = \"sha1\"\n",
        )
        .unwrap();
        assert!(matches!(
            KegConfig::load(&path),
            Err(Error::InvalidConfig { .. })
        ));
    }
}
