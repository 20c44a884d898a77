//! The repository root object

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use keg_cdn::LocalCdn;
use keg_remote::{HttpRemote, RibbitRemote};

use crate::config::KegConfig;
use crate::db::KegDb;
use crate::remote::{AnyRemote, CacheableHttpRemote, CacheableRibbitRemote};
use crate::statecache::StateCache;
use crate::{Error, Result};

/// One Keg repository on disk.
///
/// Directory layout under the root:
///
/// ```text
/// keg.conf     repository configuration
/// keg.db       metadata database
/// objects/     the content-addressed store
/// fragments/   encrypted quarantine
/// armadillo/   decryption keys
/// responses/   state cache for HTTP responses
/// ribbit/      state cache for raw Ribbit payloads
/// tmp/         temp staging
/// ```
pub struct Keg {
    path: PathBuf,
    pub config: KegConfig,
    pub db: Arc<KegDb>,
    pub state_cache: StateCache,
    pub ribbit_cache: StateCache,
    pub local_cdn: LocalCdn,
}

impl Keg {
    /// Open a repository rooted at `path`.
    ///
    /// An uninitialized path is usable read-only (the database lives in
    /// memory) so that `init` itself has something to work with.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path: PathBuf = path.into();

        let db = if path.exists() {
            KegDb::open(&path.join("keg.db"))?
        } else {
            KegDb::open_in_memory()?
        };

        let config = KegConfig::load(path.join("keg.conf"))?;
        let local_cdn = LocalCdn::new(
            path.join("objects"),
            path.join("fragments"),
            path.join("armadillo"),
            path.join("tmp"),
        );

        Ok(Self {
            state_cache: StateCache::new(path.join("responses")),
            ribbit_cache: StateCache::new(path.join("ribbit")),
            config,
            db: Arc::new(db),
            local_cdn,
            path,
        })
    }

    /// Open a repository, failing if it was never initialized.
    pub fn open_existing(path: impl Into<PathBuf>) -> Result<Self> {
        let path: PathBuf = path.into();
        if !path.join("keg.conf").exists() {
            return Err(Error::RepositoryNotFound {
                path: path.display().to_string(),
            });
        }
        Self::open(path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn initialized(&self) -> bool {
        self.path.join("keg.conf").exists()
    }

    /// Create the directory skeleton, config file and database tables.
    /// Returns true when the repository was newly created.
    pub fn initialize(&mut self) -> Result<bool> {
        let created = !self.path.exists();
        fs::create_dir_all(&self.path)?;

        self.config.initialize()?;
        self.db = Arc::new(KegDb::open(&self.path.join("keg.db"))?);
        self.db.create_tables()?;

        info!(
            "{} repository at {}",
            if created { "initialized" } else { "reinitialized" },
            self.path.display()
        );
        Ok(created)
    }

    /// Remove staged files a crashed run left behind. Anything carrying the
    /// temp suffix was never published, so deleting it is always safe.
    pub fn clean_temp(&self) -> Result<u32> {
        let temp_dir = self.path.join("tmp");
        if !temp_dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(&temp_dir)? {
            let path = entry?.path();
            let is_temp = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(".keg_temp"));
            if is_temp {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        if removed > 0 {
            info!("removed {removed} orphaned temp files");
        }
        Ok(removed)
    }

    /// Prefix a bare remote name with the configured default prefix.
    pub fn clean_remote(&self, remote: &str) -> String {
        if remote.contains("://") {
            remote.to_string()
        } else {
            format!("{}{remote}", self.config.default_remote_prefix())
        }
    }

    /// Construct the cacheable remote for a URL.
    pub fn get_remote(&self, remote: &str) -> Result<AnyRemote> {
        if remote.starts_with("ribbit://") {
            let ribbit = RibbitRemote::new(remote)?;
            Ok(AnyRemote::Ribbit(CacheableRibbitRemote::new(
                ribbit,
                self.db.clone(),
                self.ribbit_cache.clone(),
            )))
        } else {
            let http = HttpRemote::new(remote)?;
            Ok(AnyRemote::Http(CacheableHttpRemote::new(
                http,
                self.db.clone(),
                self.state_cache.clone(),
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ngdp");

        let mut keg = Keg::open(&root).unwrap();
        assert!(!keg.initialized());

        assert!(keg.initialize().unwrap());
        assert!(keg.initialized());
        assert!(root.join("keg.conf").exists());
        assert!(root.join("keg.db").exists());

        // Second init is a reinit, not an error.
        let mut keg = Keg::open(&root).unwrap();
        assert!(!keg.initialize().unwrap());
    }

    #[test]
    fn test_open_existing() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ngdp");

        assert!(matches!(
            Keg::open_existing(&root),
            Err(Error::RepositoryNotFound { .. })
        ));

        Keg::open(&root).unwrap().initialize().unwrap();
        assert!(Keg::open_existing(&root).is_ok());
    }

    #[test]
    fn test_clean_temp() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("ngdp");
        let mut keg = Keg::open(&root).unwrap();
        keg.initialize().unwrap();

        let tmp = root.join("tmp");
        fs::create_dir_all(&tmp).unwrap();
        fs::write(tmp.join("abc123.keg_temp"), b"partial").unwrap();
        fs::write(tmp.join("unrelated.bin"), b"keep").unwrap();

        assert_eq!(keg.clean_temp().unwrap(), 1);
        assert!(!tmp.join("abc123.keg_temp").exists());
        assert!(tmp.join("unrelated.bin").exists());
    }

    #[test]
    fn test_clean_remote() {
        let dir = tempfile::tempdir().unwrap();
        let keg = Keg::open(dir.path().join("ngdp")).unwrap();

        assert_eq!(
            keg.clean_remote("hsb"),
            "http://us.patch.battle.net:1119/hsb"
        );
        assert_eq!(
            keg.clean_remote("ribbit://version.example.com/hsb"),
            "ribbit://version.example.com/hsb"
        );
    }

    #[test]
    fn test_get_remote_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let keg = Keg::open(dir.path().join("ngdp")).unwrap();

        assert!(matches!(
            keg.get_remote("http://us.patch.battle.net:1119/hsb").unwrap(),
            AnyRemote::Http(_)
        ));
        assert!(matches!(
            keg.get_remote("ribbit://us.version.battle.net/hsb").unwrap(),
            AnyRemote::Ribbit(_)
        ));
    }
}
