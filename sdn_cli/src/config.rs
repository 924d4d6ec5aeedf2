use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use sdn_core::Session;
use sdn_engine::RetryPolicy;
use sdn_nfs::NfsConfig;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
    pub identity: IdentityConfig,
    pub network: NetworkConfig,
    #[serde(default)]
    pub engine: RetryPolicy,
    #[serde(default)]
    pub nfs: NfsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdentityConfig {
    /// File holding the 32-byte session seed; relative paths are resolved
    /// against the config file's directory.
    pub seed_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    /// Directory of the local redb network database.
    pub path: PathBuf,
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).with_context(|| {
            format!("could not read config file {path:?}, run `sdn config init` first")
        })?;
        toml::from_str(&text).with_context(|| format!("invalid config file {path:?}"))
    }

    pub fn seed_path(&self, config_file: &Path) -> PathBuf {
        let path = Path::new(&self.identity.seed_file);
        match config_file.parent() {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    pub fn load_session(&self, config_file: &Path) -> Result<Session> {
        let seed_path = self.seed_path(config_file);
        let mut seed = std::fs::read(&seed_path)
            .with_context(|| format!("could not read seed file {seed_path:?}"))?;
        if seed.len() != 32 {
            let len = seed.len();
            seed.zeroize();
            bail!("seed file {seed_path:?} holds {len} bytes, expected 32");
        }
        let session = Session::from_seed(&seed);
        seed.zeroize();
        Ok(session)
    }
}
