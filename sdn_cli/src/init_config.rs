use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::Subcommand;
use rand::RngCore;
use sdn_engine::RetryPolicy;
use sdn_nfs::NfsConfig;
use toml_edit::{DocumentMut, Item, Table, value};
use tracing::info;
use zeroize::Zeroize;

#[derive(Subcommand)]
pub enum CmdConfig {
    /// Creates the config file if it doesn't exist and generates a seed
    Init,
}

impl CmdConfig {
    pub fn run(self, config_file: PathBuf, data_dir: &Path) -> Result<()> {
        let config_dir = config_file
            .parent()
            .context("config file has no parent directory")?;
        let mut doc = if config_file.exists() {
            fs::read_to_string(&config_file)?
        } else {
            fs::create_dir_all(config_dir)?;
            String::new()
        }
        .parse::<DocumentMut>()
        .context("could not parse config file")?;

        match self {
            Self::Init => {
                let seed_file = config_file.with_extension("seed");
                let seed_name = seed_file
                    .file_name()
                    .and_then(|name| name.to_str())
                    .context("seed file name is not valid UTF-8")?;
                let network_path = data_dir.join("network");
                let network_path = network_path
                    .to_str()
                    .context("data directory is not valid UTF-8")?;

                table(&mut doc, "identity")?
                    .entry("seed_file")
                    .or_insert(value(seed_name));
                table(&mut doc, "network")?
                    .entry("path")
                    .or_insert(value(network_path));

                let retry = RetryPolicy::default();
                let engine = table(&mut doc, "engine")?;
                engine
                    .entry("max_attempts")
                    .or_insert(value(i64::from(retry.max_attempts)));
                engine
                    .entry("initial_backoff_ms")
                    .or_insert(value(retry.initial_backoff_ms as i64));
                engine
                    .entry("max_backoff_ms")
                    .or_insert(value(retry.max_backoff_ms as i64));

                let nfs_defaults = NfsConfig::default();
                let nfs = table(&mut doc, "nfs")?;
                nfs.entry("chunk_size")
                    .or_insert(value(nfs_defaults.chunk_size as i64));
                nfs.entry("inline_threshold")
                    .or_insert(value(nfs_defaults.inline_threshold as i64));

                if !seed_file.exists() {
                    info!("generating random session seed");
                    let mut seed = [0u8; 32];
                    rand::rng().fill_bytes(&mut seed);
                    let written = fs::write(&seed_file, seed);
                    seed.zeroize();
                    written.with_context(|| format!("could not write {seed_file:?}"))?;
                }
            }
        }

        info!("writing to config file {config_file:?}");

        let tmp_path = config_file.with_extension("tmp");
        let mut tmp = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        tmp.write_all(doc.to_string().as_bytes())?;
        tmp.sync_all()?;
        fs::rename(&tmp_path, config_file)?;
        Ok(())
    }
}

fn table<'a>(doc: &'a mut DocumentMut, key: &str) -> Result<&'a mut Table> {
    doc.entry(key)
        .or_insert(Item::Table(Table::new()))
        .as_table_mut()
        .with_context(|| format!("config key `{key}` is not a table"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;

    #[test]
    fn init_writes_a_loadable_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("config").join("local.toml");
        let data_dir = dir.path().join("data");

        CmdConfig::Init.run(config_file.clone(), &data_dir).unwrap();
        let config = ClientConfig::load(&config_file).unwrap();
        assert_eq!(config.network.path, data_dir.join("network"));
        assert_eq!(config.engine, RetryPolicy::default());
        assert_eq!(config.nfs, NfsConfig::default());
        let first = config.load_session(&config_file).unwrap().public_key();

        // A second init keeps the existing seed and any edited values.
        let edited = fs::read_to_string(&config_file)
            .unwrap()
            .replace("max_attempts = 10", "max_attempts = 4");
        fs::write(&config_file, edited).unwrap();
        CmdConfig::Init.run(config_file.clone(), &data_dir).unwrap();
        let config = ClientConfig::load(&config_file).unwrap();
        assert_eq!(config.engine.max_attempts, 4);
        assert_eq!(config.load_session(&config_file).unwrap().public_key(), first);
    }
}
