use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use sdn_core::Session;
use sdn_dns::Dns;
use sdn_engine::StructuredDataEngine;
use sdn_network_redb::RedbNetwork;
use sdn_nfs::{DirRef, Nfs};

use crate::{Commands, config::ClientConfig, helpers};

mod dns;
mod fs;

pub use dns::run_dns;
pub use fs::run_fs;

/// Everything a command needs, opened from the config file.
pub struct Client {
    pub session: Session,
    pub nfs: Nfs,
    pub dns: Dns,
}

impl Client {
    pub fn open(config_file: &Path) -> Result<Self> {
        let config = ClientConfig::load(config_file)?;
        let session = config.load_session(config_file)?;
        let network = RedbNetwork::open(&config.network.path)
            .with_context(|| format!("could not open network at {:?}", config.network.path))?;
        let engine =
            StructuredDataEngine::new(Arc::new(network)).with_retry_policy(config.engine);
        Ok(Self {
            session,
            nfs: Nfs::new(engine.clone(), config.nfs),
            dns: Dns::new(engine),
        })
    }

    /// Opens a directory given as a hex address or a registered name.
    pub async fn dir(&self, arg: &str) -> Result<DirRef> {
        let address = if helpers::is_address(arg) {
            helpers::parse_address_hex(arg)?
        } else {
            self.dns
                .resolve(arg)
                .await
                .with_context(|| format!("could not resolve '{arg}'"))?
        };
        self.nfs
            .open_dir(&self.session, address)
            .await
            .with_context(|| format!("could not open directory {address}"))
    }
}

pub async fn run_command(config_file: PathBuf, data_dir: &Path, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Config { cmd } => cmd.run(config_file, data_dir),
        Commands::Dns { cmd } => run_dns(&Client::open(&config_file)?, cmd).await,
        cmd => run_fs(&Client::open(&config_file)?, cmd).await,
    }
}
