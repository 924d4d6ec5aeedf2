use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::WarnLevel;
use directories::ProjectDirs;

use crate::init_config::CmdConfig;

mod cmd;
mod config;
mod helpers;
mod init_config;

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file to use instead of the per-user default
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(flatten)]
    verbosity: clap_verbosity_flag::Verbosity<WarnLevel>,

    #[command(subcommand)]
    cmd: Commands,
}

// Directory arguments take a hex address or a registered name.
#[derive(Subcommand)]
enum Commands {
    /// Modify the client config
    Config {
        #[command(subcommand)]
        cmd: CmdConfig,
    },
    /// Print this identity's public key
    Id,
    /// Create a new empty root directory and print its address
    Mkroot,
    /// Create a subdirectory
    Mkdir { dir: String, name: String },
    /// List a directory, or the directory at PATH below it
    Ls { dir: String, path: Option<String> },
    /// Store a local file under NAME, replacing the content of an existing file
    Put {
        dir: String,
        name: String,
        file: PathBuf,
        /// Append to an existing file instead of replacing its content
        #[arg(long)]
        append: bool,
    },
    /// Write a file's content to stdout
    Cat { dir: String, name: String },
    /// Remove an entry
    Rm { dir: String, name: String },
    /// Move an entry to another directory, optionally renaming it
    Mv {
        src: String,
        name: String,
        dst: String,
        new_name: Option<String>,
    },
    /// Manage registered names
    Dns {
        #[command(subcommand)]
        cmd: DnsCmd,
    },
}

#[derive(Subcommand)]
enum DnsCmd {
    /// Bind NAME to a root directory address
    Register {
        name: String,
        root: String,
        /// Additional owner public keys in hex
        #[arg(long = "owner", value_name = "PUBLIC_KEY")]
        owners: Vec<String>,
    },
    /// Print the address NAME is bound to
    Resolve { name: String },
    /// Rebind NAME to another root address
    Update { name: String, root: String },
    /// Release NAME
    Unregister { name: String },
    /// Hand NAME over to other owners
    Transfer {
        name: String,
        #[arg(long = "owner", value_name = "PUBLIC_KEY", required = true)]
        owners: Vec<String>,
    },
    /// Publish an address under a service label of NAME
    AddService {
        name: String,
        service: String,
        address: String,
    },
    /// Remove a service label from NAME
    RemoveService { name: String, service: String },
    /// Print the address of a service label of NAME
    GetService { name: String, service: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .with_writer(std::io::stderr)
        .init();

    // Configs under ~/.config/sdn/, network data under ~/.local/share/sdn/
    let dirs =
        ProjectDirs::from("", "", "sdn").context("failed to determine config directory path")?;
    let config_file = cli
        .config
        .unwrap_or_else(|| dirs.config_dir().join("local.toml"));

    cmd::run_command(config_file, dirs.data_dir(), cli.cmd).await
}
