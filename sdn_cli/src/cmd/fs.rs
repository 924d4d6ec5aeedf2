use anyhow::{Context, Result};
use sdn_core::Error;
use sdn_nfs::{DirectoryEntry, EntryKind, Metadata, WriteMode};
use tokio::io::AsyncWriteExt;

use super::Client;
use crate::Commands;

pub async fn run_fs(client: &Client, cmd: Commands) -> Result<()> {
    let Client { session, nfs, .. } = client;
    match cmd {
        Commands::Id => {
            println!("{}", session.public_key().to_hex());
        }
        Commands::Mkroot => {
            let dir = nfs.create_dir(session).await?;
            println!("{}", dir.address());
        }
        Commands::Mkdir { dir, name } => {
            let parent = client.dir(&dir).await?;
            let child = nfs
                .create_subdir(session, &parent, &name, Metadata::now())
                .await?;
            println!("{}", child.address());
        }
        Commands::Ls { dir, path } => {
            let mut dir = client.dir(&dir).await?;
            if let Some(path) = path {
                let entry = nfs.lookup_path(session, &dir, &path).await?;
                dir = *entry.as_dir()?;
            }
            for entry in nfs.list(session, &dir).await? {
                print_entry(&entry);
            }
        }
        Commands::Put {
            dir,
            name,
            file,
            append,
        } => {
            let dir = client.dir(&dir).await?;
            let content = tokio::fs::read(&file)
                .await
                .with_context(|| format!("could not read {file:?}"))?;
            if append {
                match nfs
                    .update_file(session, &dir, &name, &content, WriteMode::Append)
                    .await
                {
                    Ok(_) => return Ok(()),
                    Err(Error::EntryNotFound(_)) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            let entry = nfs
                .write_file(session, &name, &content, Metadata::now())
                .await?;
            match nfs.add_entry(session, &dir, entry).await {
                Ok(()) => {}
                Err(Error::DuplicateName(_)) => {
                    nfs.update_file(session, &dir, &name, &content, WriteMode::Overwrite)
                        .await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Cat { dir, name } => {
            let dir = client.dir(&dir).await?;
            let entry = nfs.get_entry(session, &dir, &name).await?;
            let content = nfs.read_file(entry.as_file()?).await?;
            let mut stdout = tokio::io::stdout();
            stdout.write_all(&content).await?;
            stdout.flush().await?;
        }
        Commands::Rm { dir, name } => {
            let dir = client.dir(&dir).await?;
            nfs.remove_entry(session, &dir, &name).await?;
        }
        Commands::Mv {
            src,
            name,
            dst,
            new_name,
        } => {
            let src = client.dir(&src).await?;
            let dst = client.dir(&dst).await?;
            nfs.move_entry(session, &src, &name, &dst, new_name.as_deref())
                .await?;
        }
        Commands::Config { .. } | Commands::Dns { .. } => unreachable!(),
    }
    Ok(())
}

fn print_entry(entry: &DirectoryEntry) {
    match &entry.kind {
        EntryKind::Directory(dir) => {
            println!("d {:>12} {}  {}", "-", dir.address().fmt_short(), entry.name)
        }
        EntryKind::File(file) => println!("f {:>12} {:10}  {}", file.size, "", entry.name),
    }
}
