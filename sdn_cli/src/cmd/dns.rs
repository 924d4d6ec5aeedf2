use anyhow::Result;

use super::Client;
use crate::{
    DnsCmd,
    helpers::{parse_address_hex, parse_public_key_hex},
};

pub async fn run_dns(client: &Client, cmd: DnsCmd) -> Result<()> {
    let Client { session, dns, .. } = client;
    let signer = session.keypair();
    match cmd {
        DnsCmd::Register { name, root, owners } => {
            let root = parse_address_hex(&root)?;
            let mut keys = vec![session.public_key()];
            for owner in &owners {
                let key = parse_public_key_hex(owner)?;
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
            dns.register(signer, &name, root, keys).await?;
        }
        DnsCmd::Resolve { name } => {
            println!("{}", dns.resolve(&name).await?);
        }
        DnsCmd::Update { name, root } => {
            dns.update_binding(signer, &name, parse_address_hex(&root)?)
                .await?;
        }
        DnsCmd::Unregister { name } => {
            dns.unregister(signer, &name).await?;
        }
        DnsCmd::Transfer { name, owners } => {
            let owners = owners
                .iter()
                .map(|owner| parse_public_key_hex(owner))
                .collect::<Result<Vec<_>>>()?;
            dns.transfer(signer, &name, owners).await?;
        }
        DnsCmd::AddService {
            name,
            service,
            address,
        } => {
            dns.add_service(signer, &name, &service, parse_address_hex(&address)?)
                .await?;
        }
        DnsCmd::RemoveService { name, service } => {
            dns.remove_service(signer, &name, &service).await?;
        }
        DnsCmd::GetService { name, service } => {
            println!("{}", dns.get_service(&name, &service).await?);
        }
    }
    Ok(())
}
