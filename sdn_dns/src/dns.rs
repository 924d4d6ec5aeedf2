use sdn_core::{Address, Error, Keypair, PublicKey, Result, TypeTag};
use sdn_engine::StructuredDataEngine;
use tracing::debug;

use crate::binding::{NameBinding, record_name, validate_name};

/// Name registry on top of a [`StructuredDataEngine`].
///
/// Each name is a versioned record at a derived address holding a
/// [`NameBinding`]. Updates go through the engine, so concurrent changes to
/// one name are serialised by version and retried like any other update.
#[derive(Debug, Clone)]
pub struct Dns {
    engine: StructuredDataEngine,
}

impl Dns {
    pub fn new(engine: StructuredDataEngine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &StructuredDataEngine {
        &self.engine
    }

    /// Address of the record that holds `name`'s binding.
    pub fn address_of(name: &str) -> Address {
        Address::derive(TypeTag::Versioned, &record_name(name))
    }

    /// Binds `name` to `root`. Fails with `NameTaken` if it is already
    /// registered, whoever owns it.
    pub async fn register(
        &self,
        signer: &Keypair,
        name: &str,
        root: Address,
        owners: Vec<PublicKey>,
    ) -> Result<Address> {
        validate_name(name)?;
        let payload = NameBinding::new(name, root).encode()?;
        let address = self
            .engine
            .create(signer, TypeTag::Versioned, record_name(name), owners, payload)
            .await
            .map_err(|e| match e {
                Error::AlreadyExists => Error::NameTaken(name.to_string()),
                e => e,
            })?;
        debug!(name, %root, %address, "registered name");
        Ok(address)
    }

    /// Current binding of `name`.
    pub async fn lookup(&self, name: &str) -> Result<NameBinding> {
        validate_name(name)?;
        let record = self
            .engine
            .fetch(&Self::address_of(name))
            .await
            .map_err(|e| not_registered(e, name))?;
        NameBinding::decode(name, &record.payload)
    }

    /// Root address `name` is bound to.
    pub async fn resolve(&self, name: &str) -> Result<Address> {
        Ok(self.lookup(name).await?.root)
    }

    /// Rebinds `name` to `root`, keeping its services.
    pub async fn update_binding(&self, signer: &Keypair, name: &str, root: Address) -> Result<()> {
        self.modify(signer, name, |binding| {
            binding.root = root;
            Ok(())
        })
        .await?;
        debug!(name, %root, "updated binding");
        Ok(())
    }

    /// Deletes the name record; the name can be registered again afterwards.
    pub async fn unregister(&self, signer: &Keypair, name: &str) -> Result<()> {
        validate_name(name)?;
        self.engine
            .delete(signer, &Self::address_of(name))
            .await
            .map_err(|e| not_registered(e, name))?;
        debug!(name, "unregistered name");
        Ok(())
    }

    /// Publishes `address` under `service`; an existing service is never
    /// replaced.
    pub async fn add_service(
        &self,
        signer: &Keypair,
        name: &str,
        service: &str,
        address: Address,
    ) -> Result<()> {
        validate_name(service)?;
        self.modify(signer, name, |binding| {
            if binding.services.contains_key(service) {
                return Err(Error::DuplicateName(service.to_string()));
            }
            binding.services.insert(service.to_string(), address);
            Ok(())
        })
        .await
    }

    pub async fn remove_service(&self, signer: &Keypair, name: &str, service: &str) -> Result<()> {
        self.modify(signer, name, |binding| {
            binding
                .services
                .remove(service)
                .map(|_| ())
                .ok_or_else(|| Error::EntryNotFound(service.to_string()))
        })
        .await
    }

    pub async fn get_service(&self, name: &str, service: &str) -> Result<Address> {
        self.lookup(name)
            .await?
            .services
            .get(service)
            .copied()
            .ok_or_else(|| Error::EntryNotFound(service.to_string()))
    }

    /// Hands the name over to `new_owners`.
    pub async fn transfer(
        &self,
        signer: &Keypair,
        name: &str,
        new_owners: Vec<PublicKey>,
    ) -> Result<()> {
        validate_name(name)?;
        let record = self
            .engine
            .transfer_ownership(signer, &Self::address_of(name), new_owners)
            .await
            .map_err(|e| not_registered(e, name))?;
        debug!(name, version = record.version, "transferred name");
        Ok(())
    }

    async fn modify<F>(&self, signer: &Keypair, name: &str, change: F) -> Result<()>
    where
        F: Fn(&mut NameBinding) -> Result<()> + Send + Sync,
    {
        validate_name(name)?;
        self.engine
            .update(signer, &Self::address_of(name), |current| {
                let mut binding = NameBinding::decode(name, &current.payload)?;
                change(&mut binding)?;
                Ok(current.draft().with_payload(binding.encode()?))
            })
            .await
            .map_err(|e| not_registered(e, name))?;
        Ok(())
    }
}

fn not_registered(err: Error, name: &str) -> Error {
    match err {
        Error::NotFound => Error::NameNotFound(name.to_string()),
        e => e,
    }
}
