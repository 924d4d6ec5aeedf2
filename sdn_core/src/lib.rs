//! Core types and traits for the structured-data network client.
//!
//! This crate defines everything the engine, directory and naming crates
//! share.
//!
//! ## Protocol types (wire-stable)
//!
//! - Record addresses (`address::Address`), derived from a type tag and a
//!   caller-chosen 32-byte name
//! - Record type tags (`record::TypeTag`): exactly two reserved values
//!   distinguish unversioned from versioned records
//! - The signed record itself (`record::StructuredRecord`) and its binary
//!   layout, including the signed-bytes layout
//!
//! Records written by one release must stay readable by every later one;
//! changes to these types are protocol changes.
//!
//! ## Client-side helpers (non-wire)
//!
//! - The Network Accessor contract (`NetworkApi`) and the guard rules every
//!   backend shares (`PutCondition`, `DeleteProof`, `admit_put`)
//! - Signing keys and symmetric encryption (`crypto`), per-session key
//!   material (`Session`)
//! - The error taxonomy (`Error`)
//!
//! Nothing in here holds ambient state: keys are always passed explicitly.

pub mod address;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod network;
pub mod record;

// Test utilities (behind feature flag)
#[cfg(feature = "testutil")]
pub mod testutil;

pub use address::{Address, XorName};
pub use crypto::{Keypair, PublicKey, Signature};
pub use error::{Error, Result};
pub use keys::Session;
pub use network::{DeleteProof, NetworkApi, NetworkError, PutCondition, admit_put};
pub use record::{RecordDraft, StructuredRecord, TypeTag};
