//! The Structured Data Engine.
//!
//! Every read and write of a structured record goes through
//! [`StructuredDataEngine`]. Writes are optimistic: the engine fetches the
//! current record, lets a caller-supplied mutator produce the next payload
//! and owner set, signs the successor and submits it with a guard on the
//! version (or content hash) it was derived from. When another writer got
//! there first the whole cycle is repeated according to the
//! [`RetryPolicy`].

mod engine;
mod retry;

pub use engine::StructuredDataEngine;
pub use retry::RetryPolicy;
