//! Naming resolver: maps human-readable names to the root address of a
//! directory tree, plus optional named service addresses.

mod binding;
mod dns;

pub use binding::{MAX_NAME_LEN, NameBinding, record_name, validate_name};
pub use dns::Dns;
