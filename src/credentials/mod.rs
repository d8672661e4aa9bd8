//! Credential resolution
//!
//! Locates usable private key material for a requested key-pair name using
//! an ordered fallback strategy over the external key-pair store. The
//! resolver is a stateless query; it never retains credential material
//! between calls.

mod record;
mod resolver;
mod store;

pub use record::{CredentialRecord, KeyFormat, ResolvedCredential};
pub use resolver::{CredentialResolver, ResolveError, StoreDiagnostics};
pub use store::{CredentialStore, MemoryCredentialStore};
