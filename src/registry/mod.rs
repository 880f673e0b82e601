//! Session registry
//!
//! Maps session id to session record. All mutation goes through the four
//! operations on [`SessionRegistry`] (`register`, `unregister`, `update`,
//! `list`), each safe under arbitrary concurrent callers; no caller can
//! observe a partially inserted or partially removed entry.

pub mod error;
pub mod store;

pub use error::RegistryError;
pub use store::SessionRegistry;
