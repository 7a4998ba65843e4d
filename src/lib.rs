//! Account info states for a distributed ledger.
//!
//! * [`states`] — the [`AccountInfo`](states::AccountInfo) record, its linear
//!   identity and the successor check used during transaction verification.
//! * [`schemas`] — mapping of account states into flat rows for the query
//!   store, failing closed on unknown schemas.
//! * [`identity`] — opaque party tokens and the directory that resolves them.
//! * [`contracts`] — classification of account transitions.
//! * [`vault`] — in-memory read-side index with version history.
//! * [`config`] — TOML configuration for the `accounts` tool.
//!
//! Records never change in place: every update yields a new value with the
//! same unique token.

pub mod config;
pub mod contracts;
pub mod identity;
pub mod schemas;
pub mod states;
pub mod vault;

pub use identity::{Party, PartyKey};
pub use schemas::{project, supported_schemas, PersistentAccountInfo, ProjectionError, SchemaRef};
pub use states::{
    identifier_of, is_successor, participants_of, AccountInfo, AccountStatus, StateError,
    UniqueIdentifier,
};
