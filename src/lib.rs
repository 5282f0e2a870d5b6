//! PostgreSQL data access for clients and their phone numbers.
//!
//! [`ClientStore`] creates the `clients` / `phones` schema on demand and
//! exposes parameterized CRUD plus a literal substring search. Each call is a
//! single statement in its own transaction.

pub mod config;
pub mod db;
pub mod models;

pub use config::Config;
pub use db::{ClientStore, ErrorKind, StoreError};
pub use models::{Client, Phone};
