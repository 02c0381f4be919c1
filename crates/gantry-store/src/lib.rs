//! # gantry-store
//!
//! `SQLite` storage layer for the gantry workflow engine: connection
//! pooling with WAL mode and idempotent schema migrations.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod migrations;

pub use connection::{
    new_file, new_in_memory, ConnectionConfig, ConnectionPool, PooledConnection,
};
pub use errors::StoreError;
pub use migrations::run_migrations;
