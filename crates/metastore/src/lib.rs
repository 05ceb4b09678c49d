//! # metastore
//!
//! Transactional embedded metadata store on top of `SQLite`.
//!
//! A store owns exactly one connection and shares it between any number of
//! table modules:
//!
//! - **Connection handle**: open-time pragmas, nested transactions, savepoints, error callback
//! - **Meta table**: persisted `version` / `last_compatible_version` pair and free-form keys
//! - **Table modules**: per-table DDL and idempotent, ordered migration steps
//! - **Store façade**: init state machine, exclusive mode, vacuum, trim, raze, diagnostics
//! - **Settings**: JSON config with deep merge and `METASTORE_*` env overrides

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod diagnostics;
pub mod errors;
pub mod logging;
pub mod meta_table;
pub mod row_helpers;
pub mod settings;
pub mod store;
pub mod table;

pub use config::{JournalMode, LockingMode, StoreConfig, SyncMode};
pub use connection::{ConnectionHandle, EngineError, EngineTransactionStats, ErrorCallback};
pub use diagnostics::DatabaseMetrics;
pub use errors::{InitStatus, Result, StoreError};
pub use meta_table::{MetaTable, SchemaVersion};
pub use store::{MetadataStore, SchemaSpec, StoreState};
pub use table::{MigrationStep, TableModule, add_column_if_missing, run_migration_steps};
