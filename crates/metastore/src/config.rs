//! Connection and store configuration.
//!
//! [`StoreConfig`] holds every knob the store applies when it opens a
//! connection. All fields have defaults, so a partial JSON document (see
//! [`crate::settings`]) deserializes into a complete config.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, StoreError};

/// Smallest page size `SQLite` accepts.
pub const MIN_PAGE_SIZE: u32 = 512;
/// Largest page size this store allows.
pub const MAX_PAGE_SIZE: u32 = 8192;

/// `SQLite` journal mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    /// Rollback journal in `<path>-journal`, deleted after each transaction.
    #[default]
    Delete,
    /// Rollback journal truncated instead of deleted.
    Truncate,
    /// Write-ahead log in `<path>-wal` / `<path>-shm`.
    Wal,
    /// Journal kept in memory.
    Memory,
}

impl JournalMode {
    /// Returns the `SQLite` pragma value.
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Truncate => "truncate",
            Self::Wal => "wal",
            Self::Memory => "memory",
        }
    }
}

/// `SQLite` synchronous mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Sync at every critical moment.
    Full,
    /// Sync less often; safe with WAL.
    #[default]
    Normal,
    /// Leave syncing to the OS.
    Off,
}

impl SyncMode {
    /// Returns the `SQLite` pragma value.
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
            Self::Off => "off",
        }
    }
}

/// File locking mode of a connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockingMode {
    /// Locks are taken and released per transaction; other readers may attach.
    #[default]
    Normal,
    /// The file lock is held for the life of the connection.
    Exclusive,
}

impl LockingMode {
    /// Returns the `SQLite` pragma value.
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Exclusive => "EXCLUSIVE",
        }
    }
}

/// Configuration applied by the store when it opens its connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Page size in bytes. Only effective before any table exists.
    pub page_size: u32,
    /// Page cache size in pages. `page_size * cache_size` bounds cache memory.
    pub cache_size: u32,
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
    /// Journal mode.
    pub journal_mode: JournalMode,
    /// Synchronous mode.
    pub synchronous: SyncMode,
    /// Open the file in exclusive locking mode straight away. Leave this off
    /// when another reader must attach after init and call
    /// `begin_exclusive_mode` later instead.
    pub exclusive_on_open: bool,
    /// Warm the OS cache with the start of the file during init.
    pub preload: bool,
    /// Raze and recreate a file whose schema predates the oldest migratable
    /// version instead of failing init.
    pub raze_if_deprecated: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            cache_size: 1000,
            busy_timeout_ms: 5000,
            journal_mode: JournalMode::default(),
            synchronous: SyncMode::default(),
            exclusive_on_open: false,
            preload: true,
            raze_if_deprecated: false,
        }
    }
}

impl StoreConfig {
    /// Check that every value is within the range the engine accepts.
    pub fn validate(&self) -> Result<()> {
        validate_page_size(self.page_size)?;
        if self.cache_size == 0 {
            return Err(StoreError::InvalidConfig(
                "cache_size must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Initial locking mode for a freshly opened connection.
    pub fn initial_locking_mode(&self) -> LockingMode {
        if self.exclusive_on_open {
            LockingMode::Exclusive
        } else {
            LockingMode::Normal
        }
    }
}

/// Page sizes must be a power of two in `MIN_PAGE_SIZE..=MAX_PAGE_SIZE`.
pub fn validate_page_size(bytes: u32) -> Result<()> {
    if !bytes.is_power_of_two() || !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&bytes) {
        return Err(StoreError::InvalidConfig(format!(
            "page_size must be a power of two between {MIN_PAGE_SIZE} and {MAX_PAGE_SIZE}, got {bytes}"
        )));
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = StoreConfig::default();
        assert_eq!(config.page_size, 4096);
        assert_eq!(config.cache_size, 1000);
        assert_eq!(config.busy_timeout_ms, 5000);
        assert_eq!(config.journal_mode, JournalMode::Delete);
        assert_eq!(config.synchronous, SyncMode::Normal);
        assert!(!config.exclusive_on_open);
        assert!(config.preload);
        assert!(!config.raze_if_deprecated);
        config.validate().unwrap();
    }

    #[test]
    fn page_size_bounds() {
        for ok in [512, 1024, 2048, 4096, 8192] {
            validate_page_size(ok).unwrap();
        }
        for bad in [0, 256, 1000, 3000, 16384, 65536] {
            assert!(validate_page_size(bad).is_err(), "{bad} accepted");
        }
    }

    #[test]
    fn zero_cache_size_rejected() {
        let config = StoreConfig {
            cache_size: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cache_size"));
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"page_size": 8192, "journal_mode": "wal"}"#).unwrap();
        assert_eq!(config.page_size, 8192);
        assert_eq!(config.journal_mode, JournalMode::Wal);
        assert_eq!(config.cache_size, 1000);
    }

    #[test]
    fn pragma_values() {
        assert_eq!(JournalMode::Wal.pragma_value(), "wal");
        assert_eq!(SyncMode::Full.pragma_value(), "full");
        assert_eq!(LockingMode::Exclusive.pragma_value(), "EXCLUSIVE");
    }

    #[test]
    fn initial_locking_mode_follows_flag() {
        let mut config = StoreConfig::default();
        assert_eq!(config.initial_locking_mode(), LockingMode::Normal);
        config.exclusive_on_open = true;
        assert_eq!(config.initial_locking_mode(), LockingMode::Exclusive);
    }
}
