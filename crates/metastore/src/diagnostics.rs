//! Diagnostic reports and size metrics for crash and corruption triage.

use std::collections::BTreeMap;
use std::fmt::Write;

use serde::Serialize;
use tracing::info;

use crate::connection::ConnectionHandle;
use crate::errors::Result;
use crate::meta_table::MetaTable;
use crate::table::row_count;

/// Size metrics of an open store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseMetrics {
    /// Size of the main file in bytes; 0 for in-memory databases.
    pub file_size_bytes: u64,
    /// Page size in bytes.
    pub page_size: u64,
    /// Pages in the file.
    pub page_count: u64,
    /// Unused pages a vacuum would reclaim.
    pub freelist_count: u64,
    /// Row count per table module, keyed by module name.
    pub table_rows: BTreeMap<String, u64>,
}

pub(crate) fn compute_metrics<'a>(
    conn: &ConnectionHandle,
    tables: impl IntoIterator<Item = &'a str>,
) -> Result<DatabaseMetrics> {
    let file_size_bytes = conn
        .path()
        .and_then(|p| std::fs::metadata(p).ok())
        .map_or(0, |m| m.len());

    let mut table_rows = BTreeMap::new();
    for table in tables {
        if conn.does_table_exist(table)? {
            let _ = table_rows.insert(table.to_owned(), row_count(conn, table)?);
        }
    }

    let metrics = DatabaseMetrics {
        file_size_bytes,
        page_size: non_negative(conn.pragma_i64("page_size")?),
        page_count: non_negative(conn.pragma_i64("page_count")?),
        freelist_count: non_negative(conn.pragma_i64("freelist_count")?),
        table_rows,
    };
    info!(
        file_size_bytes = metrics.file_size_bytes,
        page_count = metrics.page_count,
        freelist_count = metrics.freelist_count,
        tables = metrics.table_rows.len(),
        "database metrics"
    );
    Ok(metrics)
}

fn non_negative(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}

/// Primary result codes that indicate a damaged file.
fn is_corruption_code(extended_error: i32) -> bool {
    matches!(
        extended_error & 0xff,
        rusqlite::ffi::SQLITE_CORRUPT | rusqlite::ffi::SQLITE_NOTADB
    )
}

/// Build a plain-text report for an engine failure. Never fails.
///
/// Every read of the database is best effort; a read that fails is
/// reported inline instead.
pub(crate) fn diagnostic_report(
    conn: &ConnectionHandle,
    header: &[(&str, String)],
    extended_error: i32,
    statement: Option<&str>,
) -> String {
    let mut out = String::new();
    for (key, value) in header {
        let _ = writeln!(out, "{key}: {value}");
    }

    let _ = writeln!(
        out,
        "error: {}",
        rusqlite::ffi::Error::new(extended_error)
    );
    let _ = writeln!(out, "extended_error: {extended_error}");
    if let Some(sql) = statement {
        let _ = writeln!(out, "statement: {sql}");
    }

    if let Some(last) = conn.last_error() {
        let _ = writeln!(
            out,
            "last_error: {:?} (extended {}) {}",
            last.code,
            last.extended_code,
            last.message.as_deref().unwrap_or("")
        );
        if let Some(sql) = &last.statement {
            let _ = writeln!(out, "last_statement: {sql}");
        }
    }

    if !conn.is_open() {
        let _ = writeln!(out, "connection: closed");
        return out;
    }

    match MetaTable::read(conn) {
        Ok(Some(v)) => {
            let _ = writeln!(out, "stored_version: {} (compatible {})", v.current, v.compatible);
        }
        Ok(None) => {
            let _ = writeln!(out, "stored_version: none");
        }
        Err(e) => {
            let _ = writeln!(out, "stored_version: unavailable ({e})");
        }
    }

    for pragma in ["page_size", "page_count", "freelist_count"] {
        match conn.pragma_i64(pragma) {
            Ok(v) => {
                let _ = writeln!(out, "{pragma}: {v}");
            }
            Err(e) => {
                let _ = writeln!(out, "{pragma}: unavailable ({e})");
            }
        }
    }

    if is_corruption_code(extended_error) {
        match conn.query_rows("PRAGMA quick_check(10)", [], |row| row.get::<_, String>(0)) {
            Ok(lines) => {
                let _ = writeln!(out, "quick_check: {}", lines.join("; "));
            }
            Err(e) => {
                let _ = writeln!(out, "quick_check: failed ({e})");
            }
        }
    }

    out
}
