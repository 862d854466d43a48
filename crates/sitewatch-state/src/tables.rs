//! redb table definitions for the sitewatch store.

use redb::TableDefinition;

/// Active dedup markers keyed by `{url}:{kind}`, valued by a millisecond timestamp.
pub const DEDUP_KEYS: TableDefinition<&str, &str> = TableDefinition::new("dedup_keys");

/// Append-only job log: sequence number → JSON site payload.
pub const JOB_LOG: TableDefinition<u64, &str> = TableDefinition::new("job_log");
