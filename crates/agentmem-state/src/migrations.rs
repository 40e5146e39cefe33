//! SurrealDB schema migrations and initialization
//!
//! Tables are schemaless; uniqueness of `(agent_id, key)` is carried by the
//! record id (`type::thing(table, [agent_id, key])`) and mirrored by a unique
//! index so a stray `CREATE` cannot duplicate a key.

use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

use crate::error::StateError;
use crate::Result;

/// Initialize all agent memory tables.
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing agentmem SurrealDB schema");

    init_working_memory_table(db).await?;
    init_longterm_memory_table(db).await?;
    init_snapshots_table(db).await?;
    init_sync_status_table(db).await?;

    info!("agentmem schema initialization complete");
    Ok(())
}

async fn run(db: &Surreal<Any>, table: &str, sql: &str) -> Result<()> {
    db.query(sql)
        .await
        .and_then(|res| res.check())
        .map_err(|e| StateError::SchemaSetup(format!("{table}: {e}")))?;
    Ok(())
}

/// `working_memory` table
///
/// ```text
/// TABLE working_memory {
///   memory_id, agent_id, key:  STRING
///   payload:                   ANY
///   metadata:                  OBJECT
///   created_at, updated_at,
///   accessed_at, expires_at:   DATETIME
///   access_count, version:     INT
/// }
/// ```
async fn init_working_memory_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing working_memory table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS working_memory SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_wm_agent_key ON TABLE working_memory COLUMNS agent_id, key UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_wm_agent ON TABLE working_memory COLUMNS agent_id;
        -- expiry sweeps scan by expires_at
        DEFINE INDEX IF NOT EXISTS idx_wm_expires_at ON TABLE working_memory COLUMNS expires_at;
    "#;

    run(db, "working_memory", sql).await?;
    debug!("working_memory table initialized");
    Ok(())
}

/// `longterm_memory` table
///
/// ```text
/// TABLE longterm_memory {
///   memory_id, agent_id, key, category: STRING
///   payload:                            ANY
///   embedding:                          ARRAY<FLOAT>?
///   metadata:                           OBJECT (source, importance, confidence, tags, references)
///   created_at, updated_at,
///   last_accessed:                      DATETIME
///   access_count, version:              INT
/// }
/// ```
async fn init_longterm_memory_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing longterm_memory table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS longterm_memory SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_lm_agent_key ON TABLE longterm_memory COLUMNS agent_id, key UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_lm_agent_category ON TABLE longterm_memory COLUMNS agent_id, category;
    "#;

    run(db, "longterm_memory", sql).await?;
    debug!("longterm_memory table initialized");
    Ok(())
}

/// `snapshots` table. Rows are never updated after creation.
async fn init_snapshots_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing snapshots table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS snapshots SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update NONE
                FOR delete FULL;
        DEFINE INDEX IF NOT EXISTS idx_snap_id ON TABLE snapshots COLUMNS snapshot_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_snap_agent_created ON TABLE snapshots COLUMNS agent_id, created_at;
        DEFINE INDEX IF NOT EXISTS idx_snap_expires_at ON TABLE snapshots COLUMNS expires_at;
    "#;

    run(db, "snapshots", sql).await?;
    debug!("snapshots table initialized");
    Ok(())
}

/// `sync_status` table, one row per `(agent_id, instance_id)`.
async fn init_sync_status_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing sync_status table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS sync_status SCHEMALESS;
        DEFINE INDEX IF NOT EXISTS idx_sync_agent_instance ON TABLE sync_status COLUMNS agent_id, instance_id UNIQUE;
    "#;

    run(db, "sync_status", sql).await?;
    debug!("sync_status table initialized");
    Ok(())
}
