//! Primary/replica connection management for PostgreSQL.
//!
//! `pgsplit` owns two SQLx connection pools — a writable primary and an
//! optional read-only replica — and hands out sessions routed by caller
//! intent: writes always go to the primary, reads go to the replica while it
//! is healthy and fall back to the primary otherwise. A replica that cannot
//! be reached at `connect()` time is dropped for the lifetime of the
//! connected session; the failure is logged, never surfaced.
//!
//! # Usage
//!
//! ```no_run
//! use pgsplit::{ConnectionManager, DatabaseConfig, SessionKind};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = DatabaseConfig::load("pgsplit.yaml")?;
//! let db = ConnectionManager::new(config);
//!
//! db.connect().await?;
//!
//! // Reads use the replica if one is configured and healthy
//! let mut session = db.get_session(SessionKind::Read).await?;
//! sqlx::query("SELECT 1").execute(&mut *session).await?;
//! drop(session);
//!
//! // health_check is pure state, safe to serve from a liveness endpoint
//! assert!(db.health_check().master);
//!
//! db.disconnect().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod manager;
pub mod session;

pub use config::{BackendConfig, DatabaseConfig, PoolSettings};
pub use errors::{Error, Result};
pub use manager::{ConnectionManager, Health, HealthStatus};
pub use session::{BackendKind, Session, SessionKind};
