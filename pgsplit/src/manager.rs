//! Connection lifecycle and read/write routing.
//!
//! This module provides [`ConnectionManager`], which owns a pool for the
//! writable primary and, optionally, a pool for a read-only replica.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────┐
//! │ ConnectionManager │
//! └─────────┬─────────┘
//!           │
//!      ┌────┴────┐
//!      ↓         ↓
//! ┌─────────┐ ┌─────────┐
//! │ Primary │ │ Replica │ (optional)
//! └─────────┘ └─────────┘
//! ```
//!
//! Write sessions always resolve to the primary. Read sessions resolve to the
//! replica while it is healthy and fall back to the primary otherwise. A
//! replica that fails to open or fails its liveness probe during `connect()`
//! is dropped for the lifetime of the connected session; only the next
//! `connect()` considers it again. Replica failures never surface to the
//! caller, they only change routing.

use parking_lot::RwLock;
use serde::Serialize;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info, warn};

use crate::config::{BackendConfig, DatabaseConfig};
use crate::errors::{Error, Result};
use crate::session::{BackendKind, Session, SessionKind};

/// Replica availability, decided once per `connect()`.
///
/// Read routing is a pure function of this state: only `Healthy` routes reads
/// away from the primary.
#[derive(Debug, Clone)]
enum ReplicaState {
    /// No replica configured (or the replica entry was incomplete)
    NotConfigured,
    /// Replica pool is open and passed its liveness probe
    Healthy(PgPool),
    /// Replica was configured but could not be opened or probed
    Unreachable,
}

/// The pools backing a connected manager.
#[derive(Debug, Clone)]
struct Backends {
    primary: PgPool,
    replica: ReplicaState,
}

impl Backends {
    /// Pool serving read sessions: the replica while healthy, otherwise primary.
    fn read_pool(&self) -> (PgPool, BackendKind) {
        match &self.replica {
            ReplicaState::Healthy(pool) => (pool.clone(), BackendKind::Replica),
            _ => (self.primary.clone(), BackendKind::Primary),
        }
    }

    /// Pool serving write sessions: always the primary.
    fn write_pool(&self) -> (PgPool, BackendKind) {
        (self.primary.clone(), BackendKind::Primary)
    }

    fn has_replica(&self) -> bool {
        matches!(self.replica, ReplicaState::Healthy(_))
    }

    async fn close(self) {
        self.primary.close().await;
        if let ReplicaState::Healthy(pool) = self.replica {
            pool.close().await;
        }
    }
}

#[derive(Debug)]
enum ManagerState {
    Disconnected,
    Connecting,
    Connected(Backends),
    DisconnectedAfterError,
}

/// Overall status reported by [`ConnectionManager::health_check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Point-in-time snapshot of backend availability.
///
/// Produced without any I/O, so it is safe to serve from a liveness endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Health {
    /// `healthy` iff the manager is connected
    pub status: HealthStatus,
    /// Whether the primary pool is present
    pub master: bool,
    /// Whether reads are currently routed to a replica
    pub replica: bool,
}

/// Connection manager routing sessions between a primary and an optional
/// read replica.
///
/// `connect()` and `disconnect()` are expected to run once at startup and
/// shutdown; calling `connect()` on a manager that is already connected (or
/// while another `connect()` is in flight) fails with
/// [`Error::AlreadyConnected`] rather than leaking a second set of pools.
/// `get_session()` and `health_check()` are safe for arbitrary concurrent use.
#[derive(Debug)]
pub struct ConnectionManager {
    config: DatabaseConfig,
    state: RwLock<ManagerState>,
}

impl ConnectionManager {
    /// Create a disconnected manager. No I/O happens until [`connect`](Self::connect).
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            state: RwLock::new(ManagerState::Disconnected),
        }
    }

    /// Open both backends and probe their liveness.
    ///
    /// The primary must open and answer the probe or this fails with
    /// [`Error::Connection`], leaving no pools behind so a retry starts
    /// clean. Replica failures are absorbed: the manager comes up in
    /// primary-only mode and logs a warning.
    pub async fn connect(&self) -> Result<()> {
        self.config.primary.validate("primary")?;

        {
            let mut state = self.state.write();
            match *state {
                ManagerState::Disconnected | ManagerState::DisconnectedAfterError => {
                    *state = ManagerState::Connecting;
                }
                ManagerState::Connecting | ManagerState::Connected(_) => {
                    return Err(Error::AlreadyConnected);
                }
            }
        }

        match self.open_backends().await {
            Ok(backends) => {
                let reads = if backends.has_replica() {
                    BackendKind::Replica
                } else {
                    BackendKind::Primary
                };
                info!(reads = %reads, writes = %BackendKind::Primary, "database connected");
                *self.state.write() = ManagerState::Connected(backends);
                Ok(())
            }
            Err(err) => {
                *self.state.write() = ManagerState::DisconnectedAfterError;
                Err(err)
            }
        }
    }

    async fn open_backends(&self) -> Result<Backends> {
        info!("connecting to databases");

        let primary = self.open_pool(&self.config.primary).await.map_err(Error::Connection)?;

        let replica = match self.config.replica() {
            Some(cfg) => match self.open_pool(cfg).await {
                Ok(pool) => ReplicaState::Healthy(pool),
                Err(err) => {
                    warn!(error = %err, "replica unavailable, continuing with primary only");
                    ReplicaState::Unreachable
                }
            },
            None => {
                debug!("no replica configured, using primary only");
                ReplicaState::NotConfigured
            }
        };

        // Primary must answer the probe; tear down everything opened so far
        // before surfacing the failure.
        if let Err(err) = probe(&primary).await {
            let partial = Backends { primary, replica };
            partial.close().await;
            return Err(Error::Connection(err));
        }
        debug!("primary liveness probe ok");

        let replica = match replica {
            ReplicaState::Healthy(pool) => match probe(&pool).await {
                Ok(()) => {
                    debug!("replica liveness probe ok");
                    ReplicaState::Healthy(pool)
                }
                Err(err) => {
                    warn!(error = %err, "replica liveness probe failed, falling back to primary");
                    pool.close().await;
                    ReplicaState::Unreachable
                }
            },
            other => other,
        };

        Ok(Backends { primary, replica })
    }

    async fn open_pool(&self, backend: &BackendConfig) -> std::result::Result<PgPool, sqlx::Error> {
        let pool = &self.config.pool;
        PgPoolOptions::new()
            .max_connections(pool.pool_size + pool.max_overflow)
            .acquire_timeout(pool.pool_timeout)
            .max_lifetime(pool.pool_recycle)
            .connect_with(backend.connect_options())
            .await
    }

    /// Release all pooled connections and return to `Disconnected`.
    ///
    /// Idempotent: calling this on a manager that never connected (or already
    /// disconnected) is a no-op.
    pub async fn disconnect(&self) {
        let backends = {
            let mut state = self.state.write();
            match std::mem::replace(&mut *state, ManagerState::Disconnected) {
                ManagerState::Connected(backends) => Some(backends),
                _ => None,
            }
        };

        let Some(backends) = backends else {
            debug!("disconnect on a manager that is not connected, nothing to do");
            return;
        };

        info!("disconnecting databases");
        backends.close().await;
        info!("database disconnected");
    }

    /// Check out a session routed by `kind`.
    ///
    /// Every call yields an independent [`Session`]; releasing it (by drop)
    /// is the caller's responsibility. Checkout may wait up to the configured
    /// `pool_timeout` for a free connection and is cancel-safe: abandoning
    /// the future does not leak a pool slot.
    pub async fn get_session(&self, kind: SessionKind) -> Result<Session> {
        let (pool, backend) = {
            let state = self.state.read();
            let ManagerState::Connected(backends) = &*state else {
                return Err(Error::NotConnected);
            };
            match kind {
                SessionKind::Write => backends.write_pool(),
                SessionKind::Read => backends.read_pool(),
            }
        };

        let conn = pool.acquire().await.map_err(|err| match err {
            sqlx::Error::PoolTimedOut => Error::PoolTimeout {
                timeout: self.config.pool.pool_timeout,
            },
            other => Error::Other(other.into()),
        })?;

        debug!(backend = %backend, "session checked out");
        Ok(Session::new(conn, backend))
    }

    /// Report current backend availability.
    ///
    /// A pure read of manager state: never performs I/O, never blocks beyond
    /// a brief lock, never fails.
    pub fn health_check(&self) -> Health {
        let state = self.state.read();
        match &*state {
            ManagerState::Connected(backends) => Health {
                status: HealthStatus::Healthy,
                master: true,
                replica: backends.has_replica(),
            },
            _ => Health {
                status: HealthStatus::Unhealthy,
                master: false,
                replica: false,
            },
        }
    }

    /// The configuration this manager was built with.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }
}

/// Liveness probe: one trivial query to confirm the backend accepts
/// connections. Bounded by the pool's acquire timeout.
async fn probe(pool: &PgPool) -> std::result::Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}
