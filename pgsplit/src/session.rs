//! Session handles and read/write routing intent.

use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, Postgres};
use std::fmt;
use std::ops::{Deref, DerefMut};

/// Caller-supplied intent for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionKind {
    /// Read-only work; served by the replica when one is healthy.
    Read,
    /// Mutating work; always served by the primary.
    #[default]
    Write,
}

/// Which backend a session resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Primary,
    Replica,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Primary => f.write_str("primary"),
            BackendKind::Replica => f.write_str("replica"),
        }
    }
}

/// A checked-out unit of work bound to one backend.
///
/// Dereferences to [`PgConnection`], so it can be passed anywhere sqlx expects
/// an executor:
///
/// ```ignore
/// let mut session = manager.get_session(SessionKind::Read).await?;
/// let row = sqlx::query("SELECT ...").fetch_one(&mut *session).await?;
/// ```
///
/// Dropping the session returns the connection to its pool, on every exit
/// path including early returns and errors.
pub struct Session {
    conn: PoolConnection<Postgres>,
    backend: BackendKind,
}

impl Session {
    pub(crate) fn new(conn: PoolConnection<Postgres>, backend: BackendKind) -> Self {
        Self { conn, backend }
    }

    /// The backend this session resolved to.
    ///
    /// A write session is always [`BackendKind::Primary`]; a read session is
    /// [`BackendKind::Replica`] only while the replica is healthy.
    pub fn backend(&self) -> BackendKind {
        self.backend
    }
}

impl Deref for Session {
    type Target = PgConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl DerefMut for Session {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("backend", &self.backend)
            .finish_non_exhaustive()
    }
}
