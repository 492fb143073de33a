//! Database access: the connection pool and PostgreSQL plumbing.

pub mod pg_tls;
pub mod pool;
pub mod util;

pub use pool::{build_pool, PgManager, PoolError, PoolSettings, PoolStatus};
