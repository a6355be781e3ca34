//! Prometheus gauges for the database connection pool

use prometheus::{register_int_gauge_vec, IntGaugeVec};
use sqlx::PgPool;

lazy_static::lazy_static! {
    /// Database connection pool size by state (idle/active/max)
    static ref DB_POOL_CONNECTIONS: IntGaugeVec = register_int_gauge_vec!(
        "db_pool_connections",
        "Database pool connection count by state",
        &["service", "state"]
    ).expect("Prometheus metrics registration should succeed at startup");
}

/// Refresh the idle/active/max gauges for `service` from the pool's current state
pub fn update_pool_metrics(pool: &PgPool, service: &str) {
    let size = pool.size() as i64;
    let idle = pool.num_idle() as i64;

    DB_POOL_CONNECTIONS
        .with_label_values(&[service, "idle"])
        .set(idle);

    DB_POOL_CONNECTIONS
        .with_label_values(&[service, "active"])
        .set(size - idle);

    DB_POOL_CONNECTIONS
        .with_label_values(&[service, "max"])
        .set(pool.options().get_max_connections() as i64);
}
