use sqlx::PgPool;

/// Runs read queries as `kanau` processors against the pool.
#[derive(Debug, Clone)]
pub struct DatabaseProcessor {
    pub pool: PgPool,
}
