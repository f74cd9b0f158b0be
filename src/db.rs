use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use crate::config::DbConfig;

fn connect_options(config: &DbConfig) -> PgConnectOptions {
    let mut options = PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user);

    if !config.database.is_empty() {
        options = options.database(&config.database);
    }
    if !config.password.is_empty() {
        options = options.password(&config.password);
    }
    options
}

/// Open a pool and establish the first connection immediately, so an
/// unreachable database fails here rather than at first use.
pub async fn connect(config: &DbConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(connect_options(config))
        .await
}

/// Open a pool without connecting. Nothing touches the network until the
/// first query runs.
pub fn connect_lazy(config: &DbConfig) -> PgPool {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect_lazy_with(connect_options(config))
}

/// Double-quote a SQL identifier, escaping embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
