//! `db` subcommands and the shared pool constructor.

use anyhow::Context;
use sqlx::PgPool;

use actsync_core::AppConfig;

pub(crate) async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    let pool_config = actsync_db::PoolConfig::from_app_config(config);
    actsync_db::connect_pool(&config.database_url, pool_config)
        .await
        .context("failed to connect to the database")
}

pub(crate) async fn ping(config: &AppConfig) -> anyhow::Result<()> {
    let pool = connect(config).await?;
    actsync_db::health_check(&pool).await?;
    println!("database ok");
    Ok(())
}

pub(crate) async fn migrate(config: &AppConfig) -> anyhow::Result<()> {
    let pool = connect(config).await?;
    let applied = actsync_db::run_migrations(&pool).await?;
    println!("applied {applied} migration(s)");
    Ok(())
}

pub(crate) async fn seed(config: &AppConfig) -> anyhow::Result<()> {
    let providers = actsync_core::load_providers(&config.providers_path)?;
    let pool = connect(config).await?;
    let count = actsync_db::seed_providers(&pool, &providers.providers).await?;
    println!(
        "seeded {count} provider(s) from {}",
        config.providers_path.display()
    );
    Ok(())
}
