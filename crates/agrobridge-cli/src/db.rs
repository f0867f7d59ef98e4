//! `db` subcommand handlers.

use crate::DbCommands;

pub(crate) async fn run(command: DbCommands) -> anyhow::Result<()> {
    let config = agrobridge_core::load_app_config()?;
    crate::init_tracing(&config.log_level)?;
    let pool_config = agrobridge_db::PoolConfig::from_app_config(&config);
    let pool = agrobridge_db::connect_pool(&config.database_url, &pool_config).await?;

    match command {
        DbCommands::Ping => {
            agrobridge_db::ping(&pool).await?;
            println!("database reachable");
        }
        DbCommands::Migrate => {
            let applied = agrobridge_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
        DbCommands::Seed { catalog } => {
            let path = catalog.unwrap_or(config.catalog_path);
            let catalog = agrobridge_core::load_catalog(&path)?;
            agrobridge_db::run_migrations(&pool).await?;
            let seeded = agrobridge_db::seed_catalog(&pool, &catalog.listings).await?;
            tracing::info!(path = %path.display(), seeded, "catalog seeded");
            println!("seeded {seeded} listing(s) from {}", path.display());
        }
    }

    pool.close().await;
    Ok(())
}
