//! Command handlers. Each returns the text printed on stdout.

use std::sync::Arc;

use anyhow::{Result, bail};
use repocache_core::config::BackendKind;
use repocache_core::{AppConfig, CacheBackend, CacheDb, KeyRegistry};
use repocache_repository::{InvalidationHandler, InvalidationOutcome, RepositoryAction};

use crate::Command;

pub async fn run(command: &Command, config: &AppConfig) -> Result<String> {
    match command {
        Command::Keys { repository } => {
            let keys = registry(config).await?.get_keys(repository).await?;
            Ok(keys.join("\n"))
        }
        Command::Groups => Ok(registry(config).await?.groups().await?.join("\n")),
        Command::Forget { repository } => forget(config, repository).await,
        Command::PurgeExpired => {
            if config.cache.backend != BackendKind::Sqlite {
                bail!("purge-expired needs the sqlite cache backend");
            }
            let purged = CacheDb::open(&config.cache.db_path).await?.purge_expired().await?;
            tracing::info!(purged, "purged expired cache entries");
            Ok(format!("purged {purged} expired entries"))
        }
        Command::Config => Ok(serde_json::to_string_pretty(config)?),
    }
}

async fn registry(config: &AppConfig) -> Result<KeyRegistry> {
    Ok(KeyRegistry::open(config).await?)
}

async fn forget(config: &AppConfig, repository: &str) -> Result<String> {
    // a memory cache lives only inside the process that filled it
    if config.cache.backend != BackendKind::Sqlite {
        bail!("forget needs the sqlite cache backend");
    }
    let cache: Arc<dyn CacheBackend> = Arc::new(CacheDb::open(&config.cache.db_path).await?);
    let handler = InvalidationHandler::new(cache, Arc::new(registry(config).await?), config.cache.clean.clone());

    match handler.sweep(repository, RepositoryAction::Deleted).await {
        InvalidationOutcome::Swept { keys, evicted, failed } if failed == 0 => {
            Ok(format!("evicted {evicted} of {keys} registered keys"))
        }
        InvalidationOutcome::Swept { keys, evicted, failed } => {
            bail!("evicted {evicted} of {keys} registered keys, {failed} failed")
        }
        InvalidationOutcome::RegistryUnavailable => bail!("cannot read key registry {}", config.registry.path().display()),
        outcome => Ok(format!("{outcome:?}")),
    }
}
