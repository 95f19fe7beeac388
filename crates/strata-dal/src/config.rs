//! Unified adapter configuration.
//!
//! A tagged enum over the per-adapter configurations, so a single config
//! file entry can select and build any enabled backend.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_core::Result;

use crate::adapter;
use crate::contract::Storage;

/// Configuration for any enabled adapter, tagged by `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[non_exhaustive]
pub enum AdapterConfig {
    /// In-memory storage.
    Memory,
    /// Local filesystem storage.
    Fs(adapter::FsConfig),
    #[cfg(feature = "elasticsearch")]
    /// Elasticsearch storage.
    Elasticsearch(adapter::ElasticsearchConfig),
    #[cfg(feature = "mongodb")]
    /// MongoDB storage.
    Mongodb(adapter::MongodbConfig),
    #[cfg(feature = "mysql")]
    /// MySQL storage.
    Mysql(adapter::MysqlConfig),
    #[cfg(feature = "postgres")]
    /// PostgreSQL storage.
    Postgres(adapter::PostgresConfig),
    #[cfg(feature = "redis")]
    /// Redis storage.
    Redis(adapter::RedisConfig),
    #[cfg(feature = "s3")]
    /// S3 storage.
    S3(adapter::S3Config),
    #[cfg(feature = "sftp")]
    /// SFTP storage.
    Sftp(adapter::SftpConfig),
}

impl AdapterConfig {
    /// Returns the storage name this configuration builds.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Memory => adapter::memory::NAME,
            Self::Fs(_) => adapter::fs::NAME,
            #[cfg(feature = "elasticsearch")]
            Self::Elasticsearch(_) => adapter::elasticsearch::NAME,
            #[cfg(feature = "mongodb")]
            Self::Mongodb(_) => adapter::mongodb::NAME,
            #[cfg(feature = "mysql")]
            Self::Mysql(_) => adapter::mysql::NAME,
            #[cfg(feature = "postgres")]
            Self::Postgres(_) => adapter::postgres::NAME,
            #[cfg(feature = "redis")]
            Self::Redis(_) => adapter::redis::NAME,
            #[cfg(feature = "s3")]
            Self::S3(_) => adapter::s3::NAME,
            #[cfg(feature = "sftp")]
            Self::Sftp(_) => adapter::sftp::NAME,
        }
    }

    /// Builds the configured adapter, running its construction-time
    /// validation and connectivity probe.
    pub async fn build(self) -> Result<Arc<dyn Storage>> {
        match self {
            Self::Memory => Ok(adapter::Memory::new()?),
            Self::Fs(config) => Ok(adapter::Fs::new(config)?),
            #[cfg(feature = "elasticsearch")]
            Self::Elasticsearch(config) => Ok(adapter::Elasticsearch::new(config).await?),
            #[cfg(feature = "mongodb")]
            Self::Mongodb(config) => Ok(adapter::Mongodb::new(config).await?),
            #[cfg(feature = "mysql")]
            Self::Mysql(config) => Ok(adapter::Mysql::new(config).await?),
            #[cfg(feature = "postgres")]
            Self::Postgres(config) => Ok(adapter::Postgres::new(config).await?),
            #[cfg(feature = "redis")]
            Self::Redis(config) => Ok(adapter::Redis::new(config).await?),
            #[cfg(feature = "s3")]
            Self::S3(config) => Ok(adapter::S3::new(config).await?),
            #[cfg(feature = "sftp")]
            Self::Sftp(config) => Ok(adapter::Sftp::new(config).await?),
        }
    }
}
