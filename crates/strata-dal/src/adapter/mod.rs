//! Backend adapter families.
//!
//! The in-memory and filesystem adapters are always available; every
//! other family sits behind a feature flag carrying its driver.

pub mod fs;
pub mod memory;

#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;
#[cfg(feature = "mongodb")]
pub mod mongodb;
#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "redis")]
pub mod redis;
#[cfg(feature = "s3")]
pub mod s3;
#[cfg(feature = "sftp")]
pub mod sftp;

pub use fs::{Fs, FsConfig};
pub use memory::Memory;

#[cfg(feature = "elasticsearch")]
pub use elasticsearch::{Elasticsearch, ElasticsearchConfig};
#[cfg(feature = "mongodb")]
pub use mongodb::{Mongodb, MongodbConfig};
#[cfg(feature = "mysql")]
pub use mysql::{Mysql, MysqlConfig};
#[cfg(feature = "postgres")]
pub use postgres::{Postgres, PostgresConfig};
#[cfg(feature = "redis")]
pub use redis::{CountStrategy, Redis, RedisConfig};
#[cfg(feature = "s3")]
pub use s3::{S3Config, S3};
#[cfg(feature = "sftp")]
pub use sftp::{Sftp, SftpConfig};
