use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use anyhow::Context;
use tracing::{info, warn};

use crate::pagination::PageSize;

/// Port selected RocksDB options for tuning underlying rocksdb instance of the record store.
/// see <https://github.com/facebook/rocksdb/blob/master/include/rocksdb/options.h>
/// for detailed explanations.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RocksdbConfig {
    /// The maximum number of files that can be open concurrently. Defaults to 5000
    pub max_open_files: i32,
    /// Once write-ahead logs exceed this size, RocksDB will start forcing the flush of column
    /// families whose memtables are backed by the oldest live WAL file. Defaults to 1GB
    pub max_total_wal_size: u64,
    /// The maximum number of background threads, including threads for flushing and compaction. Defaults to 16.
    pub max_background_jobs: i32,
}

impl Default for RocksdbConfig {
    fn default() -> Self {
        Self {
            // Allow db to close old sst files, saving memory.
            max_open_files: 5000,
            // For now we set the max total WAL size to be 1G. This config can be useful when column
            // families are updated at non-uniform frequencies.
            max_total_wal_size: 1u64 << 30,
            // This includes threads for flushing and compaction. Rocksdb will decide the # of
            // threads to use internally.
            max_background_jobs: 16,
        }
    }
}

/// Generate [`rocksdb::Options`] corresponding to the given [`RocksdbConfig`].
pub fn gen_rocksdb_options(config: &RocksdbConfig, readonly: bool) -> rocksdb::Options {
    let mut db_opts = rocksdb::Options::default();
    db_opts.set_max_open_files(config.max_open_files);
    db_opts.set_max_total_wal_size(config.max_total_wal_size);
    db_opts.set_max_background_jobs(config.max_background_jobs);
    if !readonly {
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        // Do not enable db_opts.set_atomic_flush(true). Writes always go through the WAL,
        // which already keeps column families consistent.
    }

    db_opts
}

/// Everything the server reads from its environment at startup.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// TCP port to listen on.
    pub port: u16,
    /// Directory holding the RocksDB files.
    pub database_path: PathBuf,
    /// RocksDB tuning.
    pub rocksdb: RocksdbConfig,
    /// Whether GET responses go through the response cache.
    pub cache_enabled: bool,
    /// How long a cached response stays valid.
    pub cache_ttl: Duration,
    /// Upper bound on the bytes held by the response cache.
    pub cache_capacity_bytes: u64,
    /// Prefix prepended to every cache key.
    pub cache_key_prefix: String,
    /// Page size of `GET /api/users`.
    pub users_page_size: PageSize,
    /// Page size of `GET /api/orders`.
    pub orders_page_size: PageSize,
    /// Users created at startup.
    pub seed_users: u64,
    /// Products created at startup.
    pub seed_products: u64,
    /// Orders created at startup.
    pub seed_orders: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            database_path: PathBuf::from("./data"),
            rocksdb: RocksdbConfig::default(),
            cache_enabled: true,
            cache_ttl: Duration::from_secs(60),
            cache_capacity_bytes: 16 << 20,
            cache_key_prefix: "__pagebound__".to_string(),
            users_page_size: PageSize::DEFAULT,
            orders_page_size: PageSize::DEFAULT,
            seed_users: 0,
            seed_products: 0,
            seed_orders: 0,
        }
    }
}

impl ServerConfig {
    /// Reads the configuration from environment variables, falling back to
    /// [`ServerConfig::default`] for every variable that is not set.
    pub fn load() -> anyhow::Result<Self> {
        let defaults = Self::default();
        let rocksdb = RocksdbConfig {
            max_open_files: try_load("ROCKSDB_MAX_OPEN_FILES", defaults.rocksdb.max_open_files)?,
            max_total_wal_size: try_load(
                "ROCKSDB_MAX_TOTAL_WAL_SIZE",
                defaults.rocksdb.max_total_wal_size,
            )?,
            max_background_jobs: try_load(
                "ROCKSDB_MAX_BACKGROUND_JOBS",
                defaults.rocksdb.max_background_jobs,
            )?,
        };

        Ok(Self {
            port: try_load("PORT", defaults.port)?,
            database_path: try_load::<String>(
                "DATABASE_PATH",
                defaults.database_path.display().to_string(),
            )?
            .into(),
            rocksdb,
            cache_enabled: try_load("CACHE_ENABLED", defaults.cache_enabled)?,
            cache_ttl: Duration::from_secs(try_load(
                "CACHE_TTL_SECS",
                defaults.cache_ttl.as_secs(),
            )?),
            cache_capacity_bytes: try_load("CACHE_CAPACITY_BYTES", defaults.cache_capacity_bytes)?,
            cache_key_prefix: try_load("CACHE_KEY_PREFIX", defaults.cache_key_prefix)?,
            users_page_size: try_load("USERS_PAGE_SIZE", defaults.users_page_size)?,
            orders_page_size: try_load("ORDERS_PAGE_SIZE", defaults.orders_page_size)?,
            seed_users: try_load("SEED_USERS", defaults.seed_users)?,
            seed_products: try_load("SEED_PRODUCTS", defaults.seed_products)?,
            seed_orders: try_load("SEED_ORDERS", defaults.seed_orders)?,
        })
    }
}

fn try_load<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    let Ok(raw) = env::var(key) else {
        info!("{key} not set, using default: {default}");
        return Ok(default);
    };

    raw.trim()
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
            anyhow::anyhow!("{e}")
        })
        .with_context(|| format!("Environment misconfigured: {key}={raw}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_variable_falls_back_to_default() {
        let port: u16 = try_load("PAGEBOUND_TEST_UNSET_PORT", 4242).unwrap();
        assert_eq!(4242, port);
    }

    #[test]
    fn invalid_variable_is_an_error() {
        env::set_var("PAGEBOUND_TEST_INVALID_PORT", "not-a-port");
        let err = try_load::<u16>("PAGEBOUND_TEST_INVALID_PORT", 1).unwrap_err();
        assert!(err.to_string().contains("PAGEBOUND_TEST_INVALID_PORT"));
    }

    #[test]
    fn page_size_is_parsed_from_the_environment() {
        env::set_var("PAGEBOUND_TEST_PAGE_SIZE", " 25 ");
        let size: PageSize = try_load("PAGEBOUND_TEST_PAGE_SIZE", PageSize::DEFAULT).unwrap();
        assert_eq!(25, size.get());

        env::set_var("PAGEBOUND_TEST_ZERO_PAGE_SIZE", "0");
        assert!(try_load::<PageSize>("PAGEBOUND_TEST_ZERO_PAGE_SIZE", PageSize::DEFAULT).is_err());
    }
}
