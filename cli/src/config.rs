use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::PathBuf;
use std::time::Duration;

use fittrack_core::cache::{DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL, MemoryCache, RedisCache};
use fittrack_core::service::SharedCache;

const DEFAULT_REDIS_TIMEOUT_SECS: u64 = 5;

pub struct Config {
    pub db_path: PathBuf,
    pub data_dir: PathBuf,
    pub cache: CacheConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Unset means the in-process LRU cache.
    pub redis_url: Option<String>,
    pub ttl: Duration,
    pub capacity: usize,
    pub redis_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            ttl: DEFAULT_CACHE_TTL,
            capacity: DEFAULT_CACHE_CAPACITY,
            redis_timeout: Duration::from_secs(DEFAULT_REDIS_TIMEOUT_SECS),
        }
    }
}

fn parse_var_or<T, F>(lookup: &F, var: &str, default: T) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        Some(val) => match val.trim().parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        None => default,
    }
}

impl CacheConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Self {
        let defaults = Self::default();
        let ttl_secs = parse_var_or(&lookup, "FITTRACK_CACHE_TTL", defaults.ttl.as_secs());
        let capacity = parse_var_or(&lookup, "FITTRACK_CACHE_CAPACITY", defaults.capacity);
        let timeout_secs = parse_var_or(
            &lookup,
            "FITTRACK_REDIS_TIMEOUT_SECS",
            DEFAULT_REDIS_TIMEOUT_SECS,
        );
        Self {
            redis_url: lookup("FITTRACK_REDIS_URL").filter(|url| !url.trim().is_empty()),
            ttl: Duration::from_secs(ttl_secs),
            capacity: if capacity == 0 {
                defaults.capacity
            } else {
                capacity
            },
            redis_timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    /// Connect the configured backend, falling back to memory when Redis is unreachable.
    pub fn build_cache(&self) -> SharedCache {
        if let Some(ref url) = self.redis_url {
            match RedisCache::connect(url, self.redis_timeout) {
                Ok(cache) => return Box::new(cache),
                Err(e) => {
                    tracing::warn!("Redis unavailable ({e:#}), using in-memory report cache");
                }
            }
        }
        Box::new(MemoryCache::new(self.capacity))
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "fittrack").context("Could not determine home directory")?;

        let data_dir = proj_dirs.data_dir().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let db_path = std::env::var_os("FITTRACK_DB_PATH")
            .map_or_else(|| data_dir.join("fittrack.db"), PathBuf::from);

        Ok(Config {
            db_path,
            data_dir,
            cache: CacheConfig::from_env(),
        })
    }

    /// Load the API key from disk, or generate a new one.
    pub fn load_or_create_api_key(&self) -> Result<String> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok(key);
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        eprintln!("Generated new API key: {key}");
        eprintln!("Include in requests: Authorization: Bearer {key}");
        Ok(key)
    }
}
