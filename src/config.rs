use anyhow::{Context, Result, bail};
use clap::Parser;
use std::{env, path::PathBuf, str::FromStr};

pub const DEFAULT_MAX_FILE_SIZE: u64 = 5 * 1024 * 1024 * 1024;
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Settings consumed by the storage core.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory holding one subdirectory per bucket.
    pub storage_dir: PathBuf,
    /// Largest object accepted by a put, in bytes.
    pub max_file_size: u64,
    /// Read/write chunk size for streaming and hashing, in bytes.
    pub chunk_size: usize,
    /// Canonicalize resolved paths and require them to stay under their parent.
    pub path_traversal_protection: bool,
}

impl StorageConfig {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            path_traversal_protection: true,
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub storage_backend: String,
    pub allowed_origins: Vec<String>,
    pub storage: StorageConfig,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Filesystem-backed object storage API")]
pub struct Args {
    /// Host to bind to (overrides OBJECT_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides OBJECT_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where buckets are stored (overrides OBJECT_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<PathBuf>,

    /// Maximum object size in bytes (overrides OBJECT_STORE_MAX_FILE_SIZE)
    #[arg(long)]
    pub max_file_size: Option<u64>,

    /// Streaming chunk size in bytes (overrides OBJECT_STORE_CHUNK_SIZE)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Enforce path containment checks (overrides OBJECT_STORE_PATH_TRAVERSAL_PROTECTION)
    #[arg(long)]
    pub path_traversal_protection: Option<bool>,

    /// Storage backend (overrides OBJECT_STORE_STORAGE_BACKEND)
    #[arg(long)]
    pub storage_backend: Option<String>,

    /// Comma-separated CORS origins (overrides OBJECT_STORE_ALLOWED_ORIGINS)
    #[arg(long)]
    pub allowed_origins: Option<String>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::resolve(Args::parse(), |name| env::var(name))
    }

    /// Merge `args` over the variables returned by `lookup` over defaults.
    pub fn resolve<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let env_host = env_or(&lookup, "OBJECT_STORE_HOST", "0.0.0.0".to_string())?;
        let env_port = env_or(&lookup, "OBJECT_STORE_PORT", 8001u16)?;
        let env_storage = env_or(
            &lookup,
            "OBJECT_STORE_STORAGE_DIR",
            PathBuf::from("./data/objects"),
        )?;
        let env_max = env_or(&lookup, "OBJECT_STORE_MAX_FILE_SIZE", DEFAULT_MAX_FILE_SIZE)?;
        let env_chunk = env_or(&lookup, "OBJECT_STORE_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?;
        let env_protection = env_bool(&lookup, "OBJECT_STORE_PATH_TRAVERSAL_PROTECTION", true)?;
        let env_backend = env_or(&lookup, "OBJECT_STORE_STORAGE_BACKEND", "local".to_string())?;
        let env_origins = env_or(&lookup, "OBJECT_STORE_ALLOWED_ORIGINS", "*".to_string())?;

        // --- Merge ---
        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            storage_backend: args.storage_backend.unwrap_or(env_backend),
            allowed_origins: split_origins(&args.allowed_origins.unwrap_or(env_origins)),
            storage: StorageConfig {
                storage_dir: args.storage_dir.unwrap_or(env_storage),
                max_file_size: args.max_file_size.unwrap_or(env_max),
                chunk_size: args.chunk_size.unwrap_or(env_chunk),
                path_traversal_protection: args
                    .path_traversal_protection
                    .unwrap_or(env_protection),
            },
        };

        if cfg.storage.chunk_size == 0 {
            bail!("chunk size must be greater than zero");
        }
        if cfg.storage.max_file_size == 0 {
            bail!("maximum file size must be greater than zero");
        }

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_or<F, T>(lookup: &F, name: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Result<String, env::VarError>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Ok(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("parsing {} value `{}`", name, value)),
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn env_bool<F>(lookup: &F, name: &str, default: bool) -> Result<bool>
where
    F: Fn(&str) -> Result<String, env::VarError>,
{
    match lookup(name) {
        Ok(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => bail!("parsing {} value `{}`: expected a boolean", name, value),
        },
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("reading {}", name)),
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}
