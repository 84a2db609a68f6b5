/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development; override via
/// environment variables in production.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// SQLite database URL (default: `sqlite://parrot.db`).
    pub database_url: String,
    /// Root directory of the filesystem blob store (default: `./data`).
    pub data_dir: String,
    /// Base URL of the GPU processing service.
    pub engine_url: String,
    /// Executor worker tasks (default: `2`).
    pub workers: usize,
    /// Concurrent GPU-bound stages (default: `1`).
    pub gpu_permits: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `HOST`                 | `0.0.0.0`                  |
    /// | `PORT`                 | `3000`                     |
    /// | `CORS_ORIGINS`         | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS` | `30`                       |
    /// | `DATABASE_URL`         | `sqlite://parrot.db`       |
    /// | `DATA_DIR`             | `./data`                   |
    /// | `ENGINE_URL`           | `http://localhost:8500`    |
    /// | `WORKERS`              | `2`                        |
    /// | `GPU_PERMITS`          | `1`                        |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://parrot.db".into());

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".into());

        let engine_url =
            std::env::var("ENGINE_URL").unwrap_or_else(|_| "http://localhost:8500".into());

        let workers: usize = std::env::var("WORKERS")
            .unwrap_or_else(|_| "2".into())
            .parse()
            .expect("WORKERS must be a valid usize");

        let gpu_permits: usize = std::env::var("GPU_PERMITS")
            .unwrap_or_else(|_| "1".into())
            .parse()
            .expect("GPU_PERMITS must be a valid usize");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            database_url,
            data_dir,
            engine_url,
            workers,
            gpu_permits,
        }
    }
}
