use std::env;
use std::str::FromStr;
use std::time::Duration;

use percent_encoding::percent_decode_str;
use url::Url;

/// Default port of the TSV-RPC server.
pub const DEFAULT_PORT: u16 = 1978;

/// Pool sizing and eviction policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    /// Placeholder slots seeded into the idle queue.
    pub min: usize,
    /// Maximum number of idle connections retained; 0 means unbounded.
    /// In-use connections are never limited.
    pub max: usize,
    /// How long `acquire` waits for an idle connection before opening a new one.
    pub acquire_timeout: Duration,
    /// Idle connections unused for longer than this are closed on acquire.
    pub idle_timeout: Duration,
    /// Connections older than this are closed on acquire.
    pub max_lifetime: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min: 1,
            max: 0,
            acquire_timeout: Duration::from_millis(100),
            idle_timeout: Duration::from_secs(60),
            max_lifetime: Duration::from_secs(30 * 60),
        }
    }
}

impl PoolConfig {
    /// Bound of the idle queue.
    #[inline]
    pub fn capacity(&self) -> usize {
        if self.max == 0 {
            usize::MAX
        } else {
            self.max
        }
    }
}

/// Configuration of a [`Client`](crate::Client) and its pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Database selector sent as `DB` with every call.
    pub db: Option<String>,
    pub connect_timeout: Option<Duration>,
    /// Timeout of one request/response exchange.
    pub request_timeout: Option<Duration>,
    pub pool: PoolConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            db: None,
            connect_timeout: Some(Duration::from_secs(1)),
            request_timeout: Some(Duration::from_secs(1)),
            pool: PoolConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Creates a configuration for `host:port` with defaults elsewhere.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Parses `http://host:port/db` or `kt://host:port/db`.
    ///
    /// A missing `kt` port defaults to 1978; the first path segment, if any,
    /// selects the database.
    pub fn from_url(value: &str) -> Result<Self, String> {
        let url = Url::parse(value).map_err(|e| format!("Invalid URL '{}': {}", value, e))?;
        let port = match url.scheme() {
            "http" => url.port_or_known_default(),
            "kt" => Some(url.port().unwrap_or(DEFAULT_PORT)),
            scheme => return Err(format!("Unsupported URL scheme '{}'", scheme)),
        }
        .ok_or_else(|| format!("URL '{}' has no port", value))?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| format!("URL '{}' has no host", value))?
            .to_string();
        let db = url
            .path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|segment| !segment.is_empty())
            .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned());

        Ok(Self {
            host,
            port,
            db,
            ..Default::default()
        })
    }

    /// Builds a configuration from `TYCOON_*` environment variables.
    pub fn from_env() -> Result<Self, String> {
        let mut config = match env::var("TYCOON_URL") {
            Ok(url) => Self::from_url(&url)?,
            Err(_) => {
                let port = match env::var("TYCOON_PORT") {
                    Ok(port) => port
                        .trim()
                        .parse()
                        .map_err(|_| format!("Invalid TYCOON_PORT '{}'", port))?,
                    Err(_) => DEFAULT_PORT,
                };
                Self {
                    host: env::var("TYCOON_HOST").unwrap_or_else(|_| "localhost".to_string()),
                    port,
                    db: env::var("TYCOON_DB").ok().filter(|db| !db.is_empty()),
                    ..Default::default()
                }
            }
        };

        if let Some(ms) = parse_env::<u64>("TYCOON_TIMEOUT_MS") {
            config.request_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(ms) = parse_env::<u64>("TYCOON_CONNECT_TIMEOUT_MS") {
            config.connect_timeout = Some(Duration::from_millis(ms));
        }

        let pool = &mut config.pool;
        if let Some(min) = parse_env("TYCOON_POOL_MIN") {
            pool.min = min;
        }
        if let Some(max) = parse_env("TYCOON_POOL_MAX") {
            pool.max = max;
        }
        if let Some(ms) = parse_env("TYCOON_ACQUIRE_TIMEOUT_MS") {
            pool.acquire_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = parse_env("TYCOON_IDLE_TIMEOUT_SECS") {
            pool.idle_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env("TYCOON_MAX_LIFETIME_SECS") {
            pool.max_lifetime = Duration::from_secs(secs);
        }

        Ok(config)
    }
}

/// Reads a numeric variable; unset or unparsable values yield `None`.
fn parse_env<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
