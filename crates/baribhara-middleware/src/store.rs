//! Shared counter stores for rate limiting.
//!
//! [`CounterStore`] is the seam between the rate limiter and wherever its
//! counters live. [`RedisCounterStore`] shares counters between every
//! gateway instance; [`MemoryCounterStore`] keeps them in process.

use crate::middleware::BoxFuture;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use std::future::Future;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::OnceCell;

/// A counter store operation failed.
///
/// The rate limiter treats every variant the same way: it lets the request
/// through.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached in time.
    #[error("counter store connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The store accepted a command but did not answer in time.
    #[error("counter store command timed out after {0:?}")]
    CommandTimeout(Duration),

    /// A Redis command or connection failed.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Async access to fixed-window counters.
pub trait CounterStore: Send + Sync + 'static {
    /// Returns a short label for logs.
    fn name(&self) -> &'static str;

    /// Reads a counter. An absent key is `Ok(None)`.
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<u64>, StoreError>>;

    /// Increments a counter and refreshes its time to live, returning the
    /// new value.
    fn increment<'a>(
        &'a self,
        key: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<u64, StoreError>>;
}

/// Connection settings for [`RedisCounterStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisSettings {
    /// Server host.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Password; empty for none.
    pub password: String,
    /// Database index.
    pub db: i64,
    /// Upper bound on establishing the connection.
    pub connect_timeout: Duration,
    /// Upper bound on a single command round trip.
    pub command_timeout: Duration,
}

impl RedisSettings {
    /// Returns the connection info for these settings.
    ///
    /// Built field by field so the password needs no URL escaping.
    #[must_use]
    pub fn connection_info(&self) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.host.clone(), self.port),
            redis: RedisConnectionInfo {
                db: self.db,
                password: (!self.password.is_empty()).then(|| self.password.clone()),
                ..RedisConnectionInfo::default()
            },
        }
    }
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: String::new(),
            db: 0,
            connect_timeout: Duration::from_secs(2),
            command_timeout: Duration::from_secs(2),
        }
    }
}

/// Counters stored in Redis.
///
/// The connection is established on first use, so the gateway starts even
/// when Redis is down; until it comes up every operation fails and the
/// limiter fails open. A failed connect is retried on the next request.
/// Once connected, the [`ConnectionManager`] reconnects on its own.
///
/// Every command is bounded by `command_timeout`, so a server that stops
/// answering fails the call instead of stalling the request.
pub struct RedisCounterStore {
    client: redis::Client,
    connect_timeout: Duration,
    command_timeout: Duration,
    connection: OnceCell<ConnectionManager>,
}

impl RedisCounterStore {
    /// Creates a store. Only the settings are checked here; no connection
    /// is made.
    pub fn new(settings: &RedisSettings) -> Result<Self, StoreError> {
        let client = redis::Client::open(settings.connection_info())?;
        Ok(Self {
            client,
            connect_timeout: settings.connect_timeout,
            command_timeout: settings.command_timeout,
            connection: OnceCell::new(),
        })
    }

    async fn bounded<T>(
        &self,
        command: impl Future<Output = redis::RedisResult<T>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.command_timeout, command)
            .await
            .map_err(|_| StoreError::CommandTimeout(self.command_timeout))?
            .map_err(StoreError::from)
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let manager = self
            .connection
            .get_or_try_init(|| async {
                let connect = ConnectionManager::new(self.client.clone());
                let manager = tokio::time::timeout(self.connect_timeout, connect)
                    .await
                    .map_err(|_| StoreError::ConnectTimeout(self.connect_timeout))??;
                tracing::info!("connected to redis counter store");
                Ok::<_, StoreError>(manager)
            })
            .await?;
        Ok(manager.clone())
    }
}

impl std::fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("connected", &self.connection.initialized())
            .field("connect_timeout", &self.connect_timeout)
            .field("command_timeout", &self.command_timeout)
            .finish_non_exhaustive()
    }
}

impl CounterStore for RedisCounterStore {
    fn name(&self) -> &'static str {
        "redis"
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<u64>, StoreError>> {
        Box::pin(async move {
            let mut conn = self.connection().await?;
            let count: Option<u64> = self.bounded(conn.get(key)).await?;
            Ok(count)
        })
    }

    fn increment<'a>(
        &'a self,
        key: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<u64, StoreError>> {
        Box::pin(async move {
            let mut conn = self.connection().await?;
            #[allow(clippy::cast_possible_wrap)]
            let ttl_secs = ttl.as_secs().max(1) as i64;
            // MULTI/EXEC so the counter never exists without an expiry.
            let mut pipe = redis::pipe();
            pipe.atomic().incr(key, 1).expire(key, ttl_secs).ignore();
            let (count,): (u64,) = self.bounded(pipe.query_async(&mut conn)).await?;
            Ok(count)
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    count: u64,
    expires_at: Instant,
}

/// Counters held in process memory.
///
/// Suitable for a single gateway instance and for tests. Window keys are
/// never touched again once their window passes, so expired entries are
/// swept on insert, at most once per [`SWEEP_INTERVAL`].
#[derive(Debug)]
pub struct MemoryCounterStore {
    entries: Mutex<Entries>,
}

/// Minimum time between sweeps of expired counters.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct Entries {
    map: HashMap<String, Entry>,
    next_sweep: Instant,
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                next_sweep: Instant::now(),
            }),
        }
    }
}

impl MemoryCounterStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live counters.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .map
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    /// Returns true if there are no live counters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of stored counters, expired ones included.
    #[must_use]
    pub fn stored(&self) -> usize {
        self.entries.lock().map.len()
    }
}

impl CounterStore for MemoryCounterStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<u64>, StoreError>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let count = entries
            .map
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.count);
        if count.is_none() {
            entries.map.remove(key);
        }
        drop(entries);
        Box::pin(async move { Ok(count) })
    }

    fn increment<'a>(
        &'a self,
        key: &'a str,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<u64, StoreError>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if now >= entries.next_sweep {
            entries.map.retain(|_, entry| entry.expires_at > now);
            entries.next_sweep = now + SWEEP_INTERVAL;
        }
        let entry = entries.map.entry(key.to_string()).or_insert(Entry {
            count: 0,
            expires_at: now + ttl,
        });
        if entry.expires_at <= now {
            entry.count = 0;
        }
        entry.count += 1;
        entry.expires_at = now + ttl;
        let count = entry.count;
        drop(entries);
        Box::pin(async move { Ok(count) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_counts() {
        let store = MemoryCounterStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        assert_eq!(store.increment("k", Duration::from_secs(60)).await.unwrap(), 1);
        assert_eq!(store.increment("k", Duration::from_secs(60)).await.unwrap(), 2);
        assert_eq!(store.get("k").await.unwrap(), Some(2));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_expires() {
        let store = MemoryCounterStore::new();
        store.increment("k", Duration::from_millis(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty());
        assert_eq!(store.increment("k", Duration::from_secs(60)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_sweeps_past_windows() {
        let store = MemoryCounterStore::new();
        for window in 0..1_000 {
            let key = format!("rate_limit:10.0.0.1:{window}");
            store.increment(&key, Duration::from_millis(1)).await.unwrap();
        }
        assert_eq!(store.stored(), 1_000);

        tokio::time::sleep(SWEEP_INTERVAL + Duration::from_millis(20)).await;
        store
            .increment("rate_limit:10.0.0.1:1000", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.stored(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_redis_connection_info() {
        let mut settings = RedisSettings::default();
        let info = settings.connection_info();
        assert_eq!(info.addr, ConnectionAddr::Tcp("localhost".to_string(), 6379));
        assert_eq!(info.redis.db, 0);
        assert_eq!(info.redis.password, None);

        settings.password = "p@ss:w/rd".to_string();
        settings.db = 2;
        let info = settings.connection_info();
        assert_eq!(info.redis.db, 2);
        assert_eq!(info.redis.password.as_deref(), Some("p@ss:w/rd"));
        assert!(RedisCounterStore::new(&settings).is_ok());
    }

    /// Answers the handshake with `+OK`, then goes silent once a `GET` or
    /// `MULTI` arrives.
    async fn stalling_redis() -> std::net::SocketAddr {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = vec![0_u8; 4096];
                    let mut stalled = false;
                    loop {
                        let n = match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => n,
                        };
                        let text = String::from_utf8_lossy(&buf[..n]).to_ascii_uppercase();
                        if text.contains("GET") || text.contains("MULTI") {
                            stalled = true;
                        }
                        if stalled {
                            continue;
                        }
                        // One reply per pipelined command.
                        let commands = text.matches("\r\n*").count()
                            + usize::from(text.starts_with('*'));
                        let replies = "+OK\r\n".repeat(commands.max(1));
                        if socket.write_all(replies.as_bytes()).await.is_err() {
                            return;
                        }
                    }
                });
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_stalled_redis_times_out() {
        let addr = stalling_redis().await;
        let settings = RedisSettings {
            host: addr.ip().to_string(),
            port: addr.port(),
            connect_timeout: Duration::from_millis(500),
            command_timeout: Duration::from_millis(200),
            ..RedisSettings::default()
        };
        let store = RedisCounterStore::new(&settings).unwrap();

        let get = tokio::time::timeout(Duration::from_secs(5), store.get("rate_limit:x:1"))
            .await
            .expect("get must not hang");
        assert!(matches!(
            get,
            Err(StoreError::CommandTimeout(_) | StoreError::ConnectTimeout(_))
        ));

        let incr = tokio::time::timeout(
            Duration::from_secs(5),
            store.increment("rate_limit:x:1", Duration::from_secs(60)),
        )
        .await
        .expect("increment must not hang");
        assert!(incr.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_redis_fails() {
        // Port 1 on loopback refuses connections.
        let settings = RedisSettings {
            host: "127.0.0.1".to_string(),
            port: 1,
            connect_timeout: Duration::from_millis(500),
            ..RedisSettings::default()
        };
        let store = RedisCounterStore::new(&settings).unwrap();
        assert!(store.get("rate_limit:test").await.is_err());
        assert!(store
            .increment("rate_limit:test", Duration::from_secs(60))
            .await
            .is_err());
    }
}
