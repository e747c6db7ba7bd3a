//! # Store Redis
//! src/store/redis.rs
//!
//! `KeyValueStore` sobre Redis (o un servidor compatible) usando un pool
//! r2d2 de conexiones síncronas. Los workers son threads del sistema, así
//! que no hace falta un runtime async.
//!
//! | Operación          | Comando                                  |
//! |--------------------|------------------------------------------|
//! | `set_if_absent`    | `SET key value NX PX ttl`                |
//! | `set`              | `SET key value PX ttl`                   |
//! | `get`              | `GET key`                                |
//! | `delete_if_equals` | script Lua compare-and-delete            |
//! | `remaining_ttl`    | `PTTL key`                               |

use super::KeyValueStore;
use crate::error::StoreError;
use std::time::Duration;
use tracing::{debug, error};

const COMPARE_AND_DELETE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

type RedisPool = r2d2::Pool<redis::Client>;

pub struct RedisStore {
    pool: RedisPool,
    compare_and_delete: redis::Script,
}

impl RedisStore {
    /// Conecta al servidor y verifica con `PING`
    ///
    /// # Errors
    /// Falla si la URL es inválida o el servidor no responde.
    pub fn connect(url: &str, pool_size: u32, timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            StoreError::from(e)
        })?;

        let pool = r2d2::Pool::builder()
            .max_size(pool_size)
            .connection_timeout(timeout)
            .build(client)?;

        let store = Self {
            pool,
            compare_and_delete: redis::Script::new(COMPARE_AND_DELETE),
        };

        let mut conn = store.pool.get()?;
        redis::cmd("PING").query::<String>(&mut *conn)?;
        debug!("Connected to Redis at {}", url);

        Ok(store)
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<redis::Client>, StoreError> {
        Ok(self.pool.get()?)
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    // PX no acepta 0
    (ttl.as_millis() as u64).max(1)
}

impl KeyValueStore for RedisStore {
    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query(&mut *conn)?;
        Ok(reply.is_some())
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query::<()>(&mut *conn)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn()?;
        Ok(redis::cmd("GET").arg(key).query(&mut *conn)?)
    }

    fn delete_if_equals(&self, key: &str, expected: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn()?;
        let deleted: i64 = self
            .compare_and_delete
            .key(key)
            .arg(expected)
            .invoke(&mut *conn)?;
        Ok(deleted > 0)
    }

    fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let mut conn = self.conn()?;
        let millis: i64 = redis::cmd("PTTL").arg(key).query(&mut *conn)?;
        // -2: no existe, -1: sin expiración
        if millis < 0 {
            Ok(None)
        } else {
            Ok(Some(Duration::from_millis(millis as u64)))
        }
    }
}
