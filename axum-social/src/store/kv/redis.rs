use std::time::Duration;

use redis::{AsyncCommands, Client, RedisError, aio::ConnectionManager};

use crate::store::KeyValue;

const DEFAULT_PREFIX: &str = "oauth2:session:";

/// Redis backed key-value store. Expiry is delegated to redis key TTLs.
#[derive(Clone)]
pub struct RedisKv {
    conn: ConnectionManager,
    prefix: String,
    ttl: Option<Duration>,
}

impl RedisKv {
    pub async fn open(url: &str) -> Result<Self, RedisError> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }

    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            prefix: DEFAULT_PREFIX.to_owned(),
            ttl: None,
        }
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Expire keys this long after their last write.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

impl KeyValue for RedisKv {
    type Error = RedisError;

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), Self::Error> {
        let mut conn = self.conn.clone();
        let key = self.key(key);

        match self.ttl {
            Some(ttl) => {
                conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
                    .await
            }
            None => conn.set::<_, _, ()>(key, value).await,
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Self::Error> {
        let mut conn = self.conn.clone();
        conn.get(self.key(key)).await
    }

    async fn delete(&self, key: &str) -> Result<(), Self::Error> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(self.key(key)).await
    }
}
