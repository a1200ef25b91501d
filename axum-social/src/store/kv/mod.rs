mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::MemKv;
#[cfg(feature = "redis")]
pub use self::redis::RedisKv;

/// Backing storage for session set records.
///
/// Every call must be atomic per key. Keys are record ids and values the
/// encoded record, the store never writes partial records.
pub trait KeyValue: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Whether the store should sweep expired records in the background.
    fn spawn_maintenance_task(&self) -> bool {
        false
    }

    fn put(
        &self,
        key: &str,
        value: Vec<u8>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// `None` when the key doesn't exist.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>, Self::Error>> + Send;

    fn delete(&self, key: &str) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Drops every record written before `deadline` (unix seconds).
    fn remove_before(&self, deadline: u64) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let _ = deadline;
        async { Ok::<_, Self::Error>(()) }
    }
}
