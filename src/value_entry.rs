use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone)]
pub struct ValueEntry {
    pub value: String,
    expires_at: Option<SystemTime>,
}

impl ValueEntry {
    /// Entry expiring `ttl_ms` milliseconds from now. `None` never expires.
    pub fn new_relative(value: String, ttl_ms: Option<u64>) -> ValueEntry {
        let expires_at = ttl_ms.map(|ms| SystemTime::now() + Duration::from_millis(ms));
        ValueEntry { value, expires_at }
    }

    /// Entry with an absolute unix-epoch-milliseconds deadline, as read from
    /// an RDB snapshot. Deadlines at or before the epoch are already expired.
    pub fn new_absolute(value: String, epoch_ms: Option<i64>) -> ValueEntry {
        let expires_at = epoch_ms.map(|ms| {
            if ms <= 0 {
                UNIX_EPOCH
            } else {
                UNIX_EPOCH + Duration::from_millis(ms as u64)
            }
        });
        ValueEntry { value, expires_at }
    }

    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(at) => at <= SystemTime::now(),
            None => false,
        }
    }
}
