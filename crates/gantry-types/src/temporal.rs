use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the UNIX epoch.
///
/// Record timestamps (`created_at`, `updated_at`, `inserted_at`) are plain
/// epoch milliseconds; ordering across processes is only ever advisory, so
/// no logical clock is needed.
pub fn epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
