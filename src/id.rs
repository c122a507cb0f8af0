//! Time and ID utilities for Cadence
//!
//! Dispatch timestamps are wall-clock seconds since the Unix epoch as `f64`,
//! which is what the aging formula consumes directly.

use rand::Rng;

/// Seconds since the Unix epoch.
pub type Timestamp = f64;

/// Get current timestamp in seconds since Unix epoch
pub fn now_secs() -> Timestamp {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Generate a unique task ID
///
/// Format: `task-{timestamp_ms}-{random_hex}`
/// Example: `task-1738300800123-a1b2`
pub fn generate_task_id() -> String {
    let random: u16 = rand::rng().random();
    format!("task-{}-{:04x}", now_ms(), random)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_secs_returns_reasonable_timestamp() {
        let ts = now_secs();
        // Should be after 2020-01-01 and before 2100-01-01
        assert!(ts > 1_577_836_800.0);
        assert!(ts < 4_102_444_800.0);
    }

    #[test]
    fn test_now_secs_and_ms_agree() {
        let secs = now_secs();
        let ms = now_ms() as f64 / 1000.0;
        assert!((ms - secs).abs() < 1.0);
    }

    #[test]
    fn test_generate_task_id_format() {
        let id = generate_task_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "task");
        assert!(parts[1].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_task_id_unique() {
        let ids: std::collections::HashSet<String> = (0..50).map(|_| generate_task_id()).collect();
        // Random suffix makes collisions within the same millisecond unlikely
        assert!(ids.len() > 40);
    }
}
