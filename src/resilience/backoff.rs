//! Exponential backoff with jitter.

use std::time::Duration;

use rand::Rng;

use crate::config::RunnerConfig;

/// Exponential backoff delay with up to 10% jitter.
///
/// Attempt 0 waits nothing; attempt `n` waits `base * 2^(n-1)`, capped at `max`.
pub fn calculate_backoff(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }

    let exponential_base = 2u64.saturating_pow(attempt - 1);
    let capped_delay = base_ms.saturating_mul(exponential_base).min(max_ms);

    let jitter_range = capped_delay / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };

    Duration::from_millis(capped_delay + jitter)
}

/// Delay before retrying after `consecutive_errors` failed iterations.
pub fn backoff_delay(consecutive_errors: u32, config: &RunnerConfig) -> Duration {
    calculate_backoff(consecutive_errors, config.io_backoff_base_ms, config.io_backoff_max_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_until_capped() {
        assert_eq!(calculate_backoff(0, 100, 2000), Duration::ZERO);

        let b1 = calculate_backoff(1, 100, 2000);
        assert!(b1 >= Duration::from_millis(100) && b1 < Duration::from_millis(110));

        let b2 = calculate_backoff(2, 100, 2000);
        assert!(b2 >= Duration::from_millis(200) && b2 < Duration::from_millis(220));

        let max = calculate_backoff(40, 100, 1000);
        assert!(max >= Duration::from_millis(1000) && max < Duration::from_millis(1100));
    }

    #[test]
    fn uses_runner_settings() {
        let config = RunnerConfig {
            io_backoff_base_ms: 10,
            io_backoff_max_ms: 15,
            ..RunnerConfig::default()
        };
        assert_eq!(backoff_delay(1, &config), Duration::from_millis(10));
        assert!(backoff_delay(3, &config) >= Duration::from_millis(15));
    }
}
