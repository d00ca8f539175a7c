// Licensed under the Apache License, Version 2.0 or the MIT license, at your option.

//! Active/idle/sleep poll-interval selection (SPEC_FULL.md §4.6).

use crate::config::CadenceSettings;

/// Select the next poll interval given time elapsed since the last release.
/// `last_release_ms == 0` means "a key is currently held" and always
/// selects the active interval.
pub fn next_interval(cfg: &CadenceSettings, last_release_ms: u64, now_ms: u64) -> u32 {
    if !cfg.dynamic_polling_interval || last_release_ms == 0 {
        return cfg.active_polling_interval_ms;
    }

    let since_ms = now_ms.saturating_sub(last_release_ms);
    if since_ms > cfg.sleep_after_secs as u64 * 1000 {
        cfg.sleep_polling_interval_ms
    } else if since_ms > cfg.idle_after_secs as u64 * 1000 {
        cfg.idle_polling_interval_ms
    } else {
        cfg.active_polling_interval_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> CadenceSettings {
        CadenceSettings {
            active_polling_interval_ms: 1,
            idle_polling_interval_ms: 5,
            sleep_polling_interval_ms: 50,
            idle_after_secs: 5,
            sleep_after_secs: 30,
            dynamic_polling_interval: true,
        }
    }

    #[test]
    fn held_key_stays_active() {
        assert_eq!(next_interval(&settings(), 0, 1_000_000), 1);
    }

    #[test]
    fn transitions_to_idle_then_sleep() {
        let cfg = settings();
        assert_eq!(next_interval(&cfg, 1_000, 1_000 + 1_000), 1);
        assert_eq!(next_interval(&cfg, 1_000, 1_000 + 6_000), 5);
        assert_eq!(next_interval(&cfg, 1_000, 1_000 + 31_000), 50);
    }

    #[test]
    fn static_cadence_ignores_elapsed_time() {
        let mut cfg = settings();
        cfg.dynamic_polling_interval = false;
        assert_eq!(next_interval(&cfg, 1_000, 1_000 + 999_000), 1);
    }
}
