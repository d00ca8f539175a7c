// Licensed under the Apache License, Version 2.0 or the MIT license, at your option.

//! Full-matrix sweep: per-cell read/normalise/decide, two-scan press
//! confirmation, and event emission (SPEC_FULL.md §4.5).

use crate::config::{DeviceConfig, Geometry};
use crate::device::Guarded;
use crate::gateway::{Delay, HardwareGateway};
use crate::normalize::{decide, normalize, Thresholds};

fn bit(word: u64, r: usize) -> bool {
    (word >> r) & 1 != 0
}

fn set_bit(word: &mut u64, r: usize, value: bool) {
    if value {
        *word |= 1 << r;
    } else {
        *word &= !(1u64 << r);
    }
}

/// Run one full sweep of the matrix, mutating `guard`'s state vectors and
/// cadence fields in place, and invoking the key-event sink for confirmed
/// changes.
pub(crate) fn run_sweep<G: HardwareGateway, DL: Delay>(
    guard: &mut Guarded<G, DL>,
    geometry: &Geometry,
    config: &DeviceConfig,
) {
    log::debug!("sweep start");
    let mut rows = vec![0u64; geometry.strobes];

    if guard.gateway.has_power() {
        guard.gateway.power_on();
        guard.gateway.warm_up(config.timing.matrix_warm_up_us);
    }

    // Outer over inputs (columns), inner over strobes (rows) — matches the
    // physical ordering where the column is selected by input configuration.
    for r in 0..geometry.inputs {
        for s in 0..geometry.strobes {
            if geometry.is_masked(s, r) {
                continue;
            }
            let entry = guard.calibration.entry(s, r);
            if !entry.is_usable() {
                continue;
            }

            let prev = bit(guard.matrix_state[s], r);
            let raw = guard.gateway.read_raw(s, r);
            let normalized = normalize(raw, entry.avg_low, entry.avg_high);
            let thresholds = Thresholds::compute(&entry, config.trigger_percentage);
            let new_bit = decide(prev, normalized, &thresholds);
            log::trace!("({s}, {r}) raw={raw} normalized={normalized} pressed={new_bit}");
            set_bit(&mut rows[s], r, new_bit);

            std::thread::yield_now();
        }
        std::thread::yield_now();
    }

    if guard.gateway.has_power() {
        guard.gateway.power_off();
    }

    let mut have_change = false;
    let mut have_keys = false;
    let mut diffs = vec![0u64; geometry.strobes];

    for s in 0..geometry.strobes {
        diffs[s] = rows[s] & guard.matrix_state[s];
        guard.matrix_state[s] = rows[s];
    }

    for s in 0..geometry.strobes {
        let diff = diffs[s];
        for r in 0..geometry.inputs {
            let diff_bit = bit(diff, r);
            let reported_bit = bit(guard.reported_matrix_state[s], r);
            if diff_bit != reported_bit {
                have_change = true;
                if let Some(sink) = guard.key_sink.as_mut() {
                    sink.on_key_event(s as u8, r as u8, diff_bit);
                }
            }
        }
        guard.reported_matrix_state[s] = diff;
        have_keys |= diff != 0;
    }

    if have_change {
        guard.last_release_ms = if have_keys { 0 } else { guard.now_ms() };
    }

    if config.cadence.dynamic_polling_interval {
        let now = guard.now_ms();
        let next = crate::cadence::next_interval(&config.cadence, guard.last_release_ms, now);
        if next != guard.poll_interval_ms {
            log::debug!("cadence transition: {} ms -> {} ms", guard.poll_interval_ms, next);
        }
        guard.poll_interval_ms = next;
    }
    log::debug!("sweep end, keys_held={have_keys}");
}
