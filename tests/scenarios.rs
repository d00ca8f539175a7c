use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use ec_kscan_matrix::{
    CadenceSettings, CalibrationEvent, CalibrationSeed, DeviceConfig, GeometryConfig, TimingConfig,
};
use ec_kscan_matrix::testing::SimulatedGateway;
use ec_kscan_matrix::EcMatrix;

type KeyLog = Arc<Mutex<Vec<(u8, u8, bool)>>>;

fn recording_key_sink() -> (KeyLog, impl FnMut(u8, u8, bool) + Send + 'static) {
    let log: KeyLog = Arc::new(Mutex::new(Vec::new()));
    let recorder = log.clone();
    (log, move |s, r, pressed| recorder.lock().unwrap().push((s, r, pressed)))
}

fn config(strobes: usize, inputs: usize, masks: Option<Vec<u64>>) -> DeviceConfig {
    DeviceConfig {
        geometry: GeometryConfig { strobes, inputs, strobe_input_masks: masks },
        timing: TimingConfig {
            matrix_relax_us: 0,
            adc_read_settle_us: 0,
            matrix_warm_up_us: 0,
            fake_open_drain: false,
        },
        cadence: CadenceSettings {
            active_polling_interval_ms: 1,
            idle_polling_interval_ms: 5,
            sleep_polling_interval_ms: 50,
            idle_after_secs: 5,
            sleep_after_secs: 300,
            dynamic_polling_interval: false,
        },
        calibration_seed: CalibrationSeed::default(),
        trigger_percentage: 50,
        adc_resolution_bits: 12,
    }
}

fn precalibrated(mut cfg: DeviceConfig, lows: Vec<u16>, highs: Vec<u16>) -> DeviceConfig {
    cfg.calibration_seed = CalibrationSeed {
        skip_startup_calibration: true,
        precalib_avg_lows: Some(lows),
        precalib_avg_highs: Some(highs),
    };
    cfg
}

/// Poll `log` until it holds at least `n` entries or `timeout` elapses.
fn wait_for_len(log: &KeyLog, n: usize, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if log.lock().unwrap().len() >= n {
            return;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn fresh_press_then_release_end_to_end() {
    let mut gateway = SimulatedGateway::new();
    // Two low reads, two settled high reads, then settle low forever: the
    // matrix must report a press once the high reading has been seen in two
    // consecutive sweeps, then a release once it drops back down.
    for v in [100u16, 100, 700, 700, 100] {
        gateway.push_reading(0, 0, v);
    }
    let cfg = precalibrated(config(1, 1, None), vec![100], vec![1000]);

    let matrix = EcMatrix::new(gateway, cfg).unwrap();
    let (log, sink) = recording_key_sink();
    matrix.configure(sink).unwrap();
    matrix.enable().unwrap();

    wait_for_len(&log, 2, Duration::from_secs(2));
    let events = log.lock().unwrap().clone();
    assert_eq!(events, vec![(0, 0, true), (0, 0, false)]);
}

#[test]
fn hysteresis_keeps_a_confirmed_press_held() {
    let mut gateway = SimulatedGateway::new();
    // avg_low=100, avg_high=1000, trigger 50% -> press_limit_raw=550,
    // release_limit_raw=438. A settled reading of 500 is below press_limit
    // but above release_limit: once pressed, it must stay pressed.
    for v in [600u16, 600, 500] {
        gateway.push_reading(0, 0, v);
    }
    let cfg = precalibrated(config(1, 1, None), vec![100], vec![1000]);

    let matrix = EcMatrix::new(gateway, cfg).unwrap();
    let (log, sink) = recording_key_sink();
    matrix.configure(sink).unwrap();
    matrix.enable().unwrap();

    wait_for_len(&log, 1, Duration::from_secs(2));
    std::thread::sleep(Duration::from_millis(100));

    let events = log.lock().unwrap().clone();
    assert_eq!(events, vec![(0, 0, true)]);
}

#[test]
fn masked_cell_is_silent_even_when_above_threshold() {
    let mut gateway = SimulatedGateway::new();
    gateway.push_reading(0, 3, 950);
    gateway.push_reading(0, 0, 950);
    // mask bit 3 on strobe 0; input 0 stays live as a control.
    let cfg = precalibrated(
        config(1, 4, Some(vec![0b1000])),
        vec![100, 100, 100, 100],
        vec![1000, 1000, 1000, 1000],
    );

    let matrix = EcMatrix::new(gateway, cfg).unwrap();
    let (log, sink) = recording_key_sink();
    matrix.configure(sink).unwrap();
    matrix.enable().unwrap();

    wait_for_len(&log, 1, Duration::from_secs(2));
    std::thread::sleep(Duration::from_millis(50));

    let events = log.lock().unwrap().clone();
    assert!(events.iter().all(|&(s, r, _)| (s, r) != (0, 3)));
    assert!(events.contains(&(0, 0, true)));
}

#[test]
fn configure_rejects_a_second_sink() {
    let gateway = SimulatedGateway::new();
    let cfg = precalibrated(config(1, 1, None), vec![100], vec![1000]);
    let matrix = EcMatrix::new(gateway, cfg).unwrap();

    matrix.configure(|_, _, _| {}).unwrap();
    let err = matrix.configure(|_, _, _| {}).unwrap_err();
    assert!(matches!(err, ec_kscan_matrix::KscanError::AlreadyConfigured));
}

#[test]
fn calibrate_runs_full_two_phase_sequence() {
    let mut gateway = SimulatedGateway::new();
    // Discard read at (0, 0), then low-phase samples low, then high-phase
    // probe/reprobe/settle/sample readings above the half-scale threshold.
    gateway.fill(1, 1, &[50]);
    for _ in 0..200 {
        gateway.push_reading(0, 0, 50);
    }
    for v in [3000u16, 3000, 3000] {
        gateway.push_reading(0, 0, v);
    }
    for _ in 0..20 {
        gateway.push_reading(0, 0, 3000);
    }

    let cfg = config(1, 1, None);
    let matrix = EcMatrix::new(gateway, cfg).unwrap();

    let events: Arc<Mutex<Vec<CalibrationEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let recorder = events.clone();
    matrix
        .calibrate(move |ev: CalibrationEvent| recorder.lock().unwrap().push(ev))
        .unwrap();
    matrix.enable().unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if events
            .lock()
            .unwrap()
            .iter()
            .any(|ev| matches!(ev, CalibrationEvent::Complete))
        {
            break;
        }
        assert!(Instant::now() < deadline, "calibration did not complete in time");
        std::thread::sleep(Duration::from_millis(10));
    }

    let recorded = events.lock().unwrap();
    assert!(recorded
        .iter()
        .any(|ev| matches!(ev, CalibrationEvent::PositionLowDetermined { .. })));
    assert!(recorded
        .iter()
        .any(|ev| matches!(ev, CalibrationEvent::PositionComplete { .. })));

    matrix
        .access_calibration(|entries| {
            assert!(entries[0].is_usable());
        })
        .unwrap();
}

#[test]
fn disable_stops_further_sweeps() {
    let mut gateway = SimulatedGateway::new();
    for v in [600u16, 600, 600] {
        gateway.push_reading(0, 0, v);
    }
    let cfg = precalibrated(config(1, 1, None), vec![100], vec![1000]);
    let matrix = EcMatrix::new(gateway, cfg).unwrap();

    let (log, sink) = recording_key_sink();
    matrix.configure(sink).unwrap();
    matrix.enable().unwrap();

    wait_for_len(&log, 1, Duration::from_secs(2));
    matrix.disable().unwrap();
    let count_at_disable = log.lock().unwrap().len();

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(log.lock().unwrap().len(), count_at_disable);
}
