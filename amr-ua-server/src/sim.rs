//! Simulated robot-side client pushing telemetry through `UpdateData`.

use std::f64::consts::PI;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use amr_ua::dispatch::Dispatcher;
use amr_ua::telemetry::{TelemetryUpdate, UPDATE_DATA};
use tracing::{debug, warn};

const SCAN_POINTS: usize = 360;

pub struct Simulator {
    stop_tx: Option<flume::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Simulator {
    pub fn spawn(dispatcher: Dispatcher, period: Duration) -> std::io::Result<Self> {
        let (stop_tx, stop_rx) = flume::bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("amr-ua-sim".into())
            .spawn(move || {
                let mut seq = 0u64;
                while let Err(flume::RecvTimeoutError::Timeout) = stop_rx.recv_timeout(period) {
                    let inputs = sample(seq).to_inputs();
                    match dispatcher.invoke(UPDATE_DATA, &inputs) {
                        Ok(outputs) => debug!("[SIM] UpdateData #{} -> {:?}", seq, outputs),
                        Err(failure) => warn!("[SIM] UpdateData #{} failed: {}", seq, failure),
                    }
                    seq += 1;
                }
            })?;
        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }
}

impl Drop for Simulator {
    fn drop(&mut self) {
        self.stop_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Robot driving a slow circle with a draining battery.
fn sample(seq: u64) -> TelemetryUpdate {
    let t = seq as f64 * 0.1;
    let soc = (1.0 - (seq % 1000) as f64 / 1000.0).max(0.05);

    let laser_scan = (0..SCAN_POINTS)
        .map(|i| {
            let angle = i as f64 * 2.0 * PI / SCAN_POINTS as f64;
            3.0 + 2.0 * angle.cos() + 0.1 * (t + i as f64 * 0.05).sin()
        })
        .collect();
    let current_path = (0..5)
        .flat_map(|i| {
            let a = t + i as f64 * 0.2;
            [2.0 * a.cos(), 2.0 * a.sin()]
        })
        .collect();

    TelemetryUpdate {
        x: 2.0 * t.cos(),
        y: 2.0 * t.sin(),
        yaw: (t + PI / 2.0).rem_euclid(2.0 * PI) - PI,
        slam_state: "Localizing".into(),
        slam_state_detail: format!("Tracking, update #{seq}"),
        current_active_map: "simulated".into(),
        localization_quality: 0.9 + 0.05 * t.sin(),
        laser_scan,
        battery_state: if soc > 0.2 { 1.0 } else { 2.0 },
        battery_soc: soc,
        battery_cycles: 42.0,
        battery_voltage: 22.0 + 4.0 * soc,
        battery_current: -1.5 - 0.2 * t.sin(),
        linear_velocity: 0.2,
        angular_velocity: 0.1,
        current_path,
    }
}
