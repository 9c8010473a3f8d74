use std::sync::Arc;
use std::thread;

use amr_ua::Builder;
use amr_ua::catalog::NodeCatalog;
use amr_ua::error::Error;
use amr_ua::method::status_outputs;
use amr_ua::telemetry::{
    self, TELEMETRY_VARIABLES, TelemetryUpdate, UPDATE_DATA, UPDATE_OK_MESSAGE,
};
use amr_ua::value::{DataType, Variant};

fn catalog() -> NodeCatalog {
    NodeCatalog::builder()
        .build()
        .expect("Failed to build catalog")
}

fn scenario_inputs() -> Vec<Variant> {
    vec![
        Variant::Double(1.5),
        Variant::Double(2.5),
        Variant::Double(0.0),
        Variant::from("Mapping"),
        Variant::from(""),
        Variant::from("map1"),
        Variant::Double(0.9),
        Variant::Array(vec![]),
        Variant::Double(0.0),
        Variant::Double(0.8),
        Variant::Double(0.0),
        Variant::Double(12.0),
        Variant::Double(1.0),
        Variant::Double(0.1),
        Variant::Double(0.0),
        Variant::Array(vec![]),
    ]
}

#[test]
fn test_update_data_scenario() {
    let catalog = catalog();
    let vars = catalog.space().variables();
    let before = vars.read(telemetry::ROBOT_POSE_X).expect("Failed to read");
    assert_eq!(before.value, Variant::Double(0.0));

    let out = catalog
        .dispatcher()
        .invoke(UPDATE_DATA, &scenario_inputs())
        .expect("UpdateData failed");
    assert_eq!(out, status_outputs(0, UPDATE_OK_MESSAGE));

    let after = vars.read(telemetry::ROBOT_POSE_X).unwrap();
    assert_eq!(after.value, Variant::Double(1.5));
    assert!(after.timestamp > before.timestamp);
    assert_eq!(
        vars.read(telemetry::SLAM_STATE).unwrap().value,
        Variant::from("Mapping")
    );
    assert_eq!(
        vars.read(telemetry::BATTERY_VOLTAGE).unwrap().value,
        Variant::Double(12.0)
    );
}

#[test]
fn test_update_shares_one_timestamp() {
    let catalog = catalog();
    catalog
        .dispatcher()
        .invoke(UPDATE_DATA, &scenario_inputs())
        .unwrap();

    let snap = catalog
        .space()
        .variables()
        .snapshot(&TELEMETRY_VARIABLES)
        .unwrap();
    let first = &snap.fields()[0];
    for field in snap.fields() {
        assert_eq!(field.timestamp, first.timestamp, "{}", field.name);
        assert_eq!(field.version, first.version, "{}", field.name);
    }
}

#[test]
fn test_rejected_update_changes_nothing() {
    let catalog = catalog();
    let vars = catalog.space().variables();
    let before = vars.snapshot_all();

    let mut inputs = scenario_inputs();
    inputs[0] = Variant::from("abc");
    let failure = catalog
        .dispatcher()
        .invoke(UPDATE_DATA, &inputs)
        .unwrap_err();

    match &failure.error {
        Error::Conversion {
            index,
            expected_type,
            ..
        } => {
            assert_eq!(*index, 0);
            assert_eq!(*expected_type, DataType::Double);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(failure.outputs[0], Variant::Byte(1));
    let message = failure.outputs[1].as_str().unwrap();
    assert!(message.starts_with("Error updating data: "), "{message}");

    let after = vars.snapshot_all();
    assert_eq!(before.fields(), after.fields());
    assert_eq!(before.sequence(), after.sequence());
}

#[test]
fn test_rejection_on_last_field() {
    let catalog = catalog();
    let mut inputs = scenario_inputs();
    inputs[15] = Variant::Double(3.0);
    let failure = catalog
        .dispatcher()
        .invoke(UPDATE_DATA, &inputs)
        .unwrap_err();
    assert!(matches!(failure.error, Error::Conversion { index: 15, .. }));
    assert_eq!(
        catalog
            .space()
            .variables()
            .read(telemetry::ROBOT_POSE_X)
            .unwrap()
            .value,
        Variant::Double(0.0)
    );
}

#[test]
fn test_update_arity_enforced() {
    let catalog = catalog();
    let inputs = &scenario_inputs()[..15];
    let failure = catalog.dispatcher().invoke(UPDATE_DATA, inputs).unwrap_err();
    assert_eq!(
        failure.error,
        Error::ArityMismatch {
            method: UPDATE_DATA.into(),
            expected: 16,
            actual: 15
        }
    );
}

#[test]
fn test_lenient_numeric_inputs_accepted() {
    let catalog = catalog();
    let mut inputs = scenario_inputs();
    inputs[0] = Variant::Int32(4);
    inputs[6] = Variant::Float(0.5);
    inputs[7] = Variant::Array(vec![Variant::Int32(1), Variant::from("2.5")]);
    catalog.dispatcher().invoke(UPDATE_DATA, &inputs).unwrap();

    let vars = catalog.space().variables();
    assert_eq!(vars.read(telemetry::ROBOT_POSE_X).unwrap().value, Variant::Double(4.0));
    assert_eq!(
        vars.read(telemetry::LASER_SCAN).unwrap().value,
        Variant::from(vec![1.0, 2.5])
    );
}

#[test]
fn test_concurrent_updates_never_interleave() {
    let catalog = Arc::new(catalog());
    let payload = |i: u32| TelemetryUpdate {
        x: i as f64,
        y: i as f64,
        yaw: i as f64,
        slam_state: format!("state-{i}"),
        slam_state_detail: format!("detail-{i}"),
        current_active_map: format!("map-{i}"),
        localization_quality: i as f64,
        laser_scan: vec![i as f64; 8],
        battery_state: i as f64,
        battery_soc: i as f64,
        battery_cycles: i as f64,
        battery_voltage: i as f64,
        battery_current: i as f64,
        linear_velocity: i as f64,
        angular_velocity: i as f64,
        current_path: vec![i as f64; 4],
    };

    let writers: Vec<_> = (1..=8u32)
        .map(|w| {
            let catalog = catalog.clone();
            thread::spawn(move || {
                let dispatcher = catalog.dispatcher();
                for round in 0..50u32 {
                    let inputs = payload(w * 1000 + round).to_inputs();
                    dispatcher.invoke(UPDATE_DATA, &inputs).unwrap();
                }
            })
        })
        .collect();

    let reader = {
        let catalog = catalog.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                let snap = catalog
                    .space()
                    .variables()
                    .snapshot(&TELEMETRY_VARIABLES)
                    .unwrap();
                let x = snap.get(telemetry::ROBOT_POSE_X).unwrap().value.clone();
                for name in [telemetry::ROBOT_POSE_Y, telemetry::BATTERY_CURRENT] {
                    assert_eq!(snap.get(name).unwrap().value, x, "torn read on {name}");
                }
            }
        })
    };

    for w in writers {
        w.join().expect("writer panicked");
    }
    reader.join().expect("reader panicked");

    let vars = catalog.space().variables();
    let x = vars.read(telemetry::ROBOT_POSE_X).unwrap().value.as_f64().unwrap();
    let expected = payload(x as u32);
    let final_state = vars.snapshot(&TELEMETRY_VARIABLES).unwrap();
    let expected_values: Vec<Variant> = expected.to_inputs();
    let actual_values: Vec<Variant> = final_state.fields().iter().map(|f| f.value.clone()).collect();
    assert_eq!(actual_values, expected_values);
}
