//! The `UpdateData` bulk update.
//!
//! The robot-side client pushes a complete telemetry payload in one call.
//! Inputs are converted by the dispatcher before the handler runs, and the
//! sixteen variables are then written with a single
//! [`VariableStore::write_many`], so a payload is applied entirely or not at
//! all.

use crate::Builder;
use crate::error::Result;
use crate::method::{Argument, HandlerFault, Method, status_outputs};
use crate::value::{DataType, Timestamp, Variant};
use crate::variable::VariableStore;

pub const UPDATE_DATA: &str = "UpdateData";
pub const UPDATE_OK_MESSAGE: &str = "Data updated successfully";
pub const UPDATE_ERROR_PREFIX: &str = "Error updating data";

pub const ROBOT_POSE_X: &str = "RobotPoseX";
pub const ROBOT_POSE_Y: &str = "RobotPoseY";
pub const ROBOT_POSE_YAW: &str = "RobotPoseYaw";
pub const SLAM_STATE: &str = "SlamState";
pub const SLAM_STATE_DETAIL: &str = "SlamStateDetail";
pub const CURRENT_ACTIVE_MAP: &str = "CurrentActiveMap";
pub const LOCALIZATION_QUALITY: &str = "LocalizationQuality";
pub const LASER_SCAN: &str = "LaserScan";
pub const BATTERY_STATE: &str = "BatteryState";
pub const BATTERY_SOC: &str = "BatterySoC";
pub const BATTERY_CYCLES: &str = "BatteryCycles";
pub const BATTERY_VOLTAGE: &str = "BatteryVoltage";
pub const BATTERY_CURRENT: &str = "BatteryCurrent";
pub const LINEAR_VELOCITY: &str = "LinearVelocity";
pub const ANGULAR_VELOCITY: &str = "AngularVelocity";
pub const CURRENT_PATH: &str = "CurrentPath";

/// Variables replaced by `UpdateData`, in argument order.
pub const TELEMETRY_VARIABLES: [&str; 16] = [
    ROBOT_POSE_X,
    ROBOT_POSE_Y,
    ROBOT_POSE_YAW,
    SLAM_STATE,
    SLAM_STATE_DETAIL,
    CURRENT_ACTIVE_MAP,
    LOCALIZATION_QUALITY,
    LASER_SCAN,
    BATTERY_STATE,
    BATTERY_SOC,
    BATTERY_CYCLES,
    BATTERY_VOLTAGE,
    BATTERY_CURRENT,
    LINEAR_VELOCITY,
    ANGULAR_VELOCITY,
    CURRENT_PATH,
];

/// A complete telemetry payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryUpdate {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
    pub slam_state: String,
    pub slam_state_detail: String,
    pub current_active_map: String,
    pub localization_quality: f64,
    pub laser_scan: Vec<f64>,
    pub battery_state: f64,
    pub battery_soc: f64,
    pub battery_cycles: f64,
    pub battery_voltage: f64,
    pub battery_current: f64,
    pub linear_velocity: f64,
    pub angular_velocity: f64,
    pub current_path: Vec<f64>,
}

/// Sequential reader over converted handler inputs.
struct Inputs<'a> {
    values: &'a [Variant],
    pos: usize,
}

impl<'a> Inputs<'a> {
    fn next(&mut self) -> std::result::Result<&'a Variant, HandlerFault> {
        let v = self
            .values
            .get(self.pos)
            .ok_or_else(|| HandlerFault::new(format!("missing input {}", self.pos)))?;
        self.pos += 1;
        Ok(v)
    }

    fn f64(&mut self) -> std::result::Result<f64, HandlerFault> {
        let pos = self.pos;
        self.next()?
            .as_f64()
            .ok_or_else(|| HandlerFault::new(format!("input {pos} is not a Double")))
    }

    fn string(&mut self) -> std::result::Result<String, HandlerFault> {
        let pos = self.pos;
        self.next()?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| HandlerFault::new(format!("input {pos} is not a String")))
    }

    fn f64_vec(&mut self) -> std::result::Result<Vec<f64>, HandlerFault> {
        let pos = self.pos;
        self.next()?
            .to_f64_vec()
            .ok_or_else(|| HandlerFault::new(format!("input {pos} is not a Double array")))
    }
}

impl TelemetryUpdate {
    /// Input schema of `UpdateData`.
    pub fn arguments() -> Vec<Argument> {
        vec![
            Argument::scalar("newX", DataType::Double),
            Argument::scalar("newY", DataType::Double),
            Argument::scalar("newYaw", DataType::Double),
            Argument::scalar("newSlamState", DataType::String),
            Argument::scalar("newSlamStateDetail", DataType::String),
            Argument::scalar("newCurrentActiveMap", DataType::String),
            Argument::scalar("newLocalizationQuality", DataType::Double),
            Argument::array("newLaserScanData", DataType::Double),
            Argument::scalar("newBatteryState", DataType::Double),
            Argument::scalar("newBatterySoC", DataType::Double),
            Argument::scalar("newBatteryCycles", DataType::Double),
            Argument::scalar("newBatteryVoltage", DataType::Double),
            Argument::scalar("newBatteryCurrent", DataType::Double),
            Argument::scalar("newLinearVelocity", DataType::Double),
            Argument::scalar("newAngularVelocity", DataType::Double),
            Argument::array("newCurrentPath", DataType::Double),
        ]
    }

    /// Read a payload from inputs already converted to [`Self::arguments`].
    pub fn from_inputs(values: &[Variant]) -> std::result::Result<Self, HandlerFault> {
        if values.len() != TELEMETRY_VARIABLES.len() {
            return Err(HandlerFault::new(format!(
                "expected {} inputs, got {}",
                TELEMETRY_VARIABLES.len(),
                values.len()
            )));
        }
        let mut r = Inputs { values, pos: 0 };
        Ok(Self {
            x: r.f64()?,
            y: r.f64()?,
            yaw: r.f64()?,
            slam_state: r.string()?,
            slam_state_detail: r.string()?,
            current_active_map: r.string()?,
            localization_quality: r.f64()?,
            laser_scan: r.f64_vec()?,
            battery_state: r.f64()?,
            battery_soc: r.f64()?,
            battery_cycles: r.f64()?,
            battery_voltage: r.f64()?,
            battery_current: r.f64()?,
            linear_velocity: r.f64()?,
            angular_velocity: r.f64()?,
            current_path: r.f64_vec()?,
        })
    }

    /// Call inputs for this payload, in argument order.
    pub fn to_inputs(&self) -> Vec<Variant> {
        self.clone()
            .into_writes()
            .into_iter()
            .map(|(_, value)| value)
            .collect()
    }

    /// Variable writes for this payload, in argument order.
    pub fn into_writes(self) -> [(&'static str, Variant); 16] {
        [
            (ROBOT_POSE_X, Variant::Double(self.x)),
            (ROBOT_POSE_Y, Variant::Double(self.y)),
            (ROBOT_POSE_YAW, Variant::Double(self.yaw)),
            (SLAM_STATE, Variant::String(self.slam_state)),
            (SLAM_STATE_DETAIL, Variant::String(self.slam_state_detail)),
            (CURRENT_ACTIVE_MAP, Variant::String(self.current_active_map)),
            (LOCALIZATION_QUALITY, Variant::Double(self.localization_quality)),
            (LASER_SCAN, Variant::from(self.laser_scan)),
            (BATTERY_STATE, Variant::Double(self.battery_state)),
            (BATTERY_SOC, Variant::Double(self.battery_soc)),
            (BATTERY_CYCLES, Variant::Double(self.battery_cycles)),
            (BATTERY_VOLTAGE, Variant::Double(self.battery_voltage)),
            (BATTERY_CURRENT, Variant::Double(self.battery_current)),
            (LINEAR_VELOCITY, Variant::Double(self.linear_velocity)),
            (ANGULAR_VELOCITY, Variant::Double(self.angular_velocity)),
            (CURRENT_PATH, Variant::from(self.current_path)),
        ]
    }

    /// Write the payload to the store in one transaction.
    pub fn apply(self, store: &VariableStore) -> Result<Timestamp> {
        store.write_many(self.into_writes())
    }
}

/// Build the `UpdateData` method.
pub fn update_data_method() -> Result<Method> {
    Method::builder(UPDATE_DATA)
        .description("Update Data from Client")
        .inputs(TelemetryUpdate::arguments())
        .status_outputs()
        .failure_prefix(UPDATE_ERROR_PREFIX)
        .handler(|ctx, inputs| {
            let update = TelemetryUpdate::from_inputs(inputs)?;
            let timestamp = update.apply(ctx.variables)?;
            tracing::debug!(
                "[TELEMETRY] Applied update at {}",
                timestamp.as_nanos()
            );
            Ok(status_outputs(0, UPDATE_OK_MESSAGE))
        })
        .build()
}
