//! Bootstrap of the robot's address space.
//!
//! [`NodeCatalogBuilder`] registers the telemetry variables and every command
//! method, wiring command handlers to an optional `flume` sink that the
//! orchestration layer drains.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::Builder;
use crate::command::{NavTarget, RobotCommand};
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::method::{Argument, HandlerFault, HandlerResult, Method, MethodContext, status_outputs};
use crate::space::AddressSpace;
use crate::telemetry::{self, update_data_method};
use crate::value::{DataType, ValueRank, Variant};
use crate::variable::VariableDescriptor;

pub const COMMAND_RECEIVED: &str = "Command received";

/// Methods whose inputs are one `(x, y, yaw, vmax, accuracy)` group per
/// navigation node.
pub const NODE_METHODS: [&str; 4] = ["MoveToNode", "DockToShelf", "DropTheShelf", "DockToCharger"];

struct VariableDef {
    name: &'static str,
    display_name: &'static str,
    data_type: DataType,
    rank: ValueRank,
    initial: Variant,
}

fn double(name: &'static str, display_name: &'static str) -> VariableDef {
    VariableDef {
        name,
        display_name,
        data_type: DataType::Double,
        rank: ValueRank::Scalar,
        initial: Variant::default_for(DataType::Double, ValueRank::Scalar),
    }
}

fn double_array(name: &'static str, display_name: &'static str) -> VariableDef {
    VariableDef {
        name,
        display_name,
        data_type: DataType::Double,
        rank: ValueRank::OneDimension,
        initial: Variant::default_for(DataType::Double, ValueRank::OneDimension),
    }
}

fn text(name: &'static str, display_name: &'static str, initial: &str) -> VariableDef {
    VariableDef {
        name,
        display_name,
        data_type: DataType::String,
        rank: ValueRank::Scalar,
        initial: Variant::from(initial),
    }
}

fn variables() -> Vec<VariableDef> {
    vec![
        double(telemetry::ROBOT_POSE_X, "Robot PoseX"),
        double(telemetry::ROBOT_POSE_Y, "Robot PoseY"),
        double(telemetry::ROBOT_POSE_YAW, "Robot PoseYaw"),
        text(telemetry::SLAM_STATE, "Slam State", "Ready"),
        text(telemetry::SLAM_STATE_DETAIL, "Slam State Detail", "No details available"),
        text(telemetry::CURRENT_ACTIVE_MAP, "Current Active Map", "No active map"),
        double(telemetry::LOCALIZATION_QUALITY, "Localization Quality"),
        double_array(telemetry::LASER_SCAN, "Laser Scan Data"),
        double(telemetry::BATTERY_STATE, "Battery State"),
        double(telemetry::BATTERY_SOC, "Battery SoC"),
        double(telemetry::BATTERY_CYCLES, "Battery Cycles"),
        double(telemetry::BATTERY_VOLTAGE, "Battery Voltage"),
        double(telemetry::BATTERY_CURRENT, "Battery Current"),
        double(telemetry::LINEAR_VELOCITY, "Current Linear Velocity"),
        double(telemetry::ANGULAR_VELOCITY, "Current Angular Velocity"),
        double_array(telemetry::CURRENT_PATH, "Current Path"),
    ]
}

/// Input schema of the node methods for `count` navigation nodes.
pub fn node_arguments(count: usize) -> Vec<Argument> {
    (0..count)
        .flat_map(|i| {
            NavTarget::FIELDS
                .iter()
                .map(move |field| Argument::scalar(format!("{field}{i}"), DataType::Double))
        })
        .collect()
}

/// Decode node method inputs into targets, five values per node.
pub fn decode_targets(inputs: &[Variant]) -> std::result::Result<Vec<NavTarget>, HandlerFault> {
    if inputs.len() % 5 != 0 {
        return Err(HandlerFault::new(format!(
            "expected groups of 5 values, got {}",
            inputs.len()
        )));
    }
    inputs
        .chunks_exact(5)
        .enumerate()
        .map(|(node, chunk)| {
            let mut values = [0.0; 5];
            for (slot, value) in values.iter_mut().zip(chunk) {
                *slot = value
                    .as_f64()
                    .ok_or_else(|| HandlerFault::new(format!("node {node}: expected Double")))?;
            }
            let target = NavTarget::from_slice(&values);
            if !target.is_finite() {
                return Err(HandlerFault::new(format!("node {node}: values must be finite")));
            }
            Ok(target)
        })
        .collect()
}

/// Where command handlers send accepted commands.
#[derive(Clone)]
struct CommandForwarder {
    sink: Option<flume::Sender<RobotCommand>>,
}

impl CommandForwarder {
    fn forward(&self, command: RobotCommand) -> HandlerResult {
        info!("[CATALOG] Command accepted: {:?}", command);
        if let Some(sink) = &self.sink {
            sink.send(command)
                .map_err(|_| HandlerFault::new("command channel closed"))?;
        }
        Ok(status_outputs(0, COMMAND_RECEIVED))
    }
}

fn string_arg(inputs: &[Variant], i: usize) -> std::result::Result<String, HandlerFault> {
    inputs
        .get(i)
        .and_then(Variant::as_str)
        .map(str::to_string)
        .ok_or_else(|| HandlerFault::new(format!("input {i} is not a String")))
}

fn finite_arg(inputs: &[Variant], i: usize) -> std::result::Result<f64, HandlerFault> {
    let v = inputs
        .get(i)
        .and_then(Variant::as_f64)
        .ok_or_else(|| HandlerFault::new(format!("input {i} is not a Double")))?;
    if !v.is_finite() {
        return Err(HandlerFault::new(format!("input {i} must be finite, got {v}")));
    }
    Ok(v)
}

fn map_name_arg(inputs: &[Variant]) -> std::result::Result<String, HandlerFault> {
    let name = string_arg(inputs, 0)?;
    if name.trim().is_empty() {
        return Err(HandlerFault::new("map_name must not be empty"));
    }
    Ok(name)
}

type Decode = fn(&[Variant]) -> std::result::Result<RobotCommand, HandlerFault>;

fn command_method(
    forwarder: &CommandForwarder,
    name: &str,
    description: &str,
    inputs: Vec<Argument>,
    decode: Decode,
) -> Result<Method> {
    let forwarder = forwarder.clone();
    Method::builder(name)
        .description(description)
        .inputs(inputs)
        .status_outputs()
        .handler(move |_: &MethodContext<'_>, args: &[Variant]| forwarder.forward(decode(args)?))
        .build()
}

fn command_methods(f: &CommandForwarder, node_count: usize) -> Result<Vec<Method>> {
    let d = |name: &str| Argument::scalar(name, DataType::Double);
    let map_name = || vec![Argument::scalar("map_name", DataType::String)];
    let nodes = || node_arguments(node_count);

    Ok(vec![
        command_method(f, "StartMapping", "Start Mapping", vec![], |_| {
            Ok(RobotCommand::StartMapping)
        })?,
        command_method(f, "StopMapping", "Stop Mapping", map_name(), |a| {
            Ok(RobotCommand::StopMapping {
                map_name: map_name_arg(a)?,
            })
        })?,
        command_method(f, "StartLocalization", "Start Localization", vec![], |_| {
            Ok(RobotCommand::StartLocalization)
        })?,
        command_method(f, "StopLocalization", "Stop Localization", vec![], |_| {
            Ok(RobotCommand::StopLocalization)
        })?,
        command_method(f, "ActivateMap", "Activate Map", map_name(), |a| {
            Ok(RobotCommand::ActivateMap {
                map_name: map_name_arg(a)?,
            })
        })?,
        command_method(
            f,
            "SetInitialPose",
            "Set Initial Pose",
            vec![d("x"), d("y"), d("yaw")],
            |a| {
                Ok(RobotCommand::SetInitialPose {
                    x: finite_arg(a, 0)?,
                    y: finite_arg(a, 1)?,
                    yaw: finite_arg(a, 2)?,
                })
            },
        )?,
        command_method(f, "ResetSlamError", "Reset Slam Error", vec![], |_| {
            Ok(RobotCommand::ResetSlamError)
        })?,
        command_method(f, "StopCalibrate", "Stop Calibrate", vec![], |_| {
            Ok(RobotCommand::StopCalibrate)
        })?,
        command_method(f, "MoveToNode", "Move to Node", nodes(), |a| {
            Ok(RobotCommand::MoveToNode(decode_targets(a)?))
        })?,
        command_method(f, "DockToShelf", "Dock to Shelf", nodes(), |a| {
            Ok(RobotCommand::DockToShelf(decode_targets(a)?))
        })?,
        command_method(f, "DropTheShelf", "Drop the Shelf", nodes(), |a| {
            Ok(RobotCommand::DropTheShelf(decode_targets(a)?))
        })?,
        command_method(f, "Rotate", "Rotate", vec![d("alpha")], |a| {
            Ok(RobotCommand::Rotate {
                alpha: finite_arg(a, 0)?,
            })
        })?,
        command_method(f, "MoveStraight", "Move Straight", vec![d("x"), d("y")], |a| {
            Ok(RobotCommand::MoveStraight {
                x: finite_arg(a, 0)?,
                y: finite_arg(a, 1)?,
            })
        })?,
        command_method(f, "DockToCharger", "Dock to Charger", nodes(), |a| {
            Ok(RobotCommand::DockToCharger(decode_targets(a)?))
        })?,
        command_method(f, "UndockFromCharger", "Undock from Charger", vec![], |_| {
            Ok(RobotCommand::UndockFromCharger)
        })?,
        command_method(
            f,
            "CancelNavigation",
            "Cancel Navigation",
            vec![Argument::scalar("softStop", DataType::Boolean)],
            |a| {
                let soft_stop = a
                    .first()
                    .and_then(Variant::as_bool)
                    .ok_or_else(|| HandlerFault::new("input 0 is not a Boolean"))?;
                Ok(RobotCommand::CancelNavigation { soft_stop })
            },
        )?,
        command_method(f, "Pause", "Pause", vec![], |_| Ok(RobotCommand::Pause))?,
        command_method(f, "Resume", "Resume", vec![], |_| Ok(RobotCommand::Resume))?,
    ])
}

/// The bootstrapped address space and its navigation nodes.
pub struct NodeCatalog {
    space: Arc<AddressSpace>,
    nodes: Mutex<Vec<NavTarget>>,
}

impl NodeCatalog {
    pub fn builder() -> NodeCatalogBuilder {
        NodeCatalogBuilder::default()
    }

    pub fn space(&self) -> &Arc<AddressSpace> {
        &self.space
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.space.clone())
    }

    pub fn navigation_nodes(&self) -> Vec<NavTarget> {
        self.nodes.lock().clone()
    }

    /// Register another navigation node and widen the node methods' inputs.
    pub fn add_navigation_node(&self, node: NavTarget) -> Result<()> {
        let mut nodes = self.nodes.lock();
        nodes.push(node);
        let inputs = node_arguments(nodes.len());
        for name in NODE_METHODS {
            self.space.methods().set_inputs(name, inputs.clone())?;
        }
        info!("[CATALOG] Navigation node added: {:?} (total {})", node, nodes.len());
        Ok(())
    }
}

pub struct NodeCatalogBuilder {
    nodes: Vec<NavTarget>,
    commands: Option<flume::Sender<RobotCommand>>,
}

impl Default for NodeCatalogBuilder {
    fn default() -> Self {
        Self {
            nodes: vec![NavTarget::default()],
            commands: None,
        }
    }
}

impl NodeCatalogBuilder {
    /// Replace the initial navigation nodes. Defaults to one all-zero node.
    pub fn with_navigation_nodes<I: IntoIterator<Item = NavTarget>>(mut self, nodes: I) -> Self {
        self.nodes = nodes.into_iter().collect();
        self
    }

    /// Forward accepted commands to `sink`. Without a sink commands are only
    /// logged.
    pub fn with_command_sink(mut self, sink: flume::Sender<RobotCommand>) -> Self {
        self.commands = Some(sink);
        self
    }
}

impl Builder for NodeCatalogBuilder {
    type Output = NodeCatalog;

    #[tracing::instrument(name = "catalog_build", skip(self), fields(nodes = self.nodes.len()))]
    fn build(self) -> Result<NodeCatalog> {
        let space = Arc::new(AddressSpace::new());

        for def in variables() {
            let descriptor = VariableDescriptor::new(def.name, def.data_type, def.rank)
                .with_display_name(def.display_name)
                .with_description(def.display_name);
            space.variables().register(descriptor, def.initial)?;
        }
        debug!("[CATALOG] Registered {} variables", space.variables().len());

        let forwarder = CommandForwarder {
            sink: self.commands,
        };
        for method in command_methods(&forwarder, self.nodes.len())? {
            space.methods().register(method)?;
        }
        space.methods().register(update_data_method()?)?;
        info!(
            "[CATALOG] Address space ready: {} variables, {} methods, {} navigation nodes",
            space.variables().len(),
            space.methods().len(),
            self.nodes.len()
        );

        Ok(NodeCatalog {
            space,
            nodes: Mutex::new(self.nodes),
        })
    }
}
