pub use crate::Builder;
pub use crate::catalog::{NodeCatalog, NodeCatalogBuilder};
pub use crate::command::{NavTarget, RobotCommand};
pub use crate::config::{ServerConfig, ServerConfigBuilder};
pub use crate::dispatch::{CallFailure, Dispatcher};
pub use crate::error::{Error, Result, TransportError};
pub use crate::method::{Argument, HandlerFault, Method, MethodContext, MethodRegistry, status_outputs};
pub use crate::publish::{
    ChannelBridge, PublishBridge, PublishScheduler, PublishState, PublishStats,
};
pub use crate::snapshot::{PublishSnapshot, SnapshotField};
pub use crate::space::AddressSpace;
pub use crate::telemetry::TelemetryUpdate;
pub use crate::value::{DataType, Timestamp, ValueRank, Variant};
pub use crate::variable::{AccessLevel, DataValue, VariableDescriptor, VariableStatus, VariableStore};
pub use crate::zenoh_bridge::ZenohBridge;
