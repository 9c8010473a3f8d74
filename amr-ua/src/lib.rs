pub mod catalog;
pub mod command;
pub mod config;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod method;
pub mod publish;
pub mod snapshot;
pub mod space;
pub mod telemetry;
pub mod value;
pub mod variable;
pub mod zenoh_bridge;

pub mod prelude;

pub use error::{Error, Result};

pub trait Builder {
    type Output;
    fn build(self) -> Result<Self::Output>;
}
