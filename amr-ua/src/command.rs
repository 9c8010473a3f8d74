//! Robot commands forwarded to the orchestration layer.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};

/// A navigation node; also the per-node argument group of the node methods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NavTarget {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
    pub vmax: f64,
    pub accuracy: f64,
}

impl NavTarget {
    pub const FIELDS: [&'static str; 5] = ["x", "y", "yaw", "vmax", "accuracy"];

    pub fn new(x: f64, y: f64, yaw: f64, vmax: f64, accuracy: f64) -> Self {
        Self {
            x,
            y,
            yaw,
            vmax,
            accuracy,
        }
    }

    pub fn from_slice(values: &[f64; 5]) -> Self {
        let [x, y, yaw, vmax, accuracy] = *values;
        Self::new(x, y, yaw, vmax, accuracy)
    }

    pub fn is_finite(&self) -> bool {
        [self.x, self.y, self.yaw, self.vmax, self.accuracy]
            .iter()
            .all(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, PartialEq, Display, AsRefStr, Serialize)]
pub enum RobotCommand {
    StartMapping,
    StopMapping { map_name: String },
    StartLocalization,
    StopLocalization,
    ActivateMap { map_name: String },
    SetInitialPose { x: f64, y: f64, yaw: f64 },
    ResetSlamError,
    StopCalibrate,
    MoveToNode(Vec<NavTarget>),
    DockToShelf(Vec<NavTarget>),
    DropTheShelf(Vec<NavTarget>),
    DockToCharger(Vec<NavTarget>),
    Rotate { alpha: f64 },
    MoveStraight { x: f64, y: f64 },
    UndockFromCharger,
    Pause,
    Resume,
    CancelNavigation { soft_stop: bool },
}

impl RobotCommand {
    /// Navigation targets carried by the command, empty for other commands.
    pub fn targets(&self) -> &[NavTarget] {
        match self {
            RobotCommand::MoveToNode(t)
            | RobotCommand::DockToShelf(t)
            | RobotCommand::DropTheShelf(t)
            | RobotCommand::DockToCharger(t) => t,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names() {
        assert_eq!(RobotCommand::Pause.to_string(), "Pause");
        assert_eq!(
            RobotCommand::CancelNavigation { soft_stop: true }.as_ref(),
            "CancelNavigation"
        );
        let cmd = RobotCommand::DockToShelf(vec![NavTarget::default()]);
        assert_eq!(cmd.to_string(), "DockToShelf");
        assert_eq!(cmd.targets().len(), 1);
        assert!(RobotCommand::Resume.targets().is_empty());
    }

    #[test]
    fn test_nav_target_finite() {
        assert!(NavTarget::from_slice(&[1.0, 2.0, 0.0, 0.5, 0.1]).is_finite());
        assert!(!NavTarget::new(f64::NAN, 0.0, 0.0, 0.0, 0.0).is_finite());
    }
}
