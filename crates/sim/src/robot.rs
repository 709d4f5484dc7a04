//! Wiring of the simulated collaborators into one robot.

use std::sync::Arc;

use motion::{Collaborators, PlanningScene};

use crate::{SimArm, SimBackend, SimCollisionChecker, SimConfig, SimController, SimError, SimPlanner};

/// A complete simulated manipulator.
///
/// Holds the concrete adapters so tests and demos can drive the fault
/// injection switches, and hands them to `MoveIface` as trait objects via
/// [`SimRobot::collaborators`].
#[derive(Clone)]
pub struct SimRobot {
    pub arm: Arc<SimArm>,
    pub checker: Arc<SimCollisionChecker>,
    pub planner: Arc<SimPlanner>,
    pub controller: Arc<SimController>,
    pub backend: Arc<SimBackend>,
}

impl SimRobot {
    pub fn new(config: &SimConfig) -> Result<Self, SimError> {
        let arm = Arc::new(SimArm::new(config)?);
        let checker = Arc::new(SimCollisionChecker::new(arm.clone(), config));
        let planner = Arc::new(SimPlanner::new(arm.clone(), checker.clone(), config));
        Ok(Self {
            arm,
            checker,
            planner,
            controller: Arc::new(SimController::new(config)),
            backend: Arc::new(SimBackend::new(config)),
        })
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            kinematics: self.arm.clone(),
            checker: self.checker.clone(),
            planner: self.planner.clone(),
            controller: self.controller.clone(),
            backend: self.backend.clone(),
        }
    }

    /// An empty scene for this robot, with adjacent-link contacts allowed.
    pub fn scene(&self) -> PlanningScene {
        self.arm.default_scene()
    }
}
