//! In-crate fakes for the collaborator ports.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::{
    Backend, Body, CartesianPath, Collaborators, CollisionChecker, Contact, ErrorKind, JointLimit,
    JointName, JointValues, Kinematics, LinearPlanOptions, LinkName, MotionConfig, MoveError,
    MoveIface, MoveResult, Planner, PlanningScene, Pose, RobotState, StateSource, Timestamp,
    Trajectory, Waypoint,
};

pub(crate) fn link(name: &str) -> LinkName {
    LinkName::new(name).unwrap()
}

// ---------------------------------------------------------------------------
// Kinematics
// ---------------------------------------------------------------------------

/// Six joints; the end effector sits at `(j0, j1, j2)` with identity rotation.
pub(crate) struct FakeKinematics {
    joints: Vec<JointName>,
    limits: Vec<JointLimit>,
    links: Vec<LinkName>,
    random: Mutex<Vec<JointValues>>,
    next_random: AtomicUsize,
}

impl Default for FakeKinematics {
    fn default() -> Self {
        Self {
            joints: (1..=6)
                .map(|i| JointName::new(format!("joint_{i}")).unwrap())
                .collect(),
            limits: vec![JointLimit::new(-3.0, 3.0).unwrap(); 6],
            links: (1..=6).map(|i| link(&format!("link_{i}"))).collect(),
            random: Mutex::new(vec![JointValues::new(vec![0.2, 0.1, 0.0, 0.0, 0.0, 0.0])]),
            next_random: AtomicUsize::new(0),
        }
    }
}

impl FakeKinematics {
    pub(crate) fn scene(&self) -> PlanningScene {
        PlanningScene::new(self.links.iter().cloned())
    }

    /// Replaces the cycle of values handed out by `random_joint_values`.
    pub(crate) fn set_random(&self, values: Vec<JointValues>) {
        *self.random.lock().unwrap() = values;
        self.next_random.store(0, Ordering::SeqCst);
    }
}

impl Kinematics for FakeKinematics {
    fn joint_names(&self) -> &[JointName] {
        &self.joints
    }

    fn joint_limits(&self) -> &[JointLimit] {
        &self.limits
    }

    fn link_names(&self) -> &[LinkName] {
        &self.links
    }

    fn link_pose(&self, joints: &JointValues, _link: &LinkName) -> MoveResult<Pose> {
        self.forward(joints)
    }

    fn forward(&self, joints: &JointValues) -> MoveResult<Pose> {
        if joints.len() != 6 {
            return Err(MoveError::new(ErrorKind::InvalidInput, "expected six joints"));
        }
        Ok(Pose::from_translation(joints[0], joints[1], joints[2]))
    }

    fn inverse(&self, pose: &Pose, _seed: &JointValues) -> Option<JointValues> {
        let t = pose.translation();
        let solution = JointValues::new(vec![t.x, t.y, t.z, 0.0, 0.0, 0.0]);
        solution
            .as_slice()
            .iter()
            .zip(&self.limits)
            .all(|(v, l)| l.contains(*v))
            .then_some(solution)
    }

    fn random_joint_values(&self) -> JointValues {
        let values = self.random.lock().unwrap();
        let index = self.next_random.fetch_add(1, Ordering::SeqCst);
        values[index % values.len()].clone()
    }
}

// ---------------------------------------------------------------------------
// Collision checker
// ---------------------------------------------------------------------------

struct Rule {
    joint: usize,
    above: f64,
    a: Body,
    b: Body,
}

/// Reports a contact between a body pair whenever a joint exceeds a threshold.
#[derive(Default)]
pub(crate) struct FakeChecker {
    rules: Mutex<Vec<Rule>>,
}

impl FakeChecker {
    pub(crate) fn colliding_when_first_joint_above(above: f64, a: &str, b: &str) -> Self {
        let checker = Self::default();
        checker.collide_when_joint_above(0, above, link(a), link(b));
        checker
    }

    pub(crate) fn collide_when_joint_above(
        &self,
        joint: usize,
        above: f64,
        a: impl Into<Body>,
        b: impl Into<Body>,
    ) {
        self.rules.lock().unwrap().push(Rule {
            joint,
            above,
            a: a.into(),
            b: b.into(),
        });
    }
}

impl CollisionChecker for FakeChecker {
    fn contacts(&self, _scene: &PlanningScene, joints: &JointValues) -> Vec<Contact> {
        self.rules
            .lock()
            .unwrap()
            .iter()
            .filter(|r| joints.as_slice().get(r.joint).is_some_and(|v| *v > r.above))
            .map(|r| Contact::new(r.a.clone(), r.b.clone(), 0.01))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

/// Interpolates in steps of at most 0.1 rad, 0.1 s apart.
pub(crate) struct FakePlanner {
    pub(crate) plan_calls: AtomicUsize,
    pub(crate) fail: AtomicBool,
    /// Plan a single jump straight to the goal.
    pub(crate) jump: AtomicBool,
    pub(crate) linear_fraction: Mutex<f64>,
}

impl Default for FakePlanner {
    fn default() -> Self {
        Self {
            plan_calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            jump: AtomicBool::new(false),
            linear_fraction: Mutex::new(1.0),
        }
    }
}

impl FakePlanner {
    fn interpolate(&self, start: &JointValues, goal: &JointValues) -> MoveResult<Trajectory> {
        self.plan_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(MoveError::new(ErrorKind::PlanningFailed, "planner told to fail"));
        }
        let steps = if self.jump.load(Ordering::SeqCst) {
            1
        } else {
            let delta = start.max_abs_delta(goal).unwrap_or(0.0);
            ((delta / 0.1).ceil() as usize).max(1)
        };
        let waypoints = (0..=steps)
            .map(|i| {
                let t = i as f64 / steps as f64;
                let positions = start
                    .as_slice()
                    .iter()
                    .zip(goal.as_slice())
                    .map(|(s, g)| s + (g - s) * t)
                    .collect::<Vec<_>>();
                Waypoint::new(JointValues::new(positions), Duration::from_millis(100 * i as u64))
            })
            .collect();
        Ok(Trajectory::new(waypoints))
    }
}

#[async_trait]
impl Planner for FakePlanner {
    async fn plan_joints(
        &self,
        _scene: &PlanningScene,
        start: &RobotState,
        goal: &JointValues,
    ) -> MoveResult<Trajectory> {
        self.interpolate(start.joints(), goal)
    }

    async fn plan_linear(
        &self,
        _scene: &PlanningScene,
        start: &RobotState,
        goal: &Pose,
        _options: LinearPlanOptions,
    ) -> MoveResult<CartesianPath> {
        let t = goal.translation();
        let target = JointValues::new(vec![t.x, t.y, t.z, 0.0, 0.0, 0.0]);
        let trajectory = self.interpolate(start.joints(), &target)?;
        Ok(CartesianPath {
            trajectory,
            fraction: *self.linear_fraction.lock().unwrap(),
        })
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Reports a freshly stamped live state for its current joints.
pub(crate) struct FakeController {
    joints: Mutex<Option<JointValues>>,
    pub(crate) executions: AtomicUsize,
    pub(crate) fail_next: AtomicBool,
    pub(crate) stale: AtomicBool,
    pub(crate) lose_state_on_execute: AtomicBool,
    /// When set, `execute` signals `started` and then waits for `release`.
    pub(crate) hold: AtomicBool,
    pub(crate) started: Notify,
    pub(crate) release: Notify,
}

impl FakeController {
    pub(crate) fn at(joints: JointValues) -> Self {
        Self {
            joints: Mutex::new(Some(joints)),
            executions: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
            stale: AtomicBool::new(false),
            lose_state_on_execute: AtomicBool::new(false),
            hold: AtomicBool::new(false),
            started: Notify::new(),
            release: Notify::new(),
        }
    }

    pub(crate) fn joints(&self) -> Option<JointValues> {
        self.joints.lock().unwrap().clone()
    }

    pub(crate) fn clear_state(&self) {
        *self.joints.lock().unwrap() = None;
    }
}

#[async_trait]
impl crate::Controller for FakeController {
    fn current_state(&self) -> Option<RobotState> {
        let joints = self.joints()?;
        if self.stale.load(Ordering::SeqCst) {
            let old = Timestamp::from_utc(chrono::Utc::now() - chrono::Duration::seconds(10));
            return Some(RobotState::captured(joints, Vec::new(), old, StateSource::Live));
        }
        Some(RobotState::live(joints, Vec::new()))
    }

    async fn execute(&self, trajectory: Trajectory) -> MoveResult {
        if self.hold.load(Ordering::SeqCst) {
            self.started.notify_one();
            self.release.notified().await;
        }
        self.executions.fetch_add(1, Ordering::SeqCst);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(MoveError::new(ErrorKind::ExecutionFailed, "controller fault"));
        }
        let last = trajectory.into_waypoints().pop().map(|w| w.positions);
        let mut joints = self.joints.lock().unwrap();
        if self.lose_state_on_execute.load(Ordering::SeqCst) {
            *joints = None;
        } else if let Some(last) = last {
            *joints = Some(last);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Counts gripper calls; the modify hooks halve trajectory timing.
#[derive(Default)]
pub(crate) struct FakeBackend {
    pub(crate) open_calls: AtomicUsize,
    pub(crate) close_calls: AtomicUsize,
    pub(crate) modify_calls: AtomicUsize,
    pub(crate) reject_trajectories: AtomicBool,
    pub(crate) fail_gripper: AtomicBool,
    pub(crate) hang: AtomicBool,
}

impl FakeBackend {
    async fn gripper(&self, counter: &AtomicUsize) -> MoveResult {
        counter.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_gripper.load(Ordering::SeqCst) {
            return Err(MoveError::new(ErrorKind::GripperFailed, "jammed"));
        }
        Ok(())
    }

    async fn modify(&self, trajectory: &mut Trajectory) -> bool {
        self.modify_calls.fetch_add(1, Ordering::SeqCst);
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.reject_trajectories.load(Ordering::SeqCst) {
            return false;
        }
        trajectory.scale_time(0.5)
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn close_gripper(&self) -> MoveResult {
        self.gripper(&self.close_calls).await
    }

    async fn open_gripper(&self) -> MoveResult {
        self.gripper(&self.open_calls).await
    }

    async fn modify_ptp_trajectory(&self, trajectory: &mut Trajectory) -> bool {
        self.modify(trajectory).await
    }

    async fn modify_lin_trajectory(&self, trajectory: &mut Trajectory) -> bool {
        self.modify(trajectory).await
    }
}

// ---------------------------------------------------------------------------
// Fixture
// ---------------------------------------------------------------------------

/// A [`MoveIface`] wired to fakes, with handles to every fake.
pub(crate) struct Rig {
    pub(crate) iface: Arc<MoveIface>,
    pub(crate) kinematics: Arc<FakeKinematics>,
    pub(crate) checker: Arc<FakeChecker>,
    pub(crate) planner: Arc<FakePlanner>,
    pub(crate) controller: Arc<FakeController>,
    pub(crate) backend: Arc<FakeBackend>,
}

impl Rig {
    /// Short timeouts so failure paths finish quickly.
    pub(crate) fn config() -> MotionConfig {
        let mut config = MotionConfig::default();
        config.state.wait_timeout_ms = 50;
        config.state.poll_interval_ms = 5;
        config.backend.hook_timeout_ms = 200;
        config.job.cancel_timeout_ms = 1_000;
        config
    }

    pub(crate) fn new() -> Self {
        Self::with_config(Self::config())
    }

    pub(crate) fn with_config(config: MotionConfig) -> Self {
        let kinematics = Arc::new(FakeKinematics::default());
        let checker = Arc::new(FakeChecker::default());
        let planner = Arc::new(FakePlanner::default());
        let controller = Arc::new(FakeController::at(JointValues::zeros(6)));
        let backend = Arc::new(FakeBackend::default());
        let ports = Collaborators {
            kinematics: kinematics.clone(),
            checker: checker.clone(),
            planner: planner.clone(),
            controller: controller.clone(),
            backend: backend.clone(),
        };
        let iface = Arc::new(MoveIface::new(config, ports, kinematics.scene()).unwrap());
        Self {
            iface,
            kinematics,
            checker,
            planner,
            controller,
            backend,
        }
    }

    pub(crate) fn plan_calls(&self) -> usize {
        self.planner.plan_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn executions(&self) -> usize {
        self.controller.executions.load(Ordering::SeqCst)
    }
}
