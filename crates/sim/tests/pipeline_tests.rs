//! End-to-end runs of the motion pipeline against the simulated arm.

use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use motion::service::{MoveJointsRequest, MoveLinRequest, MoveRandomRequest, PickPlaceRequest};
use motion::{
    CollisionObject, ErrorKind, Job, JobContext, JobGoal, JobServer, JobStatus, JointValues,
    Kinematics, LinkName, MotionConfig, MoveIface, MoveResult, ObjectId, Pose, ServerState,
    Severity, Shape,
};
use sim::{GripperState, SimConfig, SimRobot};

/// Tool pointing straight down above `(0.4, 0, 0.2)`, elbow up.
const READY: [f64; 6] = [0.0, 0.512, 1.918, 0.0, 0.711, 0.0];

fn link(name: &str) -> LinkName {
    LinkName::new(name).unwrap()
}

fn object(name: &str) -> ObjectId {
    ObjectId::new(name).unwrap()
}

fn joints(values: [f64; 6]) -> JointValues {
    JointValues::new(values.to_vec())
}

fn down(x: f64, y: f64, z: f64) -> Pose {
    Pose::from_xyz_rpy(x, y, z, 0.0, PI, 0.0)
}

fn start(config: SimConfig, motion: MotionConfig) -> (SimRobot, Arc<MoveIface>) {
    let robot = SimRobot::new(&config).unwrap();
    let iface = MoveIface::new(motion, robot.collaborators(), robot.scene()).unwrap();
    (robot, Arc::new(iface))
}

fn deterministic() -> (SimRobot, Arc<MoveIface>) {
    start(SimConfig::deterministic(7), MotionConfig::default())
}

fn table_and_cube(iface: &MoveIface) {
    iface
        .add_collision_object(CollisionObject {
            id: object("table"),
            shape: Shape::Cuboid {
                half_extents: [0.6, 0.6, 0.02],
            },
            pose: Pose::from_translation(0.3, 0.0, -0.02),
        })
        .unwrap();
    iface.disable_collision(link("link_1"), object("table")).unwrap();
    iface
        .add_collision_object(CollisionObject {
            id: object("cube"),
            shape: Shape::Cuboid {
                half_extents: [0.02, 0.02, 0.02],
            },
            pose: Pose::from_translation(0.4, 0.0, 0.02),
        })
        .unwrap();
    iface.disable_collision(link("link_6"), object("cube")).unwrap();
}

async fn move_joints(iface: &MoveIface, values: [f64; 6]) -> motion::service::MoveResponse {
    iface
        .move_joints_srv(MoveJointsRequest {
            joints: joints(values),
        })
        .await
}

#[tokio::test]
async fn goal_at_the_current_state_succeeds_without_motion() {
    let (robot, iface) = deterministic();
    let response = move_joints(&iface, [0.0; 6]).await;
    assert!(response.success);
    assert_eq!(robot.controller.executions(), 0);
}

#[tokio::test]
async fn joint_goal_is_planned_validated_and_executed() {
    let (robot, iface) = deterministic();
    let response = move_joints(&iface, [0.5, 0.3, 0.2, 0.0, 0.0, 0.0]).await;
    assert!(response.success, "{}", response.message);
    assert_eq!(robot.controller.executions(), 1);
    assert_eq!(robot.controller.joints(), joints([0.5, 0.3, 0.2, 0.0, 0.0, 0.0]));
    assert_eq!(robot.backend.modify_calls(), 1);
}

#[tokio::test]
async fn colliding_goal_is_refused_until_the_pair_is_allowed() {
    let (robot, iface) = deterministic();
    let goal = [0.0, 0.5, 0.0, 0.0, 0.0, 0.0];
    let tip = robot.arm.forward(&joints(goal)).unwrap().translation();
    iface
        .add_collision_object(CollisionObject {
            id: object("ball"),
            shape: Shape::Sphere { radius: 0.02 },
            pose: Pose::from_translation(tip.x, tip.y, tip.z),
        })
        .unwrap();

    let refused = move_joints(&iface, goal).await;
    assert_eq!(refused.error_code.kind(), Some(ErrorKind::GoalInCollision));
    assert_eq!(refused.error_code.severity(), Some(Severity::Recoverable));
    assert_eq!(robot.controller.executions(), 0);

    iface.disable_collision(link("link_6"), object("ball")).unwrap();
    let response = move_joints(&iface, goal).await;
    assert!(response.success, "{}", response.message);
}

#[tokio::test]
async fn second_request_during_execution_is_busy() {
    let (robot, iface) = start(
        SimConfig {
            time_scale: 1.0,
            ..SimConfig::deterministic(7)
        },
        MotionConfig::default(),
    );
    let first = tokio::spawn({
        let iface = iface.clone();
        async move { move_joints(&iface, [0.3, 0.0, 0.0, 0.0, 0.0, 0.0]).await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(iface.is_busy());

    let second = move_joints(&iface, [0.0, 0.3, 0.0, 0.0, 0.0, 0.0]).await;
    assert_eq!(second.error_code.kind(), Some(ErrorKind::Busy));
    assert_eq!(second.error_code.severity(), Some(Severity::Recoverable));

    assert!(first.await.unwrap().success);
    assert_eq!(robot.controller.executions(), 1);
    assert!(iface.is_allowed_to_move());
}

#[tokio::test]
async fn controller_fault_disables_motion_until_reset() {
    let (robot, iface) = deterministic();
    robot.controller.inject_fault();

    let failed = move_joints(&iface, [0.2, 0.0, 0.0, 0.0, 0.0, 0.0]).await;
    assert_eq!(failed.error_code.kind(), Some(ErrorKind::ExecutionFailed));
    assert_eq!(failed.error_code.severity(), Some(Severity::Critical));
    assert!(!iface.is_allowed_to_move());
    assert!(!iface.robot_ready_srv().success);

    let refused = move_joints(&iface, [0.2, 0.0, 0.0, 0.0, 0.0, 0.0]).await;
    assert_eq!(refused.error_code.kind(), Some(ErrorKind::NotAllowedToMove));
    assert_eq!(robot.controller.executions(), 1);

    iface.reset();
    assert!(move_joints(&iface, [0.2, 0.0, 0.0, 0.0, 0.0, 0.0]).await.success);
}

#[tokio::test]
async fn rejected_or_hanging_hooks_fail_recoverably_without_execution() {
    let mut motion = MotionConfig::default();
    motion.backend.hook_timeout_ms = 100;
    let (robot, iface) = start(SimConfig::deterministic(7), motion);

    robot.backend.set_reject_trajectories(true);
    let rejected = move_joints(&iface, [0.2, 0.0, 0.0, 0.0, 0.0, 0.0]).await;
    assert_eq!(rejected.error_code.kind(), Some(ErrorKind::TrajectoryInvalid));

    robot.backend.set_reject_trajectories(false);
    robot.backend.set_hang(true);
    let hung = move_joints(&iface, [0.2, 0.0, 0.0, 0.0, 0.0, 0.0]).await;
    assert_eq!(hung.error_code.kind(), Some(ErrorKind::TrajectoryInvalid));
    assert_eq!(hung.error_code.severity(), Some(Severity::Recoverable));

    assert_eq!(robot.controller.executions(), 0);
    assert!(iface.is_allowed_to_move());
}

#[tokio::test]
async fn stale_or_missing_state_blocks_motion() {
    let mut motion = MotionConfig::default();
    motion.state.max_age_ms = 50;
    motion.state.wait_timeout_ms = 100;
    motion.state.poll_interval_ms = 10;
    let (robot, iface) = start(SimConfig::deterministic(7), motion);

    robot.controller.set_stale(true);
    let stale = move_joints(&iface, [0.2, 0.0, 0.0, 0.0, 0.0, 0.0]).await;
    assert_eq!(stale.error_code.kind(), Some(ErrorKind::StateUnavailable));

    robot.controller.set_stale(false);
    robot.controller.set_dropped(true);
    let missing = move_joints(&iface, [0.2, 0.0, 0.0, 0.0, 0.0, 0.0]).await;
    assert_eq!(missing.error_code.kind(), Some(ErrorKind::StateUnavailable));
    assert!(!iface.get_current_joint_values_srv().await.success);

    robot.controller.set_dropped(false);
    assert!(move_joints(&iface, [0.2, 0.0, 0.0, 0.0, 0.0, 0.0]).await.success);
    assert_eq!(robot.controller.executions(), 1);
}

#[tokio::test]
async fn linear_move_goes_straight_down() {
    let (robot, iface) = deterministic();
    assert!(move_joints(&iface, READY).await.success);
    let from = iface.get_current_pose_srv().await.pose.unwrap();
    let goal = Pose::new(nalgebra::Translation3::new(0.0, 0.0, -0.05) * *from.isometry());

    let response = iface.move_lin_srv(MoveLinRequest { pose: goal }).await;
    assert!(response.success, "{}", response.message);
    let reached = robot.arm.forward(&robot.controller.joints()).unwrap();
    assert!(reached.distance_to(&goal) < 1e-3);
}

#[tokio::test]
async fn random_move_reports_where_it_went() {
    // Narrow limits keep every sampled path clear of self-collision.
    let (robot, iface) = start(
        SimConfig {
            joint_limits: [[-0.5, 0.5]; 6],
            ..SimConfig::deterministic(7)
        },
        MotionConfig::default(),
    );
    let response = iface.move_random_srv(MoveRandomRequest {}).await;
    assert!(response.success, "{}", response.message);

    let outcome = response.payload.unwrap();
    assert_eq!(robot.controller.joints(), outcome.joints);
    for (value, limit) in outcome.joints.as_slice().iter().zip(robot.arm.joint_limits()) {
        assert!(limit.contains(*value));
    }
}

#[tokio::test]
async fn pick_and_place_moves_the_cube() {
    let (robot, iface) = deterministic();
    table_and_cube(&iface);
    assert!(move_joints(&iface, READY).await.success);

    let pick = iface
        .pick_place_srv(PickPlaceRequest {
            pose_above: down(0.4, 0.0, 0.2),
            pose_grip: down(0.4, 0.0, 0.04),
            gripper_close: true,
            object: Some(object("cube")),
        })
        .await;
    assert!(pick.success, "{}", pick.message);
    assert_eq!(robot.backend.gripper_state(), GripperState::Closed);
    let scene = iface.scene_snapshot().unwrap();
    assert!(scene.attached_object(&object("cube")).is_some());

    let place = iface
        .pick_place_srv(PickPlaceRequest {
            pose_above: down(0.3, 0.2, 0.2),
            pose_grip: down(0.3, 0.2, 0.04),
            gripper_close: false,
            object: Some(object("cube")),
        })
        .await;
    assert!(place.success, "{}", place.message);
    assert_eq!(robot.backend.gripper_state(), GripperState::Open);

    let scene = iface.scene_snapshot().unwrap();
    let cube = scene.world_object(&object("cube")).unwrap().pose.translation();
    assert!((cube.x - 0.3).abs() < 1e-3);
    assert!((cube.y - 0.2).abs() < 1e-3);
    assert!((cube.z - 0.02).abs() < 1e-3);
}

/// Swings joint 1 back and forth until cancelled.
struct Shuttle;

#[async_trait]
impl Job for Shuttle {
    async fn run(&self, ctx: &JobContext) -> MoveResult {
        for target in [0.2, -0.2].into_iter().cycle() {
            ctx.checkpoint()?;
            ctx.iface()
                .move_joints_srv(MoveJointsRequest {
                    joints: joints([target, 0.3, 0.3, 0.0, 0.0, 0.0]),
                })
                .await
                .into_result()?;
        }
        Ok(())
    }
}

#[tokio::test]
async fn idle_cancels_the_job_and_returns_home() {
    let (robot, iface) = start(
        SimConfig {
            time_scale: 0.2,
            ..SimConfig::deterministic(7)
        },
        MotionConfig::default(),
    );
    let server = Arc::new(JobServer::new(iface, Arc::new(Shuttle)));

    let run = tokio::spawn({
        let server = server.clone();
        async move { server.run_job_action(JobGoal::new()).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.state(), ServerState::Running);

    server.idle_action().await.unwrap();
    let result = run.await.unwrap();
    assert_eq!(result.status, JobStatus::Idle);
    assert_eq!(server.state(), ServerState::Idle);
    assert_eq!(robot.controller.joints(), JointValues::zeros(6));
}
