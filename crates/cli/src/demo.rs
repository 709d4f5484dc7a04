//! The demo cell: a table with one cube, and a job that moves the cube.

use std::f64::consts::PI;

use async_trait::async_trait;
use tracing::info;

use motion::service::{MoveJointsRequest, PickPlaceRequest};
use motion::{
    CollisionObject, ErrorKind, Job, JobContext, JointValues, LinkName, MoveError, MoveIface,
    MoveResult, ObjectId, Pose, Shape,
};

/// Tool pointing down above the cube, elbow up.
const READY: [f64; 6] = [0.0, 0.512, 1.918, 0.0, 0.711, 0.0];

const CUBE_HALF: f64 = 0.02;
const APPROACH_HEIGHT: f64 = 0.2;

fn object(id: &str) -> MoveResult<ObjectId> {
    ObjectId::new(id).ok_or_else(|| MoveError::new(ErrorKind::InvalidInput, "empty object id"))
}

fn link(name: &str) -> MoveResult<LinkName> {
    LinkName::new(name).ok_or_else(|| MoveError::new(ErrorKind::InvalidInput, "empty link name"))
}

fn tool_down(x: f64, y: f64, z: f64) -> Pose {
    Pose::from_xyz_rpy(x, y, z, 0.0, PI, 0.0)
}

/// Adds the table and the cube. The base stands on the table and the tool
/// tip may touch the cube while gripping it.
pub fn build_scene(iface: &MoveIface) -> MoveResult {
    let table = object("table")?;
    let cube = object("cube")?;
    iface.add_collision_object(CollisionObject {
        id: table.clone(),
        shape: Shape::Cuboid {
            half_extents: [0.6, 0.6, 0.02],
        },
        pose: Pose::from_translation(0.3, 0.0, -0.02),
    })?;
    iface.disable_collision(link("link_1")?, table)?;
    iface.add_collision_object(CollisionObject {
        id: cube.clone(),
        shape: Shape::Cuboid {
            half_extents: [CUBE_HALF; 3],
        },
        pose: Pose::from_translation(0.4, 0.0, CUBE_HALF),
    })?;
    iface.disable_collision(link("link_6")?, cube)?;
    Ok(())
}

/// Picks the cube up at `from` and puts it down at `to` (table-plane x, y).
pub struct PickPlaceDemo {
    pub from: [f64; 2],
    pub to: [f64; 2],
}

impl Default for PickPlaceDemo {
    fn default() -> Self {
        Self {
            from: [0.4, 0.0],
            to: [0.3, 0.2],
        }
    }
}

impl PickPlaceDemo {
    fn request(&self, [x, y]: [f64; 2], gripper_close: bool) -> MoveResult<PickPlaceRequest> {
        Ok(PickPlaceRequest {
            pose_above: tool_down(x, y, APPROACH_HEIGHT),
            pose_grip: tool_down(x, y, 2.0 * CUBE_HALF),
            gripper_close,
            object: Some(object("cube")?),
        })
    }
}

#[async_trait]
impl Job for PickPlaceDemo {
    async fn run(&self, ctx: &JobContext) -> MoveResult {
        let iface = ctx.iface();

        ctx.checkpoint()?;
        iface
            .move_joints_srv(MoveJointsRequest {
                joints: JointValues::new(READY.to_vec()),
            })
            .await
            .into_result()?;

        ctx.checkpoint()?;
        info!(from = ?self.from, "Picking");
        iface
            .pick_place_srv(self.request(self.from, true)?)
            .await
            .into_result()?;

        ctx.checkpoint()?;
        info!(to = ?self.to, "Placing");
        iface
            .pick_place_srv(self.request(self.to, false)?)
            .await
            .into_result()?;

        ctx.checkpoint()?;
        iface.reset_to_home().await
    }
}
