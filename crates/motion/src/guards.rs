//! Proximity and collision guards.
//!
//! Guards run before planning. They are cheap, purely geometric predicates
//! that fail fast on degenerate or colliding goals, so the planner never sees
//! an input it may mishandle.

use tracing::debug;

use crate::{
    CollisionChecker, Contact, ErrorKind, JointValues, Kinematics, MoveError, MoveResult,
    PlanningScene, Pose,
};

/// Returns `true` if every joint of `goal` is within `epsilon` of `start`.
///
/// A delta equal to `epsilon` is *not* too close, and neither is a NaN delta.
/// Configurations of different length are never too close.
pub fn joints_goal_too_close(start: &JointValues, goal: &JointValues, epsilon: f64) -> bool {
    start.len() == goal.len()
        && start
            .as_slice()
            .iter()
            .zip(goal.as_slice())
            .all(|(a, b)| (a - b).abs() < epsilon)
}

/// Returns `true` if `goal` is within `linear_epsilon` of `start` in position
/// *and* within `angular_epsilon` in orientation.
pub fn pose_goal_too_close(
    start: &Pose,
    goal: &Pose,
    linear_epsilon: f64,
    angular_epsilon: f64,
) -> bool {
    start.distance_to(goal) < linear_epsilon && start.angle_to(goal) < angular_epsilon
}

/// Returns the contacts at `goal` that the scene's collision matrix does not exempt.
pub fn goal_collisions(
    checker: &dyn CollisionChecker,
    scene: &PlanningScene,
    goal: &JointValues,
) -> Vec<Contact> {
    let contacts = checker.contacts(scene, goal);
    scene.disallowed(&contacts).into_iter().cloned().collect()
}

/// Returns `true` if the robot at `goal` touches any body pair the collision
/// matrix does not exempt.
pub fn joints_goal_in_collision(
    checker: &dyn CollisionChecker,
    scene: &PlanningScene,
    goal: &JointValues,
) -> bool {
    let collisions = goal_collisions(checker, scene, goal);
    if let Some(first) = collisions.first() {
        debug!(
            a = %first.a,
            b = %first.b,
            depth = first.depth,
            count = collisions.len(),
            "Goal configuration in collision"
        );
        return true;
    }
    false
}

/// Solves IK for `goal` (seeded with `seed`) and checks the solution like
/// [`joints_goal_in_collision`].
///
/// Returns the solution alongside the verdict so callers plan to the same
/// configuration that was checked.
pub fn pose_goal_in_collision(
    kinematics: &dyn Kinematics,
    checker: &dyn CollisionChecker,
    scene: &PlanningScene,
    goal: &Pose,
    seed: &JointValues,
) -> MoveResult<(bool, JointValues)> {
    let solution = kinematics.inverse(goal, seed).ok_or_else(|| {
        MoveError::new(
            ErrorKind::NoIkSolution,
            "no inverse kinematics solution for the goal pose",
        )
    })?;
    let in_collision = joints_goal_in_collision(checker, scene, &solution);
    Ok((in_collision, solution))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{link, FakeChecker, FakeKinematics};

    #[test]
    fn joints_below_epsilon_are_too_close() {
        let start = JointValues::zeros(6);
        let goal = JointValues::new(vec![0.0001, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert!(joints_goal_too_close(&start, &goal, 0.001));
    }

    #[test]
    fn any_joint_at_or_above_epsilon_is_not_too_close() {
        let start = JointValues::zeros(3);
        for i in 0..3 {
            let mut v = vec![0.0005; 3];
            v[i] = 0.001;
            assert!(!joints_goal_too_close(&start, &JointValues::new(v), 0.001));
        }
        let far = JointValues::new(vec![0.5, 0.0, 0.0]);
        assert!(!joints_goal_too_close(&start, &far, 0.001));
    }

    #[test]
    fn non_finite_goal_is_not_too_close() {
        let start = JointValues::zeros(6);
        for bad in [f64::NAN, f64::INFINITY] {
            let goal = JointValues::new(vec![bad, 0.0, 0.0, 0.0, 0.0, 0.0]);
            assert!(!joints_goal_too_close(&start, &goal, 0.001));
        }
    }

    #[test]
    fn mismatched_lengths_are_not_too_close() {
        assert!(!joints_goal_too_close(
            &JointValues::zeros(6),
            &JointValues::zeros(5),
            1.0
        ));
    }

    #[test]
    fn pose_needs_both_position_and_orientation_close() {
        let start = Pose::from_translation(0.3, 0.0, 0.5);
        let near = Pose::from_translation(0.30001, 0.0, 0.5);
        assert!(pose_goal_too_close(&start, &near, 1e-4, 1e-3));

        let rotated = Pose::from_xyz_rpy(0.3, 0.0, 0.5, 0.0, 0.0, 0.1);
        assert!(!pose_goal_too_close(&start, &rotated, 1e-4, 1e-3));

        let moved = Pose::from_translation(0.31, 0.0, 0.5);
        assert!(!pose_goal_too_close(&start, &moved, 1e-4, 1e-3));
    }

    #[test]
    fn disallowed_pair_collides_until_allowed() {
        let checker = FakeChecker::colliding_when_first_joint_above(0.4, "link_1", "link_3");
        let mut scene = FakeKinematics::default().scene();
        let goal = JointValues::new(vec![0.5, 0.0, 0.0, 0.0, 0.0, 0.0]);

        assert!(joints_goal_in_collision(&checker, &scene, &goal));
        scene.allow_collision(link("link_1"), link("link_3"));
        assert!(!joints_goal_in_collision(&checker, &scene, &goal));
    }

    #[test]
    fn pose_goal_checks_the_ik_solution() {
        let kinematics = FakeKinematics::default();
        let checker = FakeChecker::colliding_when_first_joint_above(0.4, "link_1", "link_3");
        let scene = kinematics.scene();
        let seed = JointValues::zeros(6);

        let (hit, solution) =
            pose_goal_in_collision(&kinematics, &checker, &scene, &Pose::from_translation(0.5, 0.0, 0.0), &seed)
                .unwrap();
        assert!(hit);
        assert_eq!(solution[0], 0.5);

        let (hit, _) =
            pose_goal_in_collision(&kinematics, &checker, &scene, &Pose::from_translation(0.1, 0.0, 0.0), &seed)
                .unwrap();
        assert!(!hit);
    }

    #[test]
    fn unreachable_pose_is_no_ik_solution() {
        let kinematics = FakeKinematics::default();
        let checker = FakeChecker::default();
        let scene = kinematics.scene();
        let err = pose_goal_in_collision(
            &kinematics,
            &checker,
            &scene,
            &Pose::from_translation(10.0, 0.0, 0.0),
            &JointValues::zeros(6),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoIkSolution);
    }
}
