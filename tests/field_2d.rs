use std::sync::Arc;

use bevy_math::{Vec2, Vec3};
use odometry_view::prelude::*;
use odometry_view::transform::{CanvasTransform, Padding};
use odometry_view::two_d::FieldEvent;
use odometry_view::two_d::canvas::DrawList;
use odometry_view::two_d::render::HoverToken;
use odometry_view::two_d::tessellate::tessellate;

fn view() -> Odometry2d {
    let config = Field2dConfig {
        padding: Padding::uniform(0.0),
        ..Default::default()
    };
    let mut view = Odometry2d::new(
        ViewBase::new(Vec2::new(1000.0, 500.0), 1.0, HintBoard::shared()),
        config,
        Arc::new(StaticTheme::dark()),
    );
    view.set_field(Some(Arc::new(FieldDefinition {
        name: "Plain".into(),
        model_path: None,
        image_path: None,
        size: Vec2::new(10.0, 5.0),
        rotations: Vec::new(),
        position: Vec3::ZERO,
    })));
    view.events().drain();
    view
}

#[test]
fn target_is_hovered_only_inside_its_box() {
    let mut view = view();
    let t = view.transform();
    let center = Vec2::new(5.0, 2.5);
    let target = view
        .add_robot(Robot::new(ShapeKind::Target, Vec2::ONE), center)
        .unwrap();

    view.set_pointer(Some(t.world_to_page(center)));
    view.render(&mut DrawList::new());
    assert_eq!(view.hovered(), Some((target, HoverToken::Main)));

    view.set_pointer(Some(t.world_to_page(center + Vec2::splat(0.6))));
    view.render(&mut DrawList::new());
    assert_eq!(view.hovered(), None);
}

#[test]
fn rendered_frame_tessellates() {
    let mut view = view();
    view.add_robot(Robot::new(ShapeKind::Robot, Vec2::ONE), Vec2::new(2.0, 2.0))
        .unwrap();
    view.add_obstacle(Obstacle::new(0.5), Vec2::new(7.0, 3.0)).unwrap();

    let mut canvas = DrawList::new();
    view.render(&mut canvas);
    let frame = tessellate(&canvas, 0.25).unwrap();
    assert!(frame.triangle_count() > 0);
}

#[test]
fn robot_pose_round_trips_through_the_tree() {
    let mut view = view();
    let robot = view
        .add_robot(Robot::new(ShapeKind::Robot, Vec2::ONE), Vec2::new(1.0, 1.0))
        .unwrap();
    let pose = Pose2d::new(4.0, 3.0, 1.25);
    assert!(view.set_robot_pose(robot, pose));
    let back = view.robot_pose(robot).unwrap();
    assert!(back.translation.abs_diff_eq(pose.translation, 1e-5));
    assert!((back.rotation - pose.rotation).abs() < 1e-5);

    assert!(view.remove(robot));
    assert!(view.robot_pose(robot).is_none());
    assert!(!view.set_robot_pose(robot, pose));
}

#[test]
fn wheel_zoom_then_reset_restores_fit() {
    let mut view = view();
    let fit = view.transform();
    view.zoom_by(3.0, Vec2::new(100.0, 400.0));
    view.pan_by(Vec2::new(25.0, -10.0));
    assert_ne!(view.transform().world_to_page(Vec2::ZERO), fit.world_to_page(Vec2::ZERO));

    view.reset_view();
    let reset = view.transform();
    assert!(
        reset
            .world_to_page(Vec2::new(3.0, 4.0))
            .abs_diff_eq(fit.world_to_page(Vec2::new(3.0, 4.0)), 1e-3)
    );
    assert!(
        view.events()
            .drain()
            .iter()
            .all(|e| matches!(e, FieldEvent::ViewChanged { .. }))
    );
}

#[test]
fn coordinate_conversions_round_trip() {
    let t = CanvasTransform::new(2.0, Vec2::new(800.0, 450.0), Padding::default(), Vec2::new(16.54, 8.07));
    for world in [Vec2::ZERO, Vec2::new(16.54, 8.07), Vec2::new(3.3, -1.2)] {
        assert!(t.canvas_to_world(t.world_to_canvas(world)).abs_diff_eq(world, 1e-4));
    }
    for page in [Vec2::ZERO, Vec2::new(400.0, 225.0), Vec2::new(-12.0, 900.0)] {
        assert!(t.page_to_canvas(t.canvas_to_page(page)).abs_diff_eq(page, 1e-3));
    }
}
