use std::fs;
use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use rigid_pose::animation::{Animation, AnimationOptions};
use rigid_pose::config::{Mat4, Quat, Vec3};
use rigid_pose::model::Model;
use rigid_pose::player::Scene;
use rigid_pose::segment::UnitCubeLoader;
use rigid_pose::FailureKind;

const MODEL: &str = r#"{
    "frames": [
        { "name": "PELVIS", "parent": "BASE" },
        { "name": "TORSO", "parent": "PELVIS", "parent_translation": [0, 1, 0] }
    ],
    "segments": [
        { "name": "torso", "frame": "TORSO", "mesh_filename": "body.obj:Torso", "dimensions": [0.5, 1.0, 0.25], "mesh_center": [0, 0.5, 0] }
    ]
}"#;

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn translation(matrix: &Mat4) -> Vec3 {
    matrix.fixed_view::<3, 1>(0, 3).into_owned()
}

fn torso_scene(dir: &Path) -> Scene {
    let model_path = write(dir, "model.json", MODEL);
    Scene::load(&model_path, &mut UnitCubeLoader).unwrap()
}

#[test]
fn parent_rotation_moves_child_offset() {
    let dir = TempDir::new().unwrap();
    let mut scene = torso_scene(dir.path());
    let animation_path = write(dir.path(), "turn.txt", "COLUMNS:\ntime, PELVIS:r:z\nDATA:\n0.0 0\n1.0 180\n");
    scene.load_animation(&animation_path, &AnimationOptions::default()).unwrap();

    scene.set_time(0.5);
    let keyframe = scene.update().unwrap();
    let pelvis_rotation = keyframe.poses[0].rotation;
    let quarter_turn = Quat::from_axis_angle(&Vec3::z_axis(), std::f32::consts::FRAC_PI_2);
    assert!(pelvis_rotation.angle_to(&quarter_turn) < 1.0e-5);

    let pelvis = translation(scene.frame_transform("PELVIS").unwrap());
    assert!(pelvis.norm() < 1.0e-6);
    let torso = translation(scene.frame_transform("TORSO").unwrap());
    assert!((torso - Vec3::new(-1.0, 0.0, 0.0)).norm() < 1.0e-5);

    // the segment is centered half a unit up the torso, which now points along -x
    let segment = translation(scene.segment_transform("torso").unwrap());
    assert!((segment - Vec3::new(-1.5, 0.0, 0.0)).norm() < 1.0e-5);
}

#[test]
fn csv_data_from_with_decimation() {
    let dir = TempDir::new().unwrap();
    fs::create_dir(dir.path().join("data")).unwrap();

    let mut data = String::from("# time, height\n");
    for i in 0..=20 {
        data.push_str(&format!("{},{}\n", i as f32 * 0.05, i as f32 * 0.1));
    }
    write(dir.path(), "data/samples.csv", &data);
    let animation_path = write(dir.path(), "lift.csv", "COLUMNS:\ntime,\"PELVIS:translation:y\"\nDATA_FROM: data/samples.csv\n");

    let options = AnimationOptions {
        frames_per_second: Some(4.0),
        ..AnimationOptions::default()
    };
    let model = Model::load(&write(dir.path(), "model.json", MODEL), &mut UnitCubeLoader).unwrap();
    let (animation, binding) = model.load_animation(&animation_path, &options).unwrap();

    let timestamps: Vec<_> = animation.keyframes().iter().map(|k| (k.timestamp * 100.0).round() as i32).collect();
    assert_eq!(timestamps, vec![0, 25, 50, 75, 100]);
    assert_eq!(animation.duration(), 1.0);
    assert_eq!(binding.frames(), &[model.skeleton().find("PELVIS").unwrap()]);

    let middle = animation.interpolate(0.6);
    let height = animation.pose_of(&middle, "PELVIS").unwrap().translation.y;
    assert!((height - 1.2).abs() < 1.0e-4);
}

#[test]
fn lenient_loading_skips_bad_rows_but_not_bad_columns() {
    let dir = TempDir::new().unwrap();
    let rows = "COLUMNS: time, PELVIS:t:x\nDATA:\n0 0\n0.5\n1 one\n2 2\n1.5 9\n";
    let path = write(dir.path(), "rows.txt", rows);

    let strict = Animation::load(&path, &AnimationOptions::default()).unwrap_err();
    assert_eq!(strict.line(), Some(4));

    let lenient = AnimationOptions {
        strict: false,
        ..AnimationOptions::default()
    };
    let animation = Animation::load(&path, &lenient).unwrap();
    let timestamps: Vec<_> = animation.keyframes().iter().map(|k| k.timestamp).collect();
    assert_eq!(timestamps, vec![0.0, 2.0]);

    let columns = write(dir.path(), "columns.txt", "COLUMNS: time, PELVIS:q:x\nDATA:\n0 0\n");
    let err = Animation::load(&columns, &lenient).unwrap_err();
    assert_eq!(err.kind(), FailureKind::Malformed);
    assert!(err.to_string().contains("columns.txt:1"));
}

#[test]
fn missing_data_file_is_resource_not_found() {
    let dir = TempDir::new().unwrap();
    let path = write(dir.path(), "anim.txt", "COLUMNS: time, PELVIS:t:x\nDATA_FROM: nowhere.txt\n");
    let err = Animation::load(&path, &AnimationOptions::default()).unwrap_err();
    assert_eq!(err.kind(), FailureKind::ResourceNotFound);
}

#[test]
fn converted_model_poses_identically() {
    let dir = TempDir::new().unwrap();
    let model = Model::load(&write(dir.path(), "model.json", MODEL), &mut UnitCubeLoader).unwrap();
    let toml_path = dir.path().join("model.toml");
    model.save(&toml_path).unwrap();

    let animation_path = write(dir.path(), "turn.txt", "COLUMNS: time, PELVIS:r:z, PELVIS:r:x\nDATA:\n0 0 0\n1 90 45\n");
    let mut transforms = Vec::new();
    for path in [dir.path().join("model.json"), toml_path] {
        let mut scene = Scene::load(&path, &mut UnitCubeLoader).unwrap();
        scene.load_animation(&animation_path, &AnimationOptions::default()).unwrap();
        scene.set_time(0.3);
        scene.update();
        transforms.push(*scene.segment_transform("torso").unwrap());
    }

    assert!((transforms[0] - transforms[1]).norm() < 1.0e-5);
}
