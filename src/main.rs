use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{arg, command, value_parser, Arg, ArgAction, ArgMatches, Command};

use rigid_pose::animation::{Animation, AnimationOptions};
use rigid_pose::model::Model;
use rigid_pose::player::Scene;
use rigid_pose::segment::UnitCubeLoader;
use rigid_pose::settings::Settings;

fn animation_args() -> [Arg; 5] {
    [
        arg!(--strict "Fail on any malformed data row instead of skipping it.").action(ArgAction::SetTrue),
        arg!(--lenient "Skip malformed data rows with a warning.").action(ArgAction::SetTrue).conflicts_with("strict"),
        arg!(--fps <FPS> "Drop data rows to approximate this many frames per second.").value_parser(value_parser!(f32)),
        arg!(--csv "Read the animation file as CSV regardless of its extension.").action(ArgAction::SetTrue),
        arg!(--"loop" "Wrap query times past the end of the animation instead of clamping them.").action(ArgAction::SetTrue),
    ]
}

fn animation_options(matches: &ArgMatches, settings: &Settings) -> AnimationOptions {
    let mut options = settings.animation_options();
    if matches.get_flag("strict") {
        options.strict = true;
    } else if matches.get_flag("lenient") {
        options.strict = false;
    }
    if let Some(fps) = matches.get_one::<f32>("fps") {
        options.frames_per_second = Some(*fps);
    }
    if matches.get_flag("csv") {
        options.csv = Some(true);
    }
    options.looping |= matches.get_flag("loop");
    options
}

fn init_logger(matches: &ArgMatches) {
    let level = match (matches.get_count("verbose"), matches.get_flag("quiet")) {
        (0, true) => "error",
        (0, false) => "warn",
        (1, _) => "info",
        (2, _) => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn format_vector(v: &nalgebra::Vector3<f32>) -> String {
    format!("({:>9.4}, {:>9.4}, {:>9.4})", v.x, v.y, v.z)
}

fn pose(matches: &ArgMatches, settings: &Settings) -> Result<()> {
    let model_path = matches.get_one::<PathBuf>("MODEL").unwrap();
    let options = animation_options(matches, settings);

    let mut scene = Scene::load(model_path, &mut UnitCubeLoader).context("Model")?;
    if let Some(animation_path) = matches.get_one::<PathBuf>("ANIMATION") {
        if options.strict {
            scene.load_animation(animation_path, &options).context("Animation")?;
        } else if !scene.try_load_animation(animation_path, &options) {
            eprintln!("Could not load {}, showing the rest pose", animation_path.display());
        }
    }

    let time = matches.get_one::<f32>("time").copied().unwrap_or(settings.time);
    scene.set_time(time);
    scene.update();

    let model = scene.model();
    let config = model.configuration();
    println!("t = {}", scene.current_time());
    for name in model.frame_names() {
        let Some(frame) = model.skeleton().frame_by_name(name) else { continue };
        let (roll, pitch, yaw) = frame.pose.rotation.euler_angles();
        println!(
            "{:<20} position {} pose angles {}",
            name,
            format_vector(&config.to_authored(&frame.world_translation())),
            format_vector(&nalgebra::Vector3::new(roll, pitch, yaw).map(f32::to_degrees)),
        );
    }

    if matches.get_flag("segments") {
        for segment in model.segments() {
            println!("{} ({})", segment.name, segment.mesh);
            for row in segment.render_matrix().row_iter() {
                println!("    [{:>9.4} {:>9.4} {:>9.4} {:>9.4}]", row[0], row[1], row[2], row[3]);
            }
        }
    }

    Ok(())
}

fn info(matches: &ArgMatches, settings: &Settings) -> Result<()> {
    let animation_path = matches.get_one::<PathBuf>("ANIMATION").unwrap();
    let options = animation_options(matches, settings);
    let animation = Animation::load(animation_path, &options).context("Animation")?;

    println!("Columns:");
    for (index, column) in animation.schema().columns().iter().enumerate() {
        println!("  {:>3}: {}", index, column);
    }
    println!("Frames: {}", animation.tracks().iter().map(|track| track.frame_name.as_str()).collect::<Vec<_>>().join(", "));
    println!("Keyframes: {}", animation.keyframes().len());
    println!("Duration: {}", animation.duration());

    Ok(())
}

fn convert(matches: &ArgMatches) -> Result<()> {
    let input_path = matches.get_one::<PathBuf>("INPUT").unwrap();
    let output_path = matches.get_one::<PathBuf>("OUTPUT").unwrap();

    let model = Model::load(input_path, &mut UnitCubeLoader).context("Input model")?;
    model.save(output_path).context("Output model")
}

fn main() -> Result<()> {
    let matches = command!()
        .arg(
            arg!(-c --config <SETTINGS> "The settings.toml file with default playback options. It is ignored if it does not exist.")
                .value_parser(value_parser!(PathBuf))
                .default_value("settings.toml")
                .global(true)
        )
        .arg(arg!(-v --verbose "Log more detail; repeat for more.").action(ArgAction::Count).global(true))
        .arg(arg!(-q --quiet "Only log errors.").action(ArgAction::SetTrue).global(true))
        .subcommand_required(true)
        .subcommand(
            Command::new("pose")
                .about("Print the world transform of every frame at a point in time")
                .arg(arg!(<MODEL> "The model file (.json or .toml).").value_parser(value_parser!(PathBuf)))
                .arg(arg!([ANIMATION] "The animation file to apply.").value_parser(value_parser!(PathBuf)))
                .arg(arg!(-t --time <TIME> "Time in seconds to sample the animation at.").value_parser(value_parser!(f32)))
                .arg(arg!(-s --segments "Also print the render matrix of every segment.").action(ArgAction::SetTrue))
                .args(animation_args())
        )
        .subcommand(
            Command::new("info")
                .about("Describe the columns and keyframes of an animation file")
                .arg(arg!(<ANIMATION> "The animation file to inspect.").value_parser(value_parser!(PathBuf)))
                .args(animation_args())
        )
        .subcommand(
            Command::new("convert")
                .about("Re-save a model file, converting between .json and .toml")
                .arg(arg!(<INPUT> "The model file to read.").value_parser(value_parser!(PathBuf)))
                .arg(arg!(<OUTPUT> "The model file to write.").value_parser(value_parser!(PathBuf)))
        )
        .get_matches()
        ;

    init_logger(&matches);

    let settings_path = matches.get_one::<PathBuf>("config").unwrap();
    let settings = Settings::load_or_default(settings_path).context("settings.toml")?;

    match matches.subcommand() {
        Some(("pose", sub_matches)) => pose(sub_matches, &settings),
        Some(("info", sub_matches)) => info(sub_matches, &settings),
        Some(("convert", sub_matches)) => convert(sub_matches),
        _ => unreachable!("a subcommand is required"),
    }
}
