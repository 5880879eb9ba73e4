use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use nalgebra::{Quaternion, Unit};

use crate::columns::{self, ColumnInfo, ColumnSchema, TransformType};
use crate::config::{FrameConfig, Quat, Vec3};
use crate::error::{Error, Result};
use crate::skeleton::{sanitize_frame_name, FrameId, Pose, Skeleton};

const COLUMNS_MARKER: &str = "COLUMNS:";
const DATA_MARKER: &str = "DATA:";
const DATA_FROM_MARKER: &str = "DATA_FROM:";

/// Above this |dot| slerp degrades to a normalized lerp.
const SLERP_LINEAR_THRESHOLD: f32 = 0.9995;

/// Slack when comparing row spacing against the decimation period.
const DECIMATION_EPSILON: f64 = 1.0e-6;

#[derive(Debug, Clone)]
pub struct AnimationOptions {
    /// Reject defective data rows instead of skipping them.
    pub strict: bool,
    /// Drop rows closer together than `1 / frames_per_second`.
    pub frames_per_second: Option<f32>,
    /// Force CSV tokenizing on or off; by default it follows the `.csv` extension.
    pub csv: Option<bool>,
    pub looping: bool,
}

impl Default for AnimationOptions {
    fn default() -> Self {
        Self {
            strict: true,
            frames_per_second: None,
            csv: None,
            looping: false,
        }
    }
}

/// Spherical linear interpolation along the shortest arc.
pub fn slerp(from: &Quat, to: &Quat, fraction: f32) -> Quat {
    let start = from.coords;
    let mut end = to.coords;
    let mut dot = start.dot(&end);
    if dot < 0.0 {
        end = -end;
        dot = -dot;
    }

    if dot > SLERP_LINEAR_THRESHOLD {
        return Quat::new_normalize(Quaternion::from_vector(start + (end - start) * fraction));
    }

    let theta_0 = dot.acos();
    let theta = theta_0 * fraction;
    let sin_theta_0 = theta_0.sin();
    let s0 = (theta_0 - theta).sin() / sin_theta_0;
    let s1 = theta.sin() / sin_theta_0;

    Quat::new_normalize(Quaternion::from_vector(start * s0 + end * s1))
}

impl Pose {
    pub fn interpolate(&self, other: &Self, fraction: f32) -> Self {
        Self {
            translation: self.translation.lerp(&other.translation, fraction),
            rotation_angles: self.rotation_angles.lerp(&other.rotation_angles, fraction),
            rotation: slerp(&self.rotation, &other.rotation, fraction),
            scaling: self.scaling.lerp(&other.scaling, fraction),
        }
    }
}

/// All frame poses sampled at one timestamp, indexed by track.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyFrame {
    pub timestamp: f32,
    pub poses: Vec<Pose>,
}

impl KeyFrame {
    pub fn interpolate(&self, other: &Self, fraction: f32) -> Self {
        Self {
            timestamp: self.timestamp + fraction * (other.timestamp - self.timestamp),
            poses: self
                .poses
                .iter()
                .zip(&other.poses)
                .map(|(start, end)| start.interpolate(end, fraction))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub frame_name: String,
    /// Line of the first column naming the frame.
    pub line: usize,
}

/// Per-row accumulation of every column that targets one track.
#[derive(Debug, Clone)]
struct PoseBuilder {
    translation: Vec3,
    rotation_angles: Vec3,
    rotation: Quat,
    scaling: Vec3,
    scaled: [bool; 3],
}

impl Default for PoseBuilder {
    fn default() -> Self {
        Self {
            translation: Vec3::zeros(),
            rotation_angles: Vec3::zeros(),
            rotation: Quat::identity(),
            scaling: Vec3::zeros(),
            scaled: [false; 3],
        }
    }
}

impl PoseBuilder {
    /// Rotations compose in column order.
    fn apply(&mut self, transform: TransformType, axis: &Vec3, value: f32) {
        match transform {
            TransformType::Translation => self.translation += axis * value,
            TransformType::Rotation => {
                self.rotation_angles += axis * value;
                self.rotation *= Quat::from_axis_angle(&Unit::new_normalize(*axis), value.to_radians());
            }
            TransformType::Scale => {
                self.scaling += axis * value;
                for (scaled, component) in self.scaled.iter_mut().zip(axis.iter()) {
                    *scaled |= *component != 0.0;
                }
            }
        }
    }

    fn build(self) -> Pose {
        let scaling = Vec3::from_fn(|i, _| if self.scaled[i] { self.scaling[i] } else { 1.0 });

        Pose {
            translation: self.translation,
            rotation_angles: self.rotation_angles,
            rotation: self.rotation,
            scaling,
        }
    }
}

#[derive(Debug, Clone)]
struct ChannelSlot {
    column: usize,
    track: usize,
    transform: TransformType,
    axis: Vec3,
}

#[derive(Debug, Clone)]
struct SourceLine {
    line: usize,
    text: String,
}

fn read_lines(path: &Path) -> Result<Vec<SourceLine>> {
    let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    Ok(text
        .lines()
        .enumerate()
        .filter_map(|(i, line)| {
            let line_text = columns::strip_comments(line).trim();
            (!line_text.is_empty()).then(|| SourceLine {
                line: i + 1,
                text: line_text.to_string(),
            })
        })
        .collect())
}

fn has_csv_extension(path: &Path) -> bool {
    path.extension().is_some_and(|extension| extension.eq_ignore_ascii_case("csv"))
}

fn resolve_data_path(animation_path: &Path, data_path: &str) -> PathBuf {
    let data_path = Path::new(data_path.trim());
    if data_path.is_absolute() {
        return data_path.to_path_buf();
    }

    match animation_path.parent() {
        Some(directory) => directory.join(data_path),
        None => data_path.to_path_buf(),
    }
}

/// Resolved track-to-frame mapping of an animation against one skeleton.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimationBinding {
    frames: Vec<FrameId>,
}

impl AnimationBinding {
    pub fn frames(&self) -> &[FrameId] {
        &self.frames
    }

    /// Writes the keyframe's poses into the bound frames.
    pub fn apply(&self, keyframe: &KeyFrame, skeleton: &mut Skeleton) {
        for (pose, &frame) in keyframe.poses.iter().zip(&self.frames) {
            skeleton.frame_mut(frame).pose = pose.clone();
        }
    }
}

#[derive(Debug, Clone)]
pub struct Animation {
    source: Option<PathBuf>,
    schema: ColumnSchema,
    tracks: Vec<Track>,
    keyframes: Vec<KeyFrame>,
    duration: f32,
    looping: bool,
    current_time: f32,
}

impl Animation {
    /// An empty animation driving the given frames, for building tracks in code.
    pub fn new(frame_names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            source: None,
            schema: ColumnSchema::new(),
            tracks: frame_names
                .into_iter()
                .map(|name| Track {
                    frame_name: name.into(),
                    line: 0,
                })
                .collect(),
            keyframes: Vec::new(),
            duration: 0.0,
            looping: false,
            current_time: 0.0,
        }
    }

    pub fn load(path: &Path, options: &AnimationOptions) -> Result<Self> {
        Self::load_with_config(path, &FrameConfig::default(), options)
    }

    pub fn load_with_config(path: &Path, config: &FrameConfig, options: &AnimationOptions) -> Result<Self> {
        info!("Loading animation {}", path.display());
        if let Some(fps) = options.frames_per_second {
            info!("Reading input using: {} frames per second", fps);
        }

        let csv_mode = options.csv.unwrap_or_else(|| has_csv_extension(path));
        let mut schema = ColumnSchema::new();
        let mut found_columns = false;
        let mut found_data = false;
        let mut in_columns = false;
        let mut data_marker_line = 0;
        let mut data_path = path.to_path_buf();
        let mut data_lines = Vec::new();

        for source_line in read_lines(path)? {
            let text = source_line.text.as_str();
            if let Some(rest) = text.strip_prefix(COLUMNS_MARKER) {
                if found_data {
                    return Err(Error::Column {
                        path: path.to_path_buf(),
                        line: source_line.line,
                        message: "COLUMNS section must precede the DATA section".to_string(),
                    });
                }
                found_columns = true;
                in_columns = true;
                if !rest.trim().is_empty() {
                    schema.push_line(rest, source_line.line, csv_mode, path)?;
                }
                continue;
            }

            if found_data {
                data_lines.push(source_line);
                continue;
            }

            if text.starts_with(DATA_MARKER) {
                found_data = true;
                in_columns = false;
                data_marker_line = source_line.line;
                continue;
            }

            if let Some(rest) = text.strip_prefix(DATA_FROM_MARKER) {
                data_path = resolve_data_path(path, rest);
                info!("Loading animation data from {}", data_path.display());
                data_lines = read_lines(&data_path)?
                    .into_iter()
                    .filter(|line| !line.text.starts_with(DATA_MARKER))
                    .collect();
                found_data = true;
                data_marker_line = source_line.line;
                break;
            }

            if in_columns {
                schema.push_line(text, source_line.line, csv_mode, path)?;
            } else {
                warn!("{}:{}: ignoring line outside of COLUMNS and DATA sections", path.display(), source_line.line);
            }
        }

        if !found_columns {
            return Err(Error::MissingSection {
                path: path.to_path_buf(),
                section: "COLUMNS:",
            });
        }
        if !found_data {
            return Err(Error::MissingSection {
                path: path.to_path_buf(),
                section: "DATA:",
            });
        }
        schema.validate(path, data_marker_line)?;

        let mut animation = Self {
            source: Some(path.to_path_buf()),
            schema,
            tracks: Vec::new(),
            keyframes: Vec::new(),
            duration: 0.0,
            looping: options.looping,
            current_time: 0.0,
        };

        let slots = animation.build_tracks(config);
        animation.read_data(&data_path, &data_lines, &slots, csv_mode, options)?;

        Ok(animation)
    }

    fn build_tracks(&mut self, config: &FrameConfig) -> Vec<ChannelSlot> {
        let mut slots = Vec::new();
        for (column, channel) in self.schema.channels() {
            let track = match self.tracks.iter().position(|track| track.frame_name == channel.frame_name) {
                Some(track) => track,
                None => {
                    self.tracks.push(Track {
                        frame_name: channel.frame_name.clone(),
                        line: channel.line,
                    });
                    self.tracks.len() - 1
                }
            };

            let authored = channel.axis.vector();
            let axis = match channel.transform {
                TransformType::Scale => config.scale_to_internal(&authored),
                _ => config.to_internal(&authored),
            };
            slots.push(ChannelSlot {
                column,
                track,
                transform: channel.transform,
                axis,
            });
        }

        slots
    }

    fn read_data(
        &mut self,
        data_path: &Path,
        data_lines: &[SourceLine],
        slots: &[ChannelSlot],
        csv_mode: bool,
        options: &AnimationOptions,
    ) -> Result<()> {
        let period = options.frames_per_second.filter(|fps| *fps > 0.0).map(|fps| 1.0 / fps as f64);
        // newest valid row, and the newest one that was kept
        let mut previous_timestamp: Option<f32> = None;
        let mut kept_timestamp: Option<f32> = None;
        // most recent row dropped by decimation; kept if nothing valid follows
        let mut held_back: Option<KeyFrame> = None;
        let mut skipped = 0usize;
        let mut rejected = 0usize;

        for source_line in data_lines {
            let row = self
                .parse_timestamp(data_path, source_line, csv_mode)
                .and_then(|(timestamp, tokens)| {
                    if let Some(previous) = previous_timestamp {
                        if timestamp < previous {
                            return Err(Error::Timestamp {
                                path: data_path.to_path_buf(),
                                line: source_line.line,
                                timestamp,
                                previous,
                            });
                        }
                    }
                    self.parse_keyframe(data_path, source_line, timestamp, &tokens, slots)
                });

            let keyframe = match row {
                Ok(keyframe) => keyframe,
                Err(e) if !options.strict => {
                    warn!("Skipping row: {}", e);
                    rejected += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            previous_timestamp = Some(keyframe.timestamp);

            if let (Some(period), Some(kept)) = (period, kept_timestamp) {
                if keyframe.timestamp != 0.0 && ((keyframe.timestamp - kept) as f64) + DECIMATION_EPSILON < period {
                    if held_back.replace(keyframe).is_some() {
                        skipped += 1;
                    }
                    continue;
                }
            }

            if held_back.take().is_some() {
                skipped += 1;
            }
            kept_timestamp = Some(keyframe.timestamp);
            self.push_keyframe_unchecked(keyframe);
        }

        if let Some(keyframe) = held_back {
            self.push_keyframe_unchecked(keyframe);
        }

        if options.frames_per_second.is_some() {
            info!("Read {} frames (skipped {} frames)", self.keyframes.len(), skipped);
        }
        if rejected > 0 {
            warn!("{}: rejected {} malformed rows", data_path.display(), rejected);
        }

        Ok(())
    }

    fn parse_timestamp(&self, data_path: &Path, source_line: &SourceLine, csv_mode: bool) -> Result<(f32, Vec<String>)> {
        let tokens = columns::tokenize(&source_line.text, csv_mode).map_err(|message| Error::Column {
            path: data_path.to_path_buf(),
            line: source_line.line,
            message,
        })?;

        if tokens.len() < self.schema.len() {
            return Err(Error::ColumnCount {
                path: data_path.to_path_buf(),
                line: source_line.line,
                found: tokens.len(),
                expected: self.schema.len(),
            });
        }

        let timestamp = parse_value(data_path, source_line.line, 0, &tokens[0])?;
        Ok((timestamp, tokens))
    }

    fn parse_keyframe(
        &self,
        data_path: &Path,
        source_line: &SourceLine,
        timestamp: f32,
        tokens: &[String],
        slots: &[ChannelSlot],
    ) -> Result<KeyFrame> {
        let mut builders = vec![PoseBuilder::default(); self.tracks.len()];
        for slot in slots {
            let value = parse_value(data_path, source_line.line, slot.column, &tokens[slot.column])?;
            let value = match &self.schema.columns()[slot.column] {
                ColumnInfo::Channel(channel) => channel.normalize_value(value),
                _ => value,
            };
            builders[slot.track].apply(slot.transform, &slot.axis, value);
        }

        Ok(KeyFrame {
            timestamp,
            poses: builders.into_iter().map(PoseBuilder::build).collect(),
        })
    }

    fn push_keyframe_unchecked(&mut self, keyframe: KeyFrame) {
        if keyframe.timestamp > self.duration {
            self.duration = keyframe.timestamp;
        }
        self.keyframes.push(keyframe);
    }

    /// Appends a keyframe; timestamps must not decrease.
    pub fn push_keyframe(&mut self, keyframe: KeyFrame) -> Result<()> {
        if keyframe.poses.len() != self.tracks.len() {
            return Err(Error::Configuration(format!(
                "keyframe has {} poses but the animation has {} tracks",
                keyframe.poses.len(),
                self.tracks.len()
            )));
        }
        if let Some(last) = self.keyframes.last() {
            if keyframe.timestamp < last.timestamp {
                return Err(Error::Configuration(format!(
                    "keyframe at {} precedes previous keyframe at {}",
                    keyframe.timestamp, last.timestamp
                )));
            }
        }

        self.push_keyframe_unchecked(keyframe);
        Ok(())
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn schema(&self) -> &ColumnSchema {
        &self.schema
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn track_index(&self, frame_name: &str) -> Option<usize> {
        self.tracks.iter().position(|track| track.frame_name == frame_name)
    }

    pub fn keyframes(&self) -> &[KeyFrame] {
        &self.keyframes
    }

    pub fn pose_of<'a>(&self, keyframe: &'a KeyFrame, frame_name: &str) -> Option<&'a Pose> {
        self.track_index(frame_name).and_then(|track| keyframe.poses.get(track))
    }

    pub const fn duration(&self) -> f32 {
        self.duration
    }

    pub const fn looping(&self) -> bool {
        self.looping
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub const fn current_time(&self) -> f32 {
        self.current_time
    }

    /// Wraps (looping) or clamps `time` into `[0, duration]`.
    pub fn normalize_time(&self, time: f32) -> f32 {
        if self.duration <= 0.0 || time <= 0.0 {
            return 0.0;
        }
        if time <= self.duration {
            return time;
        }
        if !self.looping {
            return self.duration;
        }

        match time % self.duration {
            wrapped if wrapped == 0.0 => self.duration,
            wrapped => wrapped,
        }
    }

    pub fn set_time(&mut self, time: f32) {
        self.current_time = self.normalize_time(time);
    }

    pub fn advance(&mut self, delta: f32) {
        self.set_time(self.current_time + delta);
    }

    pub fn interpolate(&self, time: f32) -> KeyFrame {
        if self.keyframes.len() < 2 {
            return match self.keyframes.first() {
                Some(only) => only.clone(),
                None => KeyFrame {
                    timestamp: time,
                    poses: vec![Pose::default(); self.tracks.len()],
                },
            };
        }

        let mut index = 0;
        while index + 1 < self.keyframes.len() && self.keyframes[index + 1].timestamp <= time {
            index += 1;
        }
        let start = &self.keyframes[index];
        let end = self.keyframes.get(index + 1).unwrap_or(start);

        let span = end.timestamp - start.timestamp;
        if span == 0.0 {
            return start.clone();
        }

        let fraction = ((time - start.timestamp) / span).clamp(0.0, 1.0);
        start.interpolate(end, fraction)
    }

    pub fn current_keyframe(&self) -> KeyFrame {
        self.interpolate(self.current_time)
    }

    /// Resolves every track's frame name against `skeleton`.
    pub fn bind(&self, skeleton: &Skeleton) -> Result<AnimationBinding> {
        let path = self.source.clone().unwrap_or_default();
        let frames = self
            .tracks
            .iter()
            .map(|track| {
                sanitize_frame_name(&track.frame_name)
                    .ok()
                    .and_then(|name| skeleton.find(&name))
                    .ok_or_else(|| Error::UnknownFrame {
                        path: path.clone(),
                        line: track.line,
                        name: track.frame_name.clone(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!("Bound {} animation tracks", frames.len());
        Ok(AnimationBinding { frames })
    }
}

/// Parses a finite number; `nan` and `inf` are rejected.
fn parse_value(path: &Path, line: usize, column: usize, token: &str) -> Result<f32> {
    match token.parse::<f32>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(Error::Number {
            path: path.to_path_buf(),
            line,
            column,
            token: token.to_string(),
        }),
    }
}
