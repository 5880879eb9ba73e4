//! The `COLUMNS:` section of an animation file.
//!
//! Each column is either the time column, an ignored `empty` column, or a
//! `frame:type:axis[:unit]` channel such as `PELVIS:rotation:-z:rad`.

use std::fmt;
use std::path::Path;

use log::{debug, warn};

use crate::config::Vec3;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformType {
    Rotation,
    Translation,
    Scale,
}

impl TransformType {
    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "rotation" | "r" => Some(Self::Rotation),
            "translation" | "t" => Some(Self::Translation),
            "scale" | "s" => Some(Self::Scale),
            _ => None,
        }
    }
}

impl fmt::Display for TransformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rotation => "rotation",
            Self::Translation => "translation",
            Self::Scale => "scale",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
    NegativeX,
    NegativeY,
    NegativeZ,
}

impl Axis {
    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "x" => Some(Self::X),
            "y" => Some(Self::Y),
            "z" => Some(Self::Z),
            "-x" => Some(Self::NegativeX),
            "-y" => Some(Self::NegativeY),
            "-z" => Some(Self::NegativeZ),
            _ => None,
        }
    }

    pub fn vector(self) -> Vec3 {
        match self {
            Self::X => Vec3::x(),
            Self::Y => Vec3::y(),
            Self::Z => Vec3::z(),
            Self::NegativeX => -Vec3::x(),
            Self::NegativeY => -Vec3::y(),
            Self::NegativeZ => -Vec3::z(),
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::X => "x",
            Self::Y => "y",
            Self::Z => "z",
            Self::NegativeX => "-x",
            Self::NegativeY => "-y",
            Self::NegativeZ => "-z",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AngleUnit {
    #[default]
    Degrees,
    Radians,
}

impl AngleUnit {
    fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "r" | "rad" | "radian" | "radians" => Self::Radians,
            "d" | "deg" | "degree" | "degrees" => Self::Degrees,
            other => {
                warn!("Unknown angle unit '{}', assuming degrees", other);
                Self::Degrees
            }
        }
    }
}

/// A column that feeds one axis of one frame's transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub frame_name: String,
    pub transform: TransformType,
    pub axis: Axis,
    pub unit: AngleUnit,
    /// Line of the COLUMNS section the channel was declared on.
    pub line: usize,
}

impl Channel {
    /// Value as stored internally: rotations are kept in degrees.
    pub fn normalize_value(&self, value: f32) -> f32 {
        if self.transform == TransformType::Rotation && self.unit == AngleUnit::Radians {
            value.to_degrees()
        } else {
            value
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.frame_name, self.transform, self.axis)?;
        if self.unit == AngleUnit::Radians {
            f.write_str(":rad")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnInfo {
    Time,
    Empty,
    Channel(Channel),
}

impl fmt::Display for ColumnInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Time => f.write_str("time"),
            Self::Empty => f.write_str("empty"),
            Self::Channel(channel) => channel.fmt(f),
        }
    }
}

/// Parses a single column token. The error is a message without location.
pub fn parse_column(token: &str, line: usize) -> std::result::Result<ColumnInfo, String> {
    let token = token.trim();
    match token.to_lowercase().as_str() {
        "time" => return Ok(ColumnInfo::Time),
        "empty" => return Ok(ColumnInfo::Empty),
        _ => (),
    }

    let fields: Vec<_> = token.split(':').map(str::trim).collect();
    if fields.len() < 3 || fields.len() > 4 {
        return Err(format!("Error parsing column definition '{}'", token));
    }

    let Some(transform) = TransformType::parse(fields[1]) else {
        return Err(format!("Unknown transform type '{}'", fields[1]));
    };
    let Some(axis) = Axis::parse(fields[2]) else {
        return Err(format!("Unknown axis name '{}'", fields[2]));
    };
    let unit = fields.get(3).map(|unit| AngleUnit::parse(unit)).unwrap_or_default();

    Ok(ColumnInfo::Channel(Channel {
        frame_name: fields[0].to_string(),
        transform,
        axis,
        unit,
        line,
    }))
}

pub fn strip_comments(line: &str) -> &str {
    match line.find('#') {
        Some(index) => &line[..index],
        None => line,
    }
}

fn tokenize_csv(line: &str) -> std::result::Result<Vec<String>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(line.as_bytes());

    match reader.records().next() {
        Some(record) => Ok(record?.iter().filter(|field| !field.is_empty()).map(str::to_string).collect()),
        None => Ok(Vec::new()),
    }
}

/// Splits a line into tokens; separators are commas and whitespace, or CSV
/// quoting rules in CSV mode.
pub fn tokenize(line: &str, csv_mode: bool) -> std::result::Result<Vec<String>, String> {
    if csv_mode {
        return tokenize_csv(line).map_err(|e| e.to_string());
    }

    Ok(line
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect())
}

/// Ordered column list, filled line by line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnSchema {
    columns: Vec<ColumnInfo>,
}

impl ColumnSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_line(&mut self, text: &str, line: usize, csv_mode: bool, path: &Path) -> Result<()> {
        let column_error = |message: String| Error::Column {
            path: path.to_path_buf(),
            line,
            message,
        };

        for token in tokenize(text, csv_mode).map_err(column_error)? {
            let column = parse_column(&token, line).map_err(column_error)?;
            if column == ColumnInfo::Time && !self.columns.is_empty() {
                return Err(column_error(format!(
                    "first column must be time column (it was column {})",
                    self.columns.len()
                )));
            }

            debug!("Adding column {}: {}", self.columns.len(), column);
            self.columns.push(column);
        }

        Ok(())
    }

    /// Checks that the schema has exactly one time column, in front.
    pub fn validate(&self, path: &Path, line: usize) -> Result<()> {
        if self.columns.first() != Some(&ColumnInfo::Time) {
            return Err(Error::Column {
                path: path.to_path_buf(),
                line,
                message: "first column must be time column".to_string(),
            });
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn channels(&self) -> impl Iterator<Item = (usize, &Channel)> + use<'_> {
        self.columns.iter().enumerate().filter_map(|(index, column)| match column {
            ColumnInfo::Channel(channel) => Some((index, channel)),
            _ => None,
        })
    }
}
