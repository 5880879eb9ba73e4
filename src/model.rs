use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::animation::{Animation, AnimationBinding, AnimationOptions};
use crate::config::{FrameConfig, Mat3, Mat4, Vec3};
use crate::error::{Error, Result};
use crate::segment::{BoundingBox, MeshLoader, MeshReference, Segment};
use crate::skeleton::{FrameId, Skeleton, BASE_FRAME};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    Json,
    Toml,
}

impl ModelFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path.extension().and_then(|extension| extension.to_str()).map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("toml") => Ok(Self::Toml),
            _ => Err(Error::UnsupportedExtension { path: path.to_path_buf() }),
        }
    }
}

/// Parent-relative rest placement: translation `r`, rotation matrix `E`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointTransformDocument {
    #[serde(default)]
    pub r: [f32; 3],
    #[serde(rename = "E", default = "identity_rows")]
    pub e: [[f32; 3]; 3],
}

fn identity_rows() -> [[f32; 3]; 3] {
    [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentDocument {
    #[serde(default)]
    pub name: String,
    /// Omitted for visuals nested inside their frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<String>,
    pub mesh_filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<[f32; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<[f32; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<[f32; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translate: Option<[f32; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mesh_center: Option<[f32; 3]>,
}

// tables go last so the TOML serializer can emit plain values first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameDocument {
    pub name: String,
    pub parent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_translation: Option<[f32; 3]>,
    /// Euler angles in degrees, applied in the configured rotation order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_rotation: Option<[f32; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub joint_transform: Option<JointTransformDocument>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub visuals: Vec<SegmentDocument>,
}

/// On-disk layout shared by the JSON and TOML syntaxes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelDocument {
    pub configuration: FrameConfig,
    pub frames: Vec<FrameDocument>,
    pub segments: Vec<SegmentDocument>,
}

impl ModelDocument {
    pub fn parse(text: &str, format: ModelFormat, path: &Path) -> Result<Self> {
        let format_error = |message: String| Error::ModelFormat {
            path: path.to_path_buf(),
            message,
        };

        match format {
            ModelFormat::Json => serde_json::from_str(text).map_err(|e| format_error(e.to_string())),
            ModelFormat::Toml => toml::from_str(text).map_err(|e| format_error(e.to_string())),
        }
    }

    pub fn to_text(&self, format: ModelFormat, path: &Path) -> Result<String> {
        let format_error = |message: String| Error::ModelFormat {
            path: path.to_path_buf(),
            message,
        };

        match format {
            ModelFormat::Json => serde_json::to_string_pretty(self).map_err(|e| format_error(e.to_string())),
            ModelFormat::Toml => toml::to_string_pretty(self).map_err(|e| format_error(e.to_string())),
        }
    }
}

fn rows_to_matrix(rows: &[[f32; 3]; 3]) -> Mat3 {
    Mat3::from_fn(|i, j| rows[i][j])
}

fn matrix_to_rows(matrix: &Mat3) -> [[f32; 3]; 3] {
    std::array::from_fn(|i| std::array::from_fn(|j| matrix[(i, j)]))
}

fn is_identity(matrix: &Mat3) -> bool {
    (matrix - Mat3::identity()).norm() < 1.0e-6
}

#[derive(Debug, Clone, Default)]
pub struct Model {
    configuration: FrameConfig,
    skeleton: Skeleton,
    segments: Vec<Segment>,
    bounding_boxes: HashMap<MeshReference, BoundingBox>,
    source: Option<PathBuf>,
}

impl Model {
    pub fn new(configuration: FrameConfig) -> Result<Self> {
        configuration.validate()?;
        Ok(Self {
            configuration,
            ..Self::default()
        })
    }

    pub fn load(path: &Path, meshes: &mut dyn MeshLoader) -> Result<Self> {
        info!("Loading model {}", path.display());
        let format = ModelFormat::from_path(path)?;
        let text = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let document = ModelDocument::parse(&text, format, path)?;

        let mut model = Self::from_document(&document, path, meshes)?;
        model.source = Some(path.to_path_buf());
        Ok(model)
    }

    pub fn from_document(document: &ModelDocument, path: &Path, meshes: &mut dyn MeshLoader) -> Result<Self> {
        let mut model = Self::new(document.configuration.clone())?;

        for frame in &document.frames {
            let (rotation, translation) = match &frame.joint_transform {
                Some(joint) => (rows_to_matrix(&joint.e), Vec3::from(joint.r)),
                None => (
                    model.configuration.angles_to_matrix(&Vec3::from(frame.parent_rotation.unwrap_or_default())),
                    Vec3::from(frame.parent_translation.unwrap_or_default()),
                ),
            };
            model.add_frame(&frame.parent, &frame.name, &rotation, &translation)?;

            for visual in &frame.visuals {
                model.add_segment_document(&frame.name, visual, meshes)?;
            }
        }

        for segment in &document.segments {
            let Some(frame_name) = segment.frame.as_deref() else {
                return Err(Error::ModelFormat {
                    path: path.to_path_buf(),
                    message: format!("segment '{}' does not name a frame", segment.name),
                });
            };
            model.add_segment_document(frame_name, segment, meshes)?;
        }

        model.skeleton.init_rest_transforms();
        debug!("Loaded {} frames and {} segments", model.skeleton.num_frames(), model.segments.len());
        Ok(model)
    }

    fn add_segment_document(&mut self, frame_name: &str, document: &SegmentDocument, meshes: &mut dyn MeshLoader) -> Result<()> {
        let config = self.configuration.clone();
        let segment = self.add_segment(frame_name, &document.name, &document.mesh_filename, meshes)?;

        if let Some(dimensions) = document.dimensions {
            segment.dimensions = config.to_internal(&Vec3::from(dimensions));
        }
        if let Some(scale) = document.scale {
            segment.scale = config.scale_to_internal(&Vec3::from(scale));
        }
        if let Some(color) = document.color {
            segment.color = Vec3::from(color);
        }
        if let Some(translate) = document.translate {
            segment.translate = config.to_internal(&Vec3::from(translate));
        }
        segment.mesh_center = document.mesh_center.map(|center| config.to_internal(&Vec3::from(center)));

        Ok(())
    }

    pub fn to_document(&self) -> ModelDocument {
        let config = &self.configuration;
        let frames = self
            .skeleton
            .depth_first()
            .into_iter()
            .filter_map(|id| {
                let frame = self.skeleton.frame(id);
                let parent = self.skeleton.frame(frame.parent()?);
                Some(FrameDocument {
                    name: frame.name.clone(),
                    parent: parent.name.clone(),
                    parent_translation: None,
                    parent_rotation: None,
                    joint_transform: Some(JointTransformDocument {
                        r: config.to_authored(frame.joint_translation()).into(),
                        e: matrix_to_rows(&config.rotation_to_authored(frame.joint_rotation())),
                    }),
                    visuals: Vec::new(),
                })
            })
            .collect();

        let segments = self
            .segments
            .iter()
            .map(|segment| SegmentDocument {
                name: segment.name.clone(),
                frame: Some(self.skeleton.frame(segment.frame).name.clone()),
                mesh_filename: segment.mesh.to_string(),
                dimensions: segment.has_dimensions().then(|| config.to_authored(&segment.dimensions).into()),
                scale: (segment.scale.x > 0.0).then(|| config.scale_to_authored(&segment.scale).into()),
                color: Some(segment.color.into()),
                translate: (segment.translate != Vec3::zeros()).then(|| config.to_authored(&segment.translate).into()),
                mesh_center: segment.mesh_center.map(|center| config.to_authored(&center).into()),
            })
            .collect();

        ModelDocument {
            configuration: self.configuration.clone(),
            frames,
            segments,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let format = ModelFormat::from_path(path)?;
        let text = self.to_document().to_text(format, path)?;
        fs::write(path, text).map_err(|e| Error::io(path, e))?;
        info!("Saved model to {}", path.display());
        Ok(())
    }

    /// Adds a frame whose rest rotation and translation are given in the
    /// authored basis.
    pub fn add_frame(&mut self, parent_name: &str, name: &str, rotation: &Mat3, translation: &Vec3) -> Result<FrameId> {
        let joint_rotation = self.configuration.rotation_to_internal(rotation);
        let joint_translation = self.configuration.to_internal(translation);
        if !is_identity(&(joint_rotation.transpose() * joint_rotation)) {
            debug!("Rest rotation of frame {} is not orthonormal", name);
        }

        self.skeleton.add_frame(parent_name, name, joint_rotation, joint_translation)
    }

    /// Attaches a mesh to a frame with default placement. The mesh bounding
    /// box is loaded once per distinct mesh.
    pub fn add_segment(
        &mut self,
        frame_name: &str,
        name: &str,
        mesh_filename: &str,
        meshes: &mut dyn MeshLoader,
    ) -> Result<&mut Segment> {
        let frame = crate::skeleton::sanitize_frame_name(frame_name)
            .ok()
            .and_then(|frame_name| self.skeleton.find(&frame_name))
            .ok_or_else(|| Error::MissingFrame(frame_name.to_string()))?;

        let mesh = MeshReference::parse(mesh_filename);
        let bounding_box = match self.bounding_boxes.get(&mesh) {
            Some(bounding_box) => *bounding_box,
            None => {
                match &mesh.subobject {
                    Some(subobject) => info!("Loading sub object {} from mesh {}", subobject, mesh.file),
                    None => info!("Loading mesh {}", mesh.file),
                }
                let bounding_box = meshes.bounding_box(&mesh)?;
                self.bounding_boxes.insert(mesh.clone(), bounding_box);
                bounding_box
            }
        };

        self.segments.push(Segment::new(name, frame, mesh, bounding_box));
        let index = self.segments.len() - 1;
        Ok(&mut self.segments[index])
    }

    pub const fn configuration(&self) -> &FrameConfig {
        &self.configuration
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub const fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    pub fn skeleton_mut(&mut self) -> &mut Skeleton {
        &mut self.skeleton
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|segment| segment.name == name)
    }

    pub fn num_meshes(&self) -> usize {
        self.bounding_boxes.len()
    }

    /// Loads an animation in this model's axis convention and binds it to
    /// the frame tree.
    pub fn load_animation(&self, path: &Path, options: &AnimationOptions) -> Result<(Animation, AnimationBinding)> {
        let animation = Animation::load_with_config(path, &self.configuration, options)?;
        let binding = self.bind(&animation)?;
        Ok((animation, binding))
    }

    pub fn bind(&self, animation: &Animation) -> Result<AnimationBinding> {
        animation.bind(&self.skeleton)
    }

    pub fn update_segments(&mut self) {
        for segment in &mut self.segments {
            segment.update_render_matrix(self.skeleton.frame(segment.frame).pose_transform());
        }
    }

    pub fn update(&mut self) {
        self.skeleton.update_frames();
        self.update_segments();
    }

    pub fn frame_transform(&self, name: &str) -> Option<&Mat4> {
        self.skeleton.frame_by_name(name).map(|frame| frame.pose_transform())
    }

    pub fn segment_transform(&self, name: &str) -> Option<&Mat4> {
        self.segment(name).map(Segment::render_matrix)
    }

    pub fn frame_names(&self) -> impl Iterator<Item = &str> + use<'_> {
        self.skeleton
            .depth_first()
            .into_iter()
            .map(|id| self.skeleton.frame(id).name.as_str())
            .filter(|name| *name != BASE_FRAME)
    }
}
