use std::fmt;

use crate::config::{scale_matrix, translation_matrix, Mat4, Vec3};
use crate::error::Result;
use crate::skeleton::FrameId;

/// Below this squared norm the authored dimensions count as unset.
const DIMENSION_EPSILON: f32 = 1.0e-4;

/// A mesh file, optionally narrowed to one named sub-object (`file:subobject`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MeshReference {
    pub file: String,
    pub subobject: Option<String>,
}

impl MeshReference {
    pub fn parse(name: &str) -> Self {
        match name.split_once(':') {
            Some((file, subobject)) => Self {
                file: file.to_string(),
                subobject: Some(subobject.to_string()),
            },
            None => Self {
                file: name.to_string(),
                subobject: None,
            },
        }
    }
}

impl fmt::Display for MeshReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subobject {
            Some(subobject) => write!(f, "{}:{}", self.file, subobject),
            None => f.write_str(&self.file),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    pub fn unit_cube() -> Self {
        Self::new(Vec3::repeat(-0.5), Vec3::repeat(0.5))
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        self.min + self.size() * 0.5
    }
}

/// Mesh geometry lives outside this crate; segments only need extents.
pub trait MeshLoader {
    fn bounding_box(&mut self, mesh: &MeshReference) -> Result<BoundingBox>;
}

/// Treats every mesh as a unit cube. Useful when geometry is unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnitCubeLoader;

impl MeshLoader for UnitCubeLoader {
    fn bounding_box(&mut self, _mesh: &MeshReference) -> Result<BoundingBox> {
        Ok(BoundingBox::unit_cube())
    }
}

/// `dimensions`, `translate` and `mesh_center` are stored in the internal
/// basis. A `scale` with a non-positive x component means "not set".
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub name: String,
    pub frame: FrameId,
    pub mesh: MeshReference,
    pub dimensions: Vec3,
    pub scale: Vec3,
    pub color: Vec3,
    pub translate: Vec3,
    pub mesh_center: Option<Vec3>,
    bounding_box: BoundingBox,
    render_matrix: Mat4,
}

impl Segment {
    pub fn new(name: impl Into<String>, frame: FrameId, mesh: MeshReference, bounding_box: BoundingBox) -> Self {
        Self {
            name: name.into(),
            frame,
            mesh,
            dimensions: Vec3::zeros(),
            scale: Vec3::repeat(-1.0),
            color: Vec3::repeat(1.0),
            translate: Vec3::zeros(),
            mesh_center: None,
            bounding_box,
            render_matrix: Mat4::identity(),
        }
    }

    pub const fn bounding_box(&self) -> &BoundingBox {
        &self.bounding_box
    }

    pub const fn render_matrix(&self) -> &Mat4 {
        &self.render_matrix
    }

    pub fn has_dimensions(&self) -> bool {
        self.dimensions.norm_squared() > DIMENSION_EPSILON
    }

    /// Mesh scale: fit to the authored dimensions, else the authored scale,
    /// else none. Axes where the mesh is flat keep a scale of 1.
    pub fn derived_scale(&self) -> Vec3 {
        if self.has_dimensions() {
            let size = self.bounding_box.size();
            return Vec3::from_fn(|i, _| {
                if size[i] != 0.0 {
                    self.dimensions[i].abs() / size[i]
                } else {
                    1.0
                }
            });
        }

        if self.scale.x > 0.0 {
            self.scale
        } else {
            Vec3::repeat(1.0)
        }
    }

    /// Offset applied to the scaled mesh: re-centers it on `mesh_center`
    /// when one is set, plus `translate`.
    pub fn derived_translation(&self, scale: &Vec3) -> Vec3 {
        let centering = match self.mesh_center {
            Some(mesh_center) => mesh_center - self.bounding_box.center().component_mul(scale),
            None => Vec3::zeros(),
        };

        centering + self.translate
    }

    pub fn update_render_matrix(&mut self, frame_pose_transform: &Mat4) {
        let scale = self.derived_scale();
        let translation = self.derived_translation(&scale);
        self.render_matrix = frame_pose_transform * translation_matrix(&translation) * scale_matrix(&scale);
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::Point3;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::skeleton::Skeleton;

    fn segment(bounding_box: BoundingBox) -> Segment {
        Segment::new("box", Skeleton::new().root(), MeshReference::parse("unit_cube.obj"), bounding_box)
    }

    #[test]
    fn mesh_reference_splits_subobject() {
        let reference = MeshReference::parse("body.obj:LeftHand");
        assert_eq!(reference.file, "body.obj");
        assert_eq!(reference.subobject.as_deref(), Some("LeftHand"));
        assert_eq!(reference.to_string(), "body.obj:LeftHand");

        let plain = MeshReference::parse("sphere");
        assert_eq!(plain.subobject, None);
        assert_eq!(plain.to_string(), "sphere");
    }

    #[test]
    fn dimensions_fit_the_bounding_box() {
        let mut segment = segment(BoundingBox::new(Vec3::zeros(), Vec3::new(2.0, 4.0, 1.0)));
        segment.dimensions = Vec3::new(1.0, -2.0, 3.0);
        segment.scale = Vec3::repeat(5.0);
        assert_eq!(segment.derived_scale(), Vec3::new(0.5, 0.5, 3.0));
    }

    #[test]
    fn scale_falls_back_to_authored_then_identity() {
        let mut segment = segment(BoundingBox::unit_cube());
        assert_eq!(segment.derived_scale(), Vec3::repeat(1.0));

        segment.scale = Vec3::new(2.0, 3.0, 4.0);
        assert_eq!(segment.derived_scale(), Vec3::new(2.0, 3.0, 4.0));

        // tiny dimensions count as unset
        segment.dimensions = Vec3::new(0.001, 0.0, 0.0);
        assert_eq!(segment.derived_scale(), Vec3::new(2.0, 3.0, 4.0));
    }

    #[test]
    fn flat_mesh_axes_do_not_divide_by_zero() {
        let mut segment = segment(BoundingBox::new(Vec3::zeros(), Vec3::new(2.0, 0.0, 2.0)));
        segment.dimensions = Vec3::new(1.0, 1.0, 1.0);
        assert_eq!(segment.derived_scale(), Vec3::new(0.5, 1.0, 0.5));
    }

    #[test]
    fn mesh_center_recenters_scaled_mesh() {
        let mut segment = segment(BoundingBox::new(Vec3::zeros(), Vec3::new(2.0, 2.0, 2.0)));
        segment.scale = Vec3::repeat(2.0);
        segment.mesh_center = Some(Vec3::new(0.0, 0.5, 0.0));
        segment.translate = Vec3::new(1.0, 0.0, 0.0);

        let scale = segment.derived_scale();
        assert_eq!(segment.derived_translation(&scale), Vec3::new(-1.0, -1.5, -2.0));

        segment.mesh_center = None;
        assert_eq!(segment.derived_translation(&scale), Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn render_matrix_applies_frame_transform_last() {
        let mut segment = segment(BoundingBox::unit_cube());
        segment.scale = Vec3::repeat(2.0);
        segment.translate = Vec3::new(0.0, 1.0, 0.0);

        let frame = translation_matrix(&Vec3::new(10.0, 0.0, 0.0));
        segment.update_render_matrix(&frame);

        let corner = segment.render_matrix().transform_point(&Point3::new(0.5, 0.5, 0.5));
        assert!((corner.coords - Vec3::new(11.0, 2.0, 1.0)).norm() < 1.0e-6);
    }

    #[test]
    fn unit_cube_loader_ignores_mesh_name() {
        let mut loader = UnitCubeLoader;
        let bbox = loader.bounding_box(&MeshReference::parse("anything:part")).unwrap();
        assert_eq!(bbox.size(), Vec3::repeat(1.0));
        assert_eq!(bbox.center(), Vec3::zeros());
    }
}
