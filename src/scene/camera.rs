use glam::{Affine3A, Mat4, Vec3, Vec4};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::resources::bounds::BoundingSphere;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Projection {
    Perspective {
        /// Vertical field of view, radians.
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        /// Half of the view volume's height.
        half_height: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
}

impl Projection {
    /// Perspective projection; `fov_y_degrees` is converted to radians.
    #[must_use]
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::Perspective {
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    #[must_use]
    pub fn orthographic(half_height: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self::Orthographic {
            half_height,
            aspect,
            near,
            far,
        }
    }

    /// Right-handed projection with a `[0, 1]` depth range.
    #[must_use]
    pub fn matrix(&self) -> Mat4 {
        match *self {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(fov_y, aspect, near, far),
            Projection::Orthographic {
                half_height,
                aspect,
                near,
                far,
            } => {
                let half_width = half_height * aspect;
                Mat4::orthographic_rh(-half_width, half_width, -half_height, half_height, near, far)
            }
        }
    }

    pub fn set_aspect(&mut self, new_aspect: f32) {
        match self {
            Projection::Perspective { aspect, .. } | Projection::Orthographic { aspect, .. } => {
                *aspect = new_aspect;
            }
        }
    }
}

/// Scene camera. Its pose comes from the node it is attached to.
#[derive(Debug)]
pub struct Camera {
    name: String,
    projection: RwLock<Projection>,
}

impl Camera {
    #[must_use]
    pub fn new(name: impl Into<String>, projection: Projection) -> Self {
        Self {
            name: name.into(),
            projection: RwLock::new(projection),
        }
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn projection(&self) -> Projection {
        *self.projection.read()
    }

    pub fn set_projection(&self, projection: Projection) {
        *self.projection.write() = projection;
    }

    pub fn set_aspect(&self, aspect: f32) {
        self.projection.write().set_aspect(aspect);
    }

    /// View-projection matrix for a camera whose node has world matrix `world`.
    #[must_use]
    pub fn view_projection(&self, world: &Affine3A) -> Mat4 {
        let view = Mat4::from(world.inverse());
        self.projection().matrix() * view
    }

    #[must_use]
    pub fn frustum(&self, world: &Affine3A) -> Frustum {
        Frustum::from_matrix(self.view_projection(world))
    }
}

/// View frustum as six inward-facing planes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Frustum {
    planes: [Vec4; 6], // Left, Right, Bottom, Top, Near, Far
}

impl Frustum {
    /// Gribb-Hartmann extraction for a `[0, 1]` depth range.
    #[must_use]
    pub fn from_matrix(m: Mat4) -> Self {
        let rows = [m.row(0), m.row(1), m.row(2), m.row(3)];

        let mut planes = [
            rows[3] + rows[0],
            rows[3] - rows[0],
            rows[3] + rows[1],
            rows[3] - rows[1],
            rows[2],
            rows[3] - rows[2],
        ];

        for plane in &mut planes {
            let length = Vec3::new(plane.x, plane.y, plane.z).length();
            if length > 0.0 {
                *plane /= length;
            }
        }

        Self { planes }
    }

    #[must_use]
    pub fn intersects_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(center) + plane.w >= -radius)
    }

    #[inline]
    #[must_use]
    pub fn intersects(&self, sphere: &BoundingSphere) -> bool {
        self.intersects_sphere(sphere.center, sphere.radius)
    }

    #[inline]
    #[must_use]
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.intersects_sphere(point, 0.0)
    }
}
