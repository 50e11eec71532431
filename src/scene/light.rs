use glam::Vec3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LightKind {
    Directional,
    Point { range: f32 },
    Spot { range: f32, inner_cone: f32, outer_cone: f32 },
}

/// Scene light. Position and direction come from the node it is attached to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub name: String,
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
    pub cast_shadows: bool,
}

impl Light {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: LightKind) -> Self {
        Self {
            name: name.into(),
            kind,
            color: Vec3::ONE,
            intensity: 1.0,
            cast_shadows: false,
        }
    }

    #[must_use]
    pub fn directional(name: impl Into<String>) -> Self {
        Self::new(name, LightKind::Directional)
    }

    #[must_use]
    pub fn point(name: impl Into<String>, range: f32) -> Self {
        Self::new(name, LightKind::Point { range })
    }

    #[must_use]
    pub fn with_color(mut self, color: Vec3, intensity: f32) -> Self {
        self.color = color;
        self.intensity = intensity;
        self
    }
}
