//! Mesh generator registry.
//!
//! Generators are factories registered under a type name ("cube", "sphere",
//! ...) and invoked as producers by the engine's mesh cache. Their geometry
//! algorithms live outside this crate.

use std::str::FromStr;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::errors::{EmberError, Result};
use crate::resources::mesh::Mesh;

/// Free-form `name → value` generator parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameters {
    values: FxHashMap<String, String>,
}

impl Parameters {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.add(name, value);
        self
    }

    /// Sets `name`, replacing any previous value.
    pub fn add(&mut self, name: impl Into<String>, value: impl ToString) {
        self.values.insert(name.into(), value.to_string());
    }

    #[must_use]
    pub fn raw(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Parsed value of `name`; `None` when absent or unparsable.
    #[must_use]
    pub fn get<T: FromStr>(&self, name: &str) -> Option<T> {
        self.raw(name)?.parse().ok()
    }

    #[must_use]
    pub fn get_or<T: FromStr>(&self, name: &str, default: T) -> T {
        self.get(name).unwrap_or(default)
    }
}

/// Builds a mesh named `name` from `params`.
pub trait MeshGenerator: Send + Sync {
    fn generate(&self, name: &str, params: &Parameters) -> Result<Mesh>;
}

impl<F> MeshGenerator for F
where
    F: Fn(&str, &Parameters) -> Result<Mesh> + Send + Sync,
{
    fn generate(&self, name: &str, params: &Parameters) -> Result<Mesh> {
        self(name, params)
    }
}

#[derive(Default)]
pub struct GeneratorRegistry {
    generators: RwLock<FxHashMap<String, Arc<dyn MeshGenerator>>>,
}

impl GeneratorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `generator` under `type_name`, replacing any previous one.
    pub fn register(&self, type_name: impl Into<String>, generator: impl MeshGenerator + 'static) {
        self.generators
            .write()
            .insert(type_name.into(), Arc::new(generator));
    }

    pub fn unregister(&self, type_name: &str) -> bool {
        self.generators.write().remove(type_name).is_some()
    }

    /// Looks up a generator. The registry lock is released before the caller
    /// runs it.
    pub fn get(&self, type_name: &str) -> Result<Arc<dyn MeshGenerator>> {
        self.generators
            .read()
            .get(type_name)
            .cloned()
            .ok_or_else(|| EmberError::UnknownGenerator(type_name.to_string()))
    }

    #[must_use]
    pub fn type_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.generators.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::mesh::Submesh;
    use glam::Vec3;

    #[test]
    fn test_parameters_parse_typed_values() {
        let params = Parameters::new().with("width", 2.5).with("segments", 8);
        assert_eq!(params.get::<f32>("width"), Some(2.5));
        assert_eq!(params.get::<u32>("segments"), Some(8));
        assert_eq!(params.get::<u32>("width"), None);
        assert_eq!(params.get_or("depth", 1.0_f32), 1.0);
    }

    #[test]
    fn test_registry_lookup() {
        let registry = GeneratorRegistry::new();
        registry.register("point", |name: &str, _: &Parameters| -> Result<Mesh> {
            Ok(Mesh::new(name, [Submesh::new(vec![Vec3::ZERO], Vec::new())]))
        });

        let mesh = registry.get("point").unwrap().generate("p", &Parameters::new()).unwrap();
        assert_eq!(mesh.submeshes().len(), 1);
        assert!(matches!(
            registry.get("torus").err(),
            Some(EmberError::UnknownGenerator(name)) if name == "torus"
        ));
        assert_eq!(registry.type_names(), vec!["point".to_string()]);
    }
}
