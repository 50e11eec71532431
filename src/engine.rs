//! Engine Core Module
//!
//! [`Engine`] owns every engine-lifetime cache (meshes, materials, samplers,
//! render targets, fonts, scenes) and the [`GpuInitScheduler`] they feed.
//! Nothing here is global: components that need a cache borrow it from the
//! engine.
//!
//! # Example
//!
//! ```rust,ignore
//! use ember::{Engine, EngineSettings, HeadlessDevice};
//!
//! let engine = Engine::new(EngineSettings::default(), Arc::new(HeadlessDevice::new()));
//! let scene = engine.create_scene("main")?;
//! let mut culler = engine.create_culler();
//!
//! loop {
//!     let frame = engine.frame(&scene, &mut culler)?;
//!     // ... draw culler.culled_opaque_submeshes() etc. ...
//! }
//! ```

use std::convert::Infallible;
use std::sync::Arc;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::cache::gpu::{GpuDevice, GpuResource};
use crate::cache::merge::MergeDefault;
use crate::cache::resource_cache::ResourceCache;
use crate::cache::scheduler::{DrainReport, GpuInitScheduler};
use crate::errors::Result;
use crate::render::culler::{CullStats, CullerKind, SceneCuller};
use crate::resources::font::Font;
use crate::resources::generator::{GeneratorRegistry, MeshGenerator, Parameters};
use crate::resources::material::Material;
use crate::resources::mesh::Mesh;
use crate::resources::render_target::RenderTarget;
use crate::resources::sampler::Sampler;
use crate::scene::Scene;

/// Engine configuration.
///
/// ```rust,ignore
/// let settings = EngineSettings::default()
///     .with_culler(CullerKind::InstantiatedDummy)
///     .with_max_gpu_inits_per_frame(Some(32));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Culler variant handed out by [`Engine::create_culler`].
    pub culler: CullerKind,
    /// GPU work items drained per frame; `None` drains everything.
    pub max_gpu_inits_per_frame: Option<usize>,
    /// Collision policy used when scenes created by this engine are merged.
    pub default_merge: MergeDefault,
}

impl EngineSettings {
    #[must_use]
    pub fn with_culler(mut self, culler: CullerKind) -> Self {
        self.culler = culler;
        self
    }

    #[must_use]
    pub fn with_max_gpu_inits_per_frame(mut self, max: Option<usize>) -> Self {
        self.max_gpu_inits_per_frame = max;
        self
    }

    #[must_use]
    pub fn with_default_merge(mut self, default_merge: MergeDefault) -> Self {
        self.default_merge = default_merge;
        self
    }
}

/// What one [`Engine::frame`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub scene_changes: usize,
    pub gpu: DrainReport,
    pub cull: CullStats,
}

pub struct Engine {
    settings: EngineSettings,
    scheduler: Arc<GpuInitScheduler>,

    meshes: ResourceCache<Mesh>,
    materials: ResourceCache<Material>,
    samplers: ResourceCache<Sampler>,
    render_targets: ResourceCache<RenderTarget>,
    fonts: ResourceCache<Font>,
    scenes: ResourceCache<Scene>,

    generators: GeneratorRegistry,
}

/// GPU-backed cache: new entries are scheduled for init, `cleanup()`
/// schedules their release.
fn gpu_cache<T: GpuResource + 'static>(kind: &'static str, scheduler: &Arc<GpuInitScheduler>) -> ResourceCache<T> {
    let init = Arc::clone(scheduler);
    let clean = Arc::clone(scheduler);
    ResourceCache::new(kind)
        .with_initialiser(move |resource: &Arc<T>| {
            init.schedule_init(resource.clone());
        })
        .with_cleaner(move |resource: &Arc<T>| {
            clean.schedule_cleanup(resource.clone());
        })
}

impl Engine {
    #[must_use]
    pub fn new(settings: EngineSettings, device: Arc<dyn GpuDevice>) -> Self {
        let scheduler = Arc::new(GpuInitScheduler::new(device));
        info!("Engine created with {settings:?}");
        Self {
            meshes: gpu_cache("Mesh", &scheduler),
            materials: gpu_cache("Material", &scheduler),
            samplers: gpu_cache("Sampler", &scheduler),
            render_targets: gpu_cache("RenderTarget", &scheduler),
            fonts: gpu_cache("Font", &scheduler),
            scenes: ResourceCache::new("Scene").with_cleaner(|scene: &Arc<Scene>| scene.cleanup()),
            generators: GeneratorRegistry::new(),
            settings,
            scheduler,
        }
    }

    #[inline]
    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    #[inline]
    #[must_use]
    pub fn scheduler(&self) -> &Arc<GpuInitScheduler> {
        &self.scheduler
    }

    #[inline]
    #[must_use]
    pub fn meshes(&self) -> &ResourceCache<Mesh> {
        &self.meshes
    }

    #[inline]
    #[must_use]
    pub fn materials(&self) -> &ResourceCache<Material> {
        &self.materials
    }

    #[inline]
    #[must_use]
    pub fn samplers(&self) -> &ResourceCache<Sampler> {
        &self.samplers
    }

    #[inline]
    #[must_use]
    pub fn render_targets(&self) -> &ResourceCache<RenderTarget> {
        &self.render_targets
    }

    #[inline]
    #[must_use]
    pub fn fonts(&self) -> &ResourceCache<Font> {
        &self.fonts
    }

    #[inline]
    #[must_use]
    pub fn scenes(&self) -> &ResourceCache<Scene> {
        &self.scenes
    }

    #[inline]
    #[must_use]
    pub fn generators(&self) -> &GeneratorRegistry {
        &self.generators
    }

    // ========================================================================
    // Producers
    // ========================================================================

    /// Registers a mesh generator under `type_name`.
    pub fn register_generator(&self, type_name: impl Into<String>, generator: impl MeshGenerator + 'static) {
        self.generators.register(type_name, generator);
    }

    /// Returns the mesh `key`, generating it with the `type_name` generator
    /// if absent. An existing mesh is returned as is.
    pub fn create_mesh(&self, key: impl Into<String>, type_name: &str, params: &Parameters) -> Result<Arc<Mesh>> {
        let key = key.into();
        if let Some(mesh) = self.meshes.find(&key) {
            return Ok(mesh);
        }
        let generator = self.generators.get(type_name)?;
        self.meshes.add(key, |name| generator.generate(name, params))
    }

    /// Returns the scene `name`, creating it if absent.
    pub fn create_scene(&self, name: impl Into<String>) -> Result<Arc<Scene>> {
        let scheduler = Arc::clone(&self.scheduler);
        let merge_default = self.settings.default_merge.clone();
        self.scenes.add(name.into(), move |name| {
            Ok::<_, Infallible>(Scene::with_scheduler(name.clone(), scheduler, merge_default))
        })
    }

    #[must_use]
    pub fn create_culler(&self) -> SceneCuller {
        SceneCuller::new(self.settings.culler)
    }

    // ========================================================================
    // Frame
    // ========================================================================

    /// Runs one frame on the render thread: applies queued scene changes,
    /// drains pending GPU work (bounded by the settings) and culls `scene`
    /// with its active camera.
    pub fn frame(&self, scene: &Scene, culler: &mut SceneCuller) -> Result<FrameReport> {
        let scene_changes = scene.flush_changes();
        let gpu = self.drain_gpu()?;
        let cull = *culler.cull_active_camera(scene)?;
        Ok(FrameReport {
            scene_changes,
            gpu,
            cull,
        })
    }

    /// Drains pending GPU work, bounded by `max_gpu_inits_per_frame`.
    pub fn drain_gpu(&self) -> Result<DrainReport> {
        match self.settings.max_gpu_inits_per_frame {
            Some(max) => self.scheduler.drain_limited(max),
            None => self.scheduler.drain(),
        }
    }

    /// Releases everything: runs every cleaner, drains the resulting GPU
    /// work and empties every cache. Render thread only.
    pub fn shutdown(&self) -> Result<()> {
        self.scenes.cleanup();
        self.meshes.cleanup();
        self.materials.cleanup();
        self.samplers.cleanup();
        self.render_targets.cleanup();
        self.fonts.cleanup();

        let report = self.scheduler.drain()?;
        debug!("Shutdown drained {report:?}");

        self.scenes.for_each(|_, scene| scene.clear());
        self.scenes.clear();
        self.meshes.clear();
        self.materials.clear();
        self.samplers.clear();
        self.render_targets.clear();
        self.fonts.clear();
        info!("Engine shut down");
        Ok(())
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("settings", &self.settings)
            .field("meshes", &self.meshes.len())
            .field("materials", &self.materials.len())
            .field("scenes", &self.scenes.len())
            .field("pending_gpu_work", &self.scheduler.pending())
            .finish_non_exhaustive()
    }
}
