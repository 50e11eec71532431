//! Engine Integration Tests
//!
//! Tests for:
//! - Mesh generators: registration, create_mesh, unknown generator types
//! - GPU init scheduling: deferred init, render-thread affinity, bounded drains,
//!   failure and retry
//! - Frame flow: change flush, GPU drain, active-camera cull
//! - Settings: serde defaults
//! - Shutdown: every device object released, every cache empty

use std::sync::Arc;

use glam::Vec3;
use ember::cache::{GpuResource, HeadlessDevice, MergeDefault, ResourceState};
use ember::errors::{EmberError, Result};
use ember::render::CullerKind;
use ember::resources::{Material, Mesh, Parameters, Submesh};
use ember::scene::Projection;
use ember::{Engine, EngineSettings};

fn quad(name: &str, params: &Parameters) -> Result<Mesh> {
    let size: f32 = params.get_or("size", 1.0);
    let h = size * 0.5;
    Ok(Mesh::new(
        name,
        [Submesh::new(
            vec![
                Vec3::new(-h, -h, 0.0),
                Vec3::new(h, -h, 0.0),
                Vec3::new(h, h, 0.0),
                Vec3::new(-h, h, 0.0),
            ],
            vec![0, 1, 2, 0, 2, 3],
        )],
    ))
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn engine_with(settings: EngineSettings) -> (Engine, Arc<HeadlessDevice>) {
    init_logging();
    let device = Arc::new(HeadlessDevice::new());
    let engine = Engine::new(settings, device.clone());
    engine.register_generator("quad", quad);
    (engine, device)
}

// ============================================================================
// Generators
// ============================================================================

#[test]
fn engine_create_mesh_runs_generator_once() {
    let (engine, _) = engine_with(EngineSettings::default());
    let params = Parameters::new().with("size", "4");

    let first = engine.create_mesh("floor", "quad", &params).unwrap();
    let second = engine.create_mesh("floor", "quad", &Parameters::new()).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!((first.bounds().radius - 8.0_f32.sqrt()).abs() < 1e-5);
    assert_eq!(engine.meshes().len(), 1);
}

#[test]
fn engine_create_mesh_with_unknown_generator_fails() {
    let (engine, _) = engine_with(EngineSettings::default());
    let err = engine.create_mesh("m", "torus", &Parameters::new()).unwrap_err();
    assert!(matches!(err, EmberError::UnknownGenerator(name) if name == "torus"));
    assert!(engine.meshes().is_empty());
}

#[test]
fn engine_generator_error_leaves_no_mesh() {
    let (engine, _) = engine_with(EngineSettings::default());
    engine.register_generator("broken", |name: &str, _: &Parameters| -> Result<Mesh> {
        Err(EmberError::GpuInitFailed {
            name: name.to_string(),
            reason: "no data".to_string(),
        })
    });

    let err = engine.create_mesh("m", "broken", &Parameters::new()).unwrap_err();
    assert!(matches!(err, EmberError::ProductionFailed { kind: "Mesh", .. }));
    assert!(!engine.meshes().contains("m"));
}

// ============================================================================
// GPU Init Scheduling
// ============================================================================

#[test]
fn engine_new_resources_wait_for_drain() {
    let (engine, device) = engine_with(EngineSettings::default());
    let mesh = engine.create_mesh("q", "quad", &Parameters::new()).unwrap();

    assert_eq!(mesh.status().state(), ResourceState::Initialising);
    assert_eq!(engine.scheduler().pending(), 1);
    assert_eq!(device.live_objects(), 0);

    let report = engine.drain_gpu().unwrap();
    assert_eq!(report.initialised, 1);
    assert!(mesh.status().is_ready());
    // Vertex and index buffers.
    assert_eq!(device.live_objects(), 2);
}

#[test]
fn engine_drain_from_other_thread_is_rejected() {
    let (engine, _) = engine_with(EngineSettings::default());
    engine.scheduler().bind_render_thread();
    engine.create_mesh("q", "quad", &Parameters::new()).unwrap();

    let engine = Arc::new(engine);
    let worker = Arc::clone(&engine);
    let result = std::thread::spawn(move || worker.drain_gpu()).join().unwrap();
    assert!(matches!(result, Err(EmberError::NotRenderThread)));
    assert_eq!(engine.scheduler().pending(), 1);
}

#[test]
fn engine_producers_on_worker_threads_drain_on_render_thread() {
    let (engine, _) = engine_with(EngineSettings::default());
    engine.scheduler().bind_render_thread();
    let engine = Arc::new(engine);

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            std::thread::spawn(move || {
                engine
                    .create_mesh(format!("q{i}"), "quad", &Parameters::new())
                    .unwrap()
            })
        })
        .collect();
    let meshes: Vec<Arc<Mesh>> = workers.into_iter().map(|w| w.join().unwrap()).collect();

    assert_eq!(engine.drain_gpu().unwrap().initialised, 4);
    assert!(meshes.iter().all(|m| m.status().is_ready()));
}

#[test]
fn engine_bounded_drain_spreads_work_over_frames() {
    let (engine, _) = engine_with(EngineSettings::default().with_max_gpu_inits_per_frame(Some(2)));
    for i in 0..5 {
        engine.create_mesh(format!("q{i}"), "quad", &Parameters::new()).unwrap();
    }

    let first = engine.drain_gpu().unwrap();
    assert_eq!((first.initialised, first.remaining), (2, 3));
    let second = engine.drain_gpu().unwrap();
    assert_eq!((second.initialised, second.remaining), (2, 1));
    let third = engine.drain_gpu().unwrap();
    assert_eq!((third.initialised, third.remaining), (1, 0));
}

#[test]
fn engine_failed_init_can_be_retried() {
    let (engine, device) = engine_with(EngineSettings::default());
    device.fail_on("glass");
    let material = engine
        .materials()
        .add("glass".to_string(), |key| {
            Ok::<_, std::convert::Infallible>(Material::opaque(key.clone()))
        })
        .unwrap();

    let report = engine.drain_gpu().unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(material.status().state(), ResourceState::Failed);
    assert!(material.status().failure().is_some());
    assert_eq!(engine.scheduler().pending(), 0);

    device.heal("glass");
    assert!(engine.scheduler().retry(material.clone()));
    engine.drain_gpu().unwrap();
    assert!(material.status().is_ready());
}

// ============================================================================
// Frame Flow
// ============================================================================

#[test]
fn engine_frame_flushes_drains_and_culls() -> anyhow::Result<()> {
    let (engine, _) = engine_with(EngineSettings::default());
    let scene = engine.create_scene("main")?;
    let mesh = engine.create_mesh("q", "quad", &Parameters::new())?;
    let material = engine.materials().add("m".to_string(), |key| {
        Ok::<_, std::convert::Infallible>(Material::opaque(key.clone()))
    })?;

    let eye = scene.create_node("eye");
    scene.create_camera("cam", eye, Projection::perspective(60.0, 1.0, 0.1, 100.0))?;
    scene.set_active_camera("cam")?;

    let target = scene.create_node("target");
    scene.graph_mut().node_mut(target).unwrap().transform.position = Vec3::new(0.0, 0.0, -5.0);
    scene.post_change(move |scene| {
        scene.create_geometry("q", target, mesh, Some(&material)).unwrap();
    });

    let mut culler = engine.create_culler();
    let frame = engine.frame(&scene, &mut culler)?;
    assert_eq!(frame.scene_changes, 1);
    assert_eq!(frame.gpu.initialised, 2);
    assert_eq!(frame.cull.frame, 1);
    assert_eq!(frame.cull.visible.opaque_submeshes, 1);
    assert_eq!(culler.culled_opaque_submeshes()[0].geometry_name, "q");

    let next = engine.frame(&scene, &mut culler)?;
    assert_eq!(next.scene_changes, 0);
    assert_eq!(next.gpu.initialised, 0);
    assert_eq!(next.cull.frame, 2);
    Ok(())
}

#[test]
fn engine_frame_without_camera_needs_dummy_culler() {
    let (engine, _) = engine_with(EngineSettings::default());
    let scene = engine.create_scene("main").unwrap();

    let mut culler = engine.create_culler();
    assert!(matches!(
        engine.frame(&scene, &mut culler),
        Err(EmberError::CameraNotFound(_))
    ));

    let (dummy_engine, _) = engine_with(EngineSettings::default().with_culler(CullerKind::InstantiatedDummy));
    let mut dummy = dummy_engine.create_culler();
    assert_eq!(dummy.kind(), CullerKind::InstantiatedDummy);
    assert!(dummy_engine.frame(&scene, &mut dummy).is_ok());
}

#[test]
fn engine_create_scene_returns_existing() {
    let (engine, _) = engine_with(EngineSettings::default());
    let a = engine.create_scene("main").unwrap();
    let b = engine.create_scene("main").unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(engine.scenes().len(), 1);
}

// ============================================================================
// Settings
// ============================================================================

#[test]
fn engine_settings_missing_fields_use_defaults() -> anyhow::Result<()> {
    let settings: EngineSettings =
        serde_json::from_str(r#"{ "culler": "InstantiatedDummy", "max_gpu_inits_per_frame": 8 }"#)?;
    assert_eq!(settings.culler, CullerKind::InstantiatedDummy);
    assert_eq!(settings.max_gpu_inits_per_frame, Some(8));
    assert_eq!(settings.default_merge, MergeDefault::KeepExisting);

    let settings: EngineSettings =
        serde_json::from_str(r#"{ "default_merge": { "RenameWithPrefix": "imported" } }"#)?;
    assert_eq!(settings.default_merge, MergeDefault::RenameWithPrefix("imported".to_string()));
    assert_eq!(settings.culler, CullerKind::Frustum);
    Ok(())
}

// ============================================================================
// Shutdown
// ============================================================================

#[test]
fn engine_shutdown_releases_everything() {
    let (engine, device) = engine_with(EngineSettings::default());
    let mesh = engine.create_mesh("q", "quad", &Parameters::new()).unwrap();
    engine
        .materials()
        .add("m".to_string(), |key| {
            Ok::<_, std::convert::Infallible>(Material::opaque(key.clone()))
        })
        .unwrap();
    let scene = engine.create_scene("main").unwrap();
    scene.create_geometry("g", scene.create_node("n"), mesh.clone(), None).unwrap();
    engine.drain_gpu().unwrap();
    assert_eq!(device.live_objects(), 3);

    engine.shutdown().unwrap();

    assert_eq!(device.live_objects(), 0);
    assert_eq!(mesh.status().state(), ResourceState::Unloaded);
    assert!(engine.meshes().is_empty());
    assert!(engine.materials().is_empty());
    assert!(engine.scenes().is_empty());
    assert!(scene.geometries().is_empty());
}
