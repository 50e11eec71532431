//! Scene Integration Tests
//!
//! Tests for:
//! - Scene: node creation/removal, object detachment on removal
//! - Resolved node state: world matrices, displayable/visible propagation
//! - Cameras: active camera selection, frustum lookup
//! - Deferred changes: post_change / flush_changes ordering
//! - Scene merge: node grafting, attachment remapping, key collisions

use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

use glam::{Vec2, Vec3};
use ember::cache::{HeadlessDevice, MergeDefault};
use ember::errors::EmberError;
use ember::resources::{Material, Mesh, Submesh};
use ember::scene::{BillboardList, Light, Projection, Scene, Transform};
use ember::{Engine, EngineSettings};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn mesh() -> Arc<Mesh> {
    Arc::new(Mesh::new(
        "tri",
        [Submesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![0, 1, 2])],
    ))
}

fn engine_with_merge(default_merge: MergeDefault) -> Engine {
    Engine::new(
        EngineSettings::default().with_default_merge(default_merge),
        Arc::new(HeadlessDevice::new()),
    )
}

// ============================================================================
// Node Creation & Removal
// ============================================================================

#[test]
fn scene_create_node_under_root() {
    let scene = Scene::new("main");
    let node = scene.create_node("a");
    let graph = scene.graph();
    assert_eq!(graph.node(node).unwrap().parent(), Some(scene.root_node()));
    assert_eq!(graph.find_by_name("a"), Some(node));
    assert_eq!(graph.len(), 2);
}

#[test]
fn scene_remove_node_detaches_objects() {
    let scene = Scene::new("main");
    let parent = scene.create_node("parent");
    let child = scene.create_child("child", parent).unwrap();
    let keep = scene.create_node("keep");

    scene.create_geometry("g", child, mesh(), None).unwrap();
    scene.create_light(Light::point("bulb", 5.0), parent).unwrap();
    scene.create_light(Light::directional("sun"), keep).unwrap();

    let detached = scene.remove_node(parent).unwrap();
    assert_eq!(detached, 2);
    assert!(!scene.graph().contains(child));
    // Objects survive removal, unattached.
    assert!(scene.geometries().contains("g"));
    assert_eq!(scene.geometries().parent_of("g"), None);
    assert_eq!(scene.lights().parent_of("bulb"), None);
    assert_eq!(scene.lights().parent_of("sun"), Some(keep));
}

#[test]
fn scene_remove_root_is_rejected() {
    let scene = Scene::new("main");
    let result = scene.remove_node(scene.root_node());
    assert!(matches!(result, Err(EmberError::InvalidHierarchy(_))));
}

#[test]
fn scene_attach_cycle_is_rejected() {
    let scene = Scene::new("main");
    let a = scene.create_node("a");
    let b = scene.create_child("b", a).unwrap();
    let result = scene.graph_mut().attach(a, b);
    assert!(matches!(result, Err(EmberError::InvalidHierarchy(_))));
}

// ============================================================================
// Resolved Node State
// ============================================================================

#[test]
fn scene_update_composes_world_matrices() {
    let scene = Scene::new("main");
    let parent = scene.create_node("parent");
    let child = scene.create_child("child", parent).unwrap();
    {
        let mut graph = scene.graph_mut();
        graph.node_mut(parent).unwrap().transform = Transform::from_translation(Vec3::new(1.0, 0.0, 0.0));
        graph.node_mut(child).unwrap().transform = Transform::from_translation(Vec3::new(0.0, 2.0, 0.0));
    }
    scene.update();

    let graph = scene.graph();
    let world = graph.node(child).unwrap().world_matrix();
    assert!(Vec3::from(world.translation).abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), 1e-6));
}

#[test]
fn scene_flags_propagate_to_descendants() {
    let scene = Scene::new("main");
    let parent = scene.create_node("parent");
    let child = scene.create_child("child", parent).unwrap();
    let detached = scene.graph_mut().create_detached("loose");

    scene.graph_mut().node_mut(parent).unwrap().set_enabled(false);
    scene.update();
    {
        let graph = scene.graph();
        assert!(!graph.node(child).unwrap().is_displayable());
        assert!(graph.node(child).unwrap().is_visible());
        assert!(!graph.node(detached).unwrap().is_displayable());
    }

    {
        let mut graph = scene.graph_mut();
        let node = graph.node_mut(parent).unwrap();
        node.set_enabled(true);
        node.set_visible(false);
    }
    scene.update();
    let graph = scene.graph();
    assert!(graph.node(child).unwrap().is_displayable());
    assert!(!graph.node(child).unwrap().is_visible());
}

// ============================================================================
// Cameras
// ============================================================================

#[test]
fn scene_active_camera_must_exist() {
    let scene = Scene::new("main");
    assert!(matches!(
        scene.set_active_camera("nope"),
        Err(EmberError::CameraNotFound(_))
    ));

    let node = scene.create_node("eye");
    scene
        .create_camera("cam", node, Projection::perspective(45.0, 1.5, 0.1, 50.0))
        .unwrap();
    scene.set_active_camera("cam").unwrap();
    assert_eq!(scene.active_camera().as_deref(), Some("cam"));
}

#[test]
fn scene_active_frustum_follows_camera_node() {
    let scene = Scene::new("main");
    let node = scene.create_node("eye");
    scene
        .create_camera("cam", node, Projection::perspective(60.0, 1.0, 0.1, 100.0))
        .unwrap();
    scene.set_active_camera("cam").unwrap();

    let frustum = scene.active_frustum().unwrap();
    assert!(frustum.contains_point(Vec3::new(0.0, 0.0, -5.0)));
    assert!(!frustum.contains_point(Vec3::new(0.0, 0.0, 5.0)));

    // Turn the camera around.
    scene.graph_mut().node_mut(node).unwrap().transform.set_rotation_euler(0.0, std::f32::consts::PI, 0.0);
    let frustum = scene.active_frustum().unwrap();
    assert!(frustum.contains_point(Vec3::new(0.0, 0.0, 5.0)));
}

#[test]
fn scene_camera_frustum_of_detached_camera_fails() {
    let scene = Scene::new("main");
    let node = scene.create_node("eye");
    scene
        .create_camera("cam", node, Projection::orthographic(5.0, 1.0, 0.1, 10.0))
        .unwrap();
    scene.cameras().detach("cam");
    assert!(matches!(scene.camera_frustum("cam"), Err(EmberError::NodeNotFound)));
}

// ============================================================================
// Deferred Changes
// ============================================================================

#[test]
fn scene_post_change_applies_on_flush() {
    let scene = Arc::new(Scene::new("main"));
    let poster = Arc::clone(&scene);
    std::thread::spawn(move || {
        poster.post_change(|scene| {
            scene.create_node("from_thread");
        });
    })
    .join()
    .unwrap();

    assert_eq!(scene.pending_changes(), 1);
    assert!(scene.graph().find_by_name("from_thread").is_none());
    assert_eq!(scene.flush_changes(), 1);
    assert!(scene.graph().find_by_name("from_thread").is_some());
}

#[test]
fn scene_changes_posted_during_flush_wait() {
    let scene = Scene::new("main");
    scene.post_change(|scene| {
        scene.create_node("first");
        scene.post_change(|scene| {
            scene.create_node("second");
        });
    });

    assert_eq!(scene.flush_changes(), 1);
    assert!(scene.graph().find_by_name("second").is_none());
    assert_eq!(scene.pending_changes(), 1);
    assert_eq!(scene.flush_changes(), 1);
    assert!(scene.graph().find_by_name("second").is_some());
}

// ============================================================================
// Scene Merge
// ============================================================================

#[test]
fn scene_merge_grafts_nodes_and_remaps_attachments() -> anyhow::Result<()> {
    init_logging();
    let engine = engine_with_merge(MergeDefault::KeepExisting);
    let main = engine.create_scene("main")?;
    let level = engine.create_scene("level")?;

    let tree_node = level.create_node("tree_node");
    let leaf_node = level.create_child("leaf_node", tree_node)?;
    level.create_geometry("tree", tree_node, mesh(), None)?;
    level.create_light(Light::point("lamp", 3.0), leaf_node)?;

    let report = main.merge(&level)?;
    assert_eq!(report.nodes, 2);
    assert!(report.is_complete());

    let graph = main.graph();
    let tree_parent = main.geometries().parent_of("tree").unwrap();
    assert_eq!(graph.node(tree_parent).unwrap().name(), "tree_node");
    assert_eq!(graph.node(tree_parent).unwrap().parent(), Some(main.root_node()));
    let lamp_parent = main.lights().parent_of("lamp").unwrap();
    assert_eq!(graph.node(lamp_parent).unwrap().parent(), Some(tree_parent));

    assert!(level.geometries().is_empty());
    assert!(level.lights().is_empty());
    assert_eq!(level.graph().len(), 1);
    Ok(())
}

#[test]
fn scene_merge_keep_existing_drops_duplicates() {
    let engine = engine_with_merge(MergeDefault::KeepExisting);
    let main = engine.create_scene("main").unwrap();
    let level = engine.create_scene("level").unwrap();

    let mine = main.create_geometry("box", main.create_node("a"), mesh(), None).unwrap();
    level.create_geometry("box", level.create_node("b"), mesh(), None).unwrap();

    let report = main.merge(&level).unwrap();
    assert_eq!(report.geometries.kept_existing, vec!["box".to_string()]);
    assert!(Arc::ptr_eq(&main.geometries().find("box").unwrap(), &mine));
    assert_eq!(main.geometries().len(), 1);
}

#[test]
fn scene_merge_renames_with_source_name() {
    let engine = engine_with_merge(MergeDefault::RenameWithSourceName);
    let main = engine.create_scene("main").unwrap();
    let level = engine.create_scene("level").unwrap();

    let material = Arc::new(Material::opaque("sprite"));
    main.create_billboards(
        BillboardList::new("sprites", vec![Vec3::ZERO], Vec2::ONE).with_material(material.clone()),
        main.create_node("a"),
    )
    .unwrap();
    let b = level.create_node("b");
    level
        .create_billboards(
            BillboardList::new("sprites", vec![Vec3::X], Vec2::ONE).with_material(material),
            b,
        )
        .unwrap();
    level.create_geometry("box", b, mesh(), None).unwrap();

    let report = main.merge(&level).unwrap();
    assert_eq!(
        report.billboards.renamed,
        vec![("sprites".to_string(), "level_sprites".to_string())]
    );
    assert_eq!(report.geometries.grafted, vec!["box".to_string()]);

    let mut keys = main.billboards().keys();
    keys.sort();
    assert_eq!(keys, vec!["level_sprites", "sprites"]);
    assert_eq!(main.billboards().parent_of("level_sprites"), main.geometries().parent_of("box"));
}

#[test]
fn scene_merge_into_itself_is_noop() {
    let scene = Scene::new("main");
    scene.create_geometry("g", scene.create_node("a"), mesh(), None).unwrap();
    let report = scene.merge(&scene).unwrap();
    assert_eq!(report.nodes, 0);
    assert_eq!(scene.geometries().len(), 1);
    assert_eq!(scene.graph().len(), 2);
}

#[test]
fn scene_merge_clears_source_active_camera() {
    let main = Scene::new("main");
    let level = Scene::new("level");
    level
        .create_camera("cam", level.create_node("eye"), Projection::perspective(60.0, 1.0, 0.1, 10.0))
        .unwrap();
    level.set_active_camera("cam").unwrap();

    main.merge(&level).unwrap();
    assert_eq!(level.active_camera(), None);
    assert!(main.cameras().contains("cam"));
    assert_eq!(main.active_camera(), None);
}

#[test]
fn scene_cross_merges_from_two_threads_finish() -> anyhow::Result<()> {
    init_logging();
    let a = Arc::new(Scene::new("a"));
    let b = Arc::new(Scene::new("b"));
    let (done_tx, done_rx) = mpsc::channel();

    for (into, from) in [(Arc::clone(&a), Arc::clone(&b)), (Arc::clone(&b), Arc::clone(&a))] {
        let done_tx = done_tx.clone();
        thread::spawn(move || {
            for i in 0..2_000 {
                into.create_node(format!("n{i}"));
                into.merge(&from).unwrap();
            }
            done_tx.send(()).unwrap();
        });
    }

    for _ in 0..2 {
        done_rx.recv_timeout(Duration::from_secs(20))?;
    }
    // Every created node ends up in exactly one of the two graphs.
    assert_eq!(a.graph().len() + b.graph().len(), 2 + 4_000);
    Ok(())
}
