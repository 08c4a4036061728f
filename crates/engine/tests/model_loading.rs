use engine::config::EngineConfig;
use engine::ModelBuilder;
use std::path::PathBuf;

fn workspace_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

#[test]
fn bundled_quad_loads_as_two_indexed_triangles() {
    let builder = ModelBuilder::load_model(workspace_root().join("models/quad.obj")).unwrap();

    assert_eq!(builder.vertices.len(), 4);
    assert_eq!(builder.indices.len(), 6);
    assert!(builder.indices.iter().all(|&index| (index as usize) < builder.vertices.len()));

    for vertex in &builder.vertices {
        assert_eq!(vertex.position[1], 0.0);
        assert_eq!(vertex.normal, [0.0, -1.0, 0.0]);
        assert_eq!(vertex.color, [1.0, 1.0, 1.0]);
    }
}

#[test]
fn default_scene_points_at_bundled_models() {
    let config = EngineConfig::default();
    for object in &config.scene.objects {
        let path = workspace_root().join(&object.model);
        assert!(path.exists(), "missing model {}", path.display());
    }
}

#[test]
fn missing_model_file_is_an_error() {
    let result = ModelBuilder::load_model(workspace_root().join("models/does_not_exist.obj"));
    assert!(result.is_err());
}

#[test]
fn bundled_config_matches_defaults() {
    let config = EngineConfig::load(workspace_root().join("viewer.toml")).unwrap();
    let defaults = EngineConfig::default();

    assert_eq!(config.window, defaults.window);
    assert_eq!(config.camera, defaults.camera);
    assert_eq!(config.scene, defaults.scene);
    assert!(!config.render.vsync);
}
