//! Integration tests for the Configuration System

use super::test_utils::with_isolated_env;
use parley::config::{global_config_path, ConfigLoader, ParleyConfig};
use parley::store::{ConversationStore, SledConversationStore};
use parley::{Conversation, Role, Workflow};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_layers_apply_in_precedence_order() {
    let test_dir = TempDir::new().unwrap();
    with_isolated_env(&test_dir, || {
        let global_path = global_config_path().unwrap();
        assert_eq!(global_path, test_dir.path().join("parley").join("config.toml"));
        std::fs::create_dir_all(global_path.parent().unwrap()).unwrap();
        std::fs::write(
            &global_path,
            r#"
[allocator]
block_size = 10

[assembly]
fallback_to_all_participants = false
"#,
        )
        .unwrap();

        let workspace = test_dir.path().join("workspace");
        std::fs::create_dir_all(workspace.join("config")).unwrap();
        std::fs::write(
            workspace.join("config").join("config.toml"),
            "[allocator]\nblock_size = 20\n",
        )
        .unwrap();
        std::fs::write(
            workspace.join("config").join("staging.toml"),
            "[storage]\nstore_path = \"/tmp/parley-staged\"\n",
        )
        .unwrap();

        std::env::set_var("PARLEY_ENV", "staging");
        let config = ConfigLoader::load(&workspace).unwrap();
        assert_eq!(config.allocator.block_size, 20);
        assert!(!config.assembly.fallback_to_all_participants);
        assert_eq!(
            config.storage.store_path,
            std::path::PathBuf::from("/tmp/parley-staged")
        );

        std::env::set_var("PARLEY_ALLOCATOR__BLOCK_SIZE", "30");
        let config = ConfigLoader::load(&workspace).unwrap();
        assert_eq!(config.allocator.block_size, 30);
        assert!(config.validate().is_ok());
    });
}

#[test]
fn test_development_profile_applies_without_env() {
    let test_dir = TempDir::new().unwrap();
    with_isolated_env(&test_dir, || {
        let workspace = test_dir.path().join("workspace");
        std::fs::create_dir_all(workspace.join("config")).unwrap();
        std::fs::write(
            workspace.join("config").join("config.toml"),
            "[allocator]\nblock_size = 20\n\n[assembly]\nfallback_to_all_participants = false\n",
        )
        .unwrap();
        std::fs::write(
            workspace.join("config").join("development.toml"),
            "[allocator]\nblock_size = 5\n",
        )
        .unwrap();

        let config = ConfigLoader::load(&workspace).unwrap();
        assert_eq!(config.allocator.block_size, 5);
        assert!(!config.assembly.fallback_to_all_participants);
    });
}

#[test]
fn test_defaults_without_any_files() {
    let test_dir = TempDir::new().unwrap();
    with_isolated_env(&test_dir, || {
        let config = ConfigLoader::load(test_dir.path()).unwrap();
        assert_eq!(config.allocator.block_size, 100);
        assert!(config.assembly.fallback_to_all_participants);
        assert_eq!(config.assembly.model_roles.len(), 3);
        assert!(config.storage.store_path.ends_with("store"));
        assert!(config.validate().is_ok());
    });
}

#[test]
fn test_invalid_values_are_reported() {
    let test_dir = TempDir::new().unwrap();
    let config_file = test_dir.path().join("parley.toml");
    std::fs::write(
        &config_file,
        r#"
[allocator]
block_size = 0

[logging]
format = "xml"
"#,
    )
    .unwrap();

    let config = ConfigLoader::load_from_file(&config_file).unwrap();
    let errors = config.validate().unwrap_err();
    let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    assert_eq!(
        messages,
        vec![
            "Allocator: Block size must be at least 1".to_string(),
            "Logging: Invalid format 'xml'".to_string(),
        ]
    );
}

#[test]
fn test_configured_engine_round_trip() {
    let test_dir = TempDir::new().unwrap();
    let config_file = test_dir.path().join("parley.toml");
    let store_path = test_dir.path().join("conversations");
    std::fs::write(
        &config_file,
        format!(
            "[storage]\nstore_path = {:?}\n\n[allocator]\nblock_size = 2\n",
            store_path.to_string_lossy()
        ),
    )
    .unwrap();

    let config: ParleyConfig = ConfigLoader::load_from_file(&config_file).unwrap();
    let store: Arc<dyn ConversationStore> =
        Arc::new(SledConversationStore::new(&config.storage.store_path).unwrap());
    let conversation = Conversation::create(
        store.clone(),
        Workflow::default(),
        config.conversation_settings(),
    )
    .unwrap();

    for n in 0..5 {
        conversation.append(Role::User, format!("{}", n), None).unwrap();
    }
    // Three refills of two ids each.
    assert_eq!(store.sequence_high_water().unwrap(), 6);
    assert!(store_path.exists());
}
