use scriptorium::SuiteConfig;
use scriptorium::pipeline::ChunkingMode;
use tempfile::NamedTempFile;

#[test]
fn test_config_serialization_roundtrip() {
    let original_config = SuiteConfig::default();

    // Test serialization to TOML string
    let toml_str = original_config
        .to_toml_string()
        .expect("Should be able to serialize config to TOML");

    assert!(!toml_str.is_empty(), "TOML string should not be empty");
    assert!(toml_str.contains("provider_id"), "Should contain provider_id field");

    // Test deserialization from TOML string
    let deserialized_config =
        SuiteConfig::from_toml_str(&toml_str).expect("Should be able to deserialize TOML string");

    assert_eq!(original_config, deserialized_config);
}

#[test]
fn test_config_file_operations() {
    let mut original_config = SuiteConfig::default();
    original_config.provider.provider_id = "anthropic".to_string();
    original_config.pipeline.flat_concurrency = 5;

    let temp_file = NamedTempFile::new().expect("Should be able to create temporary file");
    let temp_path = temp_file.path();

    original_config
        .to_toml_file(temp_path)
        .expect("Should be able to save config to file");

    let loaded_config =
        SuiteConfig::from_toml_file(temp_path).expect("Should be able to load config from file");

    assert_eq!(original_config, loaded_config);
}

#[test]
fn test_config_toml_structure() {
    let toml_str = SuiteConfig::default()
        .to_toml_string()
        .expect("Should be able to serialize config");

    assert!(toml_str.contains("[provider]"), "Should contain provider section");
    assert!(toml_str.contains("[pipeline]"), "Should contain pipeline section");
    assert!(toml_str.contains("target_chunk_size"), "Should contain target_chunk_size");
    assert!(toml_str.contains("max_reduction_inputs"), "Should contain max_reduction_inputs");
    assert!(!toml_str.contains("api_key"), "Unset key should not be written");
}

#[test]
fn test_config_error_handling() {
    let result = SuiteConfig::from_toml_file("non_existent_file.toml");
    assert!(result.is_err(), "Should fail when loading non-existent file");

    let result = SuiteConfig::from_toml_str("invalid toml content [[[");
    assert!(result.is_err(), "Should fail when parsing invalid TOML");

    let result = SuiteConfig::from_toml_str("[pipeline]\nmode = \"sideways\"\n");
    assert!(result.is_err(), "Should reject an unknown chunking mode");
}

#[test]
fn test_partial_config_keeps_defaults() {
    let config = SuiteConfig::from_toml_str(
        r#"
[provider]
provider_id = "ollama"
model = "llama3.1"

[pipeline]
mode = "hierarchical"
target_chunk_size = 8000
"#,
    )
    .expect("Should parse partial config");

    assert_eq!(config.provider.provider_id, "ollama");
    assert_eq!(config.provider.model, "llama3.1");
    assert!(config.provider.api_key.is_none());
    assert_eq!(config.pipeline.mode, ChunkingMode::Hierarchical);
    assert_eq!(config.pipeline.target_chunk_size, 8000);

    let defaults = SuiteConfig::default();
    assert_eq!(config.pipeline.flat_concurrency, defaults.pipeline.flat_concurrency);
    assert_eq!(
        config.provider.request_timeout_secs,
        defaults.provider.request_timeout_secs
    );
}
