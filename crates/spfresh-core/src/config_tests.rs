//! Tests for config module

#[cfg(test)]
mod tests {
    use crate::config::*;
    use serial_test::serial;
    use std::io::Write;

    // ========================================================================
    // Defaults
    // ========================================================================

    #[test]
    fn test_config_default_values() {
        // Arrange & Act
        let config = FreshConfig::default();

        // Assert
        assert_eq!(config.build.algorithm, "BKT");
        assert_eq!(config.build.distance, "L2");
        assert!((config.build.select_head_ratio - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.build.refine_iterations, 3);
        assert_eq!(config.build.posting_page_limit, 12);
        assert_eq!(config.build.search_posting_page_limit, 3);
        assert_eq!(config.build.internal_result_num, 64);
        assert_eq!(config.build.search_internal_result_num, 32);
        assert_eq!(config.build.result_num, 10);
        assert_eq!(config.threads, ThreadsConfig::default());
        assert_eq!(config.search.max_k, 1000);
        assert_eq!(config.limits.max_dimension, 4096);
        assert_eq!(config.limits.max_threads, 256);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(FreshConfig::default().validate().is_ok());
    }

    // ========================================================================
    // Thread resolution
    // ========================================================================

    #[test]
    fn test_threads_resolve_prefers_request() {
        assert_eq!(ThreadsConfig::resolve(3, 8), 3);
    }

    #[test]
    fn test_threads_resolve_falls_back_to_configured() {
        assert_eq!(ThreadsConfig::resolve(0, 8), 8);
    }

    #[test]
    fn test_threads_resolve_zero_uses_available_parallelism() {
        // Arrange
        let expected = std::thread::available_parallelism().map_or(1, |n| n.get());

        // Act & Assert
        assert_eq!(ThreadsConfig::resolve(0, 0), expected);
    }

    // ========================================================================
    // TOML parsing
    // ========================================================================

    #[test]
    fn test_from_toml_overrides_sections() {
        // Arrange
        let toml_str = r#"
            [build]
            distance = "Cosine"
            posting_page_limit = 24

            [threads]
            search = 16

            [search]
            max_k = 50
        "#;

        // Act
        let config = FreshConfig::from_toml(toml_str).expect("parse");

        // Assert
        assert_eq!(config.build.distance, "Cosine");
        assert_eq!(config.build.posting_page_limit, 24);
        assert_eq!(config.build.algorithm, "BKT");
        assert_eq!(config.threads.search, 16);
        assert_eq!(config.threads.insert, 0);
        assert_eq!(config.search.max_k, 50);
    }

    #[test]
    fn test_from_toml_rejects_wrong_type() {
        // Arrange
        let toml_str = r#"
            [search]
            max_k = "many"
        "#;

        // Act
        let result = FreshConfig::from_toml(toml_str);

        // Assert
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_to_toml_round_trip() {
        // Arrange
        let mut config = FreshConfig::default();
        config.build.tmp_dir = "/var/tmp/spfresh/".to_string();
        config.threads.delete = 4;

        // Act
        let toml_str = config.to_toml().expect("serialize");
        let parsed = FreshConfig::from_toml(&toml_str).expect("parse");

        // Assert
        assert_eq!(parsed, config);
    }

    // ========================================================================
    // Validation
    // ========================================================================

    fn invalid_key(config: &FreshConfig) -> String {
        match config.validate() {
            Err(ConfigError::InvalidValue { key, .. }) => key,
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_select_head_ratio_bounds() {
        let mut config = FreshConfig::default();

        config.build.select_head_ratio = 0.0;
        assert_eq!(invalid_key(&config), "build.select_head_ratio");

        config.build.select_head_ratio = 1.5;
        assert_eq!(invalid_key(&config), "build.select_head_ratio");

        config.build.select_head_ratio = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_unknown_distance() {
        // Arrange
        let mut config = FreshConfig::default();
        config.build.distance = "Manhattan".to_string();

        // Act & Assert
        assert_eq!(invalid_key(&config), "build.distance");
    }

    #[test]
    fn test_validate_unknown_algorithm() {
        let mut config = FreshConfig::default();
        config.build.algorithm = "HNSW".to_string();
        assert_eq!(invalid_key(&config), "build.algorithm");
    }

    #[test]
    fn test_validate_zero_max_k() {
        let mut config = FreshConfig::default();
        config.search.max_k = 0;
        assert_eq!(invalid_key(&config), "search.max_k");
    }

    #[test]
    fn test_validate_dimension_limit() {
        let mut config = FreshConfig::default();
        config.limits.max_dimension = 100_000;
        assert_eq!(invalid_key(&config), "limits.max_dimension");
    }

    #[test]
    fn test_validate_thread_counts_capped_by_limit() {
        // Arrange
        let mut config = FreshConfig::default();
        config.limits.max_threads = 4;
        config.build.threads = 4;
        config.threads.search = 8;

        // Act & Assert
        assert_eq!(invalid_key(&config), "threads.search");
    }

    // ========================================================================
    // File and environment layering
    // ========================================================================

    #[test]
    #[serial]
    fn test_load_from_path_reads_file() {
        // Arrange
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[threads]\ninsert = 6").expect("write");

        // Act
        let config = FreshConfig::load_from_path(file.path()).expect("load");

        // Assert
        assert_eq!(config.threads.insert, 6);
        assert_eq!(config.threads.delete, 0);
    }

    #[test]
    #[serial]
    fn test_load_missing_file_uses_defaults() {
        // Arrange
        let dir = tempfile::tempdir().expect("temp dir");

        // Act
        let config = FreshConfig::load_from_path(dir.path().join("absent.toml")).expect("load");

        // Assert
        assert_eq!(config, FreshConfig::default());
    }

    #[test]
    #[serial]
    fn test_env_overrides_file() {
        // Arrange
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[search]\nmax_k = 20").expect("write");
        std::env::set_var("SPFRESH_SEARCH__MAX_K", "40");

        // Act
        let result = FreshConfig::load_from_path(file.path());
        std::env::remove_var("SPFRESH_SEARCH__MAX_K");

        // Assert
        assert_eq!(result.expect("load").search.max_k, 40);
    }

    #[test]
    fn test_config_error_converts_to_crate_error() {
        // Arrange
        let err = ConfigError::InvalidValue {
            key: "search.max_k".to_string(),
            message: "value must be >= 1".to_string(),
        };

        // Act
        let err: crate::Error = err.into();

        // Assert
        assert_eq!(err.code(), "SPF-001");
        assert!(err.to_string().contains("search.max_k"));
    }
}
