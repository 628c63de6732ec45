//! Unit tests for configuration.

#[cfg(test)]
mod path_expansion_tests {
    use super::super::Config;
    use std::path::PathBuf;

    #[test]
    fn expand_path_handles_tilde() {
        let result = Config::expand_path("~/test");
        assert!(!result.to_string_lossy().starts_with('~'));
    }

    #[test]
    fn expand_path_handles_absolute_path() {
        let result = Config::expand_path("/absolute/path");
        assert_eq!(result, PathBuf::from("/absolute/path"));
    }

    #[test]
    fn expand_path_handles_env_vars() {
        temp_env::with_var("TRIAGE_TEST_VAR", Some("/test/path"), || {
            let result = Config::expand_path("$TRIAGE_TEST_VAR/subdir");
            assert!(result.to_string_lossy().contains("/test/path"));
        });
    }
}

#[cfg(test)]
mod default_config_tests {
    use super::super::Config;
    use std::time::Duration;

    #[test]
    fn default_has_database_path() {
        let config = Config::default();
        assert!(config.database.to_string_lossy().contains("triage"));
        assert!(config.database.to_string_lossy().ends_with(".db"));
    }

    #[test]
    fn default_engine_bounds() {
        let config = Config::default();
        assert_eq!(config.engine.max_conflict_retries, 5);
        assert_eq!(config.engine.operation_timeout(), Duration::from_secs(10));
        assert_eq!(config.engine.busy_timeout(), Duration::from_millis(5_000));
    }

    #[test]
    fn backoff_grows_linearly() {
        let config = Config::default();
        assert_eq!(config.engine.backoff(1), Duration::from_millis(25));
        assert_eq!(config.engine.backoff(3), Duration::from_millis(75));
    }

    #[test]
    fn default_api_listens_locally() {
        let config = Config::default();
        assert_eq!(config.api.host, "127.0.0.1");
        assert_eq!(config.api.port, 3000);
    }

    #[test]
    fn default_seed_enables_everything() {
        let config = Config::default();
        assert!(config.seed.default_agents);
        assert!(config.seed.canned_templates);
        assert!(config.seed.sample_conversations);
    }
}

#[cfg(test)]
mod load_tests {
    use super::super::Config;
    use crate::Error;

    const RETRIES_VAR: &str = "TRIAGE__ENGINE__MAX_CONFLICT_RETRIES";

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[api]\nport = 8088\n").unwrap();

        temp_env::with_var_unset(RETRIES_VAR, || {
            let config = Config::load_from_path(&path).unwrap();
            assert_eq!(config.api.port, 8088);
            assert_eq!(config.api.host, "127.0.0.1");
            assert_eq!(config.engine.max_conflict_retries, 5);
        });
    }

    #[test]
    fn environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[engine]\nmax_conflict_retries = 2\n").unwrap();

        temp_env::with_var(RETRIES_VAR, Some("9"), || {
            let config = Config::load_from_path(&path).unwrap();
            assert_eq!(config.engine.max_conflict_retries, 9);
        });
    }

    #[test]
    fn invalid_toml_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[engine\nbroken").unwrap();

        temp_env::with_var_unset(RETRIES_VAR, || {
            let err = Config::load_from_path(&path).unwrap_err();
            assert!(matches!(err, Error::Config(_)));
        });
    }

    #[test]
    fn missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load_from_path(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn ensure_at_writes_defaults_then_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        temp_env::with_var_unset(RETRIES_VAR, || {
            let created = Config::ensure_at(&path).unwrap();
            assert!(path.exists());

            let reloaded = Config::ensure_at(&path).unwrap();
            assert_eq!(reloaded.database, created.database);
            assert_eq!(reloaded.api.port, created.api.port);
        });
    }
}
