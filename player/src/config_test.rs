#[cfg(test)]
mod tests {
    use crate::config::{ConfigError, PlayerConfig, PlayerOptions};
    use crate::retry::RetryPolicy;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = PlayerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.manifest_retry.max_attempts, 2);
        assert_eq!(config.manifest_retry.base_delay, Duration::from_secs(1));
        assert_eq!(config.preferred_text_language, "");
    }

    #[tokio::test]
    async fn test_load_from_toml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
preferred_audio_language = "en"
preferred_text_language = "es"

[manifest_retry]
max_attempts = 4
base_delay = 250
timeout = 3000

[logging]
level = "debug"
"#
        )
        .unwrap();

        let config = PlayerConfig::load_from_file(file.path()).await.unwrap();
        assert_eq!(config.preferred_audio_language, "en");
        assert_eq!(config.preferred_text_language, "es");
        assert_eq!(config.manifest_retry.max_attempts, 4);
        assert_eq!(config.manifest_retry.base_delay, Duration::from_millis(250));
        assert_eq!(config.manifest_retry.timeout, Some(Duration::from_secs(3)));
        // Unset fields keep their defaults.
        assert_eq!(config.manifest_retry.backoff_factor, 2.0);
        assert_eq!(config.logging.level, "debug");
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("player.toml");

        let mut config = PlayerConfig::default();
        config.preferred_text_language = "fr".to_string();
        config.manifest_retry.timeout = Some(Duration::from_millis(1500));
        config.save_to_file(&path).await.unwrap();

        let loaded = PlayerConfig::load_from_file(&path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");
        match PlayerConfig::load_from_file(&path).await {
            Err(ConfigError::Io { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_file_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[manifest_retry]\nmax_attempts = 0").unwrap();
        assert!(matches!(
            PlayerConfig::load_from_file(file.path()).await,
            Err(ConfigError::Invalid { .. })
        ));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "preferred_text_language = [").unwrap();
        assert!(matches!(
            PlayerConfig::load_from_file(file.path()).await,
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_validation_rules() {
        let mut config = PlayerConfig::default();
        config.manifest_retry.fuzz_factor = 1.5;
        assert!(config.validate().is_err());

        let mut config = PlayerConfig::default();
        config.manifest_retry.backoff_factor = 0.5;
        assert!(config.validate().is_err());

        let mut config = PlayerConfig::default();
        config.manifest_retry.timeout = Some(Duration::ZERO);
        assert!(config.validate().is_err());

        let mut config = PlayerConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merge_only_touches_set_fields() {
        let mut base = PlayerConfig::default();
        base.preferred_audio_language = "en".to_string();

        let merged = base.merged(PlayerOptions::new().preferred_text_language("de"));
        assert_eq!(merged.preferred_audio_language, "en");
        assert_eq!(merged.preferred_text_language, "de");
        assert_eq!(merged.manifest_retry, base.manifest_retry);

        let policy = RetryPolicy {
            max_attempts: 7,
            ..RetryPolicy::default()
        };
        let merged = merged.merged(PlayerOptions::new().manifest_retry(policy.clone()));
        assert_eq!(merged.manifest_retry, policy);
        assert_eq!(merged.preferred_text_language, "de");
    }

    #[test]
    fn test_env_overrides() {
        std::env::set_var("PLAYBACK_PREFERRED_TEXT_LANGUAGE", "pt-BR");
        std::env::set_var("PLAYBACK_MANIFEST_MAX_ATTEMPTS", "5");
        std::env::set_var("PLAYBACK_LOG_LEVEL", "warn");

        let mut config = PlayerConfig::default();
        config.apply_env_overrides();

        std::env::remove_var("PLAYBACK_PREFERRED_TEXT_LANGUAGE");
        std::env::remove_var("PLAYBACK_MANIFEST_MAX_ATTEMPTS");
        std::env::remove_var("PLAYBACK_LOG_LEVEL");

        assert_eq!(config.preferred_text_language, "pt-BR");
        assert_eq!(config.manifest_retry.max_attempts, 5);
        assert_eq!(config.logging.level, "warn");
    }
}
