//! Session settings from `ramwatch.toml` and the command line
//!
//! ```toml
//! region = "us"
//! pause_timeout_ms = 500
//! poll_interval_ms = 33
//! process_name = "Project64"
//!
//! [mapping]
//! process_offset = "0x7FF6_2000_0000"
//! target = "big"
//! host = "little"
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use ramwatch_core::{SessionConfig, SessionConfigBuilder};
use tracing::{debug, info};

use crate::cli::TargetArgs;

/// Load settings, falling back to defaults when the file does not exist
pub fn load(path: &Path) -> Result<SessionConfig> {
    if !path.exists() {
        debug!("No config at {}, using defaults", path.display());
        return Ok(SessionConfig::default());
    }

    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config {}", path.display()))?;
    info!("Loaded config from {}", path.display());
    Ok(config)
}

/// Let command line flags win over the file
pub fn apply_overrides(config: &SessionConfig, target: &TargetArgs) -> SessionConfig {
    let mut builder = SessionConfigBuilder::from_config(config);
    if let Some(region) = target.region {
        builder = builder.region(region);
    }
    if let Some(offset) = target.offset {
        builder = builder.process_offset(offset);
    }
    if let Some(name) = &target.process_name {
        builder = builder.process_name(name.clone());
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ramwatch_core::{Endianness, Region};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = load(Path::new("/nonexistent/ramwatch.toml")).unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn test_load_toml() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
region = "pal"
poll_interval_ms = 16

[mapping]
process_offset = "0x7FF6_2000_0000"
host = "big"
"#
        )
        .unwrap();

        let config = load(file.path()).unwrap();
        assert_eq!(config.region, Region::Pal);
        assert_eq!(config.poll_interval_ms, 16);
        assert_eq!(config.mapping.process_offset, 0x7FF6_2000_0000);
        assert_eq!(config.mapping.host, Endianness::Big);
        assert_eq!(config.mapping.target, Endianness::Big);
    }

    #[test]
    fn test_bad_toml_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "region = 5").unwrap();
        assert!(load(file.path()).is_err());
    }

    #[test]
    fn test_flags_override_file() {
        let config = SessionConfig::builder()
            .region(Region::Us)
            .process_offset(0x1000)
            .build();
        let target = TargetArgs {
            region: Some(Region::Jp),
            offset: Some(0x2000),
            process_name: Some("mupen64".to_string()),
            ..Default::default()
        };

        let merged = apply_overrides(&config, &target);
        assert_eq!(merged.region, Region::Jp);
        assert_eq!(merged.mapping.process_offset, 0x2000);
        assert_eq!(merged.process_name.as_deref(), Some("mupen64"));
        assert_eq!(merged.pause_timeout_ms, config.pause_timeout_ms);
    }
}
