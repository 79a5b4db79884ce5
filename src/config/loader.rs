//! Configuration file loading and validation

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::AppConfig;
use crate::error::{AppError, Result};
use crate::gadget::{FrameRegistry, FrameSpec};

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "UVC_GADGET_CONFIG";

/// Configuration file used when nothing else is given
pub const DEFAULT_CONFIG_PATH: &str = "/etc/uvc-gadget/gadget.toml";

/// Pick the configuration file: explicit path, then environment, then the
/// default location if it exists
pub fn resolve_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path);
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    let default = PathBuf::from(DEFAULT_CONFIG_PATH);
    default.exists().then_some(default)
}

/// Load configuration, falling back to defaults when there is no file
pub fn load(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            let text = std::fs::read_to_string(path).map_err(|e| {
                AppError::Config(format!("Failed to read {}: {}", path.display(), e))
            })?;
            parse(&text)?
        }
        None => {
            debug!("No configuration file, using defaults");
            AppConfig::default()
        }
    };
    // Fail early on a bad registry rather than half way through start
    registry(&config)?;
    Ok(config)
}

/// Parse TOML text
pub fn parse(text: &str) -> Result<AppConfig> {
    toml::from_str(text).map_err(|e| AppError::Config(format!("Invalid configuration: {}", e)))
}

/// Build the validated frame registry from the configuration
pub fn registry(config: &AppConfig) -> Result<FrameRegistry> {
    let frames = config
        .frames
        .iter()
        .map(|frame| {
            FrameSpec::new(
                frame.name.clone(),
                frame.format.parse()?,
                frame.width,
                frame.height,
                frame.intervals.clone(),
            )
        })
        .collect::<Result<Vec<_>>>()
        .and_then(FrameRegistry::new);

    frames.map_err(|e| match e {
        AppError::Validation(msg) => AppError::Config(msg),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gadget::FormatGroup;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
gadget_name = "cam"
udc = "fe980000.usb"
settle_delay_ms = 250

[identity]
vendor_id = 0x1234
product = "Test Camera"

[function]
instance = "usb1"
streaming_maxpacket = 1024

[[frames]]
name = "vga"
format = "YUYV"
width = 640
height = 480
intervals = [333333, 666666]

[[frames]]
name = "hd"
format = "jpeg"
width = 1280
height = 720
intervals = [333333]
"#;

    #[test]
    fn test_parse_sample() {
        let config = parse(SAMPLE).unwrap();
        assert_eq!(config.gadget_name, "cam");
        assert_eq!(config.udc.as_deref(), Some("fe980000.usb"));
        assert_eq!(config.identity.vendor_id, 0x1234);
        assert_eq!(config.identity.product, "Test Camera");
        // Unset fields keep their defaults
        assert_eq!(config.identity.product_id, 0x0104);
        assert_eq!(config.function.instance, "usb1");
        assert_eq!(config.function.streaming_interval, 1);

        let registry = registry(&config).unwrap();
        assert_eq!(registry.frames().len(), 2);
        assert_eq!(registry.frames()[1].format, FormatGroup::Mjpeg);
    }

    #[test]
    fn test_defaults_without_file() {
        let config = load(None).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(registry(&config).unwrap(), FrameRegistry::builtin());
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gadget.toml");
        std::fs::write(&path, SAMPLE).unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.settle_delay_ms, 250);
        assert!(load(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_bad_registry_is_config_error() {
        let text = r#"
[[frames]]
name = "x"
format = "h264"
width = 640
height = 480
intervals = [333333]
"#;
        let config = parse(text).unwrap();
        assert!(matches!(registry(&config), Err(AppError::Config(_))));

        let empty = parse("frames = []").unwrap();
        assert!(matches!(registry(&empty), Err(AppError::Config(_))));
    }

    #[test]
    fn test_explicit_path_wins() {
        let path = PathBuf::from("/tmp/explicit.toml");
        assert_eq!(resolve_path(Some(path.clone())), Some(path));
    }

    #[test]
    fn test_environment_path_fallback() {
        // Only this test touches the variable
        std::env::set_var(CONFIG_ENV, "/tmp/from-env.toml");
        assert_eq!(
            resolve_path(None),
            Some(PathBuf::from("/tmp/from-env.toml"))
        );
        assert_eq!(
            resolve_path(Some(PathBuf::from("/tmp/explicit.toml"))),
            Some(PathBuf::from("/tmp/explicit.toml"))
        );

        // Empty value falls through to the default location
        std::env::set_var(CONFIG_ENV, "");
        let expected = Path::new(DEFAULT_CONFIG_PATH)
            .exists()
            .then(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(resolve_path(None), expected);
        std::env::remove_var(CONFIG_ENV);
    }
}
