//! Host-side device discovery: USB Device Controllers and V4L2 nodes

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use v4l::capability::Flags;
use v4l::prelude::*;

/// sysfs class directory listing the UDCs
pub const UDC_CLASS_PATH: &str = "/sys/class/udc";

/// V4L2 driver name of the UVC gadget function
pub const UVC_GADGET_DRIVER: &str = "g_uvc";

/// What the gadget manager needs to know about the machine it runs on
pub trait HostDevices {
    /// Available binding targets, preferred first
    fn udcs(&self) -> Vec<String>;

    /// Video node exposed by the gadget bound to `udc`
    fn video_node(&self, udc: &str) -> Option<PathBuf>;
}

/// Discovery backed by sysfs and `/dev/video*`
#[derive(Debug, Clone)]
pub struct SysHost {
    udc_class: PathBuf,
    preferred_udc: Option<String>,
}

impl SysHost {
    pub fn new(udc_class: impl Into<PathBuf>, preferred_udc: Option<String>) -> Self {
        Self {
            udc_class: udc_class.into(),
            preferred_udc,
        }
    }
}

impl Default for SysHost {
    fn default() -> Self {
        Self::new(UDC_CLASS_PATH, None)
    }
}

/// Find available UDCs (USB Device Controllers) under `udc_class`
pub fn list_udcs(udc_class: &Path) -> Vec<String> {
    let entries = match fs::read_dir(udc_class) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot read {}: {}", udc_class.display(), e);
            return Vec::new();
        }
    };

    let mut udcs: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().to_string())
        .collect();
    udcs.sort();
    udcs
}

/// Put `preferred` first if it is present; a preferred controller that does
/// not exist is reported and otherwise ignored
pub fn order_udcs(mut udcs: Vec<String>, preferred: Option<&str>) -> Vec<String> {
    if let Some(preferred) = preferred {
        match udcs.iter().position(|u| u == preferred) {
            Some(pos) => {
                let udc = udcs.remove(pos);
                udcs.insert(0, udc);
            }
            None => warn!("Configured UDC {} not found", preferred),
        }
    }
    udcs
}

impl HostDevices for SysHost {
    fn udcs(&self) -> Vec<String> {
        order_udcs(list_udcs(&self.udc_class), self.preferred_udc.as_deref())
    }

    fn video_node(&self, udc: &str) -> Option<PathBuf> {
        let entries = fs::read_dir("/dev").ok()?;
        let mut nodes: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("video"))
                    .unwrap_or(false)
            })
            .collect();
        nodes.sort();

        nodes.into_iter().find(|path| {
            let device = match Device::with_path(path) {
                Ok(device) => device,
                Err(e) => {
                    debug!("Skipping {}: {}", path.display(), e);
                    return false;
                }
            };
            match device.query_caps() {
                Ok(caps) => {
                    caps.capabilities.contains(Flags::VIDEO_OUTPUT)
                        && (caps.driver == UVC_GADGET_DRIVER || caps.card.contains(udc))
                }
                Err(_) => false,
            }
        })
    }
}

/// Fixed answers, for tests and for machines without discovery
#[derive(Debug, Clone, Default)]
pub struct StaticHost {
    pub udcs: Vec<String>,
    pub video_node: Option<PathBuf>,
}

impl StaticHost {
    pub fn with_udc(udc: &str) -> Self {
        Self {
            udcs: vec![udc.to_string()],
            video_node: None,
        }
    }
}

impl HostDevices for StaticHost {
    fn udcs(&self) -> Vec<String> {
        self.udcs.clone()
    }

    fn video_node(&self, _udc: &str) -> Option<PathBuf> {
        self.video_node.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_list_udcs() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("musb-hdrc.1")).unwrap();
        fs::create_dir(dir.path().join("fe980000.usb")).unwrap();

        assert_eq!(
            list_udcs(dir.path()),
            vec!["fe980000.usb".to_string(), "musb-hdrc.1".to_string()]
        );
        assert!(list_udcs(&dir.path().join("missing")).is_empty());
    }

    #[test]
    fn test_preferred_udc_first() {
        let udcs = vec!["a.usb".to_string(), "b.usb".to_string()];
        assert_eq!(order_udcs(udcs.clone(), Some("b.usb"))[0], "b.usb");
        assert_eq!(order_udcs(udcs.clone(), Some("c.usb")), udcs);
        assert_eq!(order_udcs(udcs.clone(), None), udcs);
    }
}
