//! Static frame registry
//!
//! The registry is what `start` builds from. Frames added at runtime with
//! `add` live only in the kernel tree and are not written back here, so a
//! `restart` (or a reboot) drops them unless the registry is edited too.

use std::collections::HashSet;

use super::format::{FormatGroup, FrameSpec};
use crate::error::{AppError, Result};

/// 30 fps
pub const INTERVAL_30FPS: u32 = 333_333;
/// 10 fps
pub const INTERVAL_10FPS: u32 = 1_000_000;

/// Compiled-in frames: (name, format, width, height, default interval)
const BUILTIN_FRAMES: &[(&str, FormatGroup, u32, u32, u32)] = &[
    ("yuyv_480p", FormatGroup::Uncompressed, 640, 480, INTERVAL_30FPS),
    // USB 2.0 bandwidth limits uncompressed 720p to 10 fps
    ("yuyv_720p", FormatGroup::Uncompressed, 1280, 720, INTERVAL_10FPS),
    ("mjpeg_480p", FormatGroup::Mjpeg, 640, 480, INTERVAL_30FPS),
    ("mjpeg_720p", FormatGroup::Mjpeg, 1280, 720, INTERVAL_30FPS),
    ("mjpeg_1080p", FormatGroup::Mjpeg, 1920, 1080, INTERVAL_30FPS),
];

/// Validated, ordered set of frames built on `start`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRegistry {
    frames: Vec<FrameSpec>,
}

impl FrameRegistry {
    /// Validate a frame list: every entry valid, names unique across
    /// both groups, at least one frame
    pub fn new(frames: Vec<FrameSpec>) -> Result<Self> {
        if frames.is_empty() {
            return Err(AppError::Validation(
                "Frame registry must contain at least one frame".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(frames.len());
        for frame in &frames {
            frame.validate()?;
            if !seen.insert(frame.name.as_str()) {
                return Err(AppError::Validation(format!(
                    "Duplicate frame name '{}' in registry",
                    frame.name
                )));
            }
        }

        Ok(Self { frames })
    }

    /// The compiled-in default registry
    pub fn builtin() -> Self {
        let frames = builtin_frames();
        Self { frames }
    }

    pub fn frames(&self) -> &[FrameSpec] {
        &self.frames
    }

    /// Frames belonging to one format group, in registry order
    pub fn group(&self, group: FormatGroup) -> impl Iterator<Item = &FrameSpec> {
        self.frames.iter().filter(move |f| f.format == group)
    }
}

impl Default for FrameRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

/// The compiled-in frames as specs
pub fn builtin_frames() -> Vec<FrameSpec> {
    BUILTIN_FRAMES
        .iter()
        .map(|&(name, format, width, height, interval)| FrameSpec {
            name: name.to_string(),
            format,
            width,
            height,
            intervals: vec![interval],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_is_valid() {
        let builtin = FrameRegistry::builtin();
        let validated = FrameRegistry::new(builtin_frames()).unwrap();
        assert_eq!(builtin, validated);
        assert_eq!(builtin.group(FormatGroup::Uncompressed).count(), 2);
        assert_eq!(builtin.group(FormatGroup::Mjpeg).count(), 3);
    }

    #[test]
    fn test_duplicate_names_across_groups_rejected() {
        let frames = vec![
            FrameSpec::new("hd", FormatGroup::Uncompressed, 1280, 720, vec![INTERVAL_10FPS])
                .unwrap(),
            FrameSpec::new("hd", FormatGroup::Mjpeg, 1280, 720, vec![INTERVAL_30FPS]).unwrap(),
        ];
        assert!(FrameRegistry::new(frames).unwrap_err().is_validation());
    }

    #[test]
    fn test_empty_registry_rejected() {
        assert!(FrameRegistry::new(Vec::new()).is_err());
    }
}
