//! Gadget state, always derived from the tree and never cached

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use super::configfs::{read_u32, ConfigFs};
use super::format::{fps, FormatGroup};
use super::host::HostDevices;
use super::tree::DescriptorTree;
use crate::error::Result;

/// Lifecycle phase of the gadget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GadgetState {
    /// No tree exists
    Absent,
    /// A root exists but the function or its config link is missing
    /// (e.g. a build that died half way)
    Incomplete,
    /// Tree complete, not bound to a controller
    Configured,
    /// Bound to a UDC and presenting to the host
    Enabled,
}

impl GadgetState {
    pub fn exists(&self) -> bool {
        !matches!(self, GadgetState::Absent)
    }
}

impl fmt::Display for GadgetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GadgetState::Absent => "not configured",
            GadgetState::Incomplete => "incomplete",
            GadgetState::Configured => "configured (disabled)",
            GadgetState::Enabled => "enabled",
        };
        write!(f, "{}", name)
    }
}

/// Recompute the state by inspecting the tree. Read-only.
pub fn inspect<F: ConfigFs + ?Sized>(fs: &F, tree: &DescriptorTree) -> GadgetState {
    let layout = tree.layout();
    if !fs.exists(layout.root()) {
        return GadgetState::Absent;
    }
    if tree.bound_udc(fs).is_some() {
        return GadgetState::Enabled;
    }
    if !fs.exists(layout.function()) || !fs.exists(&layout.config_link()) {
        return GadgetState::Incomplete;
    }
    GadgetState::Configured
}

/// One configured frame as read back from the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameStatus {
    pub name: String,
    pub format: FormatGroup,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub interval: Option<u32>,
    pub fps: Option<u32>,
}

impl fmt::Display for FrameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<u32>| v.map(|v| v.to_string()).unwrap_or_else(|| "?".into());
        write!(
            f,
            "{:<16} {}x{} @ {} fps",
            self.name,
            show(self.width),
            show(self.height),
            show(self.fps)
        )
    }
}

/// Snapshot returned by `status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub gadget: String,
    pub state: GadgetState,
    pub udc: Option<String>,
    pub video_node: Option<PathBuf>,
    pub frames: Vec<FrameStatus>,
}

impl StatusReport {
    /// Frames of one group
    pub fn group(&self, group: FormatGroup) -> impl Iterator<Item = &FrameStatus> {
        self.frames.iter().filter(move |f| f.format == group)
    }

    pub fn frame(&self, name: &str) -> Option<&FrameStatus> {
        self.frames.iter().find(|f| f.name == name)
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Gadget {}: {}", self.gadget, self.state)?;
        if !self.state.exists() {
            return Ok(());
        }
        if let Some(udc) = &self.udc {
            writeln!(f, "UDC: {}", udc)?;
        }
        if let Some(node) = &self.video_node {
            writeln!(f, "Video node: {}", node.display())?;
        }
        for group in FormatGroup::all() {
            writeln!(f, "{} frames:", group)?;
            let mut any = false;
            for frame in self.group(group) {
                writeln!(f, "  {}", frame)?;
                any = true;
            }
            if !any {
                writeln!(f, "  (none)")?;
            }
        }
        Ok(())
    }
}

/// Build a status report. Never mutates the tree; missing attributes show
/// up as `None` rather than errors so partial trees can be described.
pub fn report<F, H>(fs: &F, host: &H, tree: &DescriptorTree, gadget: &str) -> Result<StatusReport>
where
    F: ConfigFs + ?Sized,
    H: HostDevices + ?Sized,
{
    let state = inspect(fs, tree);
    let mut status = StatusReport {
        gadget: gadget.to_string(),
        state,
        udc: None,
        video_node: None,
        frames: Vec::new(),
    };
    if !state.exists() {
        return Ok(status);
    }

    status.udc = tree.bound_udc(fs);
    if let Some(udc) = &status.udc {
        status.video_node = host.video_node(udc);
    }

    let layout = tree.layout();
    for group in FormatGroup::all() {
        for name in tree.function().frames(fs, layout, group)? {
            let frame = layout.frame(group, &name);
            let interval = read_u32(fs, &frame.join("dwDefaultFrameInterval"));
            status.frames.push(FrameStatus {
                width: read_u32(fs, &frame.join("wWidth")),
                height: read_u32(fs, &frame.join("wHeight")),
                fps: interval.filter(|&i| i > 0).map(fps),
                interval,
                format: group,
                name,
            });
        }
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gadget::format::FrameSpec;
    use crate::gadget::host::StaticHost;
    use crate::gadget::layout::GadgetLayout;
    use crate::gadget::memfs::MemoryConfigFs;
    use crate::gadget::tree::GadgetIdentity;
    use crate::gadget::uvc::UvcFunction;
    use std::path::Path;

    fn tree() -> (MemoryConfigFs, DescriptorTree) {
        let fs = MemoryConfigFs::new("/cfg");
        let layout = GadgetLayout::new(Path::new("/cfg"), "cam", "usb0");
        (fs, DescriptorTree::new(layout, UvcFunction::default(), 500))
    }

    #[test]
    fn test_inspect_phases() {
        let (fs, tree) = tree();
        assert_eq!(inspect(&fs, &tree), GadgetState::Absent);

        tree.create_gadget(&fs, &GadgetIdentity::default()).unwrap();
        assert_eq!(inspect(&fs, &tree), GadgetState::Incomplete);

        tree.create_function(&fs).unwrap();
        tree.add_frame(
            &fs,
            &FrameSpec::new("hd", FormatGroup::Mjpeg, 1280, 720, vec![333_333]).unwrap(),
        )
        .unwrap();
        tree.link_all(&fs).unwrap();
        assert_eq!(inspect(&fs, &tree), GadgetState::Configured);

        tree.bind(&fs, "fe980000.usb").unwrap();
        assert_eq!(inspect(&fs, &tree), GadgetState::Enabled);

        // Controller released by someone else
        fs.external_write(&tree.layout().udc_attr(), "");
        assert_eq!(inspect(&fs, &tree), GadgetState::Configured);
    }

    #[test]
    fn test_report_partial_frame() {
        let (fs, tree) = tree();
        tree.create_gadget(&fs, &GadgetIdentity::default()).unwrap();
        tree.create_function(&fs).unwrap();
        // Frame directory without attributes
        fs.create_dir(&tree.layout().frame(FormatGroup::Uncompressed, "raw"))
            .unwrap();

        let status = report(&fs, &StaticHost::default(), &tree, "cam").unwrap();
        assert_eq!(status.state, GadgetState::Incomplete);
        let frame = status.frame("raw").unwrap();
        assert_eq!(frame.width, None);
        assert_eq!(frame.fps, None);
        assert!(status.to_string().contains("raw"));
    }

    #[test]
    fn test_enabled_report_names_video_node() {
        let (fs, tree) = tree();
        tree.create_gadget(&fs, &GadgetIdentity::default()).unwrap();
        tree.create_function(&fs).unwrap();
        tree.add_frame(
            &fs,
            &FrameSpec::new("hd", FormatGroup::Mjpeg, 1280, 720, vec![333_333]).unwrap(),
        )
        .unwrap();
        tree.link_all(&fs).unwrap();
        tree.bind(&fs, "fe980000.usb").unwrap();

        let host = StaticHost {
            udcs: vec!["fe980000.usb".to_string()],
            video_node: Some(PathBuf::from("/dev/video0")),
        };
        let status = report(&fs, &host, &tree, "cam").unwrap();
        assert_eq!(status.state, GadgetState::Enabled);
        assert_eq!(status.video_node, Some(PathBuf::from("/dev/video0")));

        let text = status.to_string();
        assert!(text.starts_with("Gadget cam: enabled\n"));
        assert!(text.contains("UDC: fe980000.usb\n"));
        assert!(text.contains("Video node: /dev/video0\n"));
        assert!(text.contains("YUY2 frames:\n  (none)\n"));

        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains(r#""state":"enabled""#));
        assert!(json.contains(r#""video_node":"/dev/video0""#));

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["udc"], "fe980000.usb");
        assert_eq!(value["frames"][0]["name"], "hd");
        assert_eq!(value["frames"][0]["format"], "mjpeg");
        assert_eq!(value["frames"][0]["width"], 1280);
        assert_eq!(value["frames"][0]["fps"], 30);
    }

    #[test]
    fn test_configured_report_skips_video_node() {
        let (fs, tree) = tree();
        tree.create_gadget(&fs, &GadgetIdentity::default()).unwrap();
        tree.create_function(&fs).unwrap();
        tree.link_all(&fs).unwrap();

        // Only looked up for a bound controller
        let host = StaticHost {
            udcs: vec!["fe980000.usb".to_string()],
            video_node: Some(PathBuf::from("/dev/video0")),
        };
        let status = report(&fs, &host, &tree, "cam").unwrap();
        assert_eq!(status.state, GadgetState::Configured);
        assert_eq!(status.video_node, None);

        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["state"], "configured");
        assert!(value["udc"].is_null());
    }

    #[test]
    fn test_absent_report() {
        let (fs, tree) = tree();
        let status = report(&fs, &StaticHost::default(), &tree, "cam").unwrap();
        assert_eq!(status.state, GadgetState::Absent);
        assert!(status.frames.is_empty());
        assert_eq!(status.to_string(), "Gadget cam: not configured\n");
    }
}
