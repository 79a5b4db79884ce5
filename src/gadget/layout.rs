//! Path layout of one gadget tree in ConfigFS

use std::path::{Path, PathBuf};

use super::format::FormatGroup;

/// English (US) string table id
pub const LANG_EN_US: &str = "0x409";

/// The only configuration this gadget exposes
pub const CONFIG_NAME: &str = "c.1";

/// Speed classes the streaming header is linked into
pub const STREAMING_CLASSES: [&str; 3] = ["fs", "hs", "ss"];

/// Speed classes the control header is linked into
pub const CONTROL_CLASSES: [&str; 2] = ["fs", "ss"];

/// Name of the header item under `control/header` and `streaming/header`
pub const HEADER_ITEM: &str = "h";

/// Paths of a gadget and its single UVC function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GadgetLayout {
    root: PathBuf,
    config: PathBuf,
    function_name: String,
    function: PathBuf,
}

impl GadgetLayout {
    /// Layout for gadget `gadget_name` under `configfs_base`, with UVC
    /// function instance `instance` (function name `uvc.<instance>`)
    pub fn new(configfs_base: &Path, gadget_name: &str, instance: &str) -> Self {
        let root = configfs_base.join(gadget_name);
        let config = root.join("configs").join(CONFIG_NAME);
        let function_name = format!("uvc.{}", instance);
        let function = root.join("functions").join(&function_name);
        Self {
            root,
            config,
            function_name,
            function,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn udc_attr(&self) -> PathBuf {
        self.root.join("UDC")
    }

    pub fn strings(&self) -> PathBuf {
        self.root.join("strings").join(LANG_EN_US)
    }

    pub fn os_desc(&self) -> PathBuf {
        self.root.join("os_desc")
    }

    /// `os_desc/c.1 -> configs/c.1`
    pub fn os_desc_link(&self) -> PathBuf {
        self.os_desc().join(CONFIG_NAME)
    }

    pub fn config(&self) -> &Path {
        &self.config
    }

    pub fn config_strings(&self) -> PathBuf {
        self.config.join("strings").join(LANG_EN_US)
    }

    /// `configs/c.1/uvc.<instance> -> functions/uvc.<instance>`
    pub fn config_link(&self) -> PathBuf {
        self.config.join(&self.function_name)
    }

    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    pub fn function(&self) -> &Path {
        &self.function
    }

    pub fn control_header(&self) -> PathBuf {
        self.function.join("control/header").join(HEADER_ITEM)
    }

    pub fn control_class_link(&self, class: &str) -> PathBuf {
        self.function
            .join("control/class")
            .join(class)
            .join(HEADER_ITEM)
    }

    pub fn streaming_header(&self) -> PathBuf {
        self.function.join("streaming/header").join(HEADER_ITEM)
    }

    pub fn streaming_class_link(&self, class: &str) -> PathBuf {
        self.function
            .join("streaming/class")
            .join(class)
            .join(HEADER_ITEM)
    }

    /// Format item, e.g. `streaming/mjpeg/m`
    pub fn format(&self, group: FormatGroup) -> PathBuf {
        self.function
            .join("streaming")
            .join(group.container())
            .join(group.item())
    }

    /// `streaming/header/h/<item> -> streaming/<container>/<item>`
    pub fn format_link(&self, group: FormatGroup) -> PathBuf {
        self.streaming_header().join(group.item())
    }

    pub fn frame(&self, group: FormatGroup, name: &str) -> PathBuf {
        self.format(group).join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_paths() {
        let layout = GadgetLayout::new(Path::new("/cfg"), "cam", "usb0");
        assert_eq!(layout.function_name(), "uvc.usb0");
        assert_eq!(layout.config_link(), PathBuf::from("/cfg/cam/configs/c.1/uvc.usb0"));
        assert_eq!(
            layout.frame(FormatGroup::Mjpeg, "hd"),
            PathBuf::from("/cfg/cam/functions/uvc.usb0/streaming/mjpeg/m/hd")
        );
        assert_eq!(
            layout.format_link(FormatGroup::Uncompressed),
            PathBuf::from("/cfg/cam/functions/uvc.usb0/streaming/header/h/u")
        );
        assert_eq!(
            layout.streaming_class_link("hs"),
            PathBuf::from("/cfg/cam/functions/uvc.usb0/streaming/class/hs/h")
        );
    }
}
