//! UVC Function implementation for USB Gadget

use tracing::debug;

use super::configfs::{
    create_dir, create_symlink, list_dirs, remove_dir, remove_link, write_attr, ConfigFs,
};
use super::format::{FormatGroup, FrameSpec};
use super::layout::{GadgetLayout, CONTROL_CLASSES, STREAMING_CLASSES};
use crate::error::{AppError, Result};

/// Streaming endpoint parameters of the UVC function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamingParams {
    /// Max packet size of the isochronous endpoint (1024, 2048 or 3072)
    pub maxpacket: u32,
    /// Max burst (SuperSpeed only)
    pub maxburst: u32,
    /// Polling interval exponent
    pub interval: u32,
}

impl Default for StreamingParams {
    fn default() -> Self {
        Self {
            maxpacket: 2048,
            maxburst: 0,
            interval: 1,
        }
    }
}

/// A UVC function instance (`uvc.<instance>`) with one control header, one
/// streaming header and the two format groups
#[derive(Debug, Clone, Default)]
pub struct UvcFunction {
    params: StreamingParams,
}

impl UvcFunction {
    pub fn new(params: StreamingParams) -> Self {
        Self { params }
    }

    /// Create function directory, headers and format items
    pub fn create<F: ConfigFs + ?Sized>(&self, fs: &F, layout: &GadgetLayout) -> Result<()> {
        let func_path = layout.function();
        create_dir(fs, func_path)?;

        write_attr(
            fs,
            &func_path.join("streaming_maxpacket"),
            &self.params.maxpacket.to_string(),
        )?;
        write_attr(
            fs,
            &func_path.join("streaming_maxburst"),
            &self.params.maxburst.to_string(),
        )?;
        write_attr(
            fs,
            &func_path.join("streaming_interval"),
            &self.params.interval.to_string(),
        )?;

        create_dir(fs, &layout.control_header())?;
        create_dir(fs, &layout.streaming_header())?;
        for group in FormatGroup::all() {
            create_dir(fs, &layout.format(group))?;
        }

        debug!(
            "Created UVC function: {} at {}",
            layout.function_name(),
            func_path.display()
        );
        Ok(())
    }

    /// Frame names configured in one group
    pub fn frames<F: ConfigFs + ?Sized>(
        &self,
        fs: &F,
        layout: &GadgetLayout,
        group: FormatGroup,
    ) -> Result<Vec<String>> {
        list_dirs(fs, &layout.format(group))
    }

    /// Which group, if any, already holds a frame called `name`
    pub fn find_frame<F: ConfigFs + ?Sized>(
        &self,
        fs: &F,
        layout: &GadgetLayout,
        name: &str,
    ) -> Result<Option<FormatGroup>> {
        for group in FormatGroup::all() {
            if self.frames(fs, layout, group)?.iter().any(|n| n == name) {
                return Ok(Some(group));
            }
        }
        Ok(None)
    }

    /// Create one frame directory and write its attributes.
    ///
    /// The format must not be linked into the streaming header while this
    /// runs: the kernel locks linked formats.
    pub fn add_frame<F: ConfigFs + ?Sized>(
        &self,
        fs: &F,
        layout: &GadgetLayout,
        spec: &FrameSpec,
    ) -> Result<()> {
        spec.validate()?;
        if let Some(existing) = self.find_frame(fs, layout, &spec.name)? {
            return Err(AppError::Validation(format!(
                "Frame '{}' already exists in the {} group",
                spec.name, existing
            )));
        }

        let frame_path = layout.frame(spec.format, &spec.name);
        let derived = spec.derived()?;
        let interval = spec.default_interval().to_string();

        create_dir(fs, &frame_path)?;
        write_attr(fs, &frame_path.join("wWidth"), &spec.width.to_string())?;
        write_attr(fs, &frame_path.join("wHeight"), &spec.height.to_string())?;
        write_attr(
            fs,
            &frame_path.join("dwMinBitRate"),
            &derived.min_bitrate.to_string(),
        )?;
        write_attr(
            fs,
            &frame_path.join("dwMaxBitRate"),
            &derived.max_bitrate.to_string(),
        )?;
        write_attr(
            fs,
            &frame_path.join("dwMaxVideoFrameBufferSize"),
            &derived.max_frame_buffer.to_string(),
        )?;
        write_attr(fs, &frame_path.join("dwDefaultFrameInterval"), &interval)?;
        // Only the default interval is declared; one named frame per rate
        write_attr(fs, &frame_path.join("dwFrameInterval"), &interval)?;

        if spec.intervals.len() > 1 {
            debug!(
                "Frame {}: only the default interval {} is persisted, {} more ignored",
                spec.name,
                interval,
                spec.intervals.len() - 1
            );
        }
        debug!("Created frame {} at {}", spec, frame_path.display());
        Ok(())
    }

    /// (Re)create the LinkSet. Existing links are removed first, so this is
    /// safe to repeat.
    pub fn link<F: ConfigFs + ?Sized>(&self, fs: &F, layout: &GadgetLayout) -> Result<()> {
        self.unlink(fs, layout)?;

        // A format without frames cannot be streamed
        for group in FormatGroup::all() {
            if self.frames(fs, layout, group)?.is_empty() {
                debug!("Skipping empty {} format", group);
                continue;
            }
            create_symlink(fs, &layout.format(group), &layout.format_link(group))?;
        }

        let streaming_header = layout.streaming_header();
        for class in STREAMING_CLASSES {
            create_symlink(fs, &streaming_header, &layout.streaming_class_link(class))?;
        }

        let control_header = layout.control_header();
        for class in CONTROL_CLASSES {
            create_symlink(fs, &control_header, &layout.control_class_link(class))?;
        }

        create_symlink(fs, layout.function(), &layout.config_link())?;

        debug!("Linked UVC function {} to config", layout.function_name());
        Ok(())
    }

    /// Remove the LinkSet in reverse order; missing links are fine
    pub fn unlink<F: ConfigFs + ?Sized>(&self, fs: &F, layout: &GadgetLayout) -> Result<()> {
        remove_link(fs, &layout.config_link())?;
        for class in CONTROL_CLASSES {
            remove_link(fs, &layout.control_class_link(class))?;
        }
        for class in STREAMING_CLASSES {
            remove_link(fs, &layout.streaming_class_link(class))?;
        }
        for group in FormatGroup::all() {
            remove_link(fs, &layout.format_link(group))?;
        }
        debug!("Unlinked UVC function {}", layout.function_name());
        Ok(())
    }

    /// Remove frames, formats, headers and the function directory.
    /// Links must already be gone.
    pub fn cleanup<F: ConfigFs + ?Sized>(&self, fs: &F, layout: &GadgetLayout) -> Result<()> {
        for group in FormatGroup::all() {
            for name in self.frames(fs, layout, group)? {
                remove_dir(fs, &layout.frame(group, &name))?;
            }
        }
        for group in FormatGroup::all() {
            remove_dir(fs, &layout.format(group))?;
        }
        remove_dir(fs, &layout.streaming_header())?;
        remove_dir(fs, &layout.control_header())?;
        remove_dir(fs, layout.function())?;
        debug!("Cleaned up UVC function {}", layout.function_name());
        Ok(())
    }
}
