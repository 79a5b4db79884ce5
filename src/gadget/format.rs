//! UVC streaming formats and per-frame derived descriptor fields

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AppError, Result};

/// Frame intervals are expressed in 100ns units
pub const INTERVAL_UNITS_PER_SECOND: u64 = 10_000_000;

/// The two streaming format groups of the UVC function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum FormatGroup {
    /// Uncompressed YUY2 (4:2:2 packed)
    Uncompressed,
    /// Motion JPEG
    Mjpeg,
}

impl FormatGroup {
    /// Both groups, in creation order
    pub fn all() -> [FormatGroup; 2] {
        [FormatGroup::Uncompressed, FormatGroup::Mjpeg]
    }

    /// Container directory under `streaming/` (kernel default group)
    pub fn container(&self) -> &'static str {
        match self {
            FormatGroup::Uncompressed => "uncompressed",
            FormatGroup::Mjpeg => "mjpeg",
        }
    }

    /// Name of the format item created inside the container
    pub fn item(&self) -> &'static str {
        match self {
            FormatGroup::Uncompressed => "u",
            FormatGroup::Mjpeg => "m",
        }
    }

    /// Bits per pixel used for the bitrate estimate
    fn bitrate_bits_per_pixel(&self) -> u64 {
        match self {
            FormatGroup::Uncompressed => 16,
            FormatGroup::Mjpeg => 4,
        }
    }

    /// Maximum frame buffer size in bytes.
    ///
    /// For MJPEG this is a fixed 4:1 guess against YUY2, not a measured
    /// compression ratio.
    fn frame_buffer_size(&self, pixels: u64) -> u64 {
        match self {
            FormatGroup::Uncompressed => pixels * 2,
            FormatGroup::Mjpeg => pixels / 2,
        }
    }

    /// Compute bitrates and buffer size for one frame definition.
    ///
    /// Returns `None` when any field does not fit its 32-bit descriptor
    /// attribute, or when `default_interval` is zero.
    pub fn derive(&self, width: u32, height: u32, default_interval: u32) -> Option<DerivedFields> {
        let pixels = width as u64 * height as u64;
        let bitrate = pixels
            .checked_mul(self.bitrate_bits_per_pixel())?
            .checked_mul(INTERVAL_UNITS_PER_SECOND)?
            .checked_div(default_interval as u64)?;
        let max_bitrate = match self {
            // Constant bitrate
            FormatGroup::Uncompressed => bitrate,
            FormatGroup::Mjpeg => bitrate.checked_mul(2)?,
        };
        Some(DerivedFields {
            min_bitrate: u32::try_from(bitrate).ok()?,
            max_bitrate: u32::try_from(max_bitrate).ok()?,
            max_frame_buffer: u32::try_from(self.frame_buffer_size(pixels)).ok()?,
        })
    }
}

impl fmt::Display for FormatGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FormatGroup::Uncompressed => "YUY2",
            FormatGroup::Mjpeg => "MJPEG",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for FormatGroup {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "yuy2" | "yuyv" | "uncompressed" => Ok(FormatGroup::Uncompressed),
            "mjpeg" | "jpeg" => Ok(FormatGroup::Mjpeg),
            _ => Err(AppError::Validation(format!(
                "Unknown format '{}' (expected yuy2, yuyv, uncompressed, mjpeg or jpeg)",
                s
            ))),
        }
    }
}

impl TryFrom<String> for FormatGroup {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Fields computed from a frame's geometry and default interval
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DerivedFields {
    pub min_bitrate: u32,
    pub max_bitrate: u32,
    pub max_frame_buffer: u32,
}

/// Frames per second for an interval, integer division
pub fn fps(interval: u32) -> u32 {
    if interval == 0 {
        return 0;
    }
    (INTERVAL_UNITS_PER_SECOND / interval as u64) as u32
}

/// One resolution + frame-rate definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FrameSpec {
    /// Unique across both groups; used as a directory name
    pub name: String,
    pub format: FormatGroup,
    pub width: u32,
    pub height: u32,
    /// Frame intervals in 100ns units, first one is the default
    pub intervals: Vec<u32>,
}

impl FrameSpec {
    /// Build and validate a frame definition
    pub fn new(
        name: impl Into<String>,
        format: FormatGroup,
        width: u32,
        height: u32,
        intervals: Vec<u32>,
    ) -> Result<Self> {
        let spec = Self {
            name: name.into(),
            format,
            width,
            height,
            intervals,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Check everything that can be checked without looking at the tree
    pub fn validate(&self) -> Result<()> {
        validate_frame_name(&self.name)?;
        if self.width == 0 || self.height == 0 {
            return Err(AppError::Validation(format!(
                "Frame '{}': width and height must be positive (got {}x{})",
                self.name, self.width, self.height
            )));
        }
        // wWidth and wHeight are 16-bit descriptor fields
        if self.width > u16::MAX as u32 || self.height > u16::MAX as u32 {
            return Err(AppError::Validation(format!(
                "Frame '{}': {}x{} exceeds the maximum of {} pixels per side",
                self.name,
                self.width,
                self.height,
                u16::MAX
            )));
        }
        if self.intervals.is_empty() {
            return Err(AppError::Validation(format!(
                "Frame '{}': at least one frame interval is required",
                self.name
            )));
        }
        if self.intervals.contains(&0) {
            return Err(AppError::Validation(format!(
                "Frame '{}': frame intervals must be positive",
                self.name
            )));
        }

        self.derived()?;
        Ok(())
    }

    /// The interval persisted as the active one
    pub fn default_interval(&self) -> u32 {
        self.intervals.first().copied().unwrap_or_default()
    }

    /// Derived bitrate and buffer fields
    pub fn derived(&self) -> Result<DerivedFields> {
        self.format
            .derive(self.width, self.height, self.default_interval())
            .ok_or_else(|| {
                AppError::Validation(format!(
                    "Frame '{}': {}x{} at {} fps exceeds the 32-bit descriptor limits",
                    self.name,
                    self.width,
                    self.height,
                    self.fps()
                ))
            })
    }

    pub fn fps(&self) -> u32 {
        fps(self.default_interval())
    }
}

impl fmt::Display for FrameSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}x{}@{}",
            self.name,
            self.format,
            self.width,
            self.height,
            self.fps()
        )
    }
}

/// Frame names become path components and link targets
pub fn validate_frame_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0')
    {
        return Err(AppError::Validation(format!(
            "Invalid frame name '{}': must be a single path component",
            name
        )));
    }
    Ok(())
}
