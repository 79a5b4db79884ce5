use serde::{Deserialize, Serialize};

use crate::gadget::configfs::{
    CONFIGFS_PATH, DEFAULT_GADGET_NAME, DEFAULT_USB_BCD_DEVICE, DEFAULT_USB_BCD_USB,
    DEFAULT_USB_PRODUCT_ID, DEFAULT_USB_VENDOR_ID,
};
use crate::gadget::format::FormatGroup;
use crate::gadget::host::UDC_CLASS_PATH;
use crate::gadget::manager::DEFAULT_SETTLE_DELAY_MS;
use crate::gadget::registry::builtin_frames;
use crate::gadget::{FrameSpec, GadgetIdentity, StreamingParams};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Gadget directory name under the ConfigFS base
    pub gadget_name: String,
    /// usb_gadget ConfigFS base path
    pub configfs_path: String,
    /// sysfs class directory listing USB Device Controllers
    pub udc_class_path: String,
    /// Preferred UDC name (first available otherwise)
    pub udc: Option<String>,
    /// Pause between remove and start on restart
    pub settle_delay_ms: u64,
    /// USB device descriptor
    pub identity: IdentityConfig,
    /// UVC function settings
    pub function: FunctionConfig,
    /// Static frame registry built on start
    pub frames: Vec<FrameConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gadget_name: DEFAULT_GADGET_NAME.to_string(),
            configfs_path: CONFIGFS_PATH.to_string(),
            udc_class_path: UDC_CLASS_PATH.to_string(),
            udc: None,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            identity: IdentityConfig::default(),
            function: FunctionConfig::default(),
            frames: builtin_frames().iter().map(FrameConfig::from).collect(),
        }
    }
}

/// USB device descriptor configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IdentityConfig {
    /// USB Vendor ID (e.g., 0x1d6b)
    pub vendor_id: u16,
    /// USB Product ID (e.g., 0x0104)
    pub product_id: u16,
    /// bcdDevice
    pub device_version: u16,
    /// bcdUSB
    pub usb_version: u16,
    pub manufacturer: String,
    pub product: String,
    pub serial_number: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        let identity = GadgetIdentity::default();
        Self {
            vendor_id: DEFAULT_USB_VENDOR_ID,   // Linux Foundation
            product_id: DEFAULT_USB_PRODUCT_ID, // Multifunction Composite Gadget
            device_version: DEFAULT_USB_BCD_DEVICE,
            usb_version: DEFAULT_USB_BCD_USB,
            manufacturer: identity.manufacturer,
            product: identity.product,
            serial_number: identity.serial_number,
        }
    }
}

impl From<&IdentityConfig> for GadgetIdentity {
    fn from(config: &IdentityConfig) -> Self {
        Self {
            vendor_id: config.vendor_id,
            product_id: config.product_id,
            device_version: config.device_version,
            usb_version: config.usb_version,
            manufacturer: config.manufacturer.clone(),
            product: config.product.clone(),
            serial_number: config.serial_number.clone(),
        }
    }
}

/// UVC function configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FunctionConfig {
    /// Instance name, the function is `uvc.<instance>`
    pub instance: String,
    pub streaming_maxpacket: u32,
    pub streaming_maxburst: u32,
    pub streaming_interval: u32,
    /// MaxPower of the configuration, in mA
    pub max_power_ma: u32,
}

impl Default for FunctionConfig {
    fn default() -> Self {
        let params = StreamingParams::default();
        Self {
            instance: "usb0".to_string(),
            streaming_maxpacket: params.maxpacket,
            streaming_maxburst: params.maxburst,
            streaming_interval: params.interval,
            max_power_ma: 500,
        }
    }
}

impl FunctionConfig {
    pub fn streaming_params(&self) -> StreamingParams {
        StreamingParams {
            maxpacket: self.streaming_maxpacket,
            maxburst: self.streaming_maxburst,
            interval: self.streaming_interval,
        }
    }
}

/// One registry entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameConfig {
    pub name: String,
    /// Format alias: yuy2, yuyv, uncompressed, mjpeg, jpeg
    pub format: String,
    pub width: u32,
    pub height: u32,
    /// Frame intervals in 100ns units, default first
    pub intervals: Vec<u32>,
}

impl From<&FrameSpec> for FrameConfig {
    fn from(spec: &FrameSpec) -> Self {
        let format = match spec.format {
            FormatGroup::Uncompressed => "yuy2",
            FormatGroup::Mjpeg => "mjpeg",
        };
        Self {
            name: spec.name.clone(),
            format: format.to_string(),
            width: spec.width,
            height: spec.height,
            intervals: spec.intervals.clone(),
        }
    }
}
