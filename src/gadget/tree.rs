//! Descriptor tree builder
//!
//! Materializes the gadget identity, the configuration and the UVC function
//! in dependency order: parents before children, attributes after their
//! directory, links after both endpoints. Teardown walks the same steps in
//! reverse and tolerates pieces that are already gone, so a tree left
//! half-built by a crash can still be removed.

use std::io;

use tracing::{debug, info};

use super::configfs::{
    create_dir, create_symlink, remove_dir, remove_link, write_attr, ConfigFs,
    IgnoreAbsent, DEFAULT_USB_BCD_DEVICE, DEFAULT_USB_BCD_USB, DEFAULT_USB_PRODUCT_ID,
    DEFAULT_USB_VENDOR_ID,
};
use super::format::FrameSpec;
use super::layout::GadgetLayout;
use super::uvc::UvcFunction;
use crate::error::{AppError, Result};

/// USB Gadget device descriptor (written once into the tree root)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GadgetIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
    pub device_version: u16,
    pub usb_version: u16,
    pub manufacturer: String,
    pub product: String,
    pub serial_number: String,
}

impl Default for GadgetIdentity {
    fn default() -> Self {
        Self {
            vendor_id: DEFAULT_USB_VENDOR_ID,
            product_id: DEFAULT_USB_PRODUCT_ID,
            device_version: DEFAULT_USB_BCD_DEVICE,
            usb_version: DEFAULT_USB_BCD_USB,
            manufacturer: "UVC Gadget".to_string(),
            product: "UVC Camera".to_string(),
            serial_number: "0123456789".to_string(),
        }
    }
}

/// Builder for one gadget tree with a single UVC function
#[derive(Debug, Clone)]
pub struct DescriptorTree {
    layout: GadgetLayout,
    function: UvcFunction,
    max_power_ma: u32,
}

impl DescriptorTree {
    pub fn new(layout: GadgetLayout, function: UvcFunction, max_power_ma: u32) -> Self {
        Self {
            layout,
            function,
            max_power_ma,
        }
    }

    pub fn layout(&self) -> &GadgetLayout {
        &self.layout
    }

    pub fn function(&self) -> &UvcFunction {
        &self.function
    }

    /// Create gadget root, strings, OS descriptors and the configuration.
    ///
    /// An existing root is reported, never reused or overwritten.
    pub fn create_gadget<F: ConfigFs + ?Sized>(
        &self,
        fs: &F,
        identity: &GadgetIdentity,
    ) -> Result<()> {
        let root = self.layout.root();
        if fs.exists(root) {
            return Err(AppError::resource(
                root,
                io::Error::new(io::ErrorKind::AlreadyExists, "gadget already exists"),
            ));
        }

        info!("Creating USB gadget at {}", root.display());
        create_dir(fs, root)?;
        self.set_device_descriptors(fs, identity)?;
        self.create_strings(fs, identity)?;
        self.create_configuration(fs)?;
        self.create_os_descriptors(fs)?;
        Ok(())
    }

    /// Create the UVC function skeleton; must precede any frame
    pub fn create_function<F: ConfigFs + ?Sized>(&self, fs: &F) -> Result<()> {
        self.function.create(fs, &self.layout)
    }

    /// Add one frame to its format group
    pub fn add_frame<F: ConfigFs + ?Sized>(&self, fs: &F, spec: &FrameSpec) -> Result<()> {
        self.function.add_frame(fs, &self.layout, spec)
    }

    /// (Re)create every function link
    pub fn link_all<F: ConfigFs + ?Sized>(&self, fs: &F) -> Result<()> {
        self.function.link(fs, &self.layout)
    }

    /// Remove every function link
    pub fn unlink_all<F: ConfigFs + ?Sized>(&self, fs: &F) -> Result<()> {
        self.function.unlink(fs, &self.layout)
    }

    /// Recreate only the function -> configuration link
    pub fn relink_config<F: ConfigFs + ?Sized>(&self, fs: &F) -> Result<()> {
        if !fs.exists(self.layout.function()) || !fs.exists(self.layout.config()) {
            return Ok(());
        }
        let link = self.layout.config_link();
        remove_link(fs, &link)?;
        create_symlink(fs, self.layout.function(), &link)
    }

    /// Remove everything in reverse creation order
    pub fn teardown<F: ConfigFs + ?Sized>(&self, fs: &F) -> Result<()> {
        let root = self.layout.root();
        if !fs.exists(root) {
            return Ok(());
        }
        info!("Tearing down USB gadget at {}", root.display());

        self.function.unlink(fs, &self.layout)?;
        remove_link(fs, &self.layout.os_desc_link())?;

        self.function.cleanup(fs, &self.layout)?;

        remove_dir(fs, &self.layout.config_strings())?;
        remove_dir(fs, self.layout.config())?;
        remove_dir(fs, &self.layout.strings())?;
        remove_dir(fs, root)?;

        info!("USB gadget teardown complete");
        Ok(())
    }

    /// Controller the gadget is bound to, if any
    pub fn bound_udc<F: ConfigFs + ?Sized>(&self, fs: &F) -> Option<String> {
        fs.read_attr(&self.layout.udc_attr())
            .ok()
            .filter(|udc| !udc.is_empty())
    }

    /// Bind the gadget to a controller
    pub fn bind<F: ConfigFs + ?Sized>(&self, fs: &F, udc: &str) -> Result<()> {
        info!("Binding gadget to UDC: {}", udc);
        write_attr(fs, &self.layout.udc_attr(), udc)
    }

    /// Clear the controller binding; a missing UDC attribute counts as unbound
    pub fn unbind<F: ConfigFs + ?Sized>(&self, fs: &F) -> Result<()> {
        let udc_attr = self.layout.udc_attr();
        fs.write_attr(&udc_attr, "")
            .ignore_absent()
            .map_err(|e| AppError::resource(&udc_attr, e))?;
        info!("Unbound gadget from UDC");
        Ok(())
    }

    /// Set USB device descriptors
    fn set_device_descriptors<F: ConfigFs + ?Sized>(
        &self,
        fs: &F,
        identity: &GadgetIdentity,
    ) -> Result<()> {
        let root = self.layout.root();
        write_attr(
            fs,
            &root.join("idVendor"),
            &format!("0x{:04x}", identity.vendor_id),
        )?;
        write_attr(
            fs,
            &root.join("idProduct"),
            &format!("0x{:04x}", identity.product_id),
        )?;
        write_attr(
            fs,
            &root.join("bcdDevice"),
            &format!("0x{:04x}", identity.device_version),
        )?;
        write_attr(
            fs,
            &root.join("bcdUSB"),
            &format!("0x{:04x}", identity.usb_version),
        )?;
        // Miscellaneous class with Interface Association Descriptor
        write_attr(fs, &root.join("bDeviceClass"), "0xEF")?;
        write_attr(fs, &root.join("bDeviceSubClass"), "0x02")?;
        write_attr(fs, &root.join("bDeviceProtocol"), "0x01")?;
        debug!("Set device descriptors");
        Ok(())
    }

    /// Create USB strings
    fn create_strings<F: ConfigFs + ?Sized>(&self, fs: &F, identity: &GadgetIdentity) -> Result<()> {
        let strings_path = self.layout.strings();
        create_dir(fs, &strings_path)?;

        write_attr(fs, &strings_path.join("serialnumber"), &identity.serial_number)?;
        write_attr(fs, &strings_path.join("manufacturer"), &identity.manufacturer)?;
        write_attr(fs, &strings_path.join("product"), &identity.product)?;
        debug!("Created USB strings");
        Ok(())
    }

    /// Create configuration
    fn create_configuration<F: ConfigFs + ?Sized>(&self, fs: &F) -> Result<()> {
        let config = self.layout.config();
        create_dir(fs, config)?;

        let strings_path = self.layout.config_strings();
        create_dir(fs, &strings_path)?;
        write_attr(fs, &strings_path.join("configuration"), "UVC")?;

        write_attr(fs, &config.join("MaxPower"), &self.max_power_ma.to_string())?;
        debug!("Created configuration {}", config.display());
        Ok(())
    }

    /// Microsoft OS descriptors, so Windows hosts pick the right driver
    fn create_os_descriptors<F: ConfigFs + ?Sized>(&self, fs: &F) -> Result<()> {
        let os_desc = self.layout.os_desc();
        write_attr(fs, &os_desc.join("use"), "1")?;
        write_attr(fs, &os_desc.join("b_vendor_code"), "0xcd")?;
        write_attr(fs, &os_desc.join("qw_sign"), "MSFT100")?;
        create_symlink(fs, self.layout.config(), &self.layout.os_desc_link())?;
        debug!("Created OS descriptors");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gadget::format::FormatGroup;
    use crate::gadget::memfs::MemoryConfigFs;
    use std::path::Path;

    const BASE: &str = "/cfg";

    fn tree() -> (MemoryConfigFs, DescriptorTree) {
        let fs = MemoryConfigFs::new(BASE);
        let layout = GadgetLayout::new(Path::new(BASE), "cam", "usb0");
        (fs, DescriptorTree::new(layout, UvcFunction::default(), 500))
    }

    fn build(fs: &MemoryConfigFs, tree: &DescriptorTree) {
        tree.create_gadget(fs, &GadgetIdentity::default()).unwrap();
        tree.create_function(fs).unwrap();
        tree.add_frame(
            fs,
            &FrameSpec::new("vga", FormatGroup::Uncompressed, 640, 480, vec![333_333]).unwrap(),
        )
        .unwrap();
        tree.link_all(fs).unwrap();
    }

    #[test]
    fn test_create_gadget_writes_identity() {
        let (fs, tree) = tree();
        tree.create_gadget(&fs, &GadgetIdentity::default()).unwrap();

        let root = tree.layout().root();
        assert_eq!(fs.read_attr(&root.join("idVendor")).unwrap(), "0x1d6b");
        assert_eq!(fs.read_attr(&root.join("idProduct")).unwrap(), "0x0104");
        assert_eq!(fs.read_attr(&root.join("bcdUSB")).unwrap(), "0x0200");
        let product = tree.layout().strings().join("product");
        assert_eq!(fs.read_attr(&product).unwrap(), "UVC Camera");
        assert_eq!(
            fs.read_attr(&tree.layout().config().join("MaxPower"))
                .unwrap(),
            "500"
        );
        assert!(fs.exists(&tree.layout().os_desc_link()));
    }

    #[test]
    fn test_create_gadget_rejects_existing_root() {
        let (fs, tree) = tree();
        tree.create_gadget(&fs, &GadgetIdentity::default()).unwrap();
        let before = fs.snapshot();

        let err = tree
            .create_gadget(&fs, &GadgetIdentity::default())
            .unwrap_err();
        assert!(matches!(err, AppError::Resource { .. }));
        assert_eq!(fs.snapshot(), before);
    }

    #[test]
    fn test_teardown_restores_empty_base() {
        let (fs, tree) = tree();
        let empty = fs.snapshot();
        build(&fs, &tree);
        tree.bind(&fs, "dummy_udc.0").unwrap();
        tree.unbind(&fs).unwrap();

        tree.teardown(&fs).unwrap();
        assert_eq!(fs.snapshot(), empty);
        // Nothing left to do, still fine
        tree.teardown(&fs).unwrap();
    }

    #[test]
    fn test_teardown_of_partial_tree() {
        let (fs, tree) = tree();
        let empty = fs.snapshot();
        // Crash after the function skeleton, before any frame or link
        tree.create_gadget(&fs, &GadgetIdentity::default()).unwrap();
        tree.create_function(&fs).unwrap();

        tree.teardown(&fs).unwrap();
        assert_eq!(fs.snapshot(), empty);
    }

    #[test]
    fn test_bind_unbind() {
        let (fs, tree) = tree();
        build(&fs, &tree);
        assert_eq!(tree.bound_udc(&fs), None);

        tree.bind(&fs, "fe980000.usb").unwrap();
        assert_eq!(tree.bound_udc(&fs).as_deref(), Some("fe980000.usb"));

        tree.unbind(&fs).unwrap();
        assert_eq!(tree.bound_udc(&fs), None);
    }

    #[test]
    fn test_relink_config() {
        let (fs, tree) = tree();
        build(&fs, &tree);
        fs.remove_link(&tree.layout().config_link()).unwrap();

        tree.relink_config(&fs).unwrap();
        assert!(fs.exists(&tree.layout().config_link()));
        tree.relink_config(&fs).unwrap();
    }
}
