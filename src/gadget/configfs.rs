//! ConfigFS file operations for USB Gadget
//!
//! The kernel tree is reached only through the [`ConfigFs`] trait so the
//! gadget logic can run against [`super::memfs::MemoryConfigFs`] in tests.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use crate::error::{AppError, Result};

/// ConfigFS base path for USB gadgets
pub const CONFIGFS_PATH: &str = "/sys/kernel/config/usb_gadget";

/// Default gadget name
pub const DEFAULT_GADGET_NAME: &str = "uvc-gadget";

/// USB Vendor ID (Linux Foundation) - default value
pub const DEFAULT_USB_VENDOR_ID: u16 = 0x1d6b;

/// USB Product ID (Multifunction Composite Gadget) - default value
pub const DEFAULT_USB_PRODUCT_ID: u16 = 0x0104;

/// USB device version - default value
pub const DEFAULT_USB_BCD_DEVICE: u16 = 0x0100;

/// USB spec version (USB 2.0) - default value
pub const DEFAULT_USB_BCD_USB: u16 = 0x0200;

/// Primitive operations on a usb_gadget configuration tree.
///
/// Paths are absolute. Implementations report "not there" as
/// [`io::ErrorKind::NotFound`] so callers can tell it apart from real
/// failures (see [`IgnoreAbsent`]).
pub trait ConfigFs {
    /// Whether anything (directory, attribute or link) exists at `path`
    fn exists(&self, path: &Path) -> bool;

    /// Create a single directory; the parent must already exist
    fn create_dir(&self, path: &Path) -> io::Result<()>;

    /// Write an attribute value
    fn write_attr(&self, path: &Path, value: &str) -> io::Result<()>;

    /// Read an attribute value, trimmed
    fn read_attr(&self, path: &Path) -> io::Result<String>;

    /// Create a symlink at `link` pointing to `target`
    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()>;

    /// Remove a symlink
    fn remove_link(&self, link: &Path) -> io::Result<()>;

    /// Remove an (item-)empty directory
    fn remove_dir(&self, path: &Path) -> io::Result<()>;

    /// Names of the sub-directories of `path`, links excluded
    fn list_dirs(&self, path: &Path) -> io::Result<Vec<String>>;
}

/// Treat "already absent" as success, propagate everything else.
pub trait IgnoreAbsent {
    fn ignore_absent(self) -> io::Result<()>;
}

impl IgnoreAbsent for io::Result<()> {
    fn ignore_absent(self) -> io::Result<()> {
        match self {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// Create directory, reporting the path on failure
pub fn create_dir<F: ConfigFs + ?Sized>(fs: &F, path: &Path) -> Result<()> {
    fs.create_dir(path).map_err(|e| AppError::resource(path, e))
}

/// Write string content to an attribute
pub fn write_attr<F: ConfigFs + ?Sized>(fs: &F, path: &Path, value: &str) -> Result<()> {
    fs.write_attr(path, value)
        .map_err(|e| AppError::resource(path, e))
}

/// Read an attribute
pub fn read_attr<F: ConfigFs + ?Sized>(fs: &F, path: &Path) -> Result<String> {
    fs.read_attr(path).map_err(|e| AppError::resource(path, e))
}

/// Read a numeric attribute, `None` if missing or unparsable
pub fn read_u32<F: ConfigFs + ?Sized>(fs: &F, path: &Path) -> Option<u32> {
    fs.read_attr(path).ok()?.parse().ok()
}

/// Create symlink
pub fn create_symlink<F: ConfigFs + ?Sized>(fs: &F, target: &Path, link: &Path) -> Result<()> {
    fs.symlink(target, link)
        .map_err(|e| AppError::resource(link, e))
}

/// Remove symlink, tolerating a missing one
pub fn remove_link<F: ConfigFs + ?Sized>(fs: &F, link: &Path) -> Result<()> {
    fs.remove_link(link)
        .ignore_absent()
        .map_err(|e| AppError::resource(link, e))
}

/// Remove directory, tolerating a missing one
pub fn remove_dir<F: ConfigFs + ?Sized>(fs: &F, path: &Path) -> Result<()> {
    fs.remove_dir(path)
        .ignore_absent()
        .map_err(|e| AppError::resource(path, e))
}

/// List sub-directories, an absent parent counts as empty
pub fn list_dirs<F: ConfigFs + ?Sized>(fs: &F, path: &Path) -> Result<Vec<String>> {
    match fs.list_dirs(path) {
        Ok(names) => Ok(names),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(AppError::resource(path, e)),
    }
}

/// The real kernel tree (or any directory laid out like it)
#[derive(Debug, Clone, Copy, Default)]
pub struct SysConfigFs;

impl SysConfigFs {
    /// Check if ConfigFS is mounted with gadget support at `base`
    pub fn is_available(base: &Path) -> bool {
        base.exists()
    }
}

impl ConfigFs for SysConfigFs {
    fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).is_ok()
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(path)
    }

    /// For sysfs/configfs attributes a newline is appended and the whole
    /// buffer goes out in a single write() syscall: the kernel processes the
    /// value on the first write and may reject partial data.
    fn write_attr(&self, path: &Path, value: &str) -> io::Result<()> {
        // Plain O_WRONLY, O_TRUNC may fail on special files
        let mut file = OpenOptions::new().write(true).open(path).or_else(|e| {
            if path.exists() {
                Err(e)
            } else {
                File::create(path)
            }
        })?;

        let data: std::borrow::Cow<[u8]> = if value.ends_with('\n') {
            value.as_bytes().into()
        } else {
            let mut buf = value.as_bytes().to_vec();
            buf.push(b'\n');
            buf.into()
        };

        file.write_all(&data)?;
        file.flush()
    }

    fn read_attr(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path).map(|s| s.trim().to_string())
    }

    fn symlink(&self, target: &Path, link: &Path) -> io::Result<()> {
        std::os::unix::fs::symlink(target, link)
    }

    fn remove_link(&self, link: &Path) -> io::Result<()> {
        fs::remove_file(link)
    }

    fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path)
    }

    fn list_dirs(&self, path: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            // file_type() does not follow symlinks, so links are skipped
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
