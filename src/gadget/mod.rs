//! USB Video Class gadget management
//!
//! Describes one UVC function with an uncompressed (YUY2) and an MJPEG
//! format group to the kernel's usb_gadget ConfigFS, and drives the gadget
//! through its lifecycle.
//!
//! Architecture:
//! ```text
//! UvcGadgetManager (lifecycle: start/stop/restart/remove/add/status)
//!     ├── DescriptorTree (gadget root, strings, config, teardown)
//!     │       └── UvcFunction (headers, format groups, frames, links)
//!     ├── FrameRegistry (static frames built on start)
//!     ├── ConfigFs (SysConfigFs for the kernel, MemoryConfigFs for tests)
//!     └── HostDevices (UDC enumeration, video node lookup)
//! ```
//!
//! State is never stored: [`state::inspect`] derives it from the tree on
//! every call.

pub mod configfs;
pub mod format;
pub mod host;
pub mod layout;
pub mod manager;
pub mod memfs;
pub mod registry;
pub mod state;
pub mod tree;
pub mod uvc;

pub use configfs::{ConfigFs, IgnoreAbsent, SysConfigFs};
pub use format::{FormatGroup, FrameSpec};
pub use host::{HostDevices, StaticHost, SysHost};
pub use layout::GadgetLayout;
pub use manager::UvcGadgetManager;
pub use memfs::MemoryConfigFs;
pub use registry::FrameRegistry;
pub use state::{GadgetState, StatusReport};
pub use tree::{DescriptorTree, GadgetIdentity};
pub use uvc::{StreamingParams, UvcFunction};
