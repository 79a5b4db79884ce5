//! uvc-gadget - USB Video Class gadget configuration manager
//!
//! This crate describes a UVC webcam function to the Linux usb_gadget
//! ConfigFS and manages the gadget's lifecycle (start, stop, restart,
//! remove, runtime frame addition and status).

pub mod config;
pub mod error;
pub mod gadget;

pub use error::{AppError, Result};
