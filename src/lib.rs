//! # sxcam - Rust SDK for Starlight Xpress ECHO2 USB CCD cameras
//!
//! Drives the vendor bulk-transfer protocol over libusb (rusb). Provides:
//! - Device discovery, interface negotiation with endpoint fallback
//! - Firmware version and camera model queries (legacy control path with
//!   bulk-command fallback)
//! - Exposure sequencing and chunked, timeout-tolerant image readout
//!
//! ## Quick Start
//! ```no_run
//! use sxcam::Device;
//! use std::time::Duration;
//!
//! let camera = Device::open_first().unwrap();
//! println!("model: {}", camera.camera_model().unwrap().name);
//!
//! let image = camera.capture_image(Duration::from_secs(2)).unwrap();
//! println!("{}x{}, complete: {}", image.width, image.height, image.is_complete());
//! ```

pub mod error;
pub mod types;
pub mod protocol;
pub mod transport;
pub mod device;
pub mod capture;

pub use capture::{CancelToken, CaptureOptions};
pub use device::{list_devices, Device};
pub use error::SxError;
pub use types::*;

/// Result type alias for sxcam operations.
pub type Result<T> = std::result::Result<T, SxError>;
