//! # freenect - Rust bindings for the libfreenect Kinect driver
//!
//! A thin, safe binding over the native libfreenect library. Provides:
//! - Context and device handle wrappers with typed errors
//! - Depth/video streaming with owned frame copies delivered to callbacks
//! - Motor, LED, and accelerometer control
//!
//! All device discovery, USB transport, and frame demuxing happen inside
//! libfreenect, which is loaded at runtime. Callbacks are delivered
//! synchronously, on the caller's thread, during [`Context::process_events`].
//!
//! ## Quick Start
//! ```no_run
//! use freenect::{Context, DepthFormat, Resolution};
//! use std::time::Duration;
//!
//! let context = Context::new().unwrap();
//! let mut kinect = context.open_device(0).unwrap();
//!
//! kinect.set_depth_callback(|frame| {
//!     println!("depth frame: {}x{} at {}", frame.width, frame.height, frame.timestamp);
//! });
//! kinect.start_depth_stream(Resolution::Medium, DepthFormat::Millimeters).unwrap();
//!
//! for _ in 0..100 {
//!     context.process_events(Duration::from_millis(100)).unwrap();
//! }
//! ```

pub mod context;
pub mod device;
pub mod error;
pub mod types;

mod bridge;
mod registry;
mod sys;

pub use context::Context;
pub use device::Device;
pub use error::FreenectError;
pub use types::*;

/// Result type alias for freenect operations.
pub type Result<T> = std::result::Result<T, FreenectError>;
