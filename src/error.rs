use crate::types::{DepthFormat, LedColor, Resolution, VideoFormat};
use std::ffi::c_int;

/// Errors that can occur when interacting with the Kinect through libfreenect.
///
/// Every native failure code is translated here at the wrapper boundary; the
/// binding never retries anything. Callback-delivered failures do not exist
/// by design: trampoline events without a registered owner or handler are
/// silently dropped, not reported.
#[derive(Debug, thiserror::Error)]
pub enum FreenectError {
    #[error("could not load the native freenect library: {0}")]
    LibraryLoad(String),

    #[error("could not initialize freenect context (code {0})")]
    Init(c_int),

    #[error("could not shut down freenect context (code {0})")]
    Shutdown(c_int),

    #[error("could not query device count (code {0})")]
    Enumeration(c_int),

    #[error("could not open device {index} (code {code})")]
    Open { index: u32, code: c_int },

    #[error("unsupported depth mode: {resolution:?} / {format:?}")]
    UnsupportedDepthMode {
        resolution: Resolution,
        format: DepthFormat,
    },

    #[error("unsupported video mode: {resolution:?} / {format:?}")]
    UnsupportedVideoMode {
        resolution: Resolution,
        format: VideoFormat,
    },

    #[error("could not apply {stream} mode (code {code})")]
    SetMode { stream: &'static str, code: c_int },

    #[error("could not start {stream} stream (code {code})")]
    StreamStart { stream: &'static str, code: c_int },

    #[error("could not stop {stream} stream (code {code})")]
    StreamStop { stream: &'static str, code: c_int },

    #[error("could not set LED to {color:?} (code {code})")]
    Led { color: LedColor, code: c_int },

    #[error("could not set tilt to {degrees} degrees (code {code})")]
    Tilt { degrees: f64, code: c_int },

    #[error("could not refresh tilt state (code {0})")]
    TiltState(c_int),

    #[error("could not process events (code {0})")]
    ProcessEvents(c_int),
}
