use std::ffi::c_int;

/// Logging verbosity level, ordered from least to most verbose.
///
/// Discriminants match `freenect_loglevel` bit-for-bit.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Fatal = 0,
    Error = 1,
    Warning = 2,
    Notice = 3,
    Info = 4,
    Debug = 5,
    Spew = 6,
}

impl LogLevel {
    /// Map a raw native level. Levels above the known range are treated as
    /// maximally verbose rather than dropped.
    pub(crate) fn from_raw(raw: c_int) -> LogLevel {
        match raw {
            0 => LogLevel::Fatal,
            1 => LogLevel::Error,
            2 => LogLevel::Warning,
            3 => LogLevel::Notice,
            4 => LogLevel::Info,
            5 => LogLevel::Debug,
            _ => LogLevel::Spew,
        }
    }
}

/// Video/depth stream resolution. Matches `freenect_resolution`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Low = 0,
    Medium = 1,
    High = 2,
}

/// Data representation of depth samples. Matches `freenect_depth_format`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthFormat {
    ElevenBit = 0,
    TenBit = 1,
    ElevenBitPacked = 2,
    TenBitPacked = 3,
    /// Depth registered to the video image.
    Registered = 4,
    Millimeters = 5,
}

/// Data representation of video pixels. Matches `freenect_video_format`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFormat {
    Rgb = 0,
    Bayer = 1,
    Ir8Bit = 2,
    Ir10Bit = 3,
    Ir10BitPacked = 4,
    YuvRgb = 5,
    YuvRaw = 6,
}

/// LED color or blink pattern. Matches `freenect_led_options`.
///
/// Note the gap: the native encoding skips 5.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedColor {
    Off = 0,
    Green = 1,
    Red = 2,
    Yellow = 3,
    BlinkGreen = 4,
    BlinkRedYellow = 6,
}

/// Tilt motor status. Matches `freenect_tilt_status_code`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiltStatus {
    Stopped = 0,
    AtLimit = 1,
    Moving = 4,
}

impl TiltStatus {
    pub(crate) fn from_raw(raw: c_int) -> TiltStatus {
        match raw {
            1 => TiltStatus::AtLimit,
            4 => TiltStatus::Moving,
            _ => TiltStatus::Stopped,
        }
    }
}

bitflags::bitflags! {
    /// Subdevice selection bitmap passed to `freenect_select_subdevices`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Subdevice: u32 {
        const MOTOR = 1 << 0;
        const CAMERA = 1 << 1;
        const AUDIO = 1 << 2;
    }
}

/// An owned copy of one completed depth frame.
///
/// `data` holds exactly `width * height` samples in row-major order, decoded
/// from the native little-endian 16-bit wire layout. The copy is independent
/// of the native buffer, which is only valid during the callback.
#[derive(Debug, Clone)]
pub struct DepthFrame {
    pub data: Vec<u16>,
    pub width: u32,
    pub height: u32,
    /// Capture timestamp from the native driver.
    pub timestamp: u32,
}

/// An owned copy of one completed video frame, raw bytes in the format the
/// stream was started with.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: u32,
}
