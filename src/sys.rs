//! Raw FFI surface for libfreenect.
//!
//! The native library is loaded at runtime via `libloading`, so the crate
//! builds and its unit tests run on machines without libfreenect installed.
//! A missing library surfaces as [`FreenectError::LibraryLoad`] from
//! `Context::new`, never as a link failure.
//!
//! Handle types are opaque: the binding only ever passes the pointers back
//! to the native layer or uses their address as a registry key.

use crate::error::FreenectError;
use libloading::{Library, Symbol};
use std::ffi::{c_char, c_int, c_void};
use std::sync::OnceLock;

/// Opaque native context handle.
#[repr(C)]
pub(crate) struct FreenectContext {
    _opaque: [u8; 0],
}

/// Opaque native device handle.
#[repr(C)]
pub(crate) struct FreenectDevice {
    _opaque: [u8; 0],
}

/// Opaque tilt-state snapshot. Read through the accessor functions only.
#[repr(C)]
pub(crate) struct RawTiltState {
    _opaque: [u8; 0],
}

/// Mirror of `freenect_frame_mode`. Passed and returned by value; every
/// native field must be present to keep the ABI layout, read or not.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)]
pub(crate) struct FrameMode {
    pub reserved: u32,
    pub resolution: c_int,
    /// Depth or video format, depending on which finder produced the mode.
    pub format: i32,
    pub bytes: i32,
    pub width: i16,
    pub height: i16,
    pub data_bits_per_pixel: i8,
    pub padding_bits_per_pixel: i8,
    pub framerate: i8,
    pub is_valid: i8,
}

pub(crate) type NativeLogCallback =
    unsafe extern "C" fn(*mut FreenectContext, c_int, *const c_char);
pub(crate) type NativeFrameCallback = unsafe extern "C" fn(*mut FreenectDevice, *mut c_void, u32);

/// Declares the symbol table struct and its loader in one place, so each
/// native function's Rust signature is written exactly once.
macro_rules! freenect_symbols {
    ($($(#[$meta:meta])* fn $name:ident($($arg:ident: $ty:ty),* $(,)?) $(-> $ret:ty)?;)*) => {
        pub(crate) struct Lib {
            _library: Library,
            $($(#[$meta])* pub(crate) $name: unsafe extern "C" fn($($ty),*) $(-> $ret)?,)*
        }

        impl Lib {
            unsafe fn from_library(library: Library) -> Result<Self, libloading::Error> {
                $(
                    let $name = {
                        let symbol: Symbol<unsafe extern "C" fn($($ty),*) $(-> $ret)?> =
                            library.get(concat!(stringify!($name), "\0").as_bytes())?;
                        *symbol
                    };
                )*
                Ok(Lib {
                    _library: library,
                    $($name,)*
                })
            }
        }
    };
}

freenect_symbols! {
    fn freenect_init(ctx: *mut *mut FreenectContext, usb_ctx: *mut c_void) -> c_int;
    fn freenect_shutdown(ctx: *mut FreenectContext) -> c_int;
    fn freenect_select_subdevices(ctx: *mut FreenectContext, flags: c_int);
    fn freenect_num_devices(ctx: *mut FreenectContext) -> c_int;
    fn freenect_open_device(
        ctx: *mut FreenectContext,
        dev: *mut *mut FreenectDevice,
        index: c_int,
    ) -> c_int;
    fn freenect_close_device(dev: *mut FreenectDevice) -> c_int;
    fn freenect_process_events(ctx: *mut FreenectContext) -> c_int;
    fn freenect_process_events_timeout(
        ctx: *mut FreenectContext,
        timeout: *mut libc::timeval,
    ) -> c_int;
    fn freenect_set_log_level(ctx: *mut FreenectContext, level: c_int);
    fn freenect_set_log_callback(ctx: *mut FreenectContext, cb: Option<NativeLogCallback>);
    fn freenect_set_depth_callback(dev: *mut FreenectDevice, cb: Option<NativeFrameCallback>);
    fn freenect_set_video_callback(dev: *mut FreenectDevice, cb: Option<NativeFrameCallback>);
    fn freenect_find_depth_mode(resolution: c_int, format: c_int) -> FrameMode;
    fn freenect_find_video_mode(resolution: c_int, format: c_int) -> FrameMode;
    fn freenect_set_depth_mode(dev: *mut FreenectDevice, mode: FrameMode) -> c_int;
    fn freenect_set_video_mode(dev: *mut FreenectDevice, mode: FrameMode) -> c_int;
    fn freenect_get_current_depth_mode(dev: *mut FreenectDevice) -> FrameMode;
    fn freenect_get_current_video_mode(dev: *mut FreenectDevice) -> FrameMode;
    fn freenect_start_depth(dev: *mut FreenectDevice) -> c_int;
    fn freenect_stop_depth(dev: *mut FreenectDevice) -> c_int;
    fn freenect_start_video(dev: *mut FreenectDevice) -> c_int;
    fn freenect_stop_video(dev: *mut FreenectDevice) -> c_int;
    fn freenect_set_led(dev: *mut FreenectDevice, color: c_int) -> c_int;
    fn freenect_set_tilt_degs(dev: *mut FreenectDevice, degrees: f64) -> c_int;
    fn freenect_update_tilt_state(dev: *mut FreenectDevice) -> c_int;
    fn freenect_get_tilt_state(dev: *mut FreenectDevice) -> *mut RawTiltState;
    fn freenect_get_tilt_degs(state: *mut RawTiltState) -> f64;
    fn freenect_get_mks_accel(
        state: *mut RawTiltState,
        x: *mut f64,
        y: *mut f64,
        z: *mut f64,
    );
    fn freenect_get_tilt_status(state: *mut RawTiltState) -> c_int;
}

/// Shared-object names to try, most specific first.
const LIBRARY_CANDIDATES: &[&str] = &[
    "libfreenect.so.0",
    "libfreenect.so",
    "libfreenect.0.dylib",
    "libfreenect.dylib",
    "freenect.dll",
];

static LIB: OnceLock<Result<Lib, String>> = OnceLock::new();

/// Load libfreenect on first use and return the cached symbol table.
pub(crate) fn lib() -> crate::Result<&'static Lib> {
    LIB.get_or_init(load)
        .as_ref()
        .map_err(|message| FreenectError::LibraryLoad(message.clone()))
}

fn load() -> Result<Lib, String> {
    let mut last_error = None;
    for name in LIBRARY_CANDIDATES {
        match unsafe { Library::new(name) } {
            Ok(library) => {
                return unsafe { Lib::from_library(library) }
                    .map_err(|e| format!("{name}: {e}"));
            }
            Err(e) => last_error = Some(format!("{name}: {e}")),
        }
    }
    Err(last_error.unwrap_or_else(|| "no candidate library names".into()))
}
