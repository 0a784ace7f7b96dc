use crate::bridge::{self, DeviceHooks};
use crate::error::FreenectError;
use crate::sys;
use crate::types::{DepthFormat, DepthFrame, LedColor, Resolution, TiltStatus, VideoFormat, VideoFrame};
use crate::Context;
use crate::Result;
use std::ffi::c_int;
use std::marker::PhantomData;

/// An opened Kinect device.
///
/// The borrow of the owning [`Context`] keeps the device from outliving it,
/// which the native layer would treat as undefined behavior. Dropping the
/// device closes the native handle and deregisters it from the callback
/// registry.
pub struct Device<'ctx> {
    dev: *mut sys::FreenectDevice,
    lib: &'static sys::Lib,
    _ctx: PhantomData<&'ctx Context>,
}

impl<'ctx> Device<'ctx> {
    pub(crate) fn from_raw(dev: *mut sys::FreenectDevice, lib: &'static sys::Lib) -> Device<'ctx> {
        Device {
            dev,
            lib,
            _ctx: PhantomData,
        }
    }

    /// Register a handler invoked once per completed depth frame.
    ///
    /// The handler receives an owned copy of the frame and runs on the
    /// thread inside [`Context::process_events`]. It is bound to this
    /// device, so capture anything else it needs. Replacing or clearing the
    /// handler from inside the handler itself is allowed and takes effect
    /// for the next frame.
    pub fn set_depth_callback<F>(&mut self, handler: F)
    where
        F: FnMut(DepthFrame) + Send + 'static,
    {
        self.hooks().depth.set(Box::new(handler));
        unsafe {
            (self.lib.freenect_set_depth_callback)(
                self.dev,
                Some(bridge::depth_callback as sys::NativeFrameCallback),
            )
        };
    }

    /// Register a handler invoked once per completed video frame. Same
    /// contract as the depth case.
    pub fn set_video_callback<F>(&mut self, handler: F)
    where
        F: FnMut(VideoFrame) + Send + 'static,
    {
        self.hooks().video.set(Box::new(handler));
        unsafe {
            (self.lib.freenect_set_video_callback)(
                self.dev,
                Some(bridge::video_callback as sys::NativeFrameCallback),
            )
        };
    }

    /// Drop the depth handler. Frames already queued are discarded silently.
    pub fn clear_depth_callback(&mut self) {
        unsafe { (self.lib.freenect_set_depth_callback)(self.dev, None) };
        if let Some(hooks) = bridge::DEVICE_HOOKS.lookup(self.dev as usize) {
            hooks.depth.clear();
        }
    }

    /// Drop the video handler.
    pub fn clear_video_callback(&mut self) {
        unsafe { (self.lib.freenect_set_video_callback)(self.dev, None) };
        if let Some(hooks) = bridge::DEVICE_HOOKS.lookup(self.dev as usize) {
            hooks.video.clear();
        }
    }

    /// Select a depth mode and begin streaming.
    ///
    /// An unsupported (resolution, format) pair fails with a mode error,
    /// distinct from a start failure at the native layer. If both stream
    /// types are used, start the video stream before the depth stream; the
    /// native layer requires that ordering and the binding does not enforce
    /// it.
    pub fn start_depth_stream(&mut self, resolution: Resolution, format: DepthFormat) -> Result<()> {
        let mode = unsafe {
            (self.lib.freenect_find_depth_mode)(resolution as c_int, format as c_int)
        };
        if mode.is_valid <= 0 {
            return Err(FreenectError::UnsupportedDepthMode { resolution, format });
        }

        let code = unsafe { (self.lib.freenect_set_depth_mode)(self.dev, mode) };
        if code < 0 {
            return Err(FreenectError::SetMode {
                stream: "depth",
                code,
            });
        }

        let code = unsafe { (self.lib.freenect_start_depth)(self.dev) };
        if code < 0 {
            return Err(FreenectError::StreamStart {
                stream: "depth",
                code,
            });
        }
        log::debug!("depth stream started ({resolution:?} / {format:?})");
        Ok(())
    }

    /// Stop the depth stream. Stopping an already-stopped stream returns
    /// whatever the native layer reports, never undefined behavior.
    pub fn stop_depth_stream(&mut self) -> Result<()> {
        let code = unsafe { (self.lib.freenect_stop_depth)(self.dev) };
        if code < 0 {
            return Err(FreenectError::StreamStop {
                stream: "depth",
                code,
            });
        }
        Ok(())
    }

    /// Select a video mode and begin streaming. Same contract as the depth
    /// case.
    pub fn start_video_stream(&mut self, resolution: Resolution, format: VideoFormat) -> Result<()> {
        let mode = unsafe {
            (self.lib.freenect_find_video_mode)(resolution as c_int, format as c_int)
        };
        if mode.is_valid <= 0 {
            return Err(FreenectError::UnsupportedVideoMode { resolution, format });
        }

        let code = unsafe { (self.lib.freenect_set_video_mode)(self.dev, mode) };
        if code < 0 {
            return Err(FreenectError::SetMode {
                stream: "video",
                code,
            });
        }

        let code = unsafe { (self.lib.freenect_start_video)(self.dev) };
        if code < 0 {
            return Err(FreenectError::StreamStart {
                stream: "video",
                code,
            });
        }
        log::debug!("video stream started ({resolution:?} / {format:?})");
        Ok(())
    }

    /// Stop the video stream.
    pub fn stop_video_stream(&mut self) -> Result<()> {
        let code = unsafe { (self.lib.freenect_stop_video)(self.dev) };
        if code < 0 {
            return Err(FreenectError::StreamStop {
                stream: "video",
                code,
            });
        }
        Ok(())
    }

    /// Set the LED color or blink pattern.
    pub fn set_led(&mut self, color: LedColor) -> Result<()> {
        let code = unsafe { (self.lib.freenect_set_led)(self.dev, color as c_int) };
        if code < 0 {
            return Err(FreenectError::Led { color, code });
        }
        Ok(())
    }

    /// Command the tilt motor to the given angle in degrees.
    ///
    /// Actuation is asynchronous: the motor may still be moving when this
    /// returns. Poll [`Device::tilt_status`] to observe completion.
    pub fn set_tilt_angle(&mut self, degrees: f64) -> Result<()> {
        let code = unsafe { (self.lib.freenect_set_tilt_degs)(self.dev, degrees) };
        if code < 0 {
            return Err(FreenectError::Tilt { degrees, code });
        }
        Ok(())
    }

    /// Current tilt angle in degrees, refreshed from the device.
    pub fn tilt_angle(&mut self) -> Result<f64> {
        let state = self.refresh_tilt_state()?;
        Ok(unsafe { (self.lib.freenect_get_tilt_degs)(state) })
    }

    /// Gravity-adjusted accelerometer state as (x, y, z) in m/s².
    pub fn accelerometer(&mut self) -> Result<(f64, f64, f64)> {
        let state = self.refresh_tilt_state()?;
        let (mut x, mut y, mut z) = (0.0, 0.0, 0.0);
        unsafe { (self.lib.freenect_get_mks_accel)(state, &mut x, &mut y, &mut z) };
        Ok((x, y, z))
    }

    /// Current tilt motor status.
    pub fn tilt_status(&mut self) -> Result<TiltStatus> {
        let state = self.refresh_tilt_state()?;
        let raw = unsafe { (self.lib.freenect_get_tilt_status)(state) };
        Ok(TiltStatus::from_raw(raw))
    }

    /// Pull a fresh tilt-state snapshot from the device before reading it.
    fn refresh_tilt_state(&mut self) -> Result<*mut sys::RawTiltState> {
        let code = unsafe { (self.lib.freenect_update_tilt_state)(self.dev) };
        if code < 0 {
            return Err(FreenectError::TiltState(code));
        }
        Ok(unsafe { (self.lib.freenect_get_tilt_state)(self.dev) })
    }

    fn hooks(&self) -> std::sync::Arc<DeviceHooks> {
        // Registry entry before the native callback is installed, so an
        // early frame can never hit an unknown identity.
        bridge::DEVICE_HOOKS.register_with(self.dev as usize, DeviceHooks::default)
    }
}

impl Drop for Device<'_> {
    fn drop(&mut self) {
        bridge::DEVICE_HOOKS.remove(self.dev as usize);
        let code = unsafe { (self.lib.freenect_close_device)(self.dev) };
        if code != 0 {
            log::warn!("closing device failed (code {code})");
        }
    }
}
