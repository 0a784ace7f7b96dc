use crate::bridge::{self, ContextHooks};
use crate::device::Device;
use crate::error::FreenectError;
use crate::sys;
use crate::types::{LogLevel, Subdevice};
use crate::Result;
use std::ffi::c_int;
use std::mem::ManuallyDrop;
use std::ptr;
use std::time::Duration;

/// A freenect driver context. Most operations go through this object.
///
/// The context owns the native handle exclusively. Dropping it shuts the
/// native context down and deregisters it from the callback registry;
/// devices opened from a context borrow it, so the compiler rejects
/// dropping a context while any of its devices are still alive.
///
/// The binding is single-threaded by contract: callbacks only ever fire on
/// the thread inside [`Context::process_events`].
pub struct Context {
    ctx: *mut sys::FreenectContext,
    lib: &'static sys::Lib,
}

impl Context {
    /// Create a context with the default subdevice selection: camera and
    /// motor, audio excluded.
    pub fn new() -> Result<Context> {
        Context::with_subdevices(Subdevice::CAMERA | Subdevice::MOTOR)
    }

    /// Create a context claiming only the given subdevices.
    pub fn with_subdevices(subdevices: Subdevice) -> Result<Context> {
        let lib = sys::lib()?;

        let mut ctx = ptr::null_mut();
        let code = unsafe { (lib.freenect_init)(&mut ctx, ptr::null_mut()) };
        if code != 0 {
            return Err(FreenectError::Init(code));
        }

        unsafe { (lib.freenect_select_subdevices)(ctx, subdevices.bits() as c_int) };
        log::debug!("created freenect context (subdevices {subdevices:?})");

        Ok(Context { ctx, lib })
    }

    /// Shut the context down, surfacing the native result.
    ///
    /// Plain `drop` does the same release but can only log a failure.
    pub fn shutdown(self) -> Result<()> {
        let ctx = ManuallyDrop::new(self);
        ctx.release()
    }

    /// Number of Kinect devices attached to the system.
    pub fn device_count(&self) -> Result<u32> {
        let count = unsafe { (self.lib.freenect_num_devices)(self.ctx) };
        if count < 0 {
            return Err(FreenectError::Enumeration(count));
        }
        Ok(count as u32)
    }

    /// Open the device at the given zero-based index.
    ///
    /// Fails if the index is out of range (a system with no devices rejects
    /// index 0 here) or the device is already opened exclusively elsewhere.
    pub fn open_device(&self, index: u32) -> Result<Device<'_>> {
        let mut dev = ptr::null_mut();
        let code = unsafe { (self.lib.freenect_open_device)(self.ctx, &mut dev, index as c_int) };
        if code != 0 {
            return Err(FreenectError::Open { index, code });
        }
        log::debug!("opened device {index}");
        Ok(Device::from_raw(dev, self.lib))
    }

    /// Pump the native event loop once, synchronously on this thread.
    ///
    /// This is the only place queued log and frame callbacks are delivered.
    /// A zero timeout blocks until at least one event is processed; a
    /// non-zero timeout blocks at most that long. Handlers run inline, so a
    /// slow handler stalls further event processing; handlers must not call
    /// back into `process_events`.
    pub fn process_events(&self, timeout: Duration) -> Result<()> {
        let code = if timeout.is_zero() {
            unsafe { (self.lib.freenect_process_events)(self.ctx) }
        } else {
            let mut tv = libc::timeval {
                tv_sec: timeout.as_secs() as libc::time_t,
                tv_usec: timeout.subsec_micros() as libc::suseconds_t,
            };
            unsafe { (self.lib.freenect_process_events_timeout)(self.ctx, &mut tv) }
        };
        if code != 0 {
            return Err(FreenectError::ProcessEvents(code));
        }
        Ok(())
    }

    /// Set how verbose the native layer should be. Effective immediately.
    pub fn set_log_level(&self, level: LogLevel) {
        unsafe { (self.lib.freenect_set_log_level)(self.ctx, level as c_int) };
    }

    /// Register a handler for native log messages.
    ///
    /// Once a handler is set, libfreenect stops printing to the console for
    /// this context. The handler runs on the thread inside
    /// [`Context::process_events`]; it is bound to this context, so capture
    /// anything else it needs. Replacing or clearing the handler from inside
    /// the handler itself is allowed and takes effect for the next event.
    pub fn set_log_callback<F>(&self, handler: F)
    where
        F: FnMut(LogLevel, &str) + Send + 'static,
    {
        // Registry entry first, so a message arriving mid-installation can
        // never hit an unknown identity.
        let hooks = bridge::CONTEXT_HOOKS.register_with(self.ctx as usize, ContextHooks::default);
        hooks.log.set(Box::new(handler));
        unsafe {
            (self.lib.freenect_set_log_callback)(
                self.ctx,
                Some(bridge::log_callback as sys::NativeLogCallback),
            )
        };
    }

    /// Remove the log handler and restore the native default logging.
    pub fn clear_log_callback(&self) {
        unsafe { (self.lib.freenect_set_log_callback)(self.ctx, None) };
        if let Some(hooks) = bridge::CONTEXT_HOOKS.lookup(self.ctx as usize) {
            hooks.log.clear();
        }
    }

    fn release(&self) -> Result<()> {
        bridge::CONTEXT_HOOKS.remove(self.ctx as usize);
        let code = unsafe { (self.lib.freenect_shutdown)(self.ctx) };
        if code != 0 {
            return Err(FreenectError::Shutdown(code));
        }
        Ok(())
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("{e}");
        }
    }
}
