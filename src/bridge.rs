//! The callback-marshaling bridge.
//!
//! libfreenect invokes the trampolines below during `Context::process_events`
//! with nothing but the native handle pointer to say which context or device
//! the event belongs to. Each trampoline looks the owner up in a
//! pointer-identity [`Registry`], copies the event data into owned memory,
//! and dispatches to the user handler. The raw frame pointer is only valid
//! for the duration of the trampoline call and never escapes it.
//!
//! Events whose handle is not registered, or whose handler slot is empty,
//! are dropped silently: a frame arriving after a handler was cleared is an
//! expected race, not a fault.

use crate::registry::Registry;
use crate::sys::{self, FrameMode, FreenectContext, FreenectDevice};
use crate::types::{DepthFrame, LogLevel, VideoFrame};
use std::ffi::{c_char, c_int, c_void, CStr};
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};

pub(crate) type LogHandler = Box<dyn FnMut(LogLevel, &str) + Send>;
pub(crate) type DepthHandler = Box<dyn FnMut(DepthFrame) + Send>;
pub(crate) type VideoHandler = Box<dyn FnMut(VideoFrame) + Send>;

/// One registered handler, with an epoch that counts every `set`/`clear`.
struct SlotState<H> {
    handler: Option<H>,
    epoch: u64,
}

/// A handler slot that is never locked across a handler invocation.
///
/// Dispatch checks the handler out of the slot, runs it with the lock
/// released, and restores it only if the slot was not touched in between.
/// The epoch makes a `set` or `clear` issued from inside the running
/// handler win over the restore.
pub(crate) struct HandlerSlot<H> {
    state: Mutex<SlotState<H>>,
}

impl<H> HandlerSlot<H> {
    pub(crate) fn set(&self, handler: H) {
        let mut state = self.lock();
        state.handler = Some(handler);
        state.epoch += 1;
    }

    pub(crate) fn clear(&self) {
        let mut state = self.lock();
        state.handler = None;
        state.epoch += 1;
    }

    /// Take the handler out for one dispatch. `None` means the slot is
    /// empty (or a dispatch is already in flight): drop the event.
    fn checkout(&self) -> Option<(H, u64)> {
        let mut state = self.lock();
        let epoch = state.epoch;
        state.handler.take().map(|handler| (handler, epoch))
    }

    /// Put a checked-out handler back, unless the slot changed meanwhile.
    fn restore(&self, handler: H, epoch: u64) {
        let mut state = self.lock();
        if state.epoch == epoch && state.handler.is_none() {
            state.handler = Some(handler);
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState<H>> {
        // A panicking handler poisons the lock; the slot itself is still
        // consistent, so keep going.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<H> Default for HandlerSlot<H> {
    fn default() -> Self {
        HandlerSlot {
            state: Mutex::new(SlotState {
                handler: None,
                epoch: 0,
            }),
        }
    }
}

/// Handler slots for one registered context.
#[derive(Default)]
pub(crate) struct ContextHooks {
    pub(crate) log: HandlerSlot<LogHandler>,
}

/// Handler slots for one registered device.
#[derive(Default)]
pub(crate) struct DeviceHooks {
    pub(crate) depth: HandlerSlot<DepthHandler>,
    pub(crate) video: HandlerSlot<VideoHandler>,
}

pub(crate) static CONTEXT_HOOKS: LazyLock<Registry<ContextHooks>> = LazyLock::new(Registry::new);
pub(crate) static DEVICE_HOOKS: LazyLock<Registry<DeviceHooks>> = LazyLock::new(Registry::new);

/// Native log trampoline. Fires on the thread inside `process_events`.
pub(crate) unsafe extern "C" fn log_callback(
    ctx: *mut FreenectContext,
    level: c_int,
    message: *const c_char,
) {
    let Some(hooks) = CONTEXT_HOOKS.lookup(ctx as usize) else {
        return;
    };
    let Some((mut handler, epoch)) = hooks.log.checkout() else {
        return;
    };
    if !message.is_null() {
        let text = unsafe { CStr::from_ptr(message) }.to_string_lossy();
        handler(LogLevel::from_raw(level), &text);
    }
    hooks.log.restore(handler, epoch);
}

/// Native depth-frame trampoline.
///
/// The buffer size comes from the currently configured depth mode, queried
/// from the native layer at dispatch time, exactly like the video case.
pub(crate) unsafe extern "C" fn depth_callback(
    dev: *mut FreenectDevice,
    data: *mut c_void,
    timestamp: u32,
) {
    let Some(hooks) = DEVICE_HOOKS.lookup(dev as usize) else {
        return;
    };
    let Some((mut handler, epoch)) = hooks.depth.checkout() else {
        return;
    };
    if let (Ok(lib), false) = (sys::lib(), data.is_null()) {
        let mode = unsafe { (lib.freenect_get_current_depth_mode)(dev) };
        if mode.is_valid > 0 && mode.bytes > 0 {
            let raw =
                unsafe { std::slice::from_raw_parts(data as *const u8, mode.bytes as usize) };
            handler(depth_frame(&mode, raw, timestamp));
        }
    }
    hooks.depth.restore(handler, epoch);
}

/// Native video-frame trampoline.
pub(crate) unsafe extern "C" fn video_callback(
    dev: *mut FreenectDevice,
    data: *mut c_void,
    timestamp: u32,
) {
    let Some(hooks) = DEVICE_HOOKS.lookup(dev as usize) else {
        return;
    };
    let Some((mut handler, epoch)) = hooks.video.checkout() else {
        return;
    };
    if let (Ok(lib), false) = (sys::lib(), data.is_null()) {
        let mode = unsafe { (lib.freenect_get_current_video_mode)(dev) };
        if mode.is_valid > 0 && mode.bytes > 0 {
            let raw =
                unsafe { std::slice::from_raw_parts(data as *const u8, mode.bytes as usize) };
            handler(video_frame(&mode, raw, timestamp));
        }
    }
    hooks.video.restore(handler, epoch);
}

/// Decode a raw depth payload into an owned width*height sample buffer.
///
/// Samples are little-endian u16 on the wire regardless of host byte order.
/// A short payload leaves the tail zeroed; extra bytes beyond width*height
/// samples are ignored.
fn depth_frame(mode: &FrameMode, raw: &[u8], timestamp: u32) -> DepthFrame {
    let width = mode.width.max(0) as usize;
    let height = mode.height.max(0) as usize;
    let mut data = vec![0u16; width * height];
    for (sample, pair) in data.iter_mut().zip(raw.chunks_exact(2)) {
        *sample = u16::from_le_bytes([pair[0], pair[1]]);
    }
    DepthFrame {
        data,
        width: width as u32,
        height: height as u32,
        timestamp,
    }
}

fn video_frame(mode: &FrameMode, raw: &[u8], timestamp: u32) -> VideoFrame {
    VideoFrame {
        data: raw.to_vec(),
        width: mode.width.max(0) as u32,
        height: mode.height.max(0) as u32,
        timestamp,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn test_mode(width: i16, height: i16, bytes: i32) -> FrameMode {
        FrameMode {
            reserved: 0,
            resolution: 1,
            format: 0,
            bytes,
            width,
            height,
            data_bits_per_pixel: 11,
            padding_bits_per_pixel: 5,
            framerate: 30,
            is_valid: 1,
        }
    }

    #[test]
    fn depth_frame_decodes_little_endian_samples() {
        let mode = test_mode(2, 1, 4);
        let frame = depth_frame(&mode, &[0x01, 0x02, 0x03, 0x04], 7);
        assert_eq!(frame.data, vec![0x0201, 0x0403]);
        assert_eq!((frame.width, frame.height), (2, 1));
        assert_eq!(frame.timestamp, 7);
    }

    #[test]
    fn depth_frame_is_always_width_times_height() {
        // Short payload: tail stays zero.
        let mode = test_mode(2, 2, 8);
        let frame = depth_frame(&mode, &[0xff, 0x00], 0);
        assert_eq!(frame.data, vec![0x00ff, 0, 0, 0]);

        // Oversized payload: extra samples ignored.
        let mode = test_mode(1, 1, 2);
        let frame = depth_frame(&mode, &[0x01, 0x00, 0xee, 0xee], 0);
        assert_eq!(frame.data, vec![1]);
    }

    #[test]
    fn video_frame_copies_raw_bytes() {
        let mode = test_mode(2, 1, 6);
        let frame = video_frame(&mode, &[1, 2, 3, 4, 5, 6], 9);
        assert_eq!(frame.data, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(frame.timestamp, 9);
    }

    #[test]
    fn handler_slot_restores_untouched_handler() {
        let slot: HandlerSlot<u32> = HandlerSlot::default();
        slot.set(7);
        let (handler, epoch) = slot.checkout().unwrap();
        assert!(slot.checkout().is_none());
        slot.restore(handler, epoch);
        assert_eq!(slot.checkout().map(|(h, _)| h), Some(7));
    }

    #[test]
    fn handler_slot_set_during_dispatch_wins_over_restore() {
        let slot: HandlerSlot<u32> = HandlerSlot::default();
        slot.set(1);
        let (old, epoch) = slot.checkout().unwrap();
        slot.set(2);
        slot.restore(old, epoch);
        assert_eq!(slot.checkout().map(|(h, _)| h), Some(2));
    }

    #[test]
    fn handler_slot_clear_during_dispatch_is_final() {
        let slot: HandlerSlot<u32> = HandlerSlot::default();
        slot.set(1);
        let (old, epoch) = slot.checkout().unwrap();
        slot.clear();
        slot.restore(old, epoch);
        assert!(slot.checkout().is_none());
    }

    #[test]
    fn log_event_for_unknown_context_is_dropped() {
        let _ = env_logger::builder().is_test(true).try_init();
        let message = CString::new("upstream marker\n").unwrap();
        // Never registered: the trampoline must return without touching
        // anything, not panic or invoke a default handler.
        unsafe {
            log_callback(0x5100 as *mut FreenectContext, 2, message.as_ptr());
        }
    }

    #[test]
    fn log_event_dispatches_once_registered() {
        let key = 0x5200usize;
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::new(Mutex::new(None));
        let message = CString::new("got depth stream").unwrap();

        // Before registration: no handler invocation.
        unsafe {
            log_callback(key as *mut FreenectContext, 5, message.as_ptr());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let hooks = CONTEXT_HOOKS.register_with(key, ContextHooks::default);
        let (calls_in, seen_in) = (calls.clone(), seen.clone());
        hooks.log.set(Box::new(move |level, text| {
            calls_in.fetch_add(1, Ordering::SeqCst);
            *seen_in.lock().unwrap() = Some((level, text.to_string()));
        }));

        unsafe {
            log_callback(key as *mut FreenectContext, 5, message.as_ptr());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            seen.lock().unwrap().take(),
            Some((LogLevel::Debug, "got depth stream".to_string()))
        );

        CONTEXT_HOOKS.remove(key);
        // After removal the same event is dropped again.
        unsafe {
            log_callback(key as *mut FreenectContext, 5, message.as_ptr());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_may_replace_itself_during_dispatch() {
        let key = 0x5500usize;
        let hooks = CONTEXT_HOOKS.register_with(key, ContextHooks::default);
        let first_calls = Arc::new(AtomicUsize::new(0));
        let second_calls = Arc::new(AtomicUsize::new(0));
        let message = CString::new("mode change").unwrap();

        // The first handler installs a replacement from inside its own
        // invocation, the same slot access set_log_callback performs. This
        // must complete (no deadlock) and the replacement must receive the
        // next event.
        let (hooks_in, first_in, second_in) = (hooks.clone(), first_calls.clone(), second_calls.clone());
        hooks.log.set(Box::new(move |_, _| {
            first_in.fetch_add(1, Ordering::SeqCst);
            let second_in = second_in.clone();
            hooks_in.log.set(Box::new(move |_, _| {
                second_in.fetch_add(1, Ordering::SeqCst);
            }));
        }));

        unsafe {
            log_callback(key as *mut FreenectContext, 3, message.as_ptr());
            log_callback(key as *mut FreenectContext, 3, message.as_ptr());
        }
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
        CONTEXT_HOOKS.remove(key);
    }

    #[test]
    fn handler_may_clear_itself_during_dispatch() {
        let key = 0x5600usize;
        let hooks = CONTEXT_HOOKS.register_with(key, ContextHooks::default);
        let calls = Arc::new(AtomicUsize::new(0));
        let message = CString::new("shutting down").unwrap();

        let (hooks_in, calls_in) = (hooks.clone(), calls.clone());
        hooks.log.set(Box::new(move |_, _| {
            calls_in.fetch_add(1, Ordering::SeqCst);
            hooks_in.log.clear();
        }));

        unsafe {
            log_callback(key as *mut FreenectContext, 3, message.as_ptr());
            // The clear is final: the second event is dropped, the original
            // handler is not resurrected by the dispatch bookkeeping.
            log_callback(key as *mut FreenectContext, 3, message.as_ptr());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        CONTEXT_HOOKS.remove(key);
    }

    #[test]
    fn log_event_with_empty_slot_is_dropped() {
        let key = 0x5300usize;
        CONTEXT_HOOKS.register_with(key, ContextHooks::default);
        let message = CString::new("ignored").unwrap();
        unsafe {
            log_callback(key as *mut FreenectContext, 0, message.as_ptr());
        }
        CONTEXT_HOOKS.remove(key);
    }

    #[test]
    fn null_log_message_is_dropped() {
        let key = 0x5400usize;
        let calls = Arc::new(AtomicUsize::new(0));
        let hooks = CONTEXT_HOOKS.register_with(key, ContextHooks::default);
        let calls_in = calls.clone();
        hooks.log.set(Box::new(move |_, _| {
            calls_in.fetch_add(1, Ordering::SeqCst);
        }));

        unsafe {
            log_callback(key as *mut FreenectContext, 1, std::ptr::null());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // The handler survives a dropped event.
        let message = CString::new("still here").unwrap();
        unsafe {
            log_callback(key as *mut FreenectContext, 1, message.as_ptr());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        CONTEXT_HOOKS.remove(key);
    }

    #[test]
    fn frame_event_for_unknown_device_is_dropped() {
        // No registry entry: must return before dereferencing anything.
        unsafe {
            depth_callback(0x6100 as *mut FreenectDevice, std::ptr::null_mut(), 0);
            video_callback(0x6100 as *mut FreenectDevice, std::ptr::null_mut(), 0);
        }
    }

    #[test]
    fn frame_event_with_empty_slot_is_dropped() {
        let key = 0x6200usize;
        DEVICE_HOOKS.register_with(key, DeviceHooks::default);
        unsafe {
            depth_callback(key as *mut FreenectDevice, std::ptr::null_mut(), 0);
            video_callback(key as *mut FreenectDevice, std::ptr::null_mut(), 0);
        }
        DEVICE_HOOKS.remove(key);
    }
}
