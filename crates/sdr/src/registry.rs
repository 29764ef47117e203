// Copyright 2025-2026 CEMAXECUTER LLC

//! Routing of C-style runtime callbacks to per-device Rust handlers.
//!
//! The hardware runtime invokes plain `extern "C"` functions with an opaque
//! context pointer. The trampolines below treat that pointer as a
//! [`DeviceHandle`] and look the device's [`DeviceCallbacks`] up in a single
//! table. Entries live from [`init_callbacks`] to [`uninit_callbacks`], which
//! bracket device init/uninit.

use std::os::raw::{c_double, c_int, c_uint, c_void};
use std::slice;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use duo_stream::{DeviceEvent, DuoModeChange, Error, Overload, Result, StreamParams, Tuner};

use crate::DeviceCallbacks;

/// Opaque device identity, passed through the runtime as the callback context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub usize);

impl DeviceHandle {
    /// Allocate a process-unique handle for a software device
    pub fn next() -> Self {
        static NEXT: AtomicUsize = AtomicUsize::new(1);
        DeviceHandle(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_context(self) -> *mut c_void {
        self.0 as *mut c_void
    }

    pub fn from_context(ctx: *mut c_void) -> Self {
        DeviceHandle(ctx as usize)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // a panicking handler must not take routing down for every device
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle-keyed table of handlers.
///
/// The table lock is only held for lookup; each handler has its own mutex,
/// so dispatch for one device never waits on another device's callback.
pub struct Registry<H> {
    entries: Mutex<Vec<(DeviceHandle, Arc<Mutex<H>>)>>,
}

impl<H> Registry<H> {
    pub const fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, handle: DeviceHandle, handler: Arc<Mutex<H>>) -> Result<()> {
        let mut entries = lock(&self.entries);
        if entries.iter().any(|(h, _)| *h == handle) {
            return Err(Error::DuplicateDevice(handle.0));
        }
        entries.push((handle, handler));
        Ok(())
    }

    /// Remove and return the handler for `handle`
    pub fn unregister(&self, handle: DeviceHandle) -> Result<Arc<Mutex<H>>> {
        let mut entries = lock(&self.entries);
        let pos = entries
            .iter()
            .position(|(h, _)| *h == handle)
            .ok_or(Error::UnknownDevice(handle.0))?;
        Ok(entries.swap_remove(pos).1)
    }

    pub fn is_registered(&self, handle: DeviceHandle) -> bool {
        lock(&self.entries).iter().any(|(h, _)| *h == handle)
    }

    /// Run `f` on the handler for `handle`. Returns `None` for unknown handles.
    pub fn dispatch<R>(&self, handle: DeviceHandle, f: impl FnOnce(&mut H) -> R) -> Option<R> {
        let handler = lock(&self.entries)
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, handler)| handler.clone())?;
        let mut guard = lock(&handler);
        Some(f(&mut *guard))
    }
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self::new()
    }
}

static CALLBACKS: Registry<Box<dyn DeviceCallbacks>> = Registry::new();

/// Route runtime callbacks for `handle` to `callbacks`. Call before device init.
pub fn init_callbacks(handle: DeviceHandle, callbacks: Box<dyn DeviceCallbacks>) -> Result<()> {
    CALLBACKS.register(handle, Arc::new(Mutex::new(callbacks)))?;
    log::debug!("callbacks registered for device {:#x}", handle.0);
    Ok(())
}

/// Stop routing callbacks for `handle`. Call after device uninit.
pub fn uninit_callbacks(handle: DeviceHandle) -> Result<()> {
    CALLBACKS.unregister(handle)?;
    log::debug!("callbacks unregistered for device {:#x}", handle.0);
    Ok(())
}

/// Stream callback metadata as laid out by the runtime
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawStreamParams {
    pub first_sample_num: c_uint,
    pub gr_changed: c_int,
    pub rf_changed: c_int,
    pub fs_changed: c_int,
    pub num_samples: c_uint,
}

impl From<&RawStreamParams> for StreamParams {
    fn from(raw: &RawStreamParams) -> Self {
        StreamParams {
            first_sample_num: raw.first_sample_num,
            gr_changed: raw.gr_changed != 0,
            rf_changed: raw.rf_changed != 0,
            fs_changed: raw.fs_changed != 0,
            num_samples: raw.num_samples,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct RawGainParams {
    pub gr_db: c_uint,
    pub lna_gr_db: c_uint,
    pub curr_gain: c_double,
}

/// Event parameters; which member is valid depends on the event id
#[repr(C)]
#[derive(Clone, Copy)]
pub union RawEventParams {
    pub gain: RawGainParams,
    pub power_overload: c_int,
    pub duo_mode: c_int,
}

pub const EVENT_GAIN_CHANGE: c_int = 0;
pub const EVENT_POWER_OVERLOAD_CHANGE: c_int = 1;
pub const EVENT_DEVICE_REMOVED: c_int = 2;
pub const EVENT_DUO_MODE_CHANGE: c_int = 3;

pub const TUNER_A: c_int = 1;
pub const TUNER_B: c_int = 2;
pub const TUNER_BOTH: c_int = 3;

fn tuner_from_raw(tuner: c_int) -> Option<Tuner> {
    match tuner {
        TUNER_A => Some(Tuner::A),
        TUNER_B => Some(Tuner::B),
        TUNER_BOTH => Some(Tuner::Both),
        _ => None,
    }
}

fn duo_mode_from_raw(mode: c_int) -> Option<DuoModeChange> {
    Some(match mode {
        0 => DuoModeChange::PrimaryInitialised,
        1 => DuoModeChange::SecondaryAttached,
        2 => DuoModeChange::SecondaryDetached,
        3 => DuoModeChange::SecondaryInitialised,
        4 => DuoModeChange::SecondaryUninitialised,
        5 => DuoModeChange::PrimaryDllDisappeared,
        6 => DuoModeChange::SecondaryDllDisappeared,
        _ => return None,
    })
}

/// Decode an event.
///
/// # Safety
///
/// `params` must be null or point to a valid `RawEventParams` whose active
/// member matches `event_id`.
unsafe fn event_from_raw(event_id: c_int, params: *const RawEventParams) -> Option<DeviceEvent> {
    if event_id == EVENT_DEVICE_REMOVED {
        return Some(DeviceEvent::DeviceRemoved);
    }
    let p = params.as_ref()?;
    match event_id {
        EVENT_GAIN_CHANGE => Some(DeviceEvent::GainChange {
            gr_db: p.gain.gr_db,
            lna_gr_db: p.gain.lna_gr_db,
            curr_gain: p.gain.curr_gain,
        }),
        EVENT_POWER_OVERLOAD_CHANGE => Some(DeviceEvent::PowerOverload(match p.power_overload {
            0 => Overload::Detected,
            _ => Overload::Corrected,
        })),
        EVENT_DUO_MODE_CHANGE => duo_mode_from_raw(p.duo_mode).map(DeviceEvent::DuoModeChange),
        _ => None,
    }
}

/// Build sample slices from runtime pointers; empty when either is null.
///
/// # Safety
///
/// Non-null pointers must reference `num_samples` valid `i16` values each.
unsafe fn stream_slices<'a>(xi: *const i16, xq: *const i16, num_samples: c_uint) -> (&'a [i16], &'a [i16]) {
    if xi.is_null() || xq.is_null() || num_samples == 0 {
        return (&[], &[]);
    }
    let n = num_samples as usize;
    (slice::from_raw_parts(xi, n), slice::from_raw_parts(xq, n))
}

unsafe fn stream_params(params: *const RawStreamParams, num_samples: c_uint) -> StreamParams {
    match params.as_ref() {
        Some(raw) => raw.into(),
        None => StreamParams {
            num_samples,
            ..Default::default()
        },
    }
}

/// Runtime entry point for tuner A sample blocks.
///
/// # Safety
///
/// Called by the runtime with pointers valid for the duration of the call.
pub unsafe extern "C" fn stream_a_trampoline(
    xi: *const i16,
    xq: *const i16,
    params: *const RawStreamParams,
    num_samples: c_uint,
    reset: c_uint,
    ctx: *mut c_void,
) {
    let (sxi, sxq) = stream_slices(xi, xq, num_samples);
    let p = stream_params(params, num_samples);
    CALLBACKS.dispatch(DeviceHandle::from_context(ctx), |cb| {
        cb.stream_a(sxi, sxq, &p, reset != 0)
    });
}

/// Runtime entry point for tuner B sample blocks.
///
/// # Safety
///
/// Called by the runtime with pointers valid for the duration of the call.
pub unsafe extern "C" fn stream_b_trampoline(
    xi: *const i16,
    xq: *const i16,
    params: *const RawStreamParams,
    num_samples: c_uint,
    reset: c_uint,
    ctx: *mut c_void,
) {
    let (sxi, sxq) = stream_slices(xi, xq, num_samples);
    let p = stream_params(params, num_samples);
    CALLBACKS.dispatch(DeviceHandle::from_context(ctx), |cb| {
        cb.stream_b(sxi, sxq, &p, reset != 0)
    });
}

/// Runtime entry point for device events.
///
/// # Safety
///
/// `params` must be null or valid for the duration of the call.
pub unsafe extern "C" fn event_trampoline(
    event_id: c_int,
    tuner: c_int,
    params: *const RawEventParams,
    ctx: *mut c_void,
) {
    let (Some(tuner), Some(event)) = (tuner_from_raw(tuner), event_from_raw(event_id, params)) else {
        log::warn!("ignoring unknown event id={} tuner={}", event_id, tuner);
        return;
    };
    CALLBACKS.dispatch(DeviceHandle::from_context(ctx), |cb| cb.event(tuner, event));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Seen {
        a: Vec<(Vec<i16>, StreamParams, bool)>,
        b: usize,
        events: Vec<(Tuner, DeviceEvent)>,
    }

    struct Probe(Arc<Mutex<Seen>>);

    impl DeviceCallbacks for Probe {
        fn stream_a(&mut self, xi: &[i16], _xq: &[i16], params: &StreamParams, reset: bool) {
            self.0.lock().unwrap().a.push((xi.to_vec(), *params, reset));
        }

        fn stream_b(&mut self, _xi: &[i16], _xq: &[i16], _params: &StreamParams, _reset: bool) {
            self.0.lock().unwrap().b += 1;
        }

        fn event(&mut self, tuner: Tuner, event: DeviceEvent) {
            self.0.lock().unwrap().events.push((tuner, event));
        }
    }

    #[test]
    fn test_registry_register_dispatch_unregister() {
        let reg: Registry<u32> = Registry::new();
        let h = DeviceHandle(7);
        reg.register(h, Arc::new(Mutex::new(1))).unwrap();
        assert!(matches!(
            reg.register(h, Arc::new(Mutex::new(2))),
            Err(Error::DuplicateDevice(7))
        ));

        assert_eq!(reg.dispatch(h, |v| { *v += 1; *v }), Some(2));
        assert_eq!(reg.dispatch(DeviceHandle(8), |v| *v), None);

        let entry = reg.unregister(h).unwrap();
        assert_eq!(*entry.lock().unwrap(), 2);
        assert!(!reg.is_registered(h));
        assert!(matches!(reg.unregister(h), Err(Error::UnknownDevice(7))));
    }

    #[test]
    fn test_trampolines_route_by_handle() {
        let seen = Arc::new(Mutex::new(Seen::default()));
        let h = DeviceHandle::next();
        let other = DeviceHandle::next();
        init_callbacks(h, Box::new(Probe(seen.clone()))).unwrap();

        let xi = [1i16, 2, 3];
        let xq = [4i16, 5, 6];
        let raw = RawStreamParams {
            first_sample_num: 42,
            rf_changed: 1,
            num_samples: 3,
            ..Default::default()
        };
        unsafe {
            stream_a_trampoline(xi.as_ptr(), xq.as_ptr(), &raw, 3, 1, h.as_context());
            stream_b_trampoline(xi.as_ptr(), xq.as_ptr(), std::ptr::null(), 3, 0, h.as_context());
            // unregistered handle is ignored
            stream_b_trampoline(xi.as_ptr(), xq.as_ptr(), std::ptr::null(), 3, 0, other.as_context());

            let gain = RawEventParams {
                gain: RawGainParams { gr_db: 30, lna_gr_db: 12, curr_gain: -20.5 },
            };
            event_trampoline(EVENT_GAIN_CHANGE, TUNER_B, &gain, h.as_context());
            event_trampoline(EVENT_DEVICE_REMOVED, TUNER_BOTH, std::ptr::null(), h.as_context());
            event_trampoline(99, TUNER_A, std::ptr::null(), h.as_context());
        }

        uninit_callbacks(h).unwrap();
        unsafe {
            stream_a_trampoline(xi.as_ptr(), xq.as_ptr(), &raw, 3, 0, h.as_context());
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen.a.len(), 1);
        assert_eq!(seen.a[0].0, vec![1, 2, 3]);
        assert_eq!(seen.a[0].1.first_sample_num, 42);
        assert!(seen.a[0].1.rf_changed);
        assert!(seen.a[0].2);
        assert_eq!(seen.b, 1);
        assert_eq!(
            seen.events,
            vec![
                (Tuner::B, DeviceEvent::GainChange { gr_db: 30, lna_gr_db: 12, curr_gain: -20.5 }),
                (Tuner::Both, DeviceEvent::DeviceRemoved),
            ]
        );
    }

    #[test]
    fn test_null_buffers_give_empty_slices() {
        let (xi, xq) = unsafe { stream_slices(std::ptr::null(), std::ptr::null(), 10) };
        assert!(xi.is_empty() && xq.is_empty());
    }
}
