pub mod file;
pub mod registry;

use duo_stream::{DeviceEvent, StreamParams, Tuner};

pub use registry::{DeviceHandle, Registry};

/// Per-device callbacks invoked by the hardware runtime.
///
/// All three run on the runtime's callback thread, serialized per device.
/// Sample slices are only valid for the duration of the call.
pub trait DeviceCallbacks: Send {
    /// Stream callback for tuner A, or the only tuner of single-tuner devices
    fn stream_a(&mut self, xi: &[i16], xq: &[i16], params: &StreamParams, reset: bool);

    /// Stream callback for tuner B in dual-tuner mode
    fn stream_b(&mut self, _xi: &[i16], _xq: &[i16], _params: &StreamParams, _reset: bool) {}

    fn event(&mut self, _tuner: Tuner, _event: DeviceEvent) {}
}

/// Common trait for dual-tuner sample sources
pub trait DuoSource: Send {
    /// Deliver samples to `callbacks` until stop() is called, the input
    /// ends, or an error occurs.
    fn start(&mut self, callbacks: Box<dyn DeviceCallbacks>) -> duo_stream::Result<()>;

    /// Signal the source to stop streaming
    fn stop(&mut self);

    /// Get the per-tuner sample rate in Hz
    fn sample_rate(&self) -> u32;
}
