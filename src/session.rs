//! One open stereo camera: handle, negotiated stream and device reference.

use tracing::{debug, info};

use crate::error::{ApplicationError, DeviceCode, ErrorValue};
use crate::traits::{DeviceHandle, FrameSink, StreamControl, StreamRequest, UsbTransport};

/// Open device state owned by the connection controller.
///
/// Every field is optional so that [`DeviceSession::close`] can unwind a
/// session left half-built by a failed open, negotiate or start.
pub struct DeviceSession<T: UsbTransport> {
    device: Option<T::Device>,
    handle: Option<T::Handle>,
    control: Option<StreamControl>,
    streaming: bool,
}

impl<T: UsbTransport> Default for DeviceSession<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: UsbTransport> DeviceSession<T> {
    /// Empty session.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            device: None,
            handle: None,
            control: None,
            streaming: false,
        }
    }

    /// Whether a handle is held.
    pub const fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Whether frames are being delivered.
    pub const fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Negotiated stream configuration.
    pub const fn control(&self) -> Option<&StreamControl> {
        self.control.as_ref()
    }

    /// Open `device` and keep a reference to it until [`DeviceSession::close`].
    pub fn open(&mut self, transport: &T, device: &T::Device) -> Result<(), ErrorValue> {
        let mut error = ErrorValue::default();
        self.device = Some(device.clone());

        // Open failures on this class of device are almost always missing privileges.
        let handle = error.check(transport.open(device).map_err(|code| {
            debug!(?code, "device open failed");
            ApplicationError::PermissionDenied
        }))?;
        let handle = self.handle.insert(handle);

        if !handle.is_device(device) {
            error.set(DeviceCode::InvalidDevice)?;
        }
        Ok(())
    }

    /// Agree on a stream configuration. Requires an open handle.
    pub fn negotiate_stream(&mut self, request: &StreamRequest) -> Result<(), ErrorValue> {
        let mut error = ErrorValue::default();
        let Some(handle) = self.handle.as_mut() else {
            return error.set(DeviceCode::InvalidDevice);
        };

        let control = error.check(handle.negotiate(request).map_err(|code| {
            debug!(?code, ?request, "stream negotiation failed");
            ApplicationError::UnsupportedMode
        }))?;
        debug!(?control, "stream negotiated");
        self.control = Some(control);
        Ok(())
    }

    /// Begin delivering frames to `sink`, then apply best-effort tuning.
    pub fn start_streaming(&mut self, sink: FrameSink) -> Result<(), ErrorValue> {
        let mut error = ErrorValue::default();
        let (Some(handle), Some(control)) = (self.handle.as_mut(), self.control.as_ref()) else {
            return error.set(DeviceCode::InvalidDevice);
        };

        error.check(handle.start_streaming(control, sink))?;
        self.streaming = true;

        if let Err(code) = handle.set_auto_exposure(true) {
            debug!(?code, "auto-exposure not applied");
        }
        if let Err(code) = handle.set_saturation_max() {
            debug!(?code, "saturation not applied");
        }
        Ok(())
    }

    /// Stop frame delivery. Safe to call at any time, any number of times.
    pub fn stop_streaming(&mut self) {
        if !self.streaming {
            return;
        }
        if let Some(handle) = self.handle.as_mut() {
            handle.stop_streaming();
        }
        self.streaming = false;
    }

    /// Stop streaming, close the handle and release the device reference.
    ///
    /// Safe on a session that never opened or opened only partly.
    pub fn close(&mut self) {
        self.stop_streaming();
        self.control = None;
        if self.handle.take().is_some() {
            info!("device handle closed");
        }
        self.device = None;
    }
}

impl<T: UsbTransport> Drop for DeviceSession<T> {
    fn drop(&mut self) {
        self.close();
    }
}
