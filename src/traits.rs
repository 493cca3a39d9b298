//! Core traits and types for the USB transport and video device abstraction.

use std::fmt;
use std::sync::Arc;

use crate::error::{DeviceCode, TransportCode};

/// Pixel format representation (e.g., YUYV, MJPG, GREY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed).
    pub const YUYV: Self = Self::new(b"YUYV");
    /// MJPEG pixel format (Motion JPEG).
    pub const MJPG: Self = Self::new(b"MJPG");
    /// 8-bit greyscale.
    pub const GREY: Self = Self::new(b"GREY");
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{}", char::from(byte))?;
        }
        Ok(())
    }
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

/// USB vendor/product pair used to recognise the target hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    /// USB vendor id.
    pub vendor_id: u16,
    /// USB product id.
    pub product_id: u16,
}

impl DeviceIdentity {
    /// Create an identity from its vendor and product ids.
    #[must_use]
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// Stream parameters asked of the device during negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames per second.
    pub fps: u32,
    /// Pixel format.
    pub fourcc: FourCC,
}

/// Stream configuration the device agreed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamControl {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames per second.
    pub fps: u32,
    /// Pixel format.
    pub fourcc: FourCC,
    /// Bytes per line (stride).
    pub stride: u32,
    /// Total frame size in bytes.
    pub size: u32,
}

impl StreamControl {
    /// Control for a packed 2-bytes-per-pixel stream matching `request`.
    #[must_use]
    pub const fn packed(request: &StreamRequest) -> Self {
        let stride = request.width * 2;
        Self {
            width: request.width,
            height: request.height,
            fps: request.fps,
            fourcc: request.fourcc,
            stride,
            size: stride * request.height,
        }
    }

    /// Whether the device honoured the size, format and rate of `request`.
    #[must_use]
    pub fn satisfies(&self, request: &StreamRequest) -> bool {
        self.width == request.width
            && self.height == request.height
            && self.fourcc == request.fourcc
            && self.fps == request.fps
    }
}

/// One captured frame, lent to the frame sink for a single invocation.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel encoding reported by the device.
    pub fourcc: FourCC,
    /// Frame sequence number.
    pub sequence: u32,
    /// Raw payload.
    pub data: &'a [u8],
}

impl<'a> RawFrame<'a> {
    /// Same payload, relabelled with another pixel encoding.
    #[must_use]
    pub const fn reinterpret(self, fourcc: FourCC) -> RawFrame<'a> {
        RawFrame { fourcc, ..self }
    }

    /// Number of pixels in the frame, or `None` on overflow.
    #[must_use]
    pub fn pixel_count(&self) -> Option<usize> {
        (self.width as usize).checked_mul(self.height as usize)
    }
}

/// Callback receiving each captured frame while a stream is active.
pub type FrameSink = Arc<dyn Fn(&RawFrame<'_>) + Send + Sync>;

/// Wrap a closure as a [`FrameSink`].
pub fn frame_sink<F>(sink: F) -> FrameSink
where
    F: Fn(&RawFrame<'_>) + Send + Sync + 'static,
{
    Arc::new(sink)
}

/// Callback invoked on any device arrival or departure.
pub type HotplugObserver = Box<dyn FnMut() + Send>;

/// Result type for transport-layer operations.
pub type TransportResult<T> = std::result::Result<T, TransportCode>;

/// Result type for device-protocol operations.
pub type DeviceResult<T> = std::result::Result<T, DeviceCode>;

/// Abstraction over the USB enumeration, handle and hotplug layer.
pub trait UsbTransport: Send + Sync + 'static {
    /// Enumerated, not yet opened device. Cloning takes a reference on it and
    /// dropping releases that reference.
    type Device: Clone + Send + 'static;

    /// Open handle to a device.
    type Handle: DeviceHandle<Device = Self::Device>;

    /// Keeps a hotplug observer registered until dropped.
    type Registration;

    /// Whether the platform can deliver hotplug notifications.
    fn has_hotplug(&self) -> bool;

    /// List the currently attached devices.
    fn devices(&self) -> TransportResult<Vec<Self::Device>>;

    /// Read the vendor/product pair from the device descriptor.
    fn identity(&self, device: &Self::Device) -> TransportResult<DeviceIdentity>;

    /// Open a handle to an enumerated device.
    fn open(&self, device: &Self::Device) -> TransportResult<Self::Handle>;

    /// Register `observer` for arrival and departure of any device.
    fn register_hotplug(&self, observer: HotplugObserver) -> TransportResult<Self::Registration>;

    /// Block until at least one pending event has been dispatched.
    fn handle_events(&self) -> TransportResult<()>;
}

/// Abstraction over the video device protocol of an open handle.
pub trait DeviceHandle: Send + 'static {
    /// Device type this handle was opened from.
    type Device;

    /// Whether this handle belongs to `device`.
    fn is_device(&self, device: &Self::Device) -> bool;

    /// Ask the device for a stream configuration matching `request`.
    fn negotiate(&mut self, request: &StreamRequest) -> DeviceResult<StreamControl>;

    /// Begin asynchronous delivery of frames to `sink`.
    fn start_streaming(&mut self, control: &StreamControl, sink: FrameSink) -> DeviceResult<()>;

    /// Stop delivery. No frame reaches the sink after this returns.
    fn stop_streaming(&mut self);

    /// Enable or disable automatic exposure.
    fn set_auto_exposure(&mut self, enabled: bool) -> DeviceResult<()>;

    /// Raise saturation to the highest value the device supports.
    fn set_saturation_max(&mut self) -> DeviceResult<()>;
}
