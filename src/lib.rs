//! Stereo-Cam-Capture: hotplug-aware capture for the `2a0b:00f5` USB stereo camera
//!
//! The camera streams YUYV where the luma bytes carry the left sensor and the
//! chroma bytes carry the right sensor. This library watches the USB bus,
//! connects whenever the camera appears, and hands every frame to a
//! [`FramePipeline`] as a pair of greyscale images. The transport sits behind
//! traits so the whole state machine runs against mock devices in tests.

pub mod camera;
pub mod config;
pub mod controller;
pub mod convert;
pub mod device;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod traits;

#[cfg(test)]
pub mod mock;

pub use camera::StereoCamera;
pub use config::CameraConfig;
pub use controller::{ConnectionController, ConnectionState, Transition};
pub use convert::{yuyv_to_chroma, yuyv_to_luma, FrameAllocator, GrayBuffer, GrayView, HeapAllocator};
pub use device::{UvcHandle, UvcTransport};
pub use error::{ApplicationError, DeviceCode, ErrorDomain, ErrorValue, TransportCode};
pub use pipeline::{FramePipeline, FramePresenter, FrameProcessor, NullPresenter, PipelineStats, TracePresenter};
pub use traits::{DeviceHandle, DeviceIdentity, FourCC, RawFrame, StreamControl, StreamRequest, UsbTransport};
