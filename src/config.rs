//! Fixed camera parameters.

use std::time::Duration;

use crate::traits::{DeviceIdentity, FourCC, StreamRequest};

/// Leopard Imaging stereo camera (`2a0b:00f5`). Any unit with this pair is
/// accepted; serial numbers are not checked.
pub const TARGET_IDENTITY: DeviceIdentity = DeviceIdentity::new(0x2A0B, 0x00F5);

/// Requested frame width in pixels.
pub const FRAME_WIDTH: u32 = 640;

/// Requested frame height in pixels.
pub const FRAME_HEIGHT: u32 = 480;

/// Requested frame rate.
pub const FRAME_RATE: u32 = 30;

/// Wire encoding of the stereo stream: left sensor in the luma bytes, right
/// sensor in the chroma bytes.
pub const FRAME_FORMAT: FourCC = FourCC::YUYV;

/// Number of mmap buffers queued on the capture node.
pub const STREAM_BUFFER_COUNT: u32 = 4;

/// How long the streaming thread waits for a frame before re-checking its stop flag.
pub const STREAM_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long to wait for the kernel to publish the V4L2 node of a freshly
/// attached camera.
pub const VIDEO_NODE_WAIT: Duration = Duration::from_secs(2);

/// Everything the controller needs to find and configure the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraConfig {
    /// Vendor/product pair to look for.
    pub identity: DeviceIdentity,
    /// Stream parameters to negotiate.
    pub request: StreamRequest,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            identity: TARGET_IDENTITY,
            request: StreamRequest {
                width: FRAME_WIDTH,
                height: FRAME_HEIGHT,
                fps: FRAME_RATE,
                fourcc: FRAME_FORMAT,
            },
        }
    }
}

impl CameraConfig {
    /// Target a different vendor/product pair.
    #[must_use]
    pub const fn with_identity(mut self, identity: DeviceIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Negotiate different stream parameters.
    #[must_use]
    pub const fn with_request(mut self, request: StreamRequest) -> Self {
        self.request = request;
        self
    }
}
