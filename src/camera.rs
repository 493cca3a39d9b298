//! Top-level owner of the transport, hotplug registration and pipeline.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::CameraConfig;
use crate::controller::{ConnectionController, ConnectionState, Transition};
use crate::device::UvcTransport;
use crate::error::{ApplicationError, ErrorValue};
use crate::pipeline::{FramePipeline, PipelineStats};
use crate::traits::UsbTransport;

/// A hot-pluggable stereo camera feeding a [`FramePipeline`].
///
/// Construction registers for hotplug notifications and connects at once if
/// the camera is already attached. [`StereoCamera::main_loop`] pumps the
/// notifications; dropping the camera deregisters and closes the device.
pub struct StereoCamera<T: UsbTransport> {
    registration: Option<T::Registration>,
    controller: Arc<Mutex<ConnectionController<T>>>,
    pipeline: Arc<FramePipeline>,
    transport: Arc<T>,
}

impl StereoCamera<UvcTransport> {
    /// Use the system libusb and V4L2 stack with the default configuration.
    pub fn open(pipeline: FramePipeline) -> Result<Self, ErrorValue> {
        let transport = UvcTransport::new().map_err(ErrorValue::transport)?;
        Self::new(transport, CameraConfig::default(), pipeline)
    }
}

impl<T: UsbTransport> StereoCamera<T> {
    /// Register for hotplug on `transport` and perform the initial scan.
    ///
    /// Fails with [`ApplicationError::UnsupportedPlatform`] when the transport
    /// cannot report hotplug events.
    pub fn new(transport: T, config: CameraConfig, pipeline: FramePipeline) -> Result<Self, ErrorValue> {
        let mut error = ErrorValue::default();
        if !transport.has_hotplug() {
            error.set(ApplicationError::UnsupportedPlatform)?;
        }

        let transport = Arc::new(transport);
        let pipeline = Arc::new(pipeline);
        let controller = Arc::new(Mutex::new(ConnectionController::new(
            Arc::clone(&transport),
            config,
            pipeline.sink(),
        )));

        let observer = Arc::downgrade(&controller);
        let registration = error.check(transport.register_hotplug(Box::new(move || {
            if let Some(controller) = observer.upgrade() {
                if let Err(err) = controller.lock().on_topology_changed() {
                    warn!(%err, "topology update failed");
                }
            }
        })))?;
        info!(identity = %config.identity, "watching for stereo camera");

        let camera = Self {
            registration: Some(registration),
            controller,
            pipeline,
            transport,
        };

        // The camera may already be attached; hotplug only reports later changes.
        if let Err(err) = camera.refresh() {
            warn!(%err, "initial scan failed");
        }
        Ok(camera)
    }

    /// Block until at least one transport event has been dispatched.
    pub fn main_loop(&self) -> Result<(), ErrorValue> {
        let mut error = ErrorValue::default();
        error.check(self.transport.handle_events())
    }

    /// Re-scan the bus now instead of waiting for a hotplug event.
    pub fn refresh(&self) -> Result<Transition, ErrorValue> {
        self.controller.lock().on_topology_changed()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.controller.lock().state()
    }

    /// `Ok` while connected, [`ApplicationError::CameraUnplugged`] otherwise.
    pub fn require_connected(&self) -> Result<(), ErrorValue> {
        let mut error = ErrorValue::default();
        if self.state() == ConnectionState::Disconnected {
            error.set(ApplicationError::CameraUnplugged)?;
        }
        Ok(())
    }

    /// Outcome of the most recent topology change.
    pub fn last_error(&self) -> ErrorValue {
        *self.controller.lock().last_error()
    }

    /// Frame counters of the pipeline.
    pub fn stats(&self) -> PipelineStats {
        self.pipeline.stats()
    }

    /// The frame pipeline.
    pub fn pipeline(&self) -> &FramePipeline {
        &self.pipeline
    }
}

impl<T: UsbTransport> Drop for StereoCamera<T> {
    fn drop(&mut self) {
        // Deregister first so no callback races the teardown.
        drop(self.registration.take());
        self.controller.lock().shutdown();
    }
}
