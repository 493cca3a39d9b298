//! Connection state machine driven by USB topology changes.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::CameraConfig;
use crate::error::ErrorValue;
use crate::session::DeviceSession;
use crate::traits::{FrameSink, UsbTransport};

/// Whether the controller holds a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No session.
    #[default]
    Disconnected,
    /// A matching device is open and streaming.
    Connected,
}

/// What a topology change did to the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing to do.
    Unchanged,
    /// The camera appeared and is now streaming.
    Connected,
    /// The camera went away and the session was torn down.
    Disconnected,
}

/// Owns the connection state and the device session.
pub struct ConnectionController<T: UsbTransport> {
    transport: Arc<T>,
    config: CameraConfig,
    sink: FrameSink,
    state: ConnectionState,
    session: DeviceSession<T>,
    last_error: ErrorValue,
}

impl<T: UsbTransport> ConnectionController<T> {
    /// Controller that will stream matching devices into `sink`.
    pub fn new(transport: Arc<T>, config: CameraConfig, sink: FrameSink) -> Self {
        Self {
            transport,
            config,
            sink,
            state: ConnectionState::Disconnected,
            session: DeviceSession::new(),
            last_error: ErrorValue::default(),
        }
    }

    /// Current connection state.
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Outcome of the most recent topology change.
    pub const fn last_error(&self) -> &ErrorValue {
        &self.last_error
    }

    /// The device session.
    pub const fn session(&self) -> &DeviceSession<T> {
        &self.session
    }

    /// Re-enumerate and connect or disconnect as needed.
    ///
    /// Repeated calls without a real topology change have no effect. A failed
    /// connect leaves the controller disconnected; the next call retries.
    pub fn on_topology_changed(&mut self) -> Result<Transition, ErrorValue> {
        self.last_error.reset();
        let result = self.update();
        if let Err(err) = result {
            self.last_error = err;
        }
        result
    }

    /// Tear the session down regardless of what is attached.
    pub fn shutdown(&mut self) {
        if self.state == ConnectionState::Connected {
            info!("stereo camera released");
        }
        self.session.close();
        self.state = ConnectionState::Disconnected;
    }

    fn update(&mut self) -> Result<Transition, ErrorValue> {
        let target = self.find_target()?;

        match (target, self.state) {
            (Some(_), ConnectionState::Connected) | (None, ConnectionState::Disconnected) => {
                Ok(Transition::Unchanged)
            }
            (None, ConnectionState::Connected) => {
                info!(identity = %self.config.identity, "connection to stereo camera lost");
                self.session.close();
                self.state = ConnectionState::Disconnected;
                Ok(Transition::Disconnected)
            }
            (Some(device), ConnectionState::Disconnected) => {
                if let Err(err) = self.connect(&device) {
                    warn!(%err, "stereo camera connect failed");
                    self.session.close();
                    return Err(err);
                }
                info!(identity = %self.config.identity, "stereo camera connected");
                self.state = ConnectionState::Connected;
                Ok(Transition::Connected)
            }
        }
    }

    fn connect(&mut self, device: &T::Device) -> Result<(), ErrorValue> {
        self.session.open(&self.transport, device)?;
        self.session.negotiate_stream(&self.config.request)?;
        self.session.start_streaming(Arc::clone(&self.sink))
    }

    /// First attached device matching the configured identity.
    fn find_target(&self) -> Result<Option<T::Device>, ErrorValue> {
        let mut error = ErrorValue::default();
        let devices = error.check(self.transport.devices())?;
        debug!(count = devices.len(), "devices enumerated");

        Ok(devices.into_iter().find(|device| {
            // Unreadable descriptors are skipped.
            self.transport
                .identity(device)
                .is_ok_and(|identity| identity == self.config.identity)
        }))
    }
}

impl<T: UsbTransport> Drop for ConnectionController<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
