//! Production backend: libusb for enumeration and hotplug, V4L2 for streaming.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use rusb::{Context, Hotplug, HotplugBuilder, UsbContext};
use tracing::{debug, warn};
use v4l::buffer::Type;
use v4l::capability::Flags;
use v4l::control::{Control, Value};
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::v4l_sys;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::Device;

use crate::config::{STREAM_BUFFER_COUNT, STREAM_POLL_INTERVAL, VIDEO_NODE_WAIT};
use crate::error::{DeviceCode, TransportCode};
use crate::traits::{
    DeviceHandle, DeviceIdentity, DeviceResult, FrameSink, HotplugObserver, RawFrame,
    StreamControl, StreamRequest, TransportResult, UsbTransport,
};

const VIDEO4LINUX_ROOT: &str = "/sys/class/video4linux";
const NODE_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// USB transport backed by a private libusb context.
pub struct UvcTransport {
    context: Context,
}

impl UvcTransport {
    /// Initialise libusb.
    pub fn new() -> TransportResult<Self> {
        let mut context = Context::new()?;
        if cfg!(debug_assertions) {
            context.set_log_level(rusb::LogLevel::Warning);
        }
        Ok(Self { context })
    }
}

impl UsbTransport for UvcTransport {
    type Device = rusb::Device<Context>;
    type Handle = UvcHandle;
    type Registration = rusb::Registration<Context>;

    fn has_hotplug(&self) -> bool {
        rusb::has_hotplug()
    }

    fn devices(&self) -> TransportResult<Vec<Self::Device>> {
        Ok(self.context.devices()?.iter().collect())
    }

    fn identity(&self, device: &Self::Device) -> TransportResult<DeviceIdentity> {
        let descriptor = device.device_descriptor()?;
        Ok(DeviceIdentity::new(descriptor.vendor_id(), descriptor.product_id()))
    }

    fn open(&self, device: &Self::Device) -> TransportResult<Self::Handle> {
        Ok(UvcHandle {
            usb: device.open()?,
            video: None,
            streamer: None,
        })
    }

    fn register_hotplug(&self, observer: HotplugObserver) -> TransportResult<Self::Registration> {
        let callback: Box<dyn Hotplug<Context>> = Box::new(HotplugAdapter { observer });
        let mut builder = HotplugBuilder::new();
        builder.enumerate(false);
        builder
            .register(&self.context, callback)
            .map_err(TransportCode::from)
    }

    fn handle_events(&self) -> TransportResult<()> {
        self.context.handle_events(None).map_err(TransportCode::from)
    }
}

/// Arrivals and departures both mean "re-scan"; the controller works out the rest.
struct HotplugAdapter {
    observer: HotplugObserver,
}

impl Hotplug<Context> for HotplugAdapter {
    fn device_arrived(&mut self, _device: rusb::Device<Context>) {
        (self.observer)();
    }

    fn device_left(&mut self, _device: rusb::Device<Context>) {
        (self.observer)();
    }
}

struct Streamer {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Open camera: the libusb handle plus the V4L2 capture node bound to it.
pub struct UvcHandle {
    usb: rusb::DeviceHandle<Context>,
    video: Option<Arc<Device>>,
    streamer: Option<Streamer>,
}

impl UvcHandle {
    fn video(&self) -> DeviceResult<&Device> {
        self.video.as_deref().ok_or(DeviceCode::InvalidDevice)
    }

    fn set_control(&self, id: u32, value: i64) -> DeviceResult<()> {
        self.video()?.set_control(Control {
            id,
            value: Value::Integer(value),
        })?;
        Ok(())
    }
}

impl DeviceHandle for UvcHandle {
    type Device = rusb::Device<Context>;

    fn is_device(&self, device: &Self::Device) -> bool {
        let own = self.usb.device();
        own.bus_number() == device.bus_number() && own.address() == device.address()
    }

    fn negotiate(&mut self, request: &StreamRequest) -> DeviceResult<StreamControl> {
        let usb = self.usb.device();
        let path = wait_for_capture_node(Path::new(VIDEO4LINUX_ROOT), usb.bus_number(), usb.address())?;
        let video = Device::with_path(&path)?;

        let mut format = video.format()?;
        format.width = request.width;
        format.height = request.height;
        format.fourcc = request.fourcc.into();
        let format = video.set_format(&format)?;
        let params = video.set_params(&Parameters::with_fps(request.fps))?;

        let control = StreamControl {
            width: format.width,
            height: format.height,
            fps: params
                .interval
                .denominator
                .checked_div(params.interval.numerator)
                .unwrap_or(0),
            fourcc: format.fourcc.into(),
            stride: format.stride,
            size: format.size,
        };
        if !control.satisfies(request) {
            debug!(?control, "device offered a different mode");
            return Err(DeviceCode::InvalidMode);
        }

        debug!(path = %path.display(), "capture node configured");
        self.video = Some(Arc::new(video));
        Ok(control)
    }

    fn start_streaming(&mut self, control: &StreamControl, sink: FrameSink) -> DeviceResult<()> {
        if self.streamer.is_some() {
            return Err(DeviceCode::CallbackExists);
        }
        let video = self.video.clone().ok_or(DeviceCode::InvalidDevice)?;

        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let control = control.clone();
        let flag = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name("stereo-capture".into())
            .spawn(move || capture_loop(&video, &control, &sink, &flag, &ready_tx))?;

        let started = ready_rx.recv().unwrap_or(Err(DeviceCode::Other));
        if let Err(code) = started {
            if thread.join().is_err() {
                warn!("capture thread panicked during startup");
            }
            return Err(code);
        }

        self.streamer = Some(Streamer { stop, thread });
        Ok(())
    }

    fn stop_streaming(&mut self) {
        let Some(streamer) = self.streamer.take() else {
            return;
        };
        streamer.stop.store(true, Ordering::Release);
        if streamer.thread.join().is_err() {
            warn!("capture thread panicked");
        }
    }

    fn set_auto_exposure(&mut self, enabled: bool) -> DeviceResult<()> {
        let mode = if enabled {
            v4l_sys::v4l2_exposure_auto_type_V4L2_EXPOSURE_AUTO
        } else {
            v4l_sys::v4l2_exposure_auto_type_V4L2_EXPOSURE_MANUAL
        };
        self.set_control(v4l_sys::V4L2_CID_EXPOSURE_AUTO, i64::from(mode))
    }

    fn set_saturation_max(&mut self) -> DeviceResult<()> {
        let maximum = self
            .video()?
            .query_controls()?
            .into_iter()
            .find(|description| description.id == v4l_sys::V4L2_CID_SATURATION)
            .map(|description| description.maximum)
            .ok_or(DeviceCode::NotSupported)?;
        self.set_control(v4l_sys::V4L2_CID_SATURATION, maximum)
    }
}

impl Drop for UvcHandle {
    fn drop(&mut self) {
        self.stop_streaming();
    }
}

/// Runs on the capture thread until `stop` is raised. Reports on `ready` once
/// the mmap buffers exist, or why they could not be created.
fn capture_loop(
    video: &Device,
    control: &StreamControl,
    sink: &FrameSink,
    stop: &AtomicBool,
    ready: &Sender<DeviceResult<()>>,
) {
    let mut stream = match Stream::with_buffers(video, Type::VideoCapture, STREAM_BUFFER_COUNT) {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ready.send(Err(DeviceCode::from(&err)));
            return;
        }
    };
    stream.set_timeout(STREAM_POLL_INTERVAL);
    if ready.send(Ok(())).is_err() {
        return;
    }
    debug!(width = control.width, height = control.height, "capture thread running");

    while !stop.load(Ordering::Acquire) {
        match stream.next() {
            Ok((buffer, meta)) => {
                let used = usize::try_from(meta.bytesused).unwrap_or(usize::MAX);
                let data = buffer.get(..used).filter(|payload| !payload.is_empty()).unwrap_or(buffer);
                sink(&RawFrame {
                    width: control.width,
                    height: control.height,
                    fourcc: control.fourcc,
                    sequence: meta.sequence,
                    data,
                });
            }
            Err(err) if err.kind() == io::ErrorKind::TimedOut => {}
            Err(err) => {
                warn!(%err, "capture stream failed");
                break;
            }
        }
    }
    debug!("capture thread exiting");
}

/// Poll `root` until the capture node of the USB device at `bus`/`address`
/// shows up or [`VIDEO_NODE_WAIT`] elapses.
fn wait_for_capture_node(root: &Path, bus: u8, address: u8) -> DeviceResult<PathBuf> {
    let deadline = Instant::now() + VIDEO_NODE_WAIT;
    loop {
        for (index, _) in video_nodes_for(root, bus, address)? {
            let path = PathBuf::from(format!("/dev/video{index}"));
            let can_capture = Device::with_path(&path)
                .and_then(|video| video.query_caps())
                .is_ok_and(|caps| caps.capabilities.contains(Flags::VIDEO_CAPTURE));
            if can_capture {
                return Ok(path);
            }
        }
        if Instant::now() >= deadline {
            debug!(bus, address, "no capture node for device");
            return Err(DeviceCode::NoDevice);
        }
        thread::sleep(NODE_POLL_INTERVAL);
    }
}

/// V4L2 nodes under `root` whose parent USB device sits at `bus`/`address`,
/// sorted by node index.
fn video_nodes_for(root: &Path, bus: u8, address: u8) -> io::Result<Vec<(u32, PathBuf)>> {
    let mut nodes = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        let Some(index) = entry.file_name().to_str().and_then(video_index) else {
            continue;
        };
        // `device` links to the USB interface; its parent is the USB device.
        let Ok(interface) = fs::canonicalize(entry.path().join("device")) else {
            continue;
        };
        let Some(usb) = interface.parent() else {
            continue;
        };
        let matches = read_number(&usb.join("busnum")) == Some(u32::from(bus))
            && read_number(&usb.join("devnum")) == Some(u32::from(address));
        if matches {
            nodes.push((index, entry.path()));
        }
    }
    nodes.sort_unstable_by_key(|(index, _)| *index);
    Ok(nodes)
}

fn video_index(name: &str) -> Option<u32> {
    name.strip_prefix("video")?.parse().ok()
}

fn read_number(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}
