//! Mock transport and device implementation for testing without hardware.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::convert::FrameAllocator;
use crate::error::{DeviceCode, TransportCode};
use crate::traits::{
    DeviceHandle, DeviceIdentity, DeviceResult, FourCC, FrameSink, HotplugObserver, RawFrame,
    StreamControl, StreamRequest, TransportResult, UsbTransport,
};

/// Enumerated mock device. Clones share one reference counter.
#[derive(Debug, Clone)]
pub struct MockDevice {
    id: u32,
    identity: DeviceIdentity,
    unreadable: bool,
    refs: Arc<()>,
}

impl MockDevice {
    /// Number of live references to this device, the bus's own included.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.refs)
    }

    /// Bus-unique id.
    pub const fn id(&self) -> u32 {
        self.id
    }
}

/// Call counters recorded by the mock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MockStats {
    /// `devices()` calls.
    pub enumerations: usize,
    /// `open()` calls.
    pub opens: usize,
    /// Handles dropped.
    pub closes: usize,
    /// `negotiate()` calls.
    pub negotiations: usize,
    /// Successful `start_streaming()` calls.
    pub starts: usize,
    /// `stop_streaming()` calls that stopped an active stream.
    pub stops: usize,
    /// Best-effort tuning calls.
    pub tunings: usize,
}

#[derive(Default)]
struct MockBus {
    next_id: u32,
    devices: Vec<MockDevice>,
    no_hotplug: bool,
    fail_enumeration: Option<TransportCode>,
    fail_registration: Option<TransportCode>,
    fail_open: Option<TransportCode>,
    wrong_handle: bool,
    fail_negotiate: Option<DeviceCode>,
    fail_start: Option<DeviceCode>,
    fail_tuning: bool,
    registered: bool,
    observer: Option<HotplugObserver>,
    pending_events: usize,
    sink: Option<FrameSink>,
    last_sink: Option<FrameSink>,
    last_control: Option<StreamControl>,
    stats: MockStats,
}

/// Mock USB bus for testing without hardware.
#[derive(Clone, Default)]
pub struct MockTransport {
    bus: Arc<Mutex<MockBus>>,
}

impl MockTransport {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device and queue a hotplug event.
    pub fn plug(&self, identity: DeviceIdentity) -> MockDevice {
        self.attach(identity, false)
    }

    /// Attach a device whose descriptor cannot be read.
    pub fn plug_unreadable(&self, identity: DeviceIdentity) -> MockDevice {
        self.attach(identity, true)
    }

    /// Detach a device and queue a hotplug event.
    pub fn unplug(&self, device: &MockDevice) {
        let mut bus = self.bus.lock();
        bus.devices.retain(|d| d.id != device.id);
        bus.pending_events += 1;
    }

    /// Report the platform as lacking hotplug support.
    pub fn disable_hotplug(&self) {
        self.bus.lock().no_hotplug = true;
    }

    /// Make `devices()` fail.
    pub fn fail_enumeration(&self, code: Option<TransportCode>) {
        self.bus.lock().fail_enumeration = code;
    }

    /// Make hotplug registration fail.
    pub fn fail_registration(&self, code: Option<TransportCode>) {
        self.bus.lock().fail_registration = code;
    }

    /// Make `open()` fail.
    pub fn fail_open(&self, code: Option<TransportCode>) {
        self.bus.lock().fail_open = code;
    }

    /// Make opened handles report a different device.
    pub fn wrong_handle(&self, enabled: bool) {
        self.bus.lock().wrong_handle = enabled;
    }

    /// Make negotiation fail.
    pub fn fail_negotiate(&self, code: Option<DeviceCode>) {
        self.bus.lock().fail_negotiate = code;
    }

    /// Make `start_streaming()` fail.
    pub fn fail_start(&self, code: Option<DeviceCode>) {
        self.bus.lock().fail_start = code;
    }

    /// Make the best-effort tuning calls fail.
    pub fn fail_tuning(&self, enabled: bool) {
        self.bus.lock().fail_tuning = enabled;
    }

    /// Call counters so far.
    pub fn stats(&self) -> MockStats {
        self.bus.lock().stats
    }

    /// Whether a stream is delivering frames.
    pub fn is_streaming(&self) -> bool {
        self.bus.lock().sink.is_some()
    }

    /// Whether a hotplug observer is registered.
    pub fn has_observer(&self) -> bool {
        self.bus.lock().registered
    }

    /// Control passed to the last successful negotiation.
    pub fn last_control(&self) -> Option<StreamControl> {
        self.bus.lock().last_control.clone()
    }

    /// Most recent sink handed to `start_streaming`, kept after stop.
    pub fn last_sink(&self) -> Option<FrameSink> {
        self.bus.lock().last_sink.clone()
    }

    /// Push a frame through the active stream. Returns `false` when not streaming.
    pub fn deliver(&self, frame: &RawFrame<'_>) -> bool {
        let sink = self.bus.lock().sink.clone();
        sink.is_some_and(|sink| {
            sink(frame);
            true
        })
    }

    fn attach(&self, identity: DeviceIdentity, unreadable: bool) -> MockDevice {
        let mut bus = self.bus.lock();
        let device = MockDevice {
            id: bus.next_id,
            identity,
            unreadable,
            refs: Arc::new(()),
        };
        bus.next_id += 1;
        bus.devices.push(device.clone());
        bus.pending_events += 1;
        device
    }
}

/// Deregisters the mock observer on drop.
pub struct MockRegistration {
    bus: Arc<Mutex<MockBus>>,
}

impl Drop for MockRegistration {
    fn drop(&mut self) {
        let mut bus = self.bus.lock();
        bus.registered = false;
        bus.observer = None;
    }
}

impl UsbTransport for MockTransport {
    type Device = MockDevice;
    type Handle = MockHandle;
    type Registration = MockRegistration;

    fn has_hotplug(&self) -> bool {
        !self.bus.lock().no_hotplug
    }

    fn devices(&self) -> TransportResult<Vec<MockDevice>> {
        let mut bus = self.bus.lock();
        bus.stats.enumerations += 1;
        match bus.fail_enumeration {
            Some(code) => Err(code),
            None => Ok(bus.devices.clone()),
        }
    }

    fn identity(&self, device: &MockDevice) -> TransportResult<DeviceIdentity> {
        if device.unreadable {
            Err(TransportCode::Io)
        } else {
            Ok(device.identity)
        }
    }

    fn open(&self, device: &MockDevice) -> TransportResult<MockHandle> {
        let mut bus = self.bus.lock();
        bus.stats.opens += 1;
        if let Some(code) = bus.fail_open {
            return Err(code);
        }
        let reported_id = if bus.wrong_handle { u32::MAX } else { device.id };
        Ok(MockHandle {
            device: device.clone(),
            reported_id,
            streaming: false,
            bus: Arc::clone(&self.bus),
        })
    }

    fn register_hotplug(&self, observer: HotplugObserver) -> TransportResult<MockRegistration> {
        let mut bus = self.bus.lock();
        if let Some(code) = bus.fail_registration {
            return Err(code);
        }
        bus.registered = true;
        bus.observer = Some(observer);
        Ok(MockRegistration {
            bus: Arc::clone(&self.bus),
        })
    }

    fn handle_events(&self) -> TransportResult<()> {
        let (pending, observer) = {
            let mut bus = self.bus.lock();
            (std::mem::take(&mut bus.pending_events), bus.observer.take())
        };
        if let Some(mut observer) = observer {
            for _ in 0..pending {
                observer();
            }
            let mut bus = self.bus.lock();
            if bus.registered {
                bus.observer = Some(observer);
            }
        }
        Ok(())
    }
}

/// Open handle to a [`MockDevice`].
pub struct MockHandle {
    device: MockDevice,
    reported_id: u32,
    streaming: bool,
    bus: Arc<Mutex<MockBus>>,
}

impl DeviceHandle for MockHandle {
    type Device = MockDevice;

    fn is_device(&self, device: &MockDevice) -> bool {
        self.reported_id == device.id && self.device.identity == device.identity
    }

    fn negotiate(&mut self, request: &StreamRequest) -> DeviceResult<StreamControl> {
        let mut bus = self.bus.lock();
        bus.stats.negotiations += 1;
        if let Some(code) = bus.fail_negotiate {
            return Err(code);
        }
        let control = StreamControl::packed(request);
        bus.last_control = Some(control.clone());
        Ok(control)
    }

    fn start_streaming(&mut self, _control: &StreamControl, sink: FrameSink) -> DeviceResult<()> {
        if self.streaming {
            return Err(DeviceCode::CallbackExists);
        }
        let mut bus = self.bus.lock();
        if let Some(code) = bus.fail_start {
            return Err(code);
        }
        bus.stats.starts += 1;
        bus.last_sink = Some(Arc::clone(&sink));
        bus.sink = Some(sink);
        self.streaming = true;
        Ok(())
    }

    fn stop_streaming(&mut self) {
        if self.streaming {
            let mut bus = self.bus.lock();
            bus.stats.stops += 1;
            bus.sink = None;
            self.streaming = false;
        }
    }

    fn set_auto_exposure(&mut self, _enabled: bool) -> DeviceResult<()> {
        self.tune()
    }

    fn set_saturation_max(&mut self) -> DeviceResult<()> {
        self.tune()
    }
}

impl MockHandle {
    fn tune(&self) -> DeviceResult<()> {
        let mut bus = self.bus.lock();
        bus.stats.tunings += 1;
        if bus.fail_tuning {
            Err(DeviceCode::NotSupported)
        } else {
            Ok(())
        }
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        self.bus.lock().stats.closes += 1;
    }
}

/// Allocation and release counters shared with a [`CountingAllocator`].
#[derive(Debug, Default)]
pub struct AllocCounters {
    allocated: AtomicUsize,
    released: AtomicUsize,
}

impl AllocCounters {
    /// Buffers handed out.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    /// Buffers given back.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

/// Allocator that counts traffic and can be told to run out of memory.
#[derive(Debug, Default)]
pub struct CountingAllocator {
    counters: Arc<AllocCounters>,
    fail_after: Option<usize>,
}

impl CountingAllocator {
    /// Allocator that succeeds `successes` times and then fails.
    #[must_use]
    pub fn failing_after(successes: usize) -> Self {
        Self {
            counters: Arc::default(),
            fail_after: Some(successes),
        }
    }

    /// Shared counters, readable after the allocator moved into a pipeline.
    pub fn counters(&self) -> Arc<AllocCounters> {
        Arc::clone(&self.counters)
    }
}

impl FrameAllocator for CountingAllocator {
    fn allocate(&self, len: usize) -> Option<Vec<u8>> {
        if self
            .fail_after
            .is_some_and(|limit| self.counters.allocated() >= limit)
        {
            return None;
        }
        self.counters.allocated.fetch_add(1, Ordering::SeqCst);
        Some(vec![0; len])
    }

    fn release(&self, buffer: Vec<u8>) {
        drop(buffer);
        self.counters.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// SMPTE color bars pattern.
    ColorBars,
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Solid color with specified Y, U, V values.
    Solid(u8, u8, u8),
}

/// Generate a YUYV payload of `width`×`height` pixels.
pub fn generate_test_frame(width: u32, height: u32, pattern: TestPattern) -> Vec<u8> {
    let size = (width * height * 2) as usize; // YUYV = 2 bytes/pixel
    let mut data = vec![0u8; size];

    match pattern {
        TestPattern::ColorBars => generate_color_bars(&mut data, width),
        TestPattern::Gradient => generate_gradient(&mut data, width),
        TestPattern::Solid(y, u, v) => fill_pairs(&mut data, |_| (y, u, v)),
    }

    data
}

/// Raw frame borrowing `data`.
pub fn yuyv_frame(data: &[u8], width: u32, height: u32, sequence: u32) -> RawFrame<'_> {
    RawFrame {
        width,
        height,
        fourcc: FourCC::YUYV,
        sequence,
        data,
    }
}

fn generate_color_bars(data: &mut [u8], width: u32) {
    // 8 color bars: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
    let bars: [(u8, u8, u8); 8] = [
        (235, 128, 128), // White
        (210, 16, 146),  // Yellow
        (170, 166, 16),  // Cyan
        (145, 54, 34),   // Green
        (106, 202, 222), // Magenta
        (81, 90, 240),   // Red
        (41, 240, 110),  // Blue
        (16, 128, 128),  // Black
    ];
    let bar_width = (width / 8).max(1);

    fill_pairs(data, |x| {
        let column = (x % width) / bar_width;
        bars[column.min(7) as usize]
    });
}

fn generate_gradient(data: &mut [u8], width: u32) {
    fill_pairs(data, |x| {
        #[allow(clippy::cast_possible_truncation)]
        let y_val = (((x % width) * 255) / width) as u8;
        (y_val, 128, 128)
    });
}

/// Fill each [Y0 U Y1 V] group with the values chosen for its first pixel index.
fn fill_pairs<F: FnMut(u32) -> (u8, u8, u8)>(data: &mut [u8], mut pick: F) {
    for (pair, chunk) in data.chunks_exact_mut(4).enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let (y, u, v) = pick(pair as u32 * 2);
        chunk.copy_from_slice(&[y, u, y, v]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_bars_pattern() {
        let data = generate_test_frame(640, 480, TestPattern::ColorBars);

        assert_eq!(data.len(), 640 * 480 * 2);
        // First bar should be white (Y=235)
        assert_eq!(data[0], 235);
        // Last pair of the first row is black
        assert_eq!(data[640 * 2 - 4], 16);
    }

    #[test]
    fn test_gradient_pattern() {
        let data = generate_test_frame(640, 480, TestPattern::Gradient);

        // Left edge should be dark
        assert!(data[0] < 10);

        // Right edge should be bright (check last row, last pixel)
        let last_row_start = 479 * 640 * 2;
        let last_pixel_y = data[last_row_start + 638 * 2];
        assert!(last_pixel_y > 200);
    }

    #[test]
    fn test_solid_pattern() {
        let data = generate_test_frame(64, 64, TestPattern::Solid(128, 64, 192));

        assert_eq!(data[0], 128);
        assert_eq!(data[2], 128);
        assert_eq!(data[1], 64);
        assert_eq!(data[3], 192);
    }

    #[test]
    fn test_unplug_queues_event() {
        let transport = MockTransport::new();
        let device = transport.plug(DeviceIdentity::new(1, 2));
        assert_eq!(device.ref_count(), 2);

        transport.unplug(&device);
        assert_eq!(device.ref_count(), 1);
        assert_eq!(transport.bus.lock().pending_events, 2);
    }

    #[test]
    fn test_counting_allocator_limit() {
        let allocator = CountingAllocator::failing_after(1);
        assert!(allocator.allocate(4).is_some());
        assert!(allocator.allocate(4).is_none());
        assert_eq!(allocator.counters().allocated(), 1);
    }
}
