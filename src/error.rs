//! Three-domain error value shared by the session, controller and pipeline.
//!
//! A failure can originate in the USB transport (libusb numbering), in the
//! video device protocol (UVC numbering) or in this crate itself. [`ErrorValue`]
//! keeps one code per domain and reports the highest-precedence one:
//! application, then device, then transport.
//!
//! Constructing a value is silent. Committing a code with [`ErrorValue::set`]
//! or [`ErrorValue::check`] is the point where a failure becomes an `Err` that
//! the caller propagates with `?`.

use std::fmt;
use std::io;

use thiserror::Error;

/// Transport-layer (libusb) status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum TransportCode {
    /// No error.
    #[default]
    Success = 0,
    /// Input/output error.
    Io = -1,
    /// Invalid parameter.
    InvalidParam = -2,
    /// Access denied (insufficient permissions).
    Access = -3,
    /// No such device (it may have been disconnected).
    NoDevice = -4,
    /// Entity not found.
    NotFound = -5,
    /// Resource busy.
    Busy = -6,
    /// Operation timed out.
    Timeout = -7,
    /// Overflow.
    Overflow = -8,
    /// Pipe error.
    Pipe = -9,
    /// System call interrupted.
    Interrupted = -10,
    /// Insufficient memory.
    NoMem = -11,
    /// Operation not supported on this platform.
    NotSupported = -12,
    /// Other error.
    Other = -99,
}

impl TransportCode {
    /// Whether this code reports success.
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Numeric libusb value of this code.
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Human-readable description, worded like `libusb_strerror`.
    pub const fn message(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Io => "Input/Output Error",
            Self::InvalidParam => "Invalid parameter",
            Self::Access => "Access denied (insufficient permissions)",
            Self::NoDevice => "No such device (it may have been disconnected)",
            Self::NotFound => "Entity not found",
            Self::Busy => "Resource busy",
            Self::Timeout => "Operation timed out",
            Self::Overflow => "Overflow",
            Self::Pipe => "Pipe error",
            Self::Interrupted => "System call interrupted (perhaps due to signal)",
            Self::NoMem => "Insufficient memory",
            Self::NotSupported => "Operation not supported or unimplemented on this platform",
            Self::Other => "Other error",
        }
    }
}

impl From<rusb::Error> for TransportCode {
    fn from(err: rusb::Error) -> Self {
        match err {
            rusb::Error::Io => Self::Io,
            rusb::Error::InvalidParam => Self::InvalidParam,
            rusb::Error::Access => Self::Access,
            rusb::Error::NoDevice => Self::NoDevice,
            rusb::Error::NotFound => Self::NotFound,
            rusb::Error::Busy => Self::Busy,
            rusb::Error::Timeout => Self::Timeout,
            rusb::Error::Overflow => Self::Overflow,
            rusb::Error::Pipe => Self::Pipe,
            rusb::Error::Interrupted => Self::Interrupted,
            rusb::Error::NoMem => Self::NoMem,
            rusb::Error::NotSupported => Self::NotSupported,
            rusb::Error::BadDescriptor | rusb::Error::Other => Self::Other,
        }
    }
}

/// Device-protocol (UVC) status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum DeviceCode {
    /// No error.
    #[default]
    Success = 0,
    /// Input/output error.
    Io = -1,
    /// Invalid parameter.
    InvalidParam = -2,
    /// Access denied.
    Access = -3,
    /// No such device.
    NoDevice = -4,
    /// Entity not found.
    NotFound = -5,
    /// Resource busy.
    Busy = -6,
    /// Operation timed out.
    Timeout = -7,
    /// Overflow.
    Overflow = -8,
    /// Pipe error.
    Pipe = -9,
    /// System call interrupted.
    Interrupted = -10,
    /// Insufficient memory.
    NoMem = -11,
    /// Operation not supported.
    NotSupported = -12,
    /// Device is not UVC-compliant or the handle does not match it.
    InvalidDevice = -50,
    /// Requested mode is not supported.
    InvalidMode = -51,
    /// A streaming callback is already registered.
    CallbackExists = -52,
    /// Other error.
    Other = -99,
}

impl DeviceCode {
    /// Whether this code reports success.
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }

    /// Numeric UVC value of this code.
    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Human-readable description, worded like `uvc_strerror`.
    pub const fn message(self) -> &'static str {
        match self {
            Self::Success => "Success (no error)",
            Self::Io => "Input/output error",
            Self::InvalidParam => "Invalid parameter",
            Self::Access => "Access denied",
            Self::NoDevice => "No such device",
            Self::NotFound => "Not found",
            Self::Busy => "Busy",
            Self::Timeout => "Timeout",
            Self::Overflow => "Overflow",
            Self::Pipe => "Pipe",
            Self::Interrupted => "Interrupted",
            Self::NoMem => "Out of memory",
            Self::NotSupported => "Not supported",
            Self::InvalidDevice => "Invalid device",
            Self::InvalidMode => "Invalid mode",
            Self::CallbackExists => "Callback exists",
            Self::Other => "Unknown error",
        }
    }
}

impl From<&io::Error> for DeviceCode {
    fn from(err: &io::Error) -> Self {
        match err.raw_os_error() {
            Some(libc::EPERM | libc::EACCES) => Self::Access,
            Some(libc::ENOENT) => Self::NotFound,
            Some(libc::EINTR) => Self::Interrupted,
            Some(libc::EIO) => Self::Io,
            Some(libc::ENXIO | libc::ENODEV) => Self::NoDevice,
            Some(libc::ENOMEM) => Self::NoMem,
            Some(libc::EBUSY) => Self::Busy,
            Some(libc::EINVAL) => Self::InvalidParam,
            Some(libc::ENOTTY) => Self::NotSupported,
            Some(libc::EPIPE) => Self::Pipe,
            Some(libc::EOVERFLOW) => Self::Overflow,
            Some(libc::ETIMEDOUT) => Self::Timeout,
            Some(_) => Self::Other,
            None => match err.kind() {
                io::ErrorKind::PermissionDenied => Self::Access,
                io::ErrorKind::NotFound => Self::NotFound,
                io::ErrorKind::TimedOut => Self::Timeout,
                io::ErrorKind::InvalidInput => Self::InvalidParam,
                io::ErrorKind::Interrupted => Self::Interrupted,
                io::ErrorKind::OutOfMemory => Self::NoMem,
                io::ErrorKind::Unsupported => Self::NotSupported,
                io::ErrorKind::BrokenPipe => Self::Pipe,
                _ => Self::Io,
            },
        }
    }
}

impl From<io::Error> for DeviceCode {
    fn from(err: io::Error) -> Self {
        Self::from(&err)
    }
}

/// Failures raised by this crate rather than by a lower layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ApplicationError {
    /// The USB library cannot deliver hotplug notifications on this platform.
    #[error("Unsupported platform")]
    UnsupportedPlatform,
    /// The stereo camera is not connected.
    #[error("Stereo camera is not connected")]
    CameraUnplugged,
    /// Opening the device failed, almost always for lack of privilege.
    #[error("Couldn't access the camera (check udev rules or run with elevated privileges)")]
    PermissionDenied,
    /// A conversion buffer could not be allocated.
    #[error("Unable to allocate frame")]
    AllocationFailed,
    /// Splitting the raw frame into left/right planes failed.
    #[error("Unable to convert frame")]
    ConversionFailed,
    /// The camera did not accept the requested size and/or frame rate.
    #[error("The camera did not support the requested video size and/or frame rate")]
    UnsupportedMode,
    /// Anything else.
    #[error("Unspecified error")]
    Unspecified,
}

impl ApplicationError {
    /// Numeric value of this error.
    pub const fn code(self) -> i32 {
        match self {
            Self::UnsupportedPlatform => 1,
            Self::CameraUnplugged => 2,
            Self::PermissionDenied => 3,
            Self::AllocationFailed => 4,
            Self::ConversionFailed => 5,
            Self::UnsupportedMode => 6,
            Self::Unspecified => 99,
        }
    }
}

/// A code from any one of the three domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Transport-layer code.
    Transport(TransportCode),
    /// Device-protocol code.
    Device(DeviceCode),
    /// Application-level error; `None` clears the domain.
    Application(Option<ApplicationError>),
}

impl From<TransportCode> for ErrorCode {
    fn from(code: TransportCode) -> Self {
        Self::Transport(code)
    }
}

impl From<DeviceCode> for ErrorCode {
    fn from(code: DeviceCode) -> Self {
        Self::Device(code)
    }
}

impl From<ApplicationError> for ErrorCode {
    fn from(kind: ApplicationError) -> Self {
        Self::Application(Some(kind))
    }
}

impl From<Option<ApplicationError>> for ErrorCode {
    fn from(kind: Option<ApplicationError>) -> Self {
        Self::Application(kind)
    }
}

/// Error domain that wins the precedence rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDomain {
    /// Transport layer.
    Transport,
    /// Device-protocol layer.
    Device,
    /// This crate.
    Application,
}

/// Outcome of an operation, fused across the three error domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorValue {
    transport: TransportCode,
    device: DeviceCode,
    application: Option<ApplicationError>,
}

impl ErrorValue {
    /// Silently captures a transport code.
    pub fn transport(code: TransportCode) -> Self {
        Self {
            transport: code,
            ..Self::default()
        }
    }

    /// Silently captures a device-protocol code.
    pub fn device(code: DeviceCode) -> Self {
        Self {
            device: code,
            ..Self::default()
        }
    }

    /// Silently captures an application error.
    pub fn application(kind: ApplicationError) -> Self {
        Self {
            application: Some(kind),
            ..Self::default()
        }
    }

    /// Replaces the code of one domain and commits the result.
    ///
    /// Returns `Err` with a copy of the value if it is now a failure, so the
    /// remaining sub-steps of the current operation are skipped by `?`.
    /// Passing `None::<ApplicationError>` clears the application domain.
    pub fn set<C: Into<ErrorCode>>(&mut self, code: C) -> Result<(), Self> {
        self.store(code.into());
        if self.is_failure() {
            Err(*self)
        } else {
            Ok(())
        }
    }

    /// Commits the error of a lower-layer result, passing a success through.
    pub fn check<T, C: Into<ErrorCode>>(&mut self, result: Result<T, C>) -> Result<T, Self> {
        match result {
            Ok(value) => Ok(value),
            Err(code) => {
                self.set(code)?;
                // A success code inside `Err` carries no failure to commit.
                Err(Self::application(ApplicationError::Unspecified))
            }
        }
    }

    /// Returns the value to success.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Whether any domain holds a failure.
    pub const fn is_failure(&self) -> bool {
        !self.transport.is_success() || !self.device.is_success() || self.application.is_some()
    }

    /// Domain that wins the precedence rule, or `None` on success.
    pub const fn domain(&self) -> Option<ErrorDomain> {
        if self.application.is_some() {
            Some(ErrorDomain::Application)
        } else if !self.device.is_success() {
            Some(ErrorDomain::Device)
        } else if !self.transport.is_success() {
            Some(ErrorDomain::Transport)
        } else {
            None
        }
    }

    /// Bracketed domain tag used in rendered errors.
    pub const fn category(&self) -> &'static str {
        match self.domain() {
            Some(ErrorDomain::Application) => "[APPLICATION]",
            Some(ErrorDomain::Device) => "[DEVICE]",
            Some(ErrorDomain::Transport) => "[TRANSPORT]",
            None => "[UNKNOWN]",
        }
    }

    /// Message of the winning domain.
    pub fn message(&self) -> String {
        match (self.application, self.domain()) {
            (Some(kind), _) => kind.to_string(),
            (None, Some(ErrorDomain::Device)) => self.device.message().to_owned(),
            (None, Some(ErrorDomain::Transport)) => self.transport.message().to_owned(),
            _ => "Success".to_owned(),
        }
    }

    /// Numeric code of the winning domain, or 0 on success.
    pub const fn numeric_code(&self) -> i32 {
        if let Some(kind) = self.application {
            kind.code()
        } else if !self.device.is_success() {
            self.device.code()
        } else {
            self.transport.code()
        }
    }

    /// Transport code currently held.
    pub const fn transport_code(&self) -> TransportCode {
        self.transport
    }

    /// Device-protocol code currently held.
    pub const fn device_code(&self) -> DeviceCode {
        self.device
    }

    /// Application error currently held.
    pub const fn application_error(&self) -> Option<ApplicationError> {
        self.application
    }

    fn store(&mut self, code: ErrorCode) {
        match code {
            ErrorCode::Transport(code) => self.transport = code,
            ErrorCode::Device(code) => self.device = code,
            ErrorCode::Application(kind) => self.application = kind,
        }
    }
}

impl From<ErrorCode> for ErrorValue {
    fn from(code: ErrorCode) -> Self {
        let mut value = Self::default();
        value.store(code);
        value
    }
}

impl From<TransportCode> for ErrorValue {
    fn from(code: TransportCode) -> Self {
        Self::transport(code)
    }
}

impl From<DeviceCode> for ErrorValue {
    fn from(code: DeviceCode) -> Self {
        Self::device(code)
    }
}

impl From<ApplicationError> for ErrorValue {
    fn from(kind: ApplicationError) -> Self {
        Self::application(kind)
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} ({})",
            self.category(),
            self.message(),
            self.numeric_code()
        )
    }
}

impl std::error::Error for ErrorValue {}
