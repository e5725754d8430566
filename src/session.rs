use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::connection::Args;
use crate::datatypes::{self, Value};
use crate::format::{NumberFormat, Plain};
use crate::modbus::{self, Endpoint, Transport};
use crate::registers::Register;

/// What [`Session::read_formatted`] returns for a code missing from the label table.
pub const UNDEFINED_LABEL: &str = "undefined";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("device is not connected")]
    NotConnected,
    #[error("register `{0}` is not writable")]
    NotWritable(String),
    #[error("either a quantity or an end address greater than 0 is required")]
    RangeUnbounded,
    #[error("only one of quantity or end address may be given")]
    RangeOverdetermined,
    #[error("end address {end} must be greater than start address {start}")]
    RangeInverted { start: u16, end: u16 },
    #[error("register range starting at {start} runs past the end of the address space")]
    RangeTooLarge { start: u16 },
    #[error("could not encode the value for register `{1}`")]
    Encode(#[source] datatypes::Error, String),
    #[error("could not decode the value of register `{1}`")]
    Decode(#[source] datatypes::Error, String),
    #[error("expected {expected} bytes of register data, got {actual}")]
    ResponseLength { expected: usize, actual: usize },
    #[error("the device did not handle the request")]
    Device(#[source] modbus::Error),
    #[error("the connection to the device failed")]
    Connection(#[source] modbus::Error),
}

impl Error {
    /// Whether the call itself was malformed, regardless of the device.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::NotWritable(_)
                | Error::RangeUnbounded
                | Error::RangeOverdetermined
                | Error::RangeInverted { .. }
                | Error::RangeTooLarge { .. }
                | Error::Encode(..)
        )
    }
}

/// A contiguous span of holding registers, bounded by either a quantity or an inclusive end
/// address. Zero means "not given" for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterRange {
    pub start: u16,
    pub quantity: u16,
    pub end: u16,
}

impl RegisterRange {
    pub fn with_quantity(start: u16, quantity: u16) -> Self {
        Self { start, quantity, end: 0 }
    }

    /// Registers `start..=end`.
    pub fn through(start: u16, end: u16) -> Self {
        Self { start, quantity: 0, end }
    }

    /// The start address and register count to request.
    pub fn resolve(&self) -> Result<(u16, u16), Error> {
        let count = match (self.quantity, self.end) {
            (0, 0) => return Err(Error::RangeUnbounded),
            (_, 0) => self.quantity,
            (0, end) if end <= self.start => {
                return Err(Error::RangeInverted { start: self.start, end });
            }
            (0, end) => u16::try_from(u32::from(end) - u32::from(self.start) + 1)
                .map_err(|_| Error::RangeTooLarge { start: self.start })?,
            (_, _) => return Err(Error::RangeOverdetermined),
        };
        if u32::from(self.start) + u32::from(count) > 1 << 16 {
            return Err(Error::RangeTooLarge { start: self.start });
        }
        Ok((self.start, count))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Disconnected,
    Connected,
}

/// A connection-managed view of one device's holding registers.
///
/// A session starts out disconnected and never connects on its own. Any transport failure
/// closes the connection; reconnecting is up to the caller. Each operation is one request and
/// one response, so a session needs `&mut` access and concurrent users must serialize.
pub struct Session<T> {
    transport: T,
    endpoint: Endpoint,
    wait: Duration,
    unit_id: u8,
    state: State,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T, args: &Args) -> Self {
        Self {
            transport,
            endpoint: args.endpoint(),
            wait: *args.wait,
            unit_id: args.unit_id,
            state: State::Disconnected,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// The unit ID used by calls that don't override it.
    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == State::Connected
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Open the connection and give the device time to settle.
    ///
    /// Returns whether the session ended up connected; the cause of a failure is logged.
    pub async fn connect(&mut self) -> bool {
        if self.is_connected() {
            return true;
        }
        info!(message = "connecting...", endpoint = %self.endpoint);
        if let Err(e) = self.transport.connect(&self.endpoint).await {
            warn!(
                message = "connection to inverter failed",
                endpoint = %self.endpoint,
                error = (&e as &dyn std::error::Error)
            );
            self.transport.close();
            self.state = State::Disconnected;
            return false;
        }
        debug!(message = "waiting for the device to settle", wait = ?self.wait);
        tokio::time::sleep(self.wait).await;
        if !self.transport.is_open() {
            warn!(message = "connection closed while waiting for the device to settle");
            self.transport.close();
            self.state = State::Disconnected;
            return false;
        }
        info!(message = "connected", endpoint = %self.endpoint);
        self.state = State::Connected;
        true
    }

    /// Close the connection.
    ///
    /// Some SDongle firmware reboots or stalls portal updates while a connection is held open,
    /// so this always closes the socket regardless of the session state.
    pub fn disconnect(&mut self) {
        self.transport.close();
        if self.state == State::Connected {
            info!(message = "disconnected", endpoint = %self.endpoint);
        }
        self.state = State::Disconnected;
    }

    /// Read and decode a register without applying its gain.
    pub async fn read_raw(
        &mut self,
        register: &Register,
        unit_id: Option<u8>,
    ) -> Result<Value, Error> {
        self.ensure_connected()?;
        let bytes = self.read_registers(register.address(), register.quantity(), unit_id).await?;
        let value = datatypes::decode(&bytes, register.data_type())
            .map_err(|e| Error::Decode(e, register.name().to_string()))?;
        trace!(message = "read register", register = register.name(), %value);
        Ok(value)
    }

    /// Read a register, dividing integers by the register gain if it has one.
    pub async fn read(&mut self, register: &Register, unit_id: Option<u8>) -> Result<Value, Error> {
        let raw = self.read_raw(register, unit_id).await?;
        Ok(scale(register, raw))
    }

    /// Read a register for display: `"<value> <unit>"` for registers with a unit, the label
    /// for registers with a label table, or the scaled value otherwise.
    pub async fn read_formatted(
        &mut self,
        register: &Register,
        unit_id: Option<u8>,
    ) -> Result<Value, Error> {
        self.read_formatted_with(register, unit_id, &Plain).await
    }

    /// [`Self::read_formatted`] with a custom rendering of the number in front of the unit.
    pub async fn read_formatted_with(
        &mut self,
        register: &Register,
        unit_id: Option<u8>,
        format: &impl NumberFormat,
    ) -> Result<Value, Error> {
        let raw = self.read_raw(register, unit_id).await?;
        Ok(present(register, raw, format))
    }

    /// Read an arbitrary span of registers as raw bytes.
    pub async fn read_range(
        &mut self,
        range: RegisterRange,
        unit_id: Option<u8>,
    ) -> Result<Vec<u8>, Error> {
        let (address, count) = range.resolve()?;
        self.ensure_connected()?;
        self.read_registers(address, count, unit_id).await
    }

    /// Encode `value` for the register and write it with a single multi-register write.
    pub async fn write(
        &mut self,
        register: &Register,
        value: impl Into<Value>,
        unit_id: Option<u8>,
    ) -> Result<(), Error> {
        self.ensure_connected()?;
        if !register.mode().is_writable() {
            return Err(Error::NotWritable(register.name().to_string()));
        }
        let encode_error = |e| Error::Encode(e, register.name().to_string());
        let encoded = datatypes::encode(&value.into(), register.data_type()).map_err(encode_error)?;
        let words = datatypes::to_words(&encoded).map_err(encode_error)?;
        let unit_id = unit_id.unwrap_or(self.unit_id);
        let address = register.address();
        trace!(message = "writing registers", register = register.name(), address, ?words, unit_id);
        match self.transport.write_registers(address, &words, unit_id).await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.fail(e)),
        }
    }

    fn ensure_connected(&self) -> Result<(), Error> {
        if self.is_connected() { Ok(()) } else { Err(Error::NotConnected) }
    }

    async fn read_registers(
        &mut self,
        address: u16,
        count: u16,
        unit_id: Option<u8>,
    ) -> Result<Vec<u8>, Error> {
        let unit_id = unit_id.unwrap_or(self.unit_id);
        trace!(message = "reading holding registers", address, count, unit_id);
        let values = match self.transport.read_holding_registers(address, count, unit_id).await {
            Ok(holdings) => holdings.into_values(),
            Err(e) => return Err(self.fail(e)),
        };
        let expected = 2 * usize::from(count);
        if values.len() != expected {
            return Err(Error::ResponseLength { expected, actual: values.len() });
        }
        Ok(values)
    }

    /// Classify a transport failure and drop the connection.
    fn fail(&mut self, e: modbus::Error) -> Error {
        let error = if e.is_connection_fault() {
            warn!(message = "a connection error occurred", error = (&e as &dyn std::error::Error));
            Error::Connection(e)
        } else {
            warn!(message = "inverter unit did not respond", error = (&e as &dyn std::error::Error));
            Error::Device(e)
        };
        self.disconnect();
        error
    }
}

fn scale(register: &Register, raw: Value) -> Value {
    match (register.gain(), raw) {
        (Some(gain), Value::Integer(n)) => Value::Scaled(n as f64 / gain),
        (_, raw) => raw,
    }
}

fn present(register: &Register, raw: Value, format: &impl NumberFormat) -> Value {
    if let Some(unit) = register.unit() {
        let scaled = scale(register, raw);
        return Value::Text(format!("{} {}", format.format(&scaled), unit));
    }
    if let Some(labels) = register.labels() {
        let label = raw.as_integer().and_then(|code| labels.get(&code));
        return Value::Text(label.map_or(UNDEFINED_LABEL, String::as_str).to_string());
    }
    scale(register, raw)
}
