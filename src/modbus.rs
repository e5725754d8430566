//! The boundary to a Modbus TCP client.
//!
//! Framing and socket handling live behind [`Transport`]; the session only ever issues
//! "read holding registers" (function 3) and "write multiple registers" (function 16).

use std::future::Future;
use std::time::Duration;

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    /// Applies both to establishing the connection and to awaiting each response.
    pub timeout: Duration,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{}:{}", self.host, self.port))
    }
}

/// A Modbus exception code, as returned in an exception response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionCode(pub u8);

impl ExceptionCode {
    pub const ILLEGAL_FUNCTION: Self = Self(1);
    pub const ILLEGAL_DATA_ADDRESS: Self = Self(2);
    pub const ILLEGAL_DATA_VALUE: Self = Self(3);
    pub const SERVER_DEVICE_FAILURE: Self = Self(4);
    pub const SERVER_BUSY: Self = Self(6);
    pub const GATEWAY_PATH_UNAVAILABLE: Self = Self(10);
    pub const GATEWAY_TARGET_FAILED: Self = Self(11);

    pub fn description(&self) -> &'static str {
        match self.0 {
            1 => "illegal function",
            2 => "illegal data address",
            3 => "illegal data value",
            4 => "server device failure",
            5 => "acknowledge",
            6 => "server device busy",
            8 => "memory parity error",
            10 => "gateway path unavailable",
            11 => "gateway target device failed to respond",
            _ => "unknown exception",
        }
    }
}

impl std::fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{} ({})", self.0, self.description()))
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("device responded with exception {0}")]
    Exception(ExceptionCode),
    #[error("requested unit did not respond")]
    NoResponse,
    #[error("response payload is malformed (byte count {declared}, {actual} bytes of data)")]
    Malformed { declared: usize, actual: usize },
    #[error("connection failed")]
    Connection(#[source] std::io::Error),
    #[error("connection unexpectedly closed")]
    Closed,
}

impl Error {
    /// Whether the connection itself is gone, as opposed to the device rejecting a request.
    pub fn is_connection_fault(&self) -> bool {
        matches!(self, Error::Connection(_) | Error::Closed)
    }

    pub fn exception_code(&self) -> Option<ExceptionCode> {
        match self {
            Error::Exception(c) => Some(*c),
            _ => None,
        }
    }
}

/// The data of a successful holding register read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holdings {
    values: Vec<u8>,
}

impl Holdings {
    /// Register data with no header.
    pub fn new(values: Vec<u8>) -> Self {
        Self { values }
    }

    /// Parse an encoded read response, i.e. the byte count followed by the register data.
    pub fn from_encoded(encoded: &[u8]) -> Result<Self, Error> {
        let Some((&count, values)) = encoded.split_first() else {
            return Err(Error::Malformed { declared: 0, actual: 0 });
        };
        // The byte count is a single byte and wraps for reads longer than 127 registers; some
        // gateways answer those anyway, so only shorter-than-declared data is rejected.
        if values.len() < usize::from(count) {
            return Err(Error::Malformed { declared: count.into(), actual: values.len() });
        }
        Ok(Self { values: values.to_vec() })
    }

    pub fn values(&self) -> &[u8] {
        &self.values
    }

    pub fn into_values(self) -> Vec<u8> {
        self.values
    }
}

/// A Modbus TCP client.
///
/// Every request is a single round trip; implementations apply the [`Endpoint::timeout`] to
/// awaiting the response.
pub trait Transport {
    fn connect(&mut self, endpoint: &Endpoint) -> impl Future<Output = Result<(), Error>> + Send;

    /// Whether the underlying socket is currently open.
    fn is_open(&self) -> bool;

    fn close(&mut self);

    fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
        unit_id: u8,
    ) -> impl Future<Output = Result<Holdings, Error>> + Send;

    fn write_registers(
        &mut self,
        address: u16,
        words: &[u16],
        unit_id: u8,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}
