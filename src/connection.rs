use std::time::Duration;

use crate::modbus::Endpoint;

pub const DEFAULT_PORT: u16 = 502;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_WAIT: Duration = Duration::from_secs(2);

/// Connection settings for a [`Session`](crate::session::Session).
///
/// Meant to be `#[clap(flatten)]`-ed into an application's own arguments; [`Args::new`] builds
/// the same defaults without going through the command line.
#[derive(clap::Parser, Clone, Debug)]
#[group(id = "connection::Args")]
pub struct Args {
    /// Host name or IP address of the inverter or its SDongle.
    #[arg(long)]
    pub host: String,

    /// Modbus TCP port. Inverters connected directly over WLAN often listen on 6607.
    #[arg(long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Timeout for establishing the connection and for each response.
    #[arg(long, default_value = "5s")]
    pub timeout: humantime::Duration,

    /// Time to wait after connecting before sending the first request.
    ///
    /// The device firmware ignores requests that arrive too soon after the TCP handshake.
    #[arg(long, default_value = "2s")]
    pub wait: humantime::Duration,

    /// The modbus unit (slave) ID. Some models need 1.
    #[arg(long, short = 'i', default_value_t = 0)]
    pub unit_id: u8,
}

impl Args {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            timeout: DEFAULT_TIMEOUT.into(),
            wait: DEFAULT_WAIT.into(),
            unit_id: 0,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.into();
        self
    }

    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait.into();
        self
    }

    pub fn with_unit_id(mut self, unit_id: u8) -> Self {
        self.unit_id = unit_id;
        self
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint { host: self.host.clone(), port: self.port, timeout: *self.timeout }
    }
}
