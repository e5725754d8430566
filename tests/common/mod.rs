#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use sun2000_modbus::connection::Args;
use sun2000_modbus::modbus::{self, Endpoint, Holdings, Transport};
use sun2000_modbus::registers::{DeviceClass, LabelTable, Mode, Register, RegisterCatalog};
use sun2000_modbus::{DataType, Session};

pub fn common_setup() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

/// How the scripted transport answers requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Behaviour {
    Answer,
    NoResponse,
    Exception(u8),
    ConnectionLost,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Connect(Endpoint),
    Close,
    Read { address: u16, count: u16, unit_id: u8 },
    Write { address: u16, words: Vec<u16>, unit_id: u8 },
}

/// An in-memory device answering from canned, encoded read responses.
pub struct ScriptedTransport {
    pub responses: HashMap<(u16, u16), Vec<u8>>,
    pub behaviour: Mutex<Behaviour>,
    pub accept_connections: bool,
    /// Drop the socket right after the handshake.
    pub drop_after_connect: bool,
    pub open: bool,
    pub calls: Vec<Call>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            responses: canned_responses(),
            behaviour: Mutex::new(Behaviour::Answer),
            accept_connections: true,
            drop_after_connect: false,
            open: false,
            calls: Vec::new(),
        }
    }

    pub fn io_calls(&self) -> Vec<&Call> {
        self.calls
            .iter()
            .filter(|c| matches!(c, Call::Read { .. } | Call::Write { .. }))
            .collect()
    }

    fn failure(&mut self) -> Option<modbus::Error> {
        let behaviour = *self.behaviour.lock().unwrap_or_else(|e| e.into_inner());
        match behaviour {
            Behaviour::Answer => None,
            Behaviour::NoResponse => Some(modbus::Error::NoResponse),
            Behaviour::Exception(code) => {
                Some(modbus::Error::Exception(modbus::ExceptionCode(code)))
            }
            Behaviour::ConnectionLost => {
                self.open = false;
                Some(modbus::Error::Closed)
            }
        }
    }
}

impl Transport for ScriptedTransport {
    fn connect(
        &mut self,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<(), modbus::Error>> + Send {
        self.calls.push(Call::Connect(endpoint.clone()));
        let result = if self.accept_connections {
            self.open = !self.drop_after_connect;
            Ok(())
        } else {
            Err(modbus::Error::Connection(std::io::ErrorKind::ConnectionRefused.into()))
        };
        async move { result }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        self.calls.push(Call::Close);
        self.open = false;
    }

    fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
        unit_id: u8,
    ) -> impl Future<Output = Result<Holdings, modbus::Error>> + Send {
        self.calls.push(Call::Read { address, count, unit_id });
        let result = match self.failure() {
            Some(e) => Err(e),
            None => match self.responses.get(&(address, count)) {
                Some(encoded) => Holdings::from_encoded(encoded),
                None => Err(modbus::Error::Exception(modbus::ExceptionCode::ILLEGAL_DATA_ADDRESS)),
            },
        };
        async move { result }
    }

    fn write_registers(
        &mut self,
        address: u16,
        words: &[u16],
        unit_id: u8,
    ) -> impl Future<Output = Result<(), modbus::Error>> + Send {
        self.calls.push(Call::Write { address, words: words.to_vec(), unit_id });
        let result = match self.failure() {
            Some(e) => Err(e),
            None => Ok(()),
        };
        async move { result }
    }
}

pub const RANGE_30000: &[u8] = b"SUN2000-10KTL-M1\0\0\0\0SUN2000-12HV2220100135\0\0\0\0\0\0\0\001074311-002\0\0\0\0\0\0\0\0";

fn canned_responses() -> HashMap<(u16, u16), Vec<u8>> {
    let mut range = vec![0x46];
    range.extend_from_slice(RANGE_30000);
    HashMap::from([
        // Model: "SUN2000"
        ((30000, 15), [b"\x1ESUN2000".as_slice(), &[0u8; 23][..]].concat()),
        // ModelID: 429
        ((30070, 1), b"\x02\x01\xAD".to_vec()),
        // RatedPower: 10000
        ((30073, 2), b"\x04\x00\x00\x27\x10".to_vec()),
        // State1
        ((32000, 1), b"\x02\x00\x06".to_vec()),
        // DeviceStatus: 512, On-grid
        ((32089, 1), b"\x02\x02\x00".to_vec()),
        // MeterStatus: 7, no label
        ((37100, 1), b"\x02\x00\x07".to_vec()),
        // ActivePower: 1000
        ((37113, 2), b"\x04\x00\x00\x03\xE8".to_vec()),
        // Truncated answer for a two-register read
        ((37200, 2), b"\x02\x00\x01".to_vec()),
        ((30000, 35), range),
    ])
}

pub struct Registers {
    pub model: Register,
    pub model_id: Register,
    pub rated_power: Register,
    pub state1: Register,
    pub device_status: Register,
    pub fixed_active_power_derated_in_w: Register,
    pub cos_phi_ppn_characteristic_curve: Register,
    pub meter_status: Register,
    pub meter_active_power: Register,
    pub battery_running_status: Register,
    pub backup_power_soc: Register,
    pub maximum_feed_grid_power_in_percentage: Register,
    pub maximum_charge_from_grid_power: Register,
    pub truncated: Register,
}

pub fn registers() -> Registers {
    let device_status = Arc::new(LabelTable::from([
        (0x0000, "Standby: initialization".to_string()),
        (0x0200, "On-grid".to_string()),
        (0xA000, "Standby: no irradiation".to_string()),
    ]));
    let meter_status = Arc::new(LabelTable::from([
        (0, "Offline".to_string()),
        (1, "Normal".to_string()),
    ]));
    let r = |name: &str, address, data_type, mode| Register::builder(name, address, data_type, mode);
    Registers {
        model: r("Model", 30000, DataType::String, Mode::R).quantity(15).build().unwrap(),
        model_id: r("ModelID", 30070, DataType::UInt16Be, Mode::R).build().unwrap(),
        rated_power: r("RatedPower", 30073, DataType::UInt32Be, Mode::R)
            .gain(1.0)
            .unit("W")
            .build()
            .unwrap(),
        state1: r("State1", 32000, DataType::Bitfield16, Mode::R).build().unwrap(),
        device_status: r("DeviceStatus", 32089, DataType::UInt16Be, Mode::R)
            .labels(device_status)
            .build()
            .unwrap(),
        fixed_active_power_derated_in_w: r(
            "FixedActivePowerDeratedInW",
            40126,
            DataType::UInt32Be,
            Mode::RW,
        )
        .gain(1.0)
        .unit("W")
        .build()
        .unwrap(),
        cos_phi_ppn_characteristic_curve: r(
            "CosPhiPPnCharacteristicCurve",
            40133,
            DataType::MultiData,
            Mode::RW,
        )
        .quantity(21)
        .build()
        .unwrap(),
        meter_status: r("MeterStatus", 37100, DataType::UInt16Be, Mode::R)
            .labels(meter_status)
            .build()
            .unwrap(),
        meter_active_power: r("ActivePower", 37113, DataType::Int32Be, Mode::R)
            .gain(1.0)
            .unit("W")
            .build()
            .unwrap(),
        battery_running_status: r("RunningStatus", 37762, DataType::UInt16Be, Mode::R)
            .build()
            .unwrap(),
        backup_power_soc: r("BackupPowerSOC", 47102, DataType::UInt16Be, Mode::RW)
            .gain(10.0)
            .unit("%")
            .build()
            .unwrap(),
        maximum_feed_grid_power_in_percentage: r(
            "MaximumFeedGridPowerInPercentage",
            47418,
            DataType::Int16Be,
            Mode::RW,
        )
        .gain(10.0)
        .unit("%")
        .build()
        .unwrap(),
        maximum_charge_from_grid_power: r(
            "MaximumChargeFromGridPower",
            47590,
            DataType::Int32Be,
            Mode::RW,
        )
        .gain(1.0)
        .unit("W")
        .build()
        .unwrap(),
        truncated: r("Truncated", 37200, DataType::UInt32Be, Mode::R).build().unwrap(),
    }
}

pub fn catalog(device: DeviceClass, registers: impl IntoIterator<Item = Register>) -> RegisterCatalog {
    RegisterCatalog::new(device, registers).unwrap()
}

pub fn args() -> Args {
    Args::new("192.168.8.1")
        .with_port(123)
        .with_timeout(std::time::Duration::from_secs(3))
        .with_wait(std::time::Duration::from_secs(2))
        .with_unit_id(1)
}

pub fn session() -> Session<ScriptedTransport> {
    Session::new(ScriptedTransport::new(), &args())
}

/// Change how the device answers from now on, without touching the session state.
pub fn set_behaviour(session: &Session<ScriptedTransport>, behaviour: Behaviour) {
    *session.transport().behaviour.lock().unwrap() = behaviour;
}

pub async fn connected_session() -> Session<ScriptedTransport> {
    let mut session = session();
    assert!(session.connect().await);
    session
}
