//! Register descriptors and the per-device catalogs they are collected in.
//!
//! Catalog content is external configuration: this module only models and validates it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::datatypes::{self, DataType};

/// Numeric register value → human readable label.
pub type LabelTable = BTreeMap<i64, String>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("register `{name}` is {data_type} spanning {expected} registers, but has quantity {actual}")]
    QuantityMismatch { name: String, data_type: DataType, expected: u16, actual: u16 },
    #[error("register `{0}` must span at least one register")]
    ZeroQuantity(String),
    #[error("register `{0}` has gain {1}, but the gain must be a positive number")]
    InvalidGain(String, f64),
    #[error("register `{0}` is {1} and cannot be scaled")]
    GainOnNonNumeric(String, DataType),
    #[error("register name `{0}` is defined more than once")]
    DuplicateName(String),
    #[error("register `{0}` refers to an unknown label table `{1}`")]
    UnknownLabels(String, String),
    #[error("register `{0}` has unknown access mode `{1}`")]
    UnknownMode(String, String),
    #[error("register `{1}` has an unusable data type")]
    DataType(#[source] datatypes::Error, String),
    #[error("could not parse the register catalog")]
    ParseCatalog(#[source] serde_json::Error),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(transparent)]
pub struct Mode(u8);

impl serde::Serialize for Mode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(if self.0 & Self::R.0 == 0 { "-" } else { "R" })?;
        f.write_str(if self.0 & Self::W.0 == 0 { "-" } else { "W" })?;
        Ok(())
    }
}

impl std::str::FromStr for Mode {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "RO" | "R-" | "R" => Ok(Self::R),
            "WO" | "-W" | "W" => Ok(Self::W),
            "RW" => Ok(Self::RW),
            _ => Err(()),
        }
    }
}

impl Mode {
    pub const R: Self = Self(1 << 0);
    pub const W: Self = Self(1 << 1);
    pub const RW: Self = Self(Self::R.0 | Self::W.0);

    pub const fn is_readable(&self) -> bool {
        self.0 & Self::R.0 != 0
    }

    pub const fn is_writable(&self) -> bool {
        self.0 & Self::W.0 != 0
    }
}

/// One addressable holding register (or run of registers).
///
/// Registers are constructed through [`Register::builder`], which enforces that `quantity`
/// agrees with the data type, and are immutable afterwards.
#[derive(Clone, Debug)]
pub struct Register {
    name: String,
    address: u16,
    quantity: u16,
    data_type: DataType,
    mode: Mode,
    gain: Option<f64>,
    unit: Option<String>,
    labels: Option<Arc<LabelTable>>,
}

impl Register {
    pub fn builder(
        name: impl Into<String>,
        address: u16,
        data_type: DataType,
        mode: Mode,
    ) -> RegisterBuilder {
        RegisterBuilder {
            name: name.into(),
            address,
            quantity: None,
            data_type,
            mode,
            gain: None,
            unit: None,
            labels: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> u16 {
        self.address
    }

    /// The number of 16-bit registers this register spans.
    pub fn quantity(&self) -> u16 {
        self.quantity
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Divisor applied to the raw value on read.
    pub fn gain(&self) -> Option<f64> {
        self.gain
    }

    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    pub fn labels(&self) -> Option<&LabelTable> {
        self.labels.as_deref()
    }
}

pub struct RegisterBuilder {
    name: String,
    address: u16,
    quantity: Option<u16>,
    data_type: DataType,
    mode: Mode,
    gain: Option<f64>,
    unit: Option<String>,
    labels: Option<Arc<LabelTable>>,
}

impl RegisterBuilder {
    /// Required for `string` and `multidata` registers, optional for everything else.
    pub fn quantity(mut self, quantity: u16) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn gain(mut self, gain: f64) -> Self {
        self.gain = Some(gain);
        self
    }

    pub fn unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn labels(mut self, labels: Arc<LabelTable>) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn build(self) -> Result<Register, Error> {
        let quantity = match (self.data_type.registers(), self.quantity) {
            (Some(expected), Some(actual)) if expected != actual => {
                return Err(Error::QuantityMismatch {
                    name: self.name,
                    data_type: self.data_type,
                    expected,
                    actual,
                });
            }
            (Some(expected), _) => expected,
            (None, Some(actual)) if actual >= 1 => actual,
            (None, _) => return Err(Error::ZeroQuantity(self.name)),
        };
        if let Some(gain) = self.gain {
            if !(gain.is_finite() && gain > 0.0) {
                return Err(Error::InvalidGain(self.name, gain));
            }
            if !self.data_type.is_numeric() {
                return Err(Error::GainOnNonNumeric(self.name, self.data_type));
            }
        }
        Ok(Register {
            name: self.name,
            address: self.address,
            quantity,
            data_type: self.data_type,
            mode: self.mode,
            gain: self.gain,
            unit: self.unit,
            labels: self.labels,
        })
    }
}

#[derive(
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Debug,
    serde::Deserialize,
    serde::Serialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceClass {
    Inverter,
    Battery,
    Meter,
}

/// The registers of one device class, indexed by name.
///
/// Iteration follows the order in which the registers were defined.
#[derive(Clone, Debug)]
pub struct RegisterCatalog {
    device: DeviceClass,
    registers: Vec<Register>,
    by_name: HashMap<String, usize>,
}

impl RegisterCatalog {
    pub fn new(
        device: DeviceClass,
        registers: impl IntoIterator<Item = Register>,
    ) -> Result<Self, Error> {
        let registers = registers.into_iter().collect::<Vec<_>>();
        let mut by_name = HashMap::with_capacity(registers.len());
        for (index, register) in registers.iter().enumerate() {
            if by_name.insert(register.name.clone(), index).is_some() {
                return Err(Error::DuplicateName(register.name.clone()));
            }
        }
        Ok(Self { device, registers, by_name })
    }

    /// Load a catalog from its JSON description.
    ///
    /// ```json
    /// {
    ///   "device": "inverter",
    ///   "labels": { "device_status": { "512": "On-grid" } },
    ///   "registers": [
    ///     { "name": "Model", "address": 30000, "quantity": 15, "type": "string", "access": "RO" },
    ///     { "name": "DeviceStatus", "address": 32089, "type": "uint16", "access": "RO",
    ///       "labels": "device_status" }
    ///   ]
    /// }
    /// ```
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let file: CatalogFile = serde_json::from_str(json).map_err(Error::ParseCatalog)?;
        let tables = file
            .labels
            .into_iter()
            .map(|(name, table)| (name, Arc::new(table)))
            .collect::<HashMap<_, _>>();
        let registers = file
            .registers
            .into_iter()
            .map(|entry| entry.into_register(&tables))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(file.device, registers)
    }

    pub fn device(&self) -> DeviceClass {
        self.device
    }

    pub fn get(&self, name: &str) -> Option<&Register> {
        self.by_name.get(name).map(|&index| &self.registers[index])
    }

    /// The first register defined at `address`.
    pub fn by_address(&self, address: u16) -> Option<&Register> {
        self.registers.iter().find(|r| r.address == address)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Register> {
        self.registers.iter()
    }

    pub fn len(&self) -> usize {
        self.registers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}

impl<'a> IntoIterator for &'a RegisterCatalog {
    type Item = &'a Register;
    type IntoIter = std::slice::Iter<'a, Register>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogFile {
    device: DeviceClass,
    #[serde(default)]
    labels: BTreeMap<String, LabelTable>,
    registers: Vec<CatalogEntry>,
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogEntry {
    name: String,
    address: u16,
    quantity: Option<u16>,
    #[serde(rename = "type")]
    data_type: String,
    access: String,
    gain: Option<f64>,
    unit: Option<String>,
    labels: Option<String>,
}

impl CatalogEntry {
    fn into_register(self, tables: &HashMap<String, Arc<LabelTable>>) -> Result<Register, Error> {
        let data_type = DataType::from_tag(&self.data_type)
            .map_err(|e| Error::DataType(e, self.name.clone()))?;
        let Ok(mode) = self.access.parse::<Mode>() else {
            return Err(Error::UnknownMode(self.name, self.access));
        };
        let mut builder = Register::builder(self.name, self.address, data_type, mode);
        if let Some(quantity) = self.quantity {
            builder = builder.quantity(quantity);
        }
        if let Some(gain) = self.gain {
            builder = builder.gain(gain);
        }
        if let Some(unit) = self.unit {
            builder = builder.unit(unit);
        }
        if let Some(table) = self.labels {
            let Some(labels) = tables.get(&table) else {
                return Err(Error::UnknownLabels(builder.name, table));
            };
            builder = builder.labels(Arc::clone(labels));
        }
        builder.build()
    }
}
