//! Typed access to the Modbus TCP holding registers of SUN2000 inverters and the batteries and
//! power meters attached to them.
//!
//! A [`RegisterCatalog`] describes the registers of a device class; a [`Session`] reads and
//! writes them through a [`Transport`], converting between register bytes and [`Value`]s.

pub mod connection;
pub mod datatypes;
pub mod format;
pub mod modbus;
pub mod registers;
pub mod session;

pub use datatypes::{DataType, Value};
pub use modbus::Transport;
pub use registers::{DeviceClass, Mode, Register, RegisterCatalog};
pub use session::{RegisterRange, Session};
