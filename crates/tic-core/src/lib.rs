//! `tic-core`
//!
//! Boundary contract between the TIC500 driver and the control-bus framework
//! that hosts it.
//!
//! ## Key Types
//!
//! - [`error::TicError`]: typed error taxonomy of the protocol core
//! - [`attribute::AttributeSet`]: dynamic, typed, access-controlled attributes
//!   with generic get/set dispatch
//! - [`capabilities`]: `Lifecycle`, `Attributed`, `Commandable`, `Readable`
//! - [`driver::DriverFactory`]: builds devices from TOML configuration
//! - [`state::DeviceState`]: Off / On / Fault, with status text

pub mod attribute;
pub mod capabilities;
pub mod driver;
pub mod error;
pub mod state;

pub use attribute::{Access, AttrType, AttrValue, Attribute, AttributeSet, EnumLabel};
pub use error::{TicError, TicResult};
pub use state::{DeviceState, StatusCell};
