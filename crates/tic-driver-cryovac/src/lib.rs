//! Cryovac TIC500 Temperature Controller Driver
//!
//! This crate provides a driver for the Cryovac TIC500 temperature
//! controller: two heater outputs with PID loops and four sensor inputs.
//!
//! # Communication
//!
//! The driver speaks the instrument's ASCII line protocol over a raw TCP
//! socket (default port 23), one command and one reply per line. Two framing
//! dialects are supported, see [`codec::Dialect`].
//!
//! # Capabilities
//!
//! - `Lifecycle` - Bring-up with verbosity negotiation, Fault reporting
//! - `Attributed` - Every channel property as a typed attribute (`Out1_setpoint`)
//! - `Commandable` - Raw `query` / `send` and `describe`
//! - `Readable` - Temperature of input 1
//!
//! # Usage
//!
//! ```rust,ignore
//! use tic_driver_cryovac::Tic500Factory;
//! use tic_core::driver::DriverFactory;
//!
//! let config = toml::toml! {
//!     host = "192.168.1.50"
//!     dialect = "verbose"
//! };
//! let components = Tic500Factory.build(config.into()).await?;
//! ```
//!
//! # Mock Mode
//!
//! For testing without hardware, set `mock = true` in the configuration; the
//! driver then talks to a [`SimulatedTic500`].

pub mod codec;
pub mod driver;
pub mod mock;
pub mod registry;
pub mod session;
pub mod transport;

pub use codec::{Codec, Dialect};
pub use driver::{Tic500Config, Tic500Driver, Tic500Factory};
pub use mock::SimulatedTic500;
pub use registry::{Channel, ChannelKind, PropertySpec};
pub use session::Session;
pub use transport::{SocketTransport, Transport};

