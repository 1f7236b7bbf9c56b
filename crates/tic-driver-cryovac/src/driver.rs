//! Cryovac TIC500 Driver
//!
//! Device façade over [`Session`]: exposes every channel property as a
//! dynamic attribute, raw instrument access as commands, and the first
//! input's temperature as the primary reading.
//!
//! # Attributes
//!
//! One attribute per (channel, property) pair, named `<channel>_<property>`:
//!
//! - `Out1_power`, `Out1_setpoint`, ... `Out2_output_on` (14 per output)
//! - `In1_temperature`, `In1_sensor_type`, ... `In4_sensor_type` (2 per input)
//!
//! # Commands
//!
//! | Command    | Arguments             | Result                     |
//! |------------|-----------------------|----------------------------|
//! | `query`    | `{"command": "..."}`  | `{"reply": "..."}`         |
//! | `send`     | `{"command": "..."}`  | `{"sent": "..."}`          |
//! | `describe` | none                  | `{"description": "..."}`   |

use crate::codec::Dialect;
use crate::mock::SimulatedTic500;
use crate::registry::{list_properties, Channel, PropertySpec};
use crate::session::{BoxTransport, Session};
use crate::transport::{SocketTransport, DEFAULT_PORT, DEFAULT_TIMEOUT_MS};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tic_core::capabilities::{Attributed, Commandable, Lifecycle, Readable};
use tic_core::driver::{Capability, DeviceComponents, DeviceMetadata, DriverFactory};
use tic_core::{AttrValue, Attribute, AttributeSet, DeviceState, TicError, TicResult};
use tracing::instrument;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the TIC500 driver
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Tic500Config {
    /// Hostname or IP address of the instrument
    pub host: String,

    /// TCP port (default: 23)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Command framing (default: verbose)
    #[serde(default)]
    pub dialect: Dialect,

    /// Reply timeout in milliseconds (default: 500)
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Use the simulated instrument instead of a socket
    #[serde(default)]
    pub mock: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl Tic500Config {
    /// Configuration for `host` with every other field at its default.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            dialect: Dialect::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            mock: false,
        }
    }

    /// Reply timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Check semantic constraints the types cannot express.
    pub fn validate(&self) -> TicResult<()> {
        if self.host.trim().is_empty() {
            return Err(TicError::Configuration(
                "'host' field cannot be empty".into(),
            ));
        }
        if self.port == 0 {
            return Err(TicError::Configuration("'port' field cannot be 0".into()));
        }
        if self.timeout_ms == 0 {
            return Err(TicError::Configuration(
                "'timeout_ms' field cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Connector
// =============================================================================

/// Opens a new link to the instrument on every call.
pub type Connector = Arc<dyn Fn() -> BoxFuture<'static, TicResult<BoxTransport>> + Send + Sync>;

fn connector_for(config: &Tic500Config) -> Connector {
    let timeout = config.timeout();
    if config.mock {
        tracing::info!("Creating mock TIC500 driver");
        let instrument = SimulatedTic500::new().with_timeout(timeout);
        Arc::new(move || {
            let instrument = instrument.clone();
            Box::pin(async move { Ok(Box::new(instrument.reconnect()) as BoxTransport) })
        })
    } else {
        let host = config.host.clone();
        let port = config.port;
        Arc::new(move || {
            let host = host.clone();
            Box::pin(async move {
                tracing::info!("Connecting to TIC500 at {}:{}", host, port);
                let transport = SocketTransport::connect_with_timeout(&host, port, timeout).await?;
                Ok(Box::new(transport) as BoxTransport)
            })
        })
    }
}

// =============================================================================
// Tic500Driver
// =============================================================================

/// Driver for the Cryovac TIC500 temperature controller.
///
/// # Example
///
/// ```rust,ignore
/// let driver = Tic500Driver::new(&Tic500Config::new("192.168.1.50"))?;
/// driver.on_init().await?;
///
/// let sp = driver.get(Channel::output(1)?, "setpoint").await?;
/// driver.set(Channel::output(1)?, "setpoint", AttrValue::Float(77.0)).await?;
/// driver.attributes().write("In2_sensor_type", SensorType::Diode.into()).await?;
/// ```
pub struct Tic500Driver {
    session: Arc<Session>,
    attributes: AttributeSet,
    connector: Connector,
}

impl Tic500Driver {
    /// Create a driver for `config`. Nothing is opened until [`Lifecycle::on_init`].
    pub fn new(config: &Tic500Config) -> TicResult<Self> {
        config.validate()?;
        Self::with_connector(config.dialect, connector_for(config))
    }

    /// Create a driver that opens its links through `connector`.
    pub fn with_connector(dialect: Dialect, connector: Connector) -> TicResult<Self> {
        let session = Arc::new(Session::new(dialect));
        let attributes = build_attributes(&session)?;
        Ok(Self {
            session,
            attributes,
            connector,
        })
    }

    /// The underlying session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Read a property of a channel.
    pub async fn get(&self, channel: Channel, property: &str) -> TicResult<AttrValue> {
        self.session.get(channel, property).await
    }

    /// Write a property of a channel.
    pub async fn set(&self, channel: Channel, property: &str, value: AttrValue) -> TicResult<()> {
        self.session.set(channel, property, value).await
    }

    /// Send a raw command line and return the reply verbatim.
    pub async fn raw_query(&self, text: &str) -> TicResult<String> {
        self.session.raw_query(text).await
    }

    /// Send a raw command line without reading a reply.
    pub async fn raw_send(&self, text: &str) -> TicResult<()> {
        self.session.raw_send(text).await
    }

    /// The instrument's description string.
    pub async fn describe(&self) -> TicResult<String> {
        self.session.describe().await
    }
}

/// Attribute name of a channel property (`Out1_power`).
pub fn attribute_name(channel: Channel, spec: &PropertySpec) -> String {
    format!("{}_{}", channel, spec.name)
}

fn unit_of(spec: &PropertySpec) -> Option<&'static str> {
    match spec.name {
        "temperature" | "setpoint" | "ramp_setpoint" => Some("K"),
        "ramp" => Some("K/min"),
        "power" => Some("W"),
        _ => None,
    }
}

fn build_attributes(session: &Arc<Session>) -> TicResult<AttributeSet> {
    let mut attributes = AttributeSet::new();

    for channel in Channel::all() {
        for spec in list_properties(channel.kind()) {
            let reader = session.clone();
            let mut attribute = Attribute::new(
                attribute_name(channel, spec),
                spec.value_type.attr_type(),
                move || {
                    let session = reader.clone();
                    Box::pin(async move { session.get_spec(channel, spec).await })
                },
            )
            .with_description(spec.description);

            if spec.access.is_writable() {
                let writer = session.clone();
                attribute = attribute.with_writer(move |value| {
                    let session = writer.clone();
                    Box::pin(async move { session.set_spec(channel, spec, &value).await })
                });
            }
            if let Some(unit) = unit_of(spec) {
                attribute = attribute.with_unit(unit);
            }

            attributes.register(attribute)?;
        }
    }

    Ok(attributes)
}

fn text_arg<'a>(args: &'a serde_json::Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(|v| v.as_str())
        .with_context(|| format!("missing string argument '{}'", key))
}

// =============================================================================
// Trait Implementations
// =============================================================================

#[async_trait]
impl Lifecycle for Tic500Driver {
    #[instrument(skip(self), err)]
    async fn on_init(&self) -> Result<()> {
        self.session
            .bring_up((self.connector)())
            .await
            .context("TIC500 bring-up failed")
    }

    #[instrument(skip(self), err)]
    async fn on_shutdown(&self) -> Result<()> {
        self.session
            .shutdown()
            .await
            .context("TIC500 shutdown failed")
    }

    fn state(&self) -> DeviceState {
        self.session.state()
    }

    fn status(&self) -> String {
        self.session.status()
    }
}

impl Attributed for Tic500Driver {
    fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }
}

#[async_trait]
impl Commandable for Tic500Driver {
    #[instrument(skip(self, args), err)]
    async fn execute_command(
        &self,
        command: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value> {
        match command {
            "query" => {
                let text = text_arg(&args, "command")?;
                let reply = self.raw_query(text).await?;
                Ok(json!({ "reply": reply }))
            }
            "send" => {
                let text = text_arg(&args, "command")?;
                self.raw_send(text).await?;
                Ok(json!({ "sent": text }))
            }
            "describe" => {
                let description = self.describe().await?;
                Ok(json!({ "description": description }))
            }
            _ => anyhow::bail!("Unknown command: {}", command),
        }
    }
}

#[async_trait]
impl Readable for Tic500Driver {
    #[instrument(skip(self), err)]
    async fn read(&self) -> Result<f64> {
        let value = self.get(Channel::input(1)?, "temperature").await?;
        value
            .as_f64()
            .with_context(|| format!("temperature reading is not a number: {}", value))
    }
}

// =============================================================================
// Tic500Factory
// =============================================================================

/// Factory for creating TIC500 driver instances.
///
/// Register this factory with the control-bus framework to enable device
/// creation from TOML configuration.
pub struct Tic500Factory;

/// Static capabilities for the TIC500 driver
static TIC500_CAPABILITIES: &[Capability] = &[
    Capability::Lifecycle,
    Capability::Attributed,
    Capability::Commandable,
    Capability::Readable,
];

impl DriverFactory for Tic500Factory {
    fn driver_type(&self) -> &'static str {
        "cryovac_tic500"
    }

    fn name(&self) -> &'static str {
        "Cryovac TIC500 Temperature Controller"
    }

    fn capabilities(&self) -> &'static [Capability] {
        TIC500_CAPABILITIES
    }

    fn validate(&self, config: &toml::Value) -> Result<()> {
        let cfg: Tic500Config = config
            .clone()
            .try_into()
            .context("Invalid TIC500 config")?;
        cfg.validate()?;
        Ok(())
    }

    fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<DeviceComponents>> {
        Box::pin(async move {
            let cfg: Tic500Config = config.try_into().context("Invalid TIC500 config")?;
            let driver = Arc::new(Tic500Driver::new(&cfg)?);

            // A failed bring-up leaves the device in Fault; on_init retries it
            if let Err(e) = driver.on_init().await {
                tracing::warn!(
                    "TIC500 at {}:{} is in fault state: {:#}",
                    cfg.host,
                    cfg.port,
                    e
                );
            }

            Ok(DeviceComponents::new()
                .with_lifecycle(driver.clone())
                .with_attributed(driver.clone())
                .with_commandable(driver.clone())
                .with_readable(driver)
                .with_metadata(DeviceMetadata {
                    model: Some("Cryovac TIC500".to_string()),
                    measurement_units: Some("K".to_string()),
                }))
        })
    }
}

// =============================================================================
// Tests
// =============================================================================
