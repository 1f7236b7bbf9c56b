//! Driver Factory and Component Types
//!
//! Drivers implement [`DriverFactory`] and are registered with the hosting
//! control-bus framework at startup. The framework hands the factory the
//! device's TOML configuration section; the factory validates it, builds the
//! driver and returns a [`DeviceComponents`] bag with every capability the
//! driver implements.
//!
//! # Example: Implementing a Driver Factory
//!
//! ```rust,ignore
//! use tic_core::driver::{DriverFactory, DeviceComponents, Capability};
//! use futures::future::BoxFuture;
//! use std::sync::Arc;
//!
//! pub struct ThermometerFactory;
//!
//! impl DriverFactory for ThermometerFactory {
//!     fn driver_type(&self) -> &'static str { "thermometer" }
//!     fn name(&self) -> &'static str { "Generic Thermometer" }
//!     fn capabilities(&self) -> &'static [Capability] { &[Capability::Readable] }
//!
//!     fn validate(&self, config: &toml::Value) -> anyhow::Result<()> {
//!         let table = config.as_table().ok_or_else(|| anyhow::anyhow!("expected table"))?;
//!         if !table.contains_key("host") {
//!             anyhow::bail!("missing 'host' field");
//!         }
//!         Ok(())
//!     }
//!
//!     fn build(&self, config: toml::Value) -> BoxFuture<'static, anyhow::Result<DeviceComponents>> {
//!         Box::pin(async move {
//!             let driver = Arc::new(Thermometer::connect(&config).await?);
//!             Ok(DeviceComponents::new().with_readable(driver))
//!         })
//!     }
//! }
//! ```

use crate::capabilities::{Attributed, Commandable, Lifecycle, Readable};
use anyhow::Result;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Capability Enum (Runtime Introspection)
// =============================================================================

/// Runtime capability flags for device introspection.
///
/// Mirrors the capability traits as an enum for easy matching and listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Has init/shutdown hooks and state reporting
    /// Corresponds to [`crate::capabilities::Lifecycle`]
    Lifecycle,

    /// Has a dynamic attribute set
    /// Corresponds to [`crate::capabilities::Attributed`]
    Attributed,

    /// Accepts free-form commands
    /// Corresponds to [`crate::capabilities::Commandable`]
    Commandable,

    /// Can read scalar values (temperature sensors)
    /// Corresponds to [`crate::capabilities::Readable`]
    Readable,
}

impl Capability {
    /// Human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Lifecycle => "Lifecycle",
            Self::Attributed => "Attributed",
            Self::Commandable => "Commandable",
            Self::Readable => "Readable",
        }
    }
}

// =============================================================================
// Device Components (Capability Bag)
// =============================================================================

/// Container for capability trait objects returned by drivers.
///
/// ```rust,ignore
/// let driver = Arc::new(MyDriver::new().await?);
///
/// let components = DeviceComponents::new()
///     .with_lifecycle(driver.clone())
///     .with_attributed(driver);
/// ```
#[derive(Default)]
pub struct DeviceComponents {
    /// Lifecycle implementation (init/shutdown)
    pub lifecycle: Option<Arc<dyn Lifecycle>>,

    /// Attributed implementation (dynamic attributes)
    pub attributed: Option<Arc<dyn Attributed>>,

    /// Commandable implementation (free-form commands)
    pub commandable: Option<Arc<dyn Commandable>>,

    /// Readable implementation (scalar measurements)
    pub readable: Option<Arc<dyn Readable>>,

    /// Capability-specific metadata
    pub metadata: DeviceMetadata,
}

impl DeviceComponents {
    /// Create a new empty DeviceComponents
    pub fn new() -> Self {
        Self::default()
    }

    /// Get list of capabilities this device supports
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut caps = Vec::new();

        if self.lifecycle.is_some() {
            caps.push(Capability::Lifecycle);
        }
        if self.attributed.is_some() {
            caps.push(Capability::Attributed);
        }
        if self.commandable.is_some() {
            caps.push(Capability::Commandable);
        }
        if self.readable.is_some() {
            caps.push(Capability::Readable);
        }

        caps
    }

    /// Set Lifecycle implementation
    pub fn with_lifecycle(mut self, l: Arc<dyn Lifecycle>) -> Self {
        self.lifecycle = Some(l);
        self
    }

    /// Set Attributed implementation
    pub fn with_attributed(mut self, a: Arc<dyn Attributed>) -> Self {
        self.attributed = Some(a);
        self
    }

    /// Set Commandable implementation
    pub fn with_commandable(mut self, c: Arc<dyn Commandable>) -> Self {
        self.commandable = Some(c);
        self
    }

    /// Set Readable implementation
    pub fn with_readable(mut self, r: Arc<dyn Readable>) -> Self {
        self.readable = Some(r);
        self
    }

    /// Set device metadata
    pub fn with_metadata(mut self, metadata: DeviceMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

// =============================================================================
// Device Metadata
// =============================================================================

/// Additional information about a device not captured by the trait objects.
#[derive(Debug, Clone, Default)]
pub struct DeviceMetadata {
    /// Manufacturer and model, for display
    pub model: Option<String>,

    /// For Readable devices: measurement units (e.g., "K")
    pub measurement_units: Option<String>,
}

// =============================================================================
// Driver Factory Trait
// =============================================================================

/// Trait for driver factories that create device instances.
///
/// Factories are registered once at startup and live for the program's
/// lifetime. `build()` takes `&self` and returns a `'static` future, so the
/// factory must not hold mutable state across builds.
pub trait DriverFactory: Send + Sync + 'static {
    /// Driver type name used in the TOML config `type` field.
    fn driver_type(&self) -> &'static str;

    /// Human-readable name for documentation and error messages.
    fn name(&self) -> &'static str;

    /// List of capabilities this driver type provides.
    fn capabilities(&self) -> &'static [Capability] {
        &[]
    }

    /// Validate configuration without instantiating.
    ///
    /// # Returns
    ///
    /// - `Ok(())` if configuration is valid
    /// - `Err` with descriptive message if validation fails
    fn validate(&self, config: &toml::Value) -> Result<()>;

    /// Async instantiation of the driver.
    ///
    /// Called after validation passes. Parses the configuration, creates the
    /// driver, runs its bring-up and returns all implemented capabilities.
    fn build(&self, config: toml::Value) -> BoxFuture<'static, Result<DeviceComponents>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_name() {
        assert_eq!(Capability::Attributed.name(), "Attributed");
        assert_eq!(Capability::Readable.name(), "Readable");
    }

    #[test]
    fn test_device_components_builder() {
        let components = DeviceComponents::new().with_metadata(DeviceMetadata {
            measurement_units: Some("K".to_string()),
            ..Default::default()
        });

        assert_eq!(components.metadata.measurement_units, Some("K".to_string()));
    }

    #[test]
    fn test_device_components_capabilities() {
        // Empty components should have no capabilities
        let empty = DeviceComponents::new();
        assert!(empty.capabilities().is_empty());
    }

    #[test]
    fn test_capability_serde() {
        let cap = Capability::Commandable;
        let json = serde_json::to_string(&cap).unwrap();
        assert_eq!(json, "\"commandable\"");

        let cap: Capability = serde_json::from_str("\"attributed\"").unwrap();
        assert_eq!(cap, Capability::Attributed);
    }
}
