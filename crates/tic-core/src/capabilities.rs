//! Capability traits
//!
//! Each trait is one facet of a device the control bus can drive. A driver
//! implements the subset it supports and hands them out through
//! [`crate::driver::DeviceComponents`].
//!
//! - [`Lifecycle`]: init/shutdown hooks plus state and status reporting
//! - [`Attributed`]: dynamic attribute set with generic get/set dispatch
//! - [`Commandable`]: free-form commands (raw instrument access)
//! - [`Readable`]: one primary scalar measurement

use crate::attribute::AttributeSet;
use crate::state::DeviceState;
use anyhow::Result;
use async_trait::async_trait;

/// Capability: Lifecycle
///
/// Hooks invoked by the framework when the device is (re)initialized and
/// when it is removed.
///
/// # Contract
/// - `on_init()` never leaves the device half-initialized: it ends in
///   `On` or in `Fault` with a status describing the failure
/// - `on_init()` may be called again to recover from `Fault`
/// - `on_shutdown()` is idempotent
#[async_trait]
pub trait Lifecycle: Send + Sync {
    /// Bring the device up.
    ///
    /// # Returns
    /// - Ok(()) if the device ended in `On`
    /// - Err with the failure if it ended in `Fault`
    async fn on_init(&self) -> Result<()>;

    /// Release hardware resources.
    async fn on_shutdown(&self) -> Result<()>;

    /// Current lifecycle state.
    fn state(&self) -> DeviceState;

    /// Human-readable status text.
    fn status(&self) -> String;
}

/// Capability: Dynamic Attributes
///
/// Devices whose attribute set is discovered at init time.
pub trait Attributed: Send + Sync {
    /// Get the device's attribute set
    fn attributes(&self) -> &AttributeSet;
}

/// Capability: Commandable
///
/// Devices that accept free-form commands beyond their attributes.
#[async_trait]
pub trait Commandable: Send + Sync {
    /// Execute a specialized command
    ///
    /// # Arguments
    /// * `command` - Command identifier
    /// * `args` - Command arguments as a JSON object
    ///
    /// # Returns
    /// - Ok(JSON object) with results
    /// - Err if command unknown or execution failed
    async fn execute_command(
        &self,
        command: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value>;
}

/// Capability: Readable
///
/// Devices with a primary scalar measurement (a thermometer channel).
#[async_trait]
pub trait Readable: Send + Sync {
    /// Read current value
    ///
    /// # Returns
    /// - Ok(value) on successful read
    /// - Err on hardware error or timeout
    async fn read(&self) -> Result<f64>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{AttrType, AttrValue, Attribute};
    use crate::state::StatusCell;
    use std::sync::Arc;

    struct Thermometer {
        attributes: AttributeSet,
        status: StatusCell,
    }

    impl Thermometer {
        fn new() -> Self {
            let mut attributes = AttributeSet::new();
            attributes
                .register(Attribute::new("In1_temperature", AttrType::Float, || {
                    Box::pin(async { Ok(AttrValue::Float(4.2)) })
                }))
                .unwrap();
            Self {
                attributes,
                status: StatusCell::new(),
            }
        }
    }

    #[async_trait]
    impl Lifecycle for Thermometer {
        async fn on_init(&self) -> Result<()> {
            self.status.set(DeviceState::On, "Device is on");
            Ok(())
        }

        async fn on_shutdown(&self) -> Result<()> {
            self.status.set(DeviceState::Off, "Device is off");
            Ok(())
        }

        fn state(&self) -> DeviceState {
            self.status.state()
        }

        fn status(&self) -> String {
            self.status.status()
        }
    }

    impl Attributed for Thermometer {
        fn attributes(&self) -> &AttributeSet {
            &self.attributes
        }
    }

    #[async_trait]
    impl Readable for Thermometer {
        async fn read(&self) -> Result<f64> {
            let value = self.attributes.read("In1_temperature").await?;
            value
                .as_f64()
                .ok_or_else(|| anyhow::anyhow!("temperature is not a float"))
        }
    }

    #[tokio::test]
    async fn test_trait_objects_compose() {
        let device = Arc::new(Thermometer::new());
        let lifecycle: Arc<dyn Lifecycle> = device.clone();
        let readable: Arc<dyn Readable> = device.clone();
        let attributed: Arc<dyn Attributed> = device;

        assert_eq!(lifecycle.state(), DeviceState::Off);
        lifecycle.on_init().await.unwrap();
        assert_eq!(lifecycle.state(), DeviceState::On);

        assert!((readable.read().await.unwrap() - 4.2).abs() < f64::EPSILON);
        assert_eq!(attributed.attributes().names(), vec!["In1_temperature"]);

        lifecycle.on_shutdown().await.unwrap();
        assert_eq!(lifecycle.status(), "Device is off");
    }
}
