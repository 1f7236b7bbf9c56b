//! Dynamic device attributes
//!
//! A device exposes a set of named, typed, access-controlled attributes that
//! is only known once the device initializes. Each [`Attribute`] carries its
//! hardware read callback and, if writable, its hardware write callback. The
//! callbacks capture whatever context the driver needs (channel, command
//! table entry, connection handle), so dispatch never has to re-parse the
//! attribute name.
//!
//! # Example
//!
//! ```rust,ignore
//! use tic_core::attribute::{Attribute, AttrType, AttrValue, AttributeSet};
//!
//! let mut set = AttributeSet::new();
//! set.register(
//!     Attribute::new("Out1_setpoint", AttrType::Float, move || {
//!         let session = session.clone();
//!         Box::pin(async move { session.get(channel, "setpoint").await })
//!     })
//!     .with_writer(move |value| { /* ... */ }),
//! )?;
//!
//! let value = set.read("Out1_setpoint").await?;
//! set.write("Out1_setpoint", AttrValue::Float(77.0)).await?;
//! ```

use crate::error::{TicError, TicResult};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

// =============================================================================
// Access & Types
// =============================================================================

/// Access mode of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    /// Value can only be read.
    ReadOnly,
    /// Value can be read and written.
    ReadWrite,
}

impl Access {
    /// Whether writes are permitted.
    pub fn is_writable(self) -> bool {
        matches!(self, Access::ReadWrite)
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::ReadOnly => write!(f, "RO"),
            Access::ReadWrite => write!(f, "RW"),
        }
    }
}

/// Declared type of an attribute, as advertised to the control bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    /// IEEE double.
    Float,
    /// Free text.
    Text,
    /// On/off flag.
    Bool,
    /// Enumerated value; labels are indexed by ordinal.
    Enum {
        /// Symbolic names, position = ordinal.
        labels: &'static [&'static str],
    },
}

impl AttrType {
    /// Whether `value` is a valid instance of this type.
    pub fn accepts(&self, value: &AttrValue) -> bool {
        match (self, value) {
            (AttrType::Float, AttrValue::Float(_)) => true,
            (AttrType::Text, AttrValue::Text(_)) => true,
            (AttrType::Bool, AttrValue::Bool(_)) => true,
            (AttrType::Enum { labels }, AttrValue::Enum(label)) => {
                labels.get(usize::from(label.ordinal)) == Some(&label.name)
            }
            _ => false,
        }
    }

    /// Short type name for listings.
    pub fn dtype(&self) -> &'static str {
        match self {
            AttrType::Float => "float",
            AttrType::Text => "string",
            AttrType::Bool => "bool",
            AttrType::Enum { .. } => "enum",
        }
    }
}

/// Member of an enumerated attribute: stable ordinal plus symbolic name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumLabel {
    /// Position of the member in its enumeration.
    pub ordinal: u8,
    /// Symbolic name of the member.
    pub name: &'static str,
}

/// A typed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Floating point value.
    Float(f64),
    /// Text value.
    Text(String),
    /// Boolean value.
    Bool(bool),
    /// Enumerated value.
    Enum(EnumLabel),
}

impl AttrValue {
    /// The float payload, if this is a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttrValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Float(v) => write!(f, "{}", v),
            AttrValue::Text(s) => write!(f, "{}", s),
            AttrValue::Bool(b) => write!(f, "{}", b),
            AttrValue::Enum(label) => write!(f, "{}", label.name),
        }
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

impl From<EnumLabel> for AttrValue {
    fn from(v: EnumLabel) -> Self {
        AttrValue::Enum(v)
    }
}

// =============================================================================
// Attribute
// =============================================================================

/// Hardware read callback.
pub type AttrReader = Arc<dyn Fn() -> BoxFuture<'static, TicResult<AttrValue>> + Send + Sync>;

/// Hardware write callback.
pub type AttrWriter =
    Arc<dyn Fn(AttrValue) -> BoxFuture<'static, TicResult<()>> + Send + Sync>;

/// One named, typed, access-controlled device attribute.
#[derive(Clone)]
pub struct Attribute {
    name: String,
    dtype: AttrType,
    description: Option<String>,
    unit: Option<String>,
    reader: AttrReader,
    writer: Option<AttrWriter>,
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("dtype", &self.dtype)
            .field("access", &self.access())
            .field("unit", &self.unit)
            .finish()
    }
}

impl Attribute {
    /// Create a read-only attribute backed by `reader`.
    pub fn new(
        name: impl Into<String>,
        dtype: AttrType,
        reader: impl Fn() -> BoxFuture<'static, TicResult<AttrValue>> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            dtype,
            description: None,
            unit: None,
            reader: Arc::new(reader),
            writer: None,
        }
    }

    /// Attach a hardware write callback, making the attribute read-write.
    pub fn with_writer(
        mut self,
        writer: impl Fn(AttrValue) -> BoxFuture<'static, TicResult<()>> + Send + Sync + 'static,
    ) -> Self {
        self.writer = Some(Arc::new(writer));
        self
    }

    /// Set attribute description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set attribute unit
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Attribute name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared type.
    pub fn dtype(&self) -> AttrType {
        self.dtype
    }

    /// Access mode, derived from whether a writer is attached.
    pub fn access(&self) -> Access {
        if self.writer.is_some() {
            Access::ReadWrite
        } else {
            Access::ReadOnly
        }
    }

    /// Description, if any.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Unit, if any.
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    /// Read the current value from hardware.
    pub async fn read(&self) -> TicResult<AttrValue> {
        (self.reader)().await
    }

    /// Write a value to hardware.
    ///
    /// Access and type are checked before the writer runs.
    pub async fn write(&self, value: AttrValue) -> TicResult<()> {
        let writer = self
            .writer
            .as_ref()
            .ok_or_else(|| TicError::Access(self.name.clone()))?;
        if !self.dtype.accepts(&value) {
            return Err(TicError::Format(format!(
                "value {:?} does not fit {} attribute '{}'",
                value,
                self.dtype.dtype(),
                self.name
            )));
        }
        writer(value).await
    }
}

// =============================================================================
// AttributeSet
// =============================================================================

/// Ordered collection of a device's attributes.
///
/// Registration order is kept so listings follow the order the driver
/// declared its channels and properties.
#[derive(Default, Clone)]
pub struct AttributeSet {
    attributes: Vec<Attribute>,
    index: HashMap<String, usize>,
}

impl fmt::Debug for AttributeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeSet")
            .field("attributes", &format!("{} attributes", self.attributes.len()))
            .field("names", &self.names())
            .finish()
    }
}

impl AttributeSet {
    /// Create a new empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an attribute. Names must be unique.
    pub fn register(&mut self, attribute: Attribute) -> TicResult<()> {
        if self.index.contains_key(attribute.name()) {
            return Err(TicError::Configuration(format!(
                "attribute '{}' registered twice",
                attribute.name()
            )));
        }
        self.index
            .insert(attribute.name().to_string(), self.attributes.len());
        self.attributes.push(attribute);
        Ok(())
    }

    /// Look up an attribute by name.
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.index.get(name).map(|&i| &self.attributes[i])
    }

    /// Iterate over attributes in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    /// List all attribute names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.attributes.iter().map(|a| a.name()).collect()
    }

    /// Number of registered attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether no attributes are registered.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Generic read dispatch by attribute name.
    pub async fn read(&self, name: &str) -> TicResult<AttrValue> {
        self.lookup(name)?.read().await
    }

    /// Generic write dispatch by attribute name.
    pub async fn write(&self, name: &str, value: AttrValue) -> TicResult<()> {
        self.lookup(name)?.write(value).await
    }

    fn lookup(&self, name: &str) -> TicResult<&Attribute> {
        self.get(name).ok_or_else(|| TicError::UnknownProperty {
            scope: "device attributes".to_string(),
            property: name.to_string(),
        })
    }
}
