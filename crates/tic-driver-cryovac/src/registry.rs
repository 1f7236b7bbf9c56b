//! TIC500 attribute registry
//!
//! Static table mapping a (channel kind, logical property) pair to the
//! instrument's wire command, the value type and the access mode. The tables
//! are `static` and never mutated, so every request path shares them without
//! locking.
//!
//! # Channels
//!
//! | Kind   | Wire ids       | Property set          |
//! |--------|----------------|-----------------------|
//! | Output | `Out1`, `Out2` | [`OUTPUT_PROPERTIES`] |
//! | Input  | `In1`..`In4`   | [`INPUT_PROPERTIES`]  |
//!
//! # Enumerations
//!
//! Enumerated values travel on the wire as their symbolic name (`Diode`),
//! never as their ordinal.

use std::fmt;
use std::str::FromStr;
use tic_core::Access::{ReadOnly, ReadWrite};
use tic_core::{Access, AttrType, AttrValue, EnumLabel, TicError, TicResult};

// =============================================================================
// Channels
// =============================================================================

/// Kind of instrument terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Heater outputs (PID loops).
    Output,
    /// Sensor inputs.
    Input,
}

impl ChannelKind {
    /// Both kinds, outputs first.
    pub const ALL: [ChannelKind; 2] = [ChannelKind::Output, ChannelKind::Input];

    /// Wire prefix of this kind's channel ids.
    pub fn prefix(self) -> &'static str {
        match self {
            ChannelKind::Output => "Out",
            ChannelKind::Input => "In",
        }
    }

    /// Number of physical channels of this kind.
    pub fn count(self) -> u8 {
        match self {
            ChannelKind::Output => 2,
            ChannelKind::Input => 4,
        }
    }

    /// Every channel of this kind, in index order.
    pub fn channels(self) -> impl Iterator<Item = Channel> {
        (1..=self.count()).map(move |index| Channel { kind: self, index })
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelKind::Output => write!(f, "output channels"),
            ChannelKind::Input => write!(f, "input channels"),
        }
    }
}

/// One physical terminal: kind plus 1-based index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Channel {
    kind: ChannelKind,
    index: u8,
}

impl Channel {
    /// Create a channel, checking the index against the instrument's terminals.
    pub fn new(kind: ChannelKind, index: u8) -> TicResult<Self> {
        if (1..=kind.count()).contains(&index) {
            Ok(Self { kind, index })
        } else {
            Err(TicError::UnknownChannel(format!("{}{}", kind.prefix(), index)))
        }
    }

    /// Output channel `index` (1..=2).
    pub fn output(index: u8) -> TicResult<Self> {
        Self::new(ChannelKind::Output, index)
    }

    /// Input channel `index` (1..=4).
    pub fn input(index: u8) -> TicResult<Self> {
        Self::new(ChannelKind::Input, index)
    }

    /// Every channel of the instrument, outputs first.
    pub fn all() -> impl Iterator<Item = Channel> {
        ChannelKind::ALL.into_iter().flat_map(ChannelKind::channels)
    }

    /// Kind of this channel.
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// 1-based index within its kind.
    pub fn index(&self) -> u8 {
        self.index
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.index)
    }
}

impl FromStr for Channel {
    type Err = TicError;

    fn from_str(s: &str) -> TicResult<Self> {
        let unknown = || TicError::UnknownChannel(s.to_string());
        // "Out" shares no prefix with "In", so order does not matter
        let (kind, digits) = if let Some(rest) = s.strip_prefix("Out") {
            (ChannelKind::Output, rest)
        } else if let Some(rest) = s.strip_prefix("In") {
            (ChannelKind::Input, rest)
        } else {
            return Err(unknown());
        };
        let index: u8 = digits.parse().map_err(|_| unknown())?;
        Channel::new(kind, index).map_err(|_| unknown())
    }
}

// =============================================================================
// Enumerations
// =============================================================================

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $(
                #[doc = $wire]
                $variant
            ),+
        }

        impl $name {
            /// Every member, in ordinal order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Symbolic wire names, position = ordinal.
            pub const LABELS: &'static [&'static str] = &[$($wire),+];

            /// Stable ordinal.
            pub fn ordinal(self) -> u8 {
                self as u8
            }

            /// Symbolic wire name.
            pub fn wire_name(self) -> &'static str {
                Self::LABELS[self as usize]
            }
        }

        impl From<$name> for EnumLabel {
            fn from(value: $name) -> Self {
                EnumLabel {
                    ordinal: value.ordinal(),
                    name: value.wire_name(),
                }
            }
        }

        impl From<$name> for AttrValue {
            fn from(value: $name) -> Self {
                AttrValue::Enum(value.into())
            }
        }

        impl TryFrom<EnumLabel> for $name {
            type Error = TicError;

            fn try_from(label: EnumLabel) -> TicResult<Self> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|member| EnumLabel::from(*member) == label)
                    .ok_or_else(|| {
                        TicError::Format(format!(
                            "'{}' is not a {} value",
                            label.name,
                            stringify!($name)
                        ))
                    })
            }
        }
    };
}

wire_enum! {
    /// Sensor technology connected to an input.
    SensorType {
        Rtd => "RTD",
        Thermistor => "Thermistor",
        Diode => "Diode",
        Rox => "ROX",
    }
}

wire_enum! {
    /// Autotune mode of an output's PID loop.
    TuneMode {
        Off => "Off",
        Auto => "Auto",
        Step => "Step",
        Relay => "Relay",
    }
}

wire_enum! {
    /// Aggressiveness of the autotuner.
    TuneType {
        Conservative => "Conservative",
        Moderate => "Moderate",
        Aggressive => "Aggressive",
        Auto => "Auto",
    }
}

wire_enum! {
    /// PID loop on/off.
    PidMode {
        Off => "Off",
        On => "On",
    }
}

/// The enumerated types a property can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumKind {
    /// [`SensorType`]
    SensorType,
    /// [`TuneMode`]
    TuneMode,
    /// [`TuneType`]
    TuneType,
    /// [`PidMode`]
    PidMode,
}

impl EnumKind {
    /// Symbolic names of this kind's members, position = ordinal.
    pub fn labels(self) -> &'static [&'static str] {
        match self {
            EnumKind::SensorType => SensorType::LABELS,
            EnumKind::TuneMode => TuneMode::LABELS,
            EnumKind::TuneType => TuneType::LABELS,
            EnumKind::PidMode => PidMode::LABELS,
        }
    }

    /// Type name, for messages.
    pub fn name(self) -> &'static str {
        match self {
            EnumKind::SensorType => "SensorType",
            EnumKind::TuneMode => "TuneMode",
            EnumKind::TuneType => "TuneType",
            EnumKind::PidMode => "PIDMode",
        }
    }

    /// Look up a member by its symbolic wire name (case-sensitive).
    pub fn lookup(self, symbol: &str) -> TicResult<EnumLabel> {
        self.labels()
            .iter()
            .position(|label| *label == symbol)
            .map(|i| EnumLabel {
                ordinal: i as u8,
                name: self.labels()[i],
            })
            .ok_or_else(|| {
                TicError::Format(format!("'{}' is not a {} value", symbol, self.name()))
            })
    }

    /// Member with the given ordinal, if any.
    pub fn member(self, ordinal: u8) -> Option<EnumLabel> {
        self.labels()
            .get(usize::from(ordinal))
            .map(|name| EnumLabel { ordinal, name })
    }

    /// Whether `label` is a member of this kind.
    pub fn contains(self, label: EnumLabel) -> bool {
        self.member(label.ordinal) == Some(label)
    }
}

// =============================================================================
// Property specs
// =============================================================================

/// Value type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// IEEE double.
    Float,
    /// Trimmed text.
    Text,
    /// On/off flag.
    Bool,
    /// Symbolic enumeration.
    Enum(EnumKind),
}

impl ValueType {
    /// Attribute type advertised to the control bus.
    pub fn attr_type(self) -> AttrType {
        match self {
            ValueType::Float => AttrType::Float,
            ValueType::Text => AttrType::Text,
            ValueType::Bool => AttrType::Bool,
            ValueType::Enum(kind) => AttrType::Enum {
                labels: kind.labels(),
            },
        }
    }
}

/// How the wire command is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    /// `<channel>.<wireCommand>`
    Channel,
    /// Whole-word command, not scoped to a channel.
    Device,
}

/// One row of the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertySpec {
    /// Logical property name exposed to callers.
    pub name: &'static str,
    /// Instrument-side command suffix.
    pub wire_command: &'static str,
    /// Value type of the property.
    pub value_type: ValueType,
    /// Access mode.
    pub access: Access,
    /// Channel-scoped or whole-word command.
    pub scope: CommandScope,
    /// Fixed number of decimals for float writes; default formatting if `None`.
    pub precision: Option<usize>,
    /// Description for attribute listings.
    pub description: &'static str,
}

const fn prop(
    name: &'static str,
    wire_command: &'static str,
    value_type: ValueType,
    access: Access,
    description: &'static str,
) -> PropertySpec {
    PropertySpec {
        name,
        wire_command,
        value_type,
        access,
        scope: CommandScope::Channel,
        precision: None,
        description,
    }
}

/// Properties of every output channel.
pub static OUTPUT_PROPERTIES: &[PropertySpec] = &[
    PropertySpec {
        precision: Some(5),
        ..prop("power", "Value", ValueType::Float, ReadWrite, "Heater output power")
    },
    prop("setpoint", "pid.Setpoint", ValueType::Float, ReadWrite, "PID setpoint"),
    prop("ramp", "pid.Ramp", ValueType::Float, ReadWrite, "Setpoint ramp rate"),
    prop(
        "ramp_setpoint",
        "pid.RampT",
        ValueType::Float,
        ReadOnly,
        "Current ramped setpoint",
    ),
    prop("PID_input", "pid.Input", ValueType::Text, ReadWrite, "Input channel feeding the PID loop"),
    prop(
        "PID_mode",
        "pid.Mode",
        ValueType::Enum(EnumKind::PidMode),
        ReadWrite,
        "PID loop on/off",
    ),
    prop("P", "pid.P", ValueType::Float, ReadWrite, "Proportional gain"),
    prop("I", "pid.I", ValueType::Float, ReadWrite, "Integral gain"),
    prop("D", "pid.D", ValueType::Float, ReadWrite, "Derivative gain"),
    prop(
        "tune_mode",
        "tune.Mode",
        ValueType::Enum(EnumKind::TuneMode),
        ReadWrite,
        "Autotune mode",
    ),
    prop(
        "tune_type",
        "tune.Type",
        ValueType::Enum(EnumKind::TuneType),
        ReadWrite,
        "Autotune aggressiveness",
    ),
    prop("tune_lag", "tune.Lag", ValueType::Float, ReadWrite, "Autotune lag"),
    prop("tune_stepY", "tune.StepY", ValueType::Float, ReadWrite, "Autotune step height"),
    PropertySpec {
        scope: CommandScope::Device,
        ..prop(
            "output_on",
            "OutputEnable",
            ValueType::Bool,
            ReadWrite,
            "Master output enable",
        )
    },
];

/// Properties of every input channel.
pub static INPUT_PROPERTIES: &[PropertySpec] = &[
    prop("temperature", "Value", ValueType::Float, ReadOnly, "Measured temperature"),
    prop(
        "sensor_type",
        "Sensor",
        ValueType::Enum(EnumKind::SensorType),
        ReadWrite,
        "Sensor technology",
    ),
];

/// Every property of a channel kind, in declaration order.
pub fn list_properties(kind: ChannelKind) -> &'static [PropertySpec] {
    match kind {
        ChannelKind::Output => OUTPUT_PROPERTIES,
        ChannelKind::Input => INPUT_PROPERTIES,
    }
}

/// Resolve a property of a channel kind.
pub fn resolve(kind: ChannelKind, name: &str) -> TicResult<&'static PropertySpec> {
    list_properties(kind)
        .iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| TicError::UnknownProperty {
            scope: kind.to_string(),
            property: name.to_string(),
        })
}
