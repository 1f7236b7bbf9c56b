//! TIC500 command codec
//!
//! Builds command lines from a channel, a registry entry and an optional
//! value, and turns reply lines back into typed values. Both framing
//! variants the instrument firmware is driven with are handled by one
//! [`Codec`] parameterized by [`Dialect`].
//!
//! # Wire Format
//!
//! | Dialect | Read                    | Write                          | Reply                 |
//! |---------|-------------------------|--------------------------------|-----------------------|
//! | Plain   | `Out1.pid.Setpoint?`    | `Out1.pid.Setpoint=77`         | `77.000`              |
//! | Verbose | `(Out1.pid.Setpoint?)`  | `(Out1.pid.Setpoint)=(77)`     | `pid.Setpoint = 77.000` |
//!
//! Device-scoped commands (`OutputEnable`) are never channel prefixed and
//! never parenthesized. A reply beginning with `Error` is an instrument-side
//! rejection in both dialects.

use crate::registry::{Channel, CommandScope, PropertySpec, ValueType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tic_core::{AttrValue, TicError, TicResult};

/// Prefix of every instrument-side error reply.
pub const ERROR_PREFIX: &str = "Error";

/// Command framing variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// Bare commands, bare value replies.
    Plain,
    /// Parenthesized commands, replies echo the command (`<cmd> = <value>`).
    #[default]
    Verbose,
}

impl Dialect {
    /// Whether the instrument must be switched to verbose communication.
    pub fn requires_verbose(self) -> bool {
        matches!(self, Dialect::Verbose)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::Plain => write!(f, "plain"),
            Dialect::Verbose => write!(f, "verbose"),
        }
    }
}

impl FromStr for Dialect {
    type Err = TicError;

    fn from_str(s: &str) -> TicResult<Self> {
        match s {
            "plain" => Ok(Dialect::Plain),
            "verbose" => Ok(Dialect::Verbose),
            other => Err(TicError::Configuration(format!(
                "unknown dialect '{}' (expected 'plain' or 'verbose')",
                other
            ))),
        }
    }
}

/// Encoder/decoder for one dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Codec {
    dialect: Dialect,
}

impl Codec {
    /// Codec for `dialect`.
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Dialect this codec speaks.
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Query line for a property.
    pub fn encode_read(&self, channel: Channel, spec: &PropertySpec) -> String {
        match (spec.scope, self.dialect) {
            (CommandScope::Device, _) => format!("{}?", spec.wire_command),
            (CommandScope::Channel, Dialect::Plain) => {
                format!("{}.{}?", channel, spec.wire_command)
            }
            (CommandScope::Channel, Dialect::Verbose) => {
                format!("({}.{}?)", channel, spec.wire_command)
            }
        }
    }

    /// Write line for a property.
    ///
    /// The value is checked against the property's type first, so a
    /// mismatch never reaches the wire.
    pub fn encode_write(
        &self,
        channel: Channel,
        spec: &PropertySpec,
        value: &AttrValue,
    ) -> TicResult<String> {
        let formatted = format_value(spec, value)?;
        Ok(match (spec.scope, self.dialect) {
            (CommandScope::Device, _) => format!("{}={}", spec.wire_command, formatted),
            (CommandScope::Channel, Dialect::Plain) => {
                format!("{}.{}={}", channel, spec.wire_command, formatted)
            }
            (CommandScope::Channel, Dialect::Verbose) => {
                format!("({}.{})=({})", channel, spec.wire_command, formatted)
            }
        })
    }

    /// Parse the reply to a read of `spec`.
    pub fn decode(&self, spec: &PropertySpec, reply: &str) -> TicResult<AttrValue> {
        let reply = check_error(reply)?;

        // OutputEnable answers with its own "OutputEnable = On/Off" line in
        // both dialects; only the presence of the "On" form matters.
        if spec.value_type == ValueType::Bool {
            return Ok(AttrValue::Bool(parse_flag(spec.wire_command, reply)));
        }

        let text = self.extract_value(spec.wire_command, reply);
        parse_value(spec, text)
    }

    /// Check the reply to a write of `spec`.
    ///
    /// Fails only on an instrument error. A verbose echo is validated the same
    /// way as for reads.
    pub fn check_ack(&self, spec: &PropertySpec, reply: &str) -> TicResult<()> {
        let reply = check_error(reply)?;
        if self.dialect == Dialect::Verbose
            && spec.scope == CommandScope::Channel
            && !reply.is_empty()
        {
            self.extract_value(spec.wire_command, reply);
        }
        Ok(())
    }

    /// Value part of a reply, with the echoed command stripped.
    ///
    /// Verbose replies must echo the command; a mismatching or missing echo
    /// is logged and the value is still returned. Plain replies are bare, but
    /// an echo naming the same command is tolerated.
    pub fn extract_value<'a>(&self, wire_command: &str, reply: &'a str) -> &'a str {
        let reply = reply.trim();
        match (self.dialect, reply.split_once('=')) {
            (Dialect::Verbose, Some((echo, value))) => {
                let echo = echo.trim();
                if !echo_matches(echo, wire_command) {
                    tracing::warn!(
                        "TIC500 echo mismatch: sent '{}' but instrument echoed '{}'",
                        wire_command,
                        echo
                    );
                }
                value.trim()
            }
            (Dialect::Verbose, None) => {
                tracing::warn!(
                    "TIC500 verbose reply to '{}' carries no echo: {:?}",
                    wire_command,
                    reply
                );
                reply
            }
            (Dialect::Plain, Some((echo, value))) if echo_matches(echo.trim(), wire_command) => {
                value.trim()
            }
            (Dialect::Plain, _) => reply,
        }
    }
}

/// Fail with [`TicError::Instrument`] if `reply` is an error reply.
///
/// Returns the trimmed reply otherwise.
pub fn check_error(reply: &str) -> TicResult<&str> {
    let reply = reply.trim();
    if reply.starts_with(ERROR_PREFIX) {
        Err(TicError::Instrument(reply.to_string()))
    } else {
        Ok(reply)
    }
}

/// Whether an echoed command names `wire_command`.
///
/// The echo may carry the channel prefix, the query mark or the verbose
/// parentheses; only its tail is compared.
fn echo_matches(echo: &str, wire_command: &str) -> bool {
    let echo = echo
        .trim_start_matches('(')
        .trim_end_matches(')')
        .trim_end_matches('?');
    echo == wire_command
        || echo
            .strip_suffix(wire_command)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn parse_flag(wire_command: &str, reply: &str) -> bool {
    reply.contains(&format!("{} = On", wire_command)) || reply.trim() == "On"
}

/// Coerce a reply value to the property's type.
pub fn parse_value(spec: &PropertySpec, text: &str) -> TicResult<AttrValue> {
    let text = text.trim();
    match spec.value_type {
        ValueType::Float => text.parse::<f64>().map(AttrValue::Float).map_err(|_| {
            TicError::Format(format!(
                "'{}' is not a number (property '{}')",
                text, spec.name
            ))
        }),
        ValueType::Text => Ok(AttrValue::Text(text.to_string())),
        ValueType::Bool => Ok(AttrValue::Bool(parse_flag(spec.wire_command, text))),
        ValueType::Enum(kind) => kind.lookup(text).map(AttrValue::Enum),
    }
}

/// Render a value in the instrument's notation.
pub fn format_value(spec: &PropertySpec, value: &AttrValue) -> TicResult<String> {
    match (spec.value_type, value) {
        (ValueType::Float, AttrValue::Float(v)) if !v.is_finite() => Err(TicError::Format(format!(
            "property '{}' cannot be set to {}",
            spec.name, v
        ))),
        (ValueType::Float, AttrValue::Float(v)) => Ok(match spec.precision {
            Some(digits) => format!("{:.*}", digits, v),
            None => format!("{}", v),
        }),
        (ValueType::Text, AttrValue::Text(s)) => Ok(s.clone()),
        (ValueType::Bool, AttrValue::Bool(on)) => {
            Ok(String::from(if *on { "On" } else { "Off" }))
        }
        (ValueType::Enum(kind), AttrValue::Enum(label)) if kind.contains(*label) => {
            Ok(label.name.to_string())
        }
        (ValueType::Enum(kind), AttrValue::Enum(label)) => Err(TicError::Format(format!(
            "'{}' is not a {} value",
            label.name,
            kind.name()
        ))),
        (expected, got) => Err(TicError::Format(format!(
            "property '{}' expects {} but got {:?}",
            spec.name,
            expected.attr_type().dtype(),
            got
        ))),
    }
}
