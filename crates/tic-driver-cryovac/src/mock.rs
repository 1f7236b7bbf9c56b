//! Simulated TIC500
//!
//! An in-process stand-in for the instrument, used when a device is
//! configured with `mock = true` and by the test suite. It keeps the state of
//! every channel property, answers reads, applies writes and follows the
//! instrument's verbosity setting: once `system.com.verbose` is `high`,
//! replies echo the command (`pid.Setpoint = 77`), otherwise they are bare.
//!
//! Commands it does not know are answered with `Error: unknown command ...`.
//! A command that produces no reply (a plain write) leaves the next read to
//! time out, like the real instrument.

use crate::registry::{list_properties, Channel, PropertySpec, ValueType};
use crate::transport::{Transport, DEFAULT_TIMEOUT_MS};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tic_core::{TicError, TicResult};

/// Description string the simulated instrument reports.
pub const SIMULATED_DESCRIPTION: &str = "Cryovac TIC500 temperature controller (simulated)";

const VERBOSE_COMMAND: &str = "system.com.verbose";
const OUTPUT_ENABLE: &str = "OutputEnable";
const ROOM_TEMPERATURE: &str = "293.150";

struct SimState {
    verbose_level: String,
    output_enable: bool,
    silent: bool,
    closed: bool,
    values: HashMap<(Channel, &'static str), String>,
    pending: VecDeque<String>,
    history: Vec<String>,
}

impl SimState {
    fn new() -> Self {
        let mut values = HashMap::new();
        for channel in Channel::all() {
            for spec in list_properties(channel.kind()) {
                if let Some(initial) = initial_value(spec) {
                    values.insert((channel, spec.wire_command), initial);
                }
            }
        }
        Self {
            verbose_level: "low".to_string(),
            output_enable: false,
            silent: false,
            closed: false,
            values,
            pending: VecDeque::new(),
            history: Vec::new(),
        }
    }

    fn verbose(&self) -> bool {
        self.verbose_level == "high"
    }

    /// Reply to a query, echoed when verbose.
    fn answer(&self, echo: &str, value: &str) -> String {
        if self.verbose() {
            format!("{} = {}", echo, value)
        } else {
            value.to_string()
        }
    }

    /// Acknowledgement of a write: echoed when verbose, nothing otherwise.
    fn acknowledge(&mut self, echo: &str, value: &str) {
        if self.verbose() {
            self.pending.push_back(format!("{} = {}", echo, value));
        }
    }

    fn handle(&mut self, line: &str) {
        let command = unwrap_verbose(line.trim());

        if command == "description?" {
            self.pending.push_back(SIMULATED_DESCRIPTION.to_string());
            return;
        }

        if let Some(target) = command.strip_suffix('?') {
            let reply = self.read(target, line);
            self.pending.push_back(reply);
            return;
        }

        if let Some((target, value)) = command.split_once('=') {
            if let Err(reply) = self.write(target.trim(), value.trim(), line) {
                self.pending.push_back(reply);
            }
            return;
        }

        self.pending.push_back(unknown(line));
    }

    fn read(&self, target: &str, line: &str) -> String {
        match target {
            VERBOSE_COMMAND => self.answer(VERBOSE_COMMAND, &self.verbose_level),
            // OutputEnable always answers in its "name = value" form
            OUTPUT_ENABLE => format!("{} = {}", OUTPUT_ENABLE, on_off(self.output_enable)),
            _ => match self.channel_property(target) {
                Some((channel, spec)) => {
                    let value = self
                        .values
                        .get(&(channel, spec.wire_command))
                        .cloned()
                        .unwrap_or_default();
                    self.answer(spec.wire_command, &value)
                }
                None => unknown(line),
            },
        }
    }

    fn write(&mut self, target: &str, value: &str, line: &str) -> Result<(), String> {
        match target {
            VERBOSE_COMMAND => {
                if !["low", "medium", "high"].contains(&value) {
                    return Err(format!("Error: invalid verbosity '{}'", value));
                }
                self.verbose_level = value.to_string();
                self.acknowledge(VERBOSE_COMMAND, value);
                Ok(())
            }
            OUTPUT_ENABLE => {
                self.output_enable = match value {
                    "On" => true,
                    "Off" => false,
                    _ => return Err(format!("Error: invalid value '{}'", value)),
                };
                self.acknowledge(OUTPUT_ENABLE, value);
                Ok(())
            }
            _ => {
                let (channel, spec) = self.channel_property(target).ok_or_else(|| unknown(line))?;
                if !spec.access.is_writable() {
                    return Err(format!("Error: {}.{} is read-only", channel, spec.wire_command));
                }
                if !accepts(spec, value) {
                    return Err(format!("Error: invalid value '{}'", value));
                }
                self.values
                    .insert((channel, spec.wire_command), value.to_string());
                // The ramp target follows the setpoint immediately
                if spec.wire_command == "pid.Setpoint" {
                    self.values
                        .insert((channel, "pid.RampT"), value.to_string());
                }
                self.acknowledge(spec.wire_command, value);
                Ok(())
            }
        }
    }

    fn channel_property(&self, target: &str) -> Option<(Channel, &'static PropertySpec)> {
        let (channel, wire_command) = target.split_once('.')?;
        let channel: Channel = channel.parse().ok()?;
        list_properties(channel.kind())
            .iter()
            .find(|spec| spec.wire_command == wire_command)
            .map(|spec| (channel, spec))
    }
}

fn unwrap_verbose(line: &str) -> String {
    // "(Out1.pid.Setpoint?)" and "(Out1.pid.Setpoint)=(77)"
    if !line.starts_with('(') {
        return line.to_string();
    }
    match line.split_once(")=(") {
        Some((target, value)) => format!(
            "{}={}",
            target.trim_start_matches('('),
            value.trim_end_matches(')')
        ),
        None => line
            .trim_start_matches('(')
            .trim_end_matches(')')
            .to_string(),
    }
}

fn initial_value(spec: &PropertySpec) -> Option<String> {
    let value = match (spec.wire_command, spec.value_type) {
        ("Value", ValueType::Float) if !spec.access.is_writable() => ROOM_TEMPERATURE.to_string(),
        (_, ValueType::Float) => match spec.precision {
            Some(digits) => format!("{:.*}", digits, 0.0),
            None => "0.000".to_string(),
        },
        (_, ValueType::Text) => "In1".to_string(),
        (_, ValueType::Enum(kind)) => kind.labels().first()?.to_string(),
        // Flags are device scoped and kept outside the table
        (_, ValueType::Bool) => return None,
    };
    Some(value)
}

fn accepts(spec: &PropertySpec, value: &str) -> bool {
    match spec.value_type {
        ValueType::Float => value.parse::<f64>().is_ok(),
        ValueType::Text => !value.is_empty(),
        ValueType::Bool => matches!(value, "On" | "Off"),
        ValueType::Enum(kind) => kind.lookup(value).is_ok(),
    }
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "On"
    } else {
        "Off"
    }
}

fn unknown(line: &str) -> String {
    format!("Error: unknown command '{}'", line.trim())
}

/// Simulated instrument behind the [`Transport`] seam.
///
/// Clones share the same instrument, so a test can keep a handle while the
/// driver owns the transport.
#[derive(Clone)]
pub struct SimulatedTic500 {
    state: Arc<Mutex<SimState>>,
    timeout: Duration,
}

impl Default for SimulatedTic500 {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedTic500 {
    /// New instrument with low verbosity, outputs disabled and every input
    /// reading room temperature.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new())),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    /// Set how long a read waits before reporting a timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// A fresh link to the same instrument, as after a reconnect.
    ///
    /// Instrument state (values, verbosity) survives; unread replies do not.
    pub fn reconnect(&self) -> Self {
        {
            let mut state = self.state.lock();
            state.closed = false;
            state.pending.clear();
        }
        self.clone()
    }

    /// Current `system.com.verbose` level.
    pub fn verbose_level(&self) -> String {
        self.state.lock().verbose_level.clone()
    }

    /// Override the `system.com.verbose` level.
    pub fn set_verbose_level(&self, level: &str) {
        self.state.lock().verbose_level = level.to_string();
    }

    /// Stop answering anything.
    pub fn set_silent(&self, silent: bool) {
        self.state.lock().silent = silent;
    }

    /// Every line received so far, in order.
    pub fn history(&self) -> Vec<String> {
        self.state.lock().history.clone()
    }

    /// Whether the driver closed the link.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Raw stored value of a channel property, by wire command.
    pub fn value(&self, channel: Channel, wire_command: &str) -> Option<String> {
        self.state
            .lock()
            .values
            .iter()
            .find(|((ch, cmd), _)| *ch == channel && *cmd == wire_command)
            .map(|(_, v)| v.clone())
    }

    /// Whether the master output is enabled.
    pub fn output_enabled(&self) -> bool {
        self.state.lock().output_enable
    }
}

#[async_trait]
impl Transport for SimulatedTic500 {
    async fn send_line(&self, line: &str) -> TicResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TicError::NotConnected);
        }
        tracing::debug!("Simulated TIC500 received: {:?}", line);
        state.history.push(line.to_string());
        if !state.silent {
            state.handle(line);
        }
        Ok(())
    }

    async fn receive_line(&self) -> TicResult<String> {
        let reply = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(TicError::NotConnected);
            }
            state.pending.pop_front()
        };
        match reply {
            Some(reply) => Ok(reply),
            None => {
                tokio::time::sleep(self.timeout).await;
                Err(TicError::Timeout(self.timeout))
            }
        }
    }

    async fn drain(&self) -> TicResult<String> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(TicError::NotConnected);
        }
        let stale: Vec<String> = state.pending.drain(..).collect();
        Ok(stale.join("\n"))
    }

    async fn close(&self) -> TicResult<()> {
        let mut state = self.state.lock();
        state.closed = true;
        state.pending.clear();
        Ok(())
    }
}
