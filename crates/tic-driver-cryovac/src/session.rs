//! Connection session
//!
//! Owns the live link to one instrument and serializes every request on it:
//! a get or set is one command line followed by one reply read, both under
//! the same async mutex. The session also carries the device state, so a
//! device that failed bring-up refuses requests until it is brought up
//! again.

use crate::codec::{check_error, Codec, Dialect};
use crate::registry::{resolve, Channel, PropertySpec};
use crate::transport::Transport;
use std::future::Future;
use tic_core::{AttrValue, DeviceState, StatusCell, TicError, TicResult};
use tokio::sync::Mutex;
use tracing::instrument;

/// Boxed transport owned by a session.
pub type BoxTransport = Box<dyn Transport>;

/// Query for the instrument's description string.
pub const DESCRIPTION_QUERY: &str = "description?";

const VERBOSE_COMMAND: &str = "system.com.verbose";
const VERBOSE_LEVELS: &[&str] = &["low", "medium", "high"];
const VERBOSE_TARGET: &str = "high";

struct Link {
    transport: BoxTransport,
    verbose: bool,
}

/// One driver's connection to the instrument.
pub struct Session {
    codec: Codec,
    link: Mutex<Option<Link>>,
    status: StatusCell,
}

impl Session {
    /// New, unconnected session speaking `dialect`.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            codec: Codec::new(dialect),
            link: Mutex::new(None),
            status: StatusCell::new(),
        }
    }

    /// Dialect of this session.
    pub fn dialect(&self) -> Dialect {
        self.codec.dialect()
    }

    /// Current device state.
    pub fn state(&self) -> DeviceState {
        self.status.state()
    }

    /// Current status text.
    pub fn status(&self) -> String {
        self.status.status()
    }

    /// Whether verbose communication was negotiated on the current link.
    pub async fn is_verbose(&self) -> bool {
        self.link.lock().await.as_ref().is_some_and(|l| l.verbose)
    }

    /// Open a link and bring the device to `On`.
    ///
    /// Any previous link is closed first. On failure the device is left in
    /// `Fault` with the failure text as status, and the new link (if any)
    /// is released.
    pub async fn bring_up<F>(&self, connect: F) -> TicResult<()>
    where
        F: Future<Output = TicResult<BoxTransport>>,
    {
        let mut guard = self.link.lock().await;
        if let Some(old) = guard.take() {
            if let Err(e) = old.transport.close().await {
                tracing::debug!("Ignoring close error on previous link: {}", e);
            }
        }

        let transport = match connect.await {
            Ok(transport) => transport,
            Err(e) => return Err(self.enter_fault(e)),
        };

        match self.negotiate(transport.as_ref()).await {
            Ok(verbose) => {
                *guard = Some(Link { transport, verbose });
                self.status.set(DeviceState::On, "Device is on");
                tracing::info!(dialect = %self.dialect(), "TIC500 is on");
                Ok(())
            }
            Err(e) => {
                if let Err(close_err) = transport.close().await {
                    tracing::debug!("Ignoring close error after failed bring-up: {}", close_err);
                }
                Err(self.enter_fault(e))
            }
        }
    }

    fn enter_fault(&self, err: TicError) -> TicError {
        let status = err.to_string();
        tracing::error!("TIC500 bring-up failed: {}", status);
        self.status.set(DeviceState::Fault, status);
        err
    }

    /// Fault the device if `result` shows the link is gone.
    fn check_link<T>(&self, result: TicResult<T>) -> TicResult<T> {
        if let Err(e) = &result {
            if !e.is_recoverable() {
                let status = e.to_string();
                tracing::error!("TIC500 link lost: {}", status);
                self.status.set(DeviceState::Fault, status);
            }
        }
        result
    }

    /// Switch the instrument to high verbosity if the dialect needs it.
    ///
    /// Returns whether verbose communication is on afterwards.
    async fn negotiate(&self, transport: &dyn Transport) -> TicResult<bool> {
        if !self.dialect().requires_verbose() {
            tracing::info!("Plain dialect, leaving instrument verbosity unchanged");
            return Ok(false);
        }

        transport.send_line(&format!("{}?", VERBOSE_COMMAND)).await?;
        let reply = transport.receive_line().await?;
        let reply = check_error(&reply)?;
        // The level reply is echoed or bare depending on the current level
        let level = Codec::new(Dialect::Plain).extract_value(VERBOSE_COMMAND, reply);

        if !VERBOSE_LEVELS.contains(&level) {
            return Err(TicError::Format(format!(
                "Unexpected reply to {}?: {:?}",
                VERBOSE_COMMAND, reply
            )));
        }

        if level == VERBOSE_TARGET {
            tracing::info!("Verbose communication already enabled");
            return Ok(true);
        }

        transport
            .send_line(&format!("{}={}", VERBOSE_COMMAND, VERBOSE_TARGET))
            .await?;
        match transport.receive_line().await {
            Ok(ack) => {
                check_error(&ack)?;
            }
            Err(TicError::Timeout(_)) => {}
            Err(e) => return Err(e),
        }
        tracing::info!("Enabled verbose communication (was '{}')", level);
        Ok(true)
    }

    fn ensure_on(&self) -> TicResult<()> {
        match self.status.state() {
            DeviceState::On => Ok(()),
            DeviceState::Fault => Err(TicError::Fault(self.status.status())),
            DeviceState::Off => Err(TicError::NotConnected),
        }
    }

    /// Drop replies left over from earlier commands, then send `line`.
    async fn send_fresh(transport: &dyn Transport, line: &str) -> TicResult<()> {
        let stale = transport.drain().await?;
        if !stale.is_empty() {
            tracing::warn!("Discarding unread TIC500 reply before '{}': {:?}", line, stale);
        }
        transport.send_line(line).await
    }

    /// One command line and one reply, holding the link lock throughout.
    async fn exchange(&self, line: &str) -> TicResult<String> {
        self.ensure_on()?;
        let guard = self.link.lock().await;
        let link = guard.as_ref().ok_or(TicError::NotConnected)?;
        let result = match Self::send_fresh(link.transport.as_ref(), line).await {
            Ok(()) => link.transport.receive_line().await,
            Err(e) => Err(e),
        };
        self.check_link(result)
    }

    /// Read a property of a channel.
    #[instrument(skip(self), err)]
    pub async fn get(&self, channel: Channel, property: &str) -> TicResult<AttrValue> {
        let spec = resolve(channel.kind(), property)?;
        self.get_spec(channel, spec).await
    }

    /// Read a resolved property of a channel.
    pub async fn get_spec(&self, channel: Channel, spec: &PropertySpec) -> TicResult<AttrValue> {
        let line = self.codec.encode_read(channel, spec);
        let reply = self.exchange(&line).await?;
        self.codec.decode(spec, &reply)
    }

    /// Write a property of a channel.
    ///
    /// Access and value type are checked before anything is sent. A missing
    /// reply is accepted; an `Error` reply is not.
    #[instrument(skip(self), err)]
    pub async fn set(&self, channel: Channel, property: &str, value: AttrValue) -> TicResult<()> {
        let spec = resolve(channel.kind(), property)?;
        self.set_spec(channel, spec, &value).await
    }

    /// Write a resolved property of a channel.
    pub async fn set_spec(
        &self,
        channel: Channel,
        spec: &PropertySpec,
        value: &AttrValue,
    ) -> TicResult<()> {
        if !spec.access.is_writable() {
            return Err(TicError::Access(spec.name.to_string()));
        }
        let line = self.codec.encode_write(channel, spec, value)?;

        match self.exchange(&line).await {
            Ok(reply) => self.codec.check_ack(spec, &reply),
            Err(TicError::Timeout(_)) => {
                tracing::debug!("No acknowledgement for '{}'", line);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Send a raw command line and return the reply verbatim.
    #[instrument(skip(self), err)]
    pub async fn raw_query(&self, text: &str) -> TicResult<String> {
        self.exchange(text).await
    }

    /// Send a raw command line without reading a reply.
    #[instrument(skip(self), err)]
    pub async fn raw_send(&self, text: &str) -> TicResult<()> {
        self.ensure_on()?;
        let guard = self.link.lock().await;
        let link = guard.as_ref().ok_or(TicError::NotConnected)?;
        let result = Self::send_fresh(link.transport.as_ref(), text).await;
        self.check_link(result)
    }

    /// The instrument's description string.
    pub async fn describe(&self) -> TicResult<String> {
        let reply = self.exchange(DESCRIPTION_QUERY).await?;
        check_error(&reply).map(str::to_string)
    }

    /// Close the link and return to `Off`. Idempotent.
    pub async fn shutdown(&self) -> TicResult<()> {
        let mut guard = self.link.lock().await;
        let result = match guard.take() {
            Some(link) => link.transport.close().await,
            None => Ok(()),
        };
        self.status.set(DeviceState::Off, "Device is off");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::SimulatedTic500;
    use std::time::Duration;
    use tracing_test::traced_test;

    fn simulated() -> SimulatedTic500 {
        SimulatedTic500::new().with_timeout(Duration::from_millis(20))
    }

    async fn session_on(dialect: Dialect, instrument: &SimulatedTic500) -> Session {
        let session = Session::new(dialect);
        let transport: BoxTransport = Box::new(instrument.clone());
        session.bring_up(async move { Ok(transport) }).await.unwrap();
        session
    }

    #[tokio::test]
    #[traced_test]
    async fn test_verbose_bring_up_enables_verbosity() {
        let instrument = simulated();
        let session = session_on(Dialect::Verbose, &instrument).await;

        assert_eq!(session.state(), DeviceState::On);
        assert!(session.is_verbose().await);
        assert_eq!(instrument.verbose_level(), "high");
        assert_eq!(
            instrument.history(),
            vec!["system.com.verbose?", "system.com.verbose=high"]
        );
        assert!(logs_contain("Enabled verbose communication"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_verbose_bring_up_when_already_high() {
        let instrument = simulated();
        instrument.set_verbose_level("high");
        let session = session_on(Dialect::Verbose, &instrument).await;

        assert_eq!(instrument.history(), vec!["system.com.verbose?"]);
        assert!(session.is_verbose().await);
        assert!(logs_contain("already enabled"));
    }

    #[tokio::test]
    async fn test_plain_bring_up_sends_nothing() {
        let instrument = simulated();
        let session = session_on(Dialect::Plain, &instrument).await;

        assert!(instrument.history().is_empty());
        assert!(!session.is_verbose().await);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_connect_failure_enters_fault() {
        let session = Session::new(Dialect::Verbose);
        let err = session
            .bring_up(async { Err(TicError::Connection("refused".into())) })
            .await
            .unwrap_err();

        assert!(matches!(err, TicError::Connection(_)));
        assert_eq!(session.state(), DeviceState::Fault);
        assert_eq!(session.status(), "Connection error: refused");
        assert!(logs_contain("bring-up failed"));

        let out1 = Channel::output(1).unwrap();
        assert!(matches!(
            session.get(out1, "power").await,
            Err(TicError::Fault(status)) if status == "Connection error: refused"
        ));
    }

    #[tokio::test]
    async fn test_silent_instrument_faults_bring_up() {
        let instrument = simulated();
        instrument.set_silent(true);
        let session = Session::new(Dialect::Verbose);
        let transport: BoxTransport = Box::new(instrument.clone());

        let err = session
            .bring_up(async move { Ok(transport) })
            .await
            .unwrap_err();
        assert!(matches!(err, TicError::Timeout(_)));
        assert_eq!(session.state(), DeviceState::Fault);
        assert!(instrument.is_closed());
    }

    #[tokio::test]
    async fn test_reinit_recovers_from_fault() {
        let instrument = simulated();
        instrument.set_silent(true);
        let session = Session::new(Dialect::Verbose);
        let transport: BoxTransport = Box::new(instrument.clone());
        assert!(session.bring_up(async move { Ok(transport) }).await.is_err());

        let healthy = simulated();
        let transport: BoxTransport = Box::new(healthy);
        session.bring_up(async move { Ok(transport) }).await.unwrap();
        assert_eq!(session.state(), DeviceState::On);
    }

    #[tokio::test]
    async fn test_get_and_set_round_trip() {
        for dialect in [Dialect::Plain, Dialect::Verbose] {
            let instrument = simulated();
            let session = session_on(dialect, &instrument).await;
            let out1 = Channel::output(1).unwrap();

            session
                .set(out1, "setpoint", AttrValue::Float(77.0))
                .await
                .unwrap();
            assert_eq!(
                session.get(out1, "setpoint").await.unwrap(),
                AttrValue::Float(77.0)
            );
        }
    }

    #[tokio::test]
    async fn test_set_read_only_sends_nothing() {
        let instrument = simulated();
        let session = session_on(Dialect::Plain, &instrument).await;
        let in1 = Channel::input(1).unwrap();

        let err = session
            .set(in1, "temperature", AttrValue::Float(4.0))
            .await
            .unwrap_err();
        assert!(matches!(err, TicError::Access(name) if name == "temperature"));
        assert!(instrument.history().is_empty());
    }

    #[tokio::test]
    async fn test_describe_and_raw_access() {
        let instrument = simulated();
        let session = session_on(Dialect::Plain, &instrument).await;

        assert!(session.describe().await.unwrap().contains("TIC500"));
        assert_eq!(session.raw_query("Out2.pid.Mode?").await.unwrap(), "Off");

        session.raw_send("Out2.pid.Mode=On").await.unwrap();
        assert_eq!(session.raw_query("Out2.pid.Mode?").await.unwrap(), "On");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_unread_echo_is_not_taken_as_next_reply() {
        let instrument = simulated();
        let session = session_on(Dialect::Verbose, &instrument).await;
        let out1 = Channel::output(1).unwrap();

        session
            .set(out1, "setpoint", AttrValue::Float(77.0))
            .await
            .unwrap();
        // Echoed by the instrument but never read
        session.raw_send("(Out1.pid.P)=(2)").await.unwrap();

        assert_eq!(
            session.get(out1, "setpoint").await.unwrap(),
            AttrValue::Float(77.0)
        );
        assert_eq!(
            session.get(out1, "P").await.unwrap(),
            AttrValue::Float(2.0)
        );
        assert!(logs_contain("Discarding unread TIC500 reply"));
        assert!(!logs_contain("echo mismatch"));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_lost_link_faults_device() {
        let instrument = simulated();
        let session = session_on(Dialect::Plain, &instrument).await;
        let out1 = Channel::output(1).unwrap();

        // Timeouts and instrument errors leave the device usable
        instrument.set_silent(true);
        assert!(matches!(
            session.get(out1, "P").await,
            Err(TicError::Timeout(_))
        ));
        instrument.set_silent(false);
        assert!(matches!(
            session.raw_query("Out7.Value?").await,
            Ok(reply) if reply.starts_with("Error")
        ));
        assert_eq!(session.state(), DeviceState::On);

        // Link dropped underneath the session
        instrument.close().await.unwrap();
        assert!(matches!(
            session.get(out1, "P").await,
            Err(TicError::NotConnected)
        ));
        assert_eq!(session.state(), DeviceState::Fault);
        assert!(logs_contain("link lost"));
        assert!(matches!(
            session.raw_send("Out1.pid.P=1").await,
            Err(TicError::Fault(_))
        ));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let instrument = simulated();
        let session = session_on(Dialect::Plain, &instrument).await;

        session.shutdown().await.unwrap();
        session.shutdown().await.unwrap();
        assert!(instrument.is_closed());
        assert_eq!(session.state(), DeviceState::Off);
        assert!(matches!(
            session.raw_query("description?").await,
            Err(TicError::NotConnected)
        ));
    }
}
