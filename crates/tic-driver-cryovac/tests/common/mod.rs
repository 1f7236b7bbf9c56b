//! Shared test doubles for the TIC500 integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tic_core::{TicError, TicResult};
use tic_driver_cryovac::codec::Dialect;
use tic_driver_cryovac::driver::Connector;
use tic_driver_cryovac::session::BoxTransport;
use tic_driver_cryovac::{Tic500Driver, Transport};

/// Timeout a scripted silence reports.
pub const SCRIPTED_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Default)]
struct Script {
    replies: VecDeque<Option<String>>,
    sent: Vec<String>,
    closed: bool,
}

/// Transport answering from a fixed script and recording every line sent.
///
/// `None` in the script stands for a reply that never comes.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new(replies: &[Option<&str>]) -> Self {
        let transport = Self::default();
        transport.script.lock().unwrap().replies = replies
            .iter()
            .map(|r| r.map(str::to_string))
            .collect();
        transport
    }

    /// Lines sent so far.
    pub fn sent(&self) -> Vec<String> {
        self.script.lock().unwrap().sent.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.script.lock().unwrap().closed
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send_line(&self, line: &str) -> TicResult<()> {
        let mut script = self.script.lock().unwrap();
        if script.closed {
            return Err(TicError::NotConnected);
        }
        script.sent.push(line.to_string());
        Ok(())
    }

    async fn receive_line(&self) -> TicResult<String> {
        let mut script = self.script.lock().unwrap();
        if script.closed {
            return Err(TicError::NotConnected);
        }
        match script.replies.pop_front() {
            Some(Some(reply)) => Ok(reply),
            Some(None) | None => Err(TicError::Timeout(SCRIPTED_TIMEOUT)),
        }
    }

    async fn drain(&self) -> TicResult<String> {
        // Scripted replies only exist once asked for
        if self.script.lock().unwrap().closed {
            return Err(TicError::NotConnected);
        }
        Ok(String::new())
    }

    async fn close(&self) -> TicResult<()> {
        self.script.lock().unwrap().closed = true;
        Ok(())
    }
}

/// Connector handing out `transport` on every call.
pub fn connector(transport: &ScriptedTransport) -> Connector {
    let transport = transport.clone();
    Arc::new(move || {
        let transport = transport.clone();
        Box::pin(async move { Ok(Box::new(transport) as BoxTransport) })
    })
}

/// Driver over a scripted transport, not yet brought up.
pub fn scripted_driver(dialect: Dialect, transport: &ScriptedTransport) -> Tic500Driver {
    Tic500Driver::with_connector(dialect, connector(transport)).unwrap()
}

/// Script prefix for a verbose bring-up against an instrument already at `high`.
pub const VERBOSE_READY: Option<&str> = Some("system.com.verbose = high");
