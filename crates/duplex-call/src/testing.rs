//! Scripted transports shared by the unit tests.

use crate::{
    context::CallContext,
    error::TransportError,
    transport::{RequestTransport, ResponseTransport},
};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use tokio::sync::{Notify, watch};
use tokio_util::sync::CancellationToken;

pub fn context() -> CallContext {
    CallContext::new(CancellationToken::new(), None)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteEvent {
    Message(u32),
    HalfClose,
}

/// Request transport that records everything it accepts.
pub struct RecordingTransport {
    log: WriteLog,
}

impl RecordingTransport {
    pub fn new() -> (Self, WriteLog) {
        let log = WriteLog::default();
        (Self { log: log.clone() }, log)
    }
}

#[derive(Clone, Default)]
pub struct WriteLog {
    inner: Arc<WriteLogInner>,
}

#[derive(Default)]
struct WriteLogInner {
    events: Mutex<Vec<WriteEvent>>,
    fail_next: Mutex<Option<TransportError>>,
    gate: Mutex<Option<Gate>>,
}

impl WriteLog {
    pub fn events(&self) -> Vec<WriteEvent> {
        self.inner.events.lock().clone()
    }

    pub fn fail_next_write(&self, err: TransportError) {
        *self.inner.fail_next.lock() = Some(err);
    }

    /// Makes every write and half-close wait until the returned gate is
    /// released.
    pub fn hold_writes(&self) -> Gate {
        let gate = Gate::new();
        *self.inner.gate.lock() = Some(gate.clone());
        gate
    }

    async fn pass_gate(&self) {
        let gate = self.inner.gate.lock().clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }
    }

    fn take_failure(&self) -> Option<TransportError> {
        self.inner.fail_next.lock().take()
    }
}

impl RequestTransport for RecordingTransport {
    type Request = u32;

    async fn write(&mut self, message: u32) -> Result<(), TransportError> {
        self.log.pass_gate().await;
        if let Some(err) = self.log.take_failure() {
            return Err(err);
        }
        self.log.inner.events.lock().push(WriteEvent::Message(message));
        Ok(())
    }

    async fn half_close(&mut self) -> Result<(), TransportError> {
        self.log.pass_gate().await;
        if let Some(err) = self.log.take_failure() {
            return Err(err);
        }
        self.log.inner.events.lock().push(WriteEvent::HalfClose);
        Ok(())
    }
}

/// Holds transport operations until released.
#[derive(Clone)]
pub struct Gate {
    entered: Arc<Notify>,
    open: Arc<watch::Sender<bool>>,
}

impl Gate {
    fn new() -> Self {
        let (open, _) = watch::channel(false);
        Self {
            entered: Arc::new(Notify::new()),
            open: Arc::new(open),
        }
    }

    /// Resolves once an operation is waiting at the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.open.send_replace(true);
    }

    async fn pass(&self) {
        let mut open = self.open.subscribe();
        let already_open = *open.borrow();
        if already_open {
            return;
        }
        self.entered.notify_one();
        let _ = open.wait_for(|open| *open).await;
    }
}

#[derive(Debug, Clone)]
pub enum Step {
    Message(u32),
    End,
    Fail(TransportError),
    /// Never resolves.
    Pending,
}

/// Response transport that plays back a fixed script and counts how often it
/// was polled.
pub struct ScriptedSource {
    steps: VecDeque<Step>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                steps: steps.into_iter().collect(),
                calls: Arc::clone(&calls),
            },
            calls,
        )
    }
}

impl ResponseTransport for ScriptedSource {
    type Response = u32;

    async fn next_message(&mut self) -> Result<Option<u32>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.steps.pop_front() {
            Some(Step::Message(m)) => Ok(Some(m)),
            Some(Step::End) | None => Ok(None),
            Some(Step::Fail(e)) => Err(e),
            Some(Step::Pending) => std::future::pending::<Result<Option<u32>, TransportError>>().await,
        }
    }
}
