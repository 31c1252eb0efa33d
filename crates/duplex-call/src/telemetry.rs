//! Optional OpenTelemetry metrics for duplex calls.
//!
//! With the `metrics` feature enabled, counters are registered lazily on the
//! global meter provider under the `duplex-call` scope. Installing a meter
//! provider is left to the application (see the `duplex-call-echo` binary).
//! Without the feature every hook compiles to an empty function.
//!
//! ## Instruments
//!
//! - `calls_started`: duplex calls created.
//! - `messages_sent`: requests accepted by the transport.
//! - `messages_received`: responses pulled from the transport.
//! - `half_failures`: halves that reached a failed state, by `half`.
//! - `cancellations`: calls whose signal fired, by `reason`.

use crate::error::{CancelReason, Half};
#[cfg(feature = "metrics")]
use opentelemetry::{
    KeyValue,
    metrics::{Counter, Meter},
};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;

#[cfg(feature = "metrics")]
struct Instruments {
    calls_started: Counter<u64>,
    messages_sent: Counter<u64>,
    messages_received: Counter<u64>,
    half_failures: Counter<u64>,
    cancellations: Counter<u64>,
}

#[cfg(feature = "metrics")]
fn instruments() -> &'static Instruments {
    static INSTRUMENTS: OnceLock<Instruments> = OnceLock::new();
    INSTRUMENTS.get_or_init(|| build_instruments(&opentelemetry::global::meter("duplex-call")))
}

#[cfg(feature = "metrics")]
fn build_instruments(meter: &Meter) -> Instruments {
    Instruments {
        calls_started: meter
            .u64_counter("calls_started")
            .with_description("Duplex calls created")
            .build(),
        messages_sent: meter
            .u64_counter("messages_sent")
            .with_description("Requests accepted by the transport")
            .build(),
        messages_received: meter
            .u64_counter("messages_received")
            .with_description("Responses pulled from the transport")
            .build(),
        half_failures: meter
            .u64_counter("half_failures")
            .with_description("Call halves that reached a failed state")
            .build(),
        cancellations: meter
            .u64_counter("cancellations")
            .with_description("Calls cancelled by caller, deadline or upstream")
            .build(),
    }
}

#[cfg(feature = "metrics")]
pub fn increment_calls_started() {
    instruments().calls_started.add(1, &[]);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_calls_started() {}

#[cfg(feature = "metrics")]
pub fn increment_messages_sent() {
    instruments().messages_sent.add(1, &[]);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_messages_sent() {}

#[cfg(feature = "metrics")]
pub fn increment_messages_received() {
    instruments().messages_received.add(1, &[]);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_messages_received() {}

#[cfg(feature = "metrics")]
pub fn increment_half_failures(half: Half) {
    instruments()
        .half_failures
        .add(1, &[KeyValue::new("half", half.as_str())]);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_half_failures(_half: Half) {}

#[cfg(feature = "metrics")]
pub fn increment_cancellations(reason: CancelReason) {
    instruments()
        .cancellations
        .add(1, &[KeyValue::new("reason", reason.as_str())]);
}

#[cfg(not(feature = "metrics"))]
pub fn increment_cancellations(_reason: CancelReason) {}
