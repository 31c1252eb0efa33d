#![doc = include_str!("../README.md")]

mod config;
mod telemetry;

use clap::Parser;
use config::{CliArgs, EchoConfig};
use duplex_call::{
    CallOptions, Completion, DuplexCall, RequestSink, RequestTransport, TransportError,
    memory::{self, PeerRequests, PeerResponses},
};
use std::sync::Arc;
use telemetry::init_telemetry;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = EchoConfig::try_from(args)?;

    let providers = init_telemetry()?;
    if cfg!(debug_assertions) {
        tracing::info!("Starting echo call with full config: {:#?}", config);
    } else {
        tracing::info!("Starting echo call with {} messages", config.messages);
    }

    let res = run(config).await;
    providers.shutdown();
    res
}

async fn run(config: EchoConfig) -> anyhow::Result<()> {
    let (requests, responses, peer) = memory::pair::<String, String>(config.request_buffer);
    let (inbox, outbox) = peer.split();
    tokio::spawn(echo_peer(inbox, outbox, config.clone()));

    let mut options = CallOptions::default();
    if let Some(timeout) = config.timeout {
        options = options.with_timeout(timeout);
    }
    let call = DuplexCall::with_options(requests, responses, options);

    if let Some(delay) = config.cancel_after {
        let call = call.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tracing::info!("{} cancelling after {:?}", call.id(), delay);
            call.cancel();
        });
    }

    {
        let call = call.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C signal, cancelling {}", call.id());
                call.cancel();
            }
        });
    }

    let sender = tokio::spawn(send_all(
        Arc::clone(call.request_sink()),
        config.payload.clone(),
        config.messages,
    ));

    let mut received = 0_u64;
    loop {
        match call.receive_next().await {
            Ok(Some(reply)) => {
                received += 1;
                tracing::debug!("{} reply #{received}: {reply}", call.id());
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("{} response half ended: {e}", call.id());
                break;
            }
        }
    }

    let sent = match sender.await? {
        Ok(sent) => sent,
        Err((sent, e)) => {
            tracing::warn!("{} request half ended after {sent} sends: {e}", call.id());
            sent
        }
    };

    let completion = call.completion();
    tracing::info!(
        "{} finished: sent {sent}, received {received}, request {:?}, response {:?}",
        call.id(),
        completion.request,
        completion.response,
    );

    match (completion.request, completion.response) {
        (Some(Completion::Ok), Some(Completion::Ok)) => Ok(()),
        (request, response) => {
            anyhow::bail!("call did not complete cleanly: request {request:?}, response {response:?}")
        }
    }
}

/// Sends `messages` requests, then half-closes. On failure the error comes
/// back with the number of requests the transport had already accepted.
async fn send_all<W>(
    sink: Arc<RequestSink<W>>,
    payload: String,
    messages: u64,
) -> Result<u64, (u64, duplex_call::Error)>
where
    W: RequestTransport<Request = String>,
{
    let mut sent = 0_u64;
    for i in 0..messages {
        if let Err(e) = sink.send(format!("{payload}-{i}")).await {
            return Err((sent, e));
        }
        sent += 1;
    }
    sink.half_close().await.map_err(|e| (sent, e))?;
    Ok(sent)
}

/// Replies to each request with its upper-cased text, optionally failing the
/// response stream after `fail_after` replies.
async fn echo_peer(
    mut inbox: PeerRequests<String>,
    outbox: PeerResponses<String>,
    config: EchoConfig,
) {
    let mut echoed = 0_u64;
    while let Some(request) = inbox.recv().await {
        if config.fail_after == Some(echoed) {
            tracing::info!("Peer failing response stream after {echoed} replies");
            inbox.close();
            outbox
                .fail(TransportError::aborted("injected peer failure"))
                .await;
            return;
        }
        if !config.reply_delay.is_zero() {
            tokio::time::sleep(config.reply_delay).await;
        }
        if outbox.send(request.to_uppercase()).await.is_err() {
            return;
        }
        echoed += 1;
    }
    outbox.finish();
}
