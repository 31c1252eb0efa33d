use anyhow::bail;
use clap::Parser;
use core::time::Duration;

/// Runtime configuration for the `duplex-call-echo` binary.
///
/// The binary opens one duplex call against an in-process echo peer, streams
/// `MESSAGES` requests on one task while reading replies on another, and
/// prints how each half finished. Fault injection knobs let the cancellation
/// and failure paths be exercised from the command line.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "duplex-call-echo",
    version,
    about = "Drives a duplex streaming call against an in-process echo peer"
)]
pub struct CliArgs {
    /// Number of requests to send before half-closing.
    ///
    /// Environment variable: `MESSAGES`
    #[arg(long, env = "MESSAGES", default_value_t = 10)]
    pub messages: u64,

    /// Text carried by each request. The peer replies with it upper-cased.
    ///
    /// Environment variable: `PAYLOAD`
    #[arg(long, env = "PAYLOAD", default_value_t = String::from("ping"))]
    pub payload: String,

    /// Capacity of the request and response buffers.
    ///
    /// Environment variable: `REQUEST_BUFFER`
    #[arg(long, env = "REQUEST_BUFFER", default_value_t = duplex_call::DEFAULT_REQUEST_BUFFER)]
    pub request_buffer: usize,

    /// Call deadline in milliseconds. Unset means no deadline.
    ///
    /// Environment variable: `TIMEOUT_MS`
    #[arg(long, env = "TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Cancel the call after this many milliseconds.
    ///
    /// Environment variable: `CANCEL_AFTER_MS`
    #[arg(long, env = "CANCEL_AFTER_MS")]
    pub cancel_after_ms: Option<u64>,

    /// Make the peer fail the response stream after echoing this many
    /// messages.
    ///
    /// Environment variable: `FAIL_AFTER`
    #[arg(long, env = "FAIL_AFTER")]
    pub fail_after: Option<u64>,

    /// Delay in milliseconds the peer waits before each reply.
    ///
    /// Environment variable: `REPLY_DELAY_MS`
    #[arg(long, env = "REPLY_DELAY_MS", default_value_t = 0)]
    pub reply_delay_ms: u64,
}

#[derive(Debug, Clone)]
pub struct EchoConfig {
    pub messages: u64,
    pub payload: String,
    pub request_buffer: usize,
    pub timeout: Option<Duration>,
    pub cancel_after: Option<Duration>,
    pub fail_after: Option<u64>,
    pub reply_delay: Duration,
}

impl TryFrom<CliArgs> for EchoConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.request_buffer == 0 {
            bail!("REQUEST_BUFFER must be greater than 0");
        }

        if args.payload.is_empty() {
            bail!("PAYLOAD must not be empty");
        }

        if args.timeout_ms == Some(0) {
            bail!("TIMEOUT_MS must be greater than 0 when set");
        }

        Ok(Self {
            messages: args.messages,
            payload: args.payload,
            request_buffer: args.request_buffer,
            timeout: args.timeout_ms.map(Duration::from_millis),
            cancel_after: args.cancel_after_ms.map(Duration::from_millis),
            fail_after: args.fail_after,
            reply_delay: Duration::from_millis(args.reply_delay_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<EchoConfig> {
        let args = CliArgs::try_parse_from(
            std::iter::once("duplex-call-echo").chain(args.iter().copied()),
        )?;
        EchoConfig::try_from(args)
    }

    #[test]
    fn defaults_are_valid() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.request_buffer, duplex_call::DEFAULT_REQUEST_BUFFER);
        assert_eq!(config.timeout, None);
        assert_eq!(config.reply_delay, Duration::ZERO);
    }

    #[test]
    fn converts_millisecond_flags() {
        let config = parse(&["--timeout-ms", "1500", "--cancel-after-ms", "20"]).unwrap();
        assert_eq!(config.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.cancel_after, Some(Duration::from_millis(20)));
    }

    #[test]
    fn rejects_zero_buffer() {
        let err = parse(&["--request-buffer", "0"]).unwrap_err();
        assert!(err.to_string().contains("REQUEST_BUFFER"));
    }

    #[test]
    fn rejects_zero_timeout() {
        assert!(parse(&["--timeout-ms", "0"]).is_err());
    }
}
