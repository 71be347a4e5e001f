//! Broker and failover URI parsing (§6).
//!
//! `failover:(uri,uri,...)?opt=val` wraps a pool of broker URIs plus
//! reconnect-policy options; a bare `tcp://host:port` is a single-URI pool
//! of size one.

use url::Url;

use crate::transport::errors::TransportError;

/// Options accepted on a `failover:` URI's query string.
#[derive(Debug, Clone)]
pub struct FailoverOptions {
    pub initial_reconnect_delay_ms: u64,
    pub max_reconnect_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub use_exponential_backoff: bool,
    pub max_reconnect_attempts: Option<u32>,
    pub randomize: bool,
    pub backup: bool,
    pub backup_pool_size: usize,
}

impl Default for FailoverOptions {
    fn default() -> Self {
        Self {
            initial_reconnect_delay_ms: 10,
            max_reconnect_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            use_exponential_backoff: true,
            max_reconnect_attempts: None,
            randomize: true,
            backup: false,
            backup_pool_size: 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FailoverUri {
    pub broker_uris: Vec<Url>,
    pub options: FailoverOptions,
}

/// Parse a `failover:(...)?...` URI, or wrap a single broker URI as a
/// one-element pool with default options.
///
/// # Errors
/// Returns [`TransportError::NegotiationFailed`] (reused here as a generic
/// "malformed configuration" error) if the URI has no parseable broker URIs.
pub fn parse_failover_uri(raw: &str) -> Result<FailoverUri, TransportError> {
    let Some(inner) = raw.strip_prefix("failover:") else {
        let url = Url::parse(raw).map_err(|e| TransportError::NegotiationFailed(e.to_string()))?;
        return Ok(FailoverUri { broker_uris: vec![url], options: FailoverOptions::default() });
    };

    let (body, query) = match inner.split_once('?') {
        Some((b, q)) => (b, Some(q)),
        None => (inner, None),
    };
    let body = body.trim_start_matches('(').trim_end_matches(')');
    let broker_uris: Vec<Url> = body
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Url::parse(s).map_err(|e| TransportError::NegotiationFailed(e.to_string())))
        .collect::<Result<_, _>>()?;

    if broker_uris.is_empty() {
        return Err(TransportError::NegotiationFailed("failover URI has no broker URIs".into()));
    }

    let mut options = FailoverOptions::default();
    if let Some(query) = query {
        for pair in query.split('&') {
            let Some((key, value)) = pair.split_once('=') else { continue };
            apply_option(&mut options, key, value);
        }
    }

    Ok(FailoverUri { broker_uris, options })
}

fn apply_option(options: &mut FailoverOptions, key: &str, value: &str) {
    match key {
        "initialReconnectDelay" => options.initial_reconnect_delay_ms = value.parse().unwrap_or(options.initial_reconnect_delay_ms),
        "maxReconnectDelay" => options.max_reconnect_delay_ms = value.parse().unwrap_or(options.max_reconnect_delay_ms),
        "backOffMultiplier" => options.backoff_multiplier = value.parse().unwrap_or(options.backoff_multiplier),
        "useExponentialBackOff" => options.use_exponential_backoff = value == "true",
        "maxReconnectAttempts" => options.max_reconnect_attempts = value.parse().ok(),
        "randomize" => options.randomize = value == "true",
        "backup" => options.backup = value == "true",
        "backupPoolSize" => options.backup_pool_size = value.parse().unwrap_or(options.backup_pool_size),
        _ => {}
    }
}
