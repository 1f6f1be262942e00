use std::time::Duration;
use thiserror::Error;

/// Rejected configuration or query argument
///
/// Always raised locally, before any network activity takes place.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// The extraction pattern does not start with `^`.
    #[error("pattern has to start with a ^")]
    MissingStartAnchor,

    /// The extraction pattern does not end with `$`.
    #[error("pattern has to end with a $")]
    MissingEndAnchor,

    /// Wrapper for [`regex::Error`](https://docs.rs/regex/latest/regex/enum.Error.html)
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The extraction pattern does not have exactly one key and one value group.
    #[error("pattern needs exactly two capture groups (key and value), found {0}")]
    CaptureGroups(usize),

    /// Port is not in the 0-65535 range.
    #[error("port {0} is out of the 0-65535 range")]
    PortOutOfRange(i64),

    /// Empty default host.
    #[error("default host cannot be empty")]
    EmptyHost,

    /// The charset label is not known to the decoder.
    #[error("unknown charset {0:?}")]
    UnknownCharset(String),
}

/// Failure of a WHOIS query
#[derive(Error, Debug)]
pub enum WhoisError {
    /// A query argument failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The server hostname could not be mapped to any address.
    #[error("failed to resolve WHOIS server hostname {host}")]
    Resolve {
        host: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// No connection could be established within the connect timeout.
    #[error("connection to {host} timed out after {} ms", .timeout.as_millis())]
    ConnectTimeout { host: String, timeout: Duration },

    /// The server stopped sending for longer than the read timeout.
    #[error("no data received from {host} for {} ms", .timeout.as_millis())]
    ReadTimeout { host: String, timeout: Duration },

    /// Any other transport failure.
    #[error("I/O error during request about {resource} from {host}: {source}")]
    Io {
        resource: String,
        host: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure to load the runtime configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Wrapper for [`figment::Error`](https://docs.rs/figment/latest/figment/struct.Error.html)
    #[error("config deserialization: {0}")]
    Deserialization(#[from] figment::Error),

    /// A configured value is not acceptable.
    #[error("config validation: {0}")]
    Validation(#[from] ValidationError),
}
