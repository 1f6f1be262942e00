//! Facilities for reading runtime configuration values
use crate::error::{ConfigError, ValidationError};
use crate::validation::{validate_pattern, validate_port};
use encoding_rs::Encoding;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// The default key/value extraction pattern
pub const DEFAULT_PATTERN: &str = r"^\s*([\w /\-]+): +(.+?)$";
/// IANA's WHOIS server, where most lookups start
pub const DEFAULT_HOST: &str = "whois.iana.org";
/// The TCP port assigned to WHOIS by RFC 3912
pub const DEFAULT_PORT: u16 = 43;
/// Default connection timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Client configuration
///
/// The value is immutable: every `with_*` method consumes the configuration and
/// returns an updated copy, re-validating the changed property.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pattern: Regex,
    charset: &'static Encoding,
    default_host: String,
    default_port: u16,
    connect_timeout: Duration,
    read_timeout: Option<Duration>,
    max_response_size: Option<u64>,
    strict_decoding: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        static PATTERN: std::sync::LazyLock<Regex> = std::sync::LazyLock::new(|| {
            validate_pattern(DEFAULT_PATTERN).expect("the default pattern is valid")
        });
        Self {
            pattern: PATTERN.clone(),
            charset: encoding_rs::UTF_8,
            default_host: DEFAULT_HOST.to_string(),
            default_port: DEFAULT_PORT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: None,
            max_response_size: None,
            strict_decoding: false,
        }
    }
}

impl ClientConfig {
    /// The pattern used to extract fields from responses
    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Validates and sets the extraction pattern
    ///
    /// See [`validate_pattern`] for the rules.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, ValidationError> {
        self.pattern = validate_pattern(pattern)?;
        Ok(self)
    }

    /// The charset used to encode requests and decode responses
    pub fn charset(&self) -> &'static Encoding {
        self.charset
    }

    pub fn with_charset(mut self, charset: &'static Encoding) -> Self {
        self.charset = charset;
        self
    }

    /// Sets the charset from a WHATWG label (e.g. `"utf-8"`, `"latin1"`)
    pub fn with_charset_label(self, label: &str) -> Result<Self, ValidationError> {
        let charset = Encoding::for_label(label.trim().as_bytes())
            .ok_or_else(|| ValidationError::UnknownCharset(label.to_string()))?;
        Ok(self.with_charset(charset))
    }

    /// The server queried when no host is given
    pub fn default_host(&self) -> &str {
        &self.default_host
    }

    pub fn with_default_host(mut self, host: &str) -> Result<Self, ValidationError> {
        if host.is_empty() {
            return Err(ValidationError::EmptyHost);
        }
        self.default_host = host.to_string();
        Ok(self)
    }

    /// The port used when no port is given
    pub fn default_port(&self) -> u16 {
        self.default_port
    }

    /// Validates and sets the default port
    pub fn with_default_port(mut self, port: impl Into<i64>) -> Result<Self, ValidationError> {
        self.default_port = validate_port(port)?;
        Ok(self)
    }

    /// The deadline for establishing the connection
    ///
    /// A zero duration disables the deadline.
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The maximum time a single read may block, if any
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        // A zero read timeout is rejected by the socket layer
        self.read_timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    /// The maximum number of bytes accepted from the server, if any
    pub fn max_response_size(&self) -> Option<u64> {
        self.max_response_size
    }

    /// Responses are truncated at `size` bytes when set
    ///
    /// A character split by the cut is dropped from the decoded text.
    pub fn with_max_response_size(mut self, size: Option<u64>) -> Self {
        self.max_response_size = size;
        self
    }

    /// Whether malformed input in the configured charset fails the query
    pub fn strict_decoding(&self) -> bool {
        self.strict_decoding
    }

    pub fn with_strict_decoding(mut self, strict: bool) -> Self {
        self.strict_decoding = strict;
        self
    }
}

/// Runtime settings as read from `whois.toml` and the environment
///
/// Every field is optional and falls back to the [`ClientConfig`] default.
#[derive(Debug, Default, Deserialize)]
pub struct Settings {
    /// The key/value extraction pattern
    pub pattern: Option<String>,
    /// The charset label
    pub charset: Option<String>,
    /// The default WHOIS server
    pub default_host: Option<String>,
    /// The default WHOIS port
    pub default_port: Option<i64>,
    /// Connection timeout in milliseconds
    pub connect_timeout_msec: Option<u64>,
    /// Read timeout in milliseconds
    pub read_timeout_msec: Option<u64>,
    /// Maximum response size in bytes
    pub max_response_size: Option<u64>,
    /// Fail on malformed response text
    pub strict_decoding: Option<bool>,
}

impl Settings {
    /// Loads the settings from `whois.toml` and `WHOIS__` prefixed env variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(
            Figment::new()
                .merge(Toml::file("whois.toml"))
                .merge(Env::prefixed("WHOIS__").split("__")),
        )
    }

    /// Extracts the settings from the provided figment
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let settings: Self = figment.extract().map_err(|err| {
            error!("Failed to validate configuration: {}", err);
            err
        })?;
        trace!("final settings: {settings:#?}");
        Ok(settings)
    }

    /// Validates the settings and builds the client configuration
    pub fn into_config(self) -> Result<ClientConfig, ConfigError> {
        let mut config = ClientConfig::default();
        if let Some(pattern) = self.pattern {
            config = config.with_pattern(&pattern)?;
        }
        if let Some(charset) = self.charset {
            config = config.with_charset_label(&charset)?;
        }
        if let Some(host) = self.default_host {
            config = config.with_default_host(&host)?;
        }
        if let Some(port) = self.default_port {
            config = config.with_default_port(port)?;
        }
        if let Some(msec) = self.connect_timeout_msec {
            config = config.with_connect_timeout(Duration::from_millis(msec));
        }
        Ok(config
            .with_read_timeout(self.read_timeout_msec.map(Duration::from_millis))
            .with_max_response_size(self.max_response_size)
            .with_strict_decoding(self.strict_decoding.unwrap_or(false)))
    }
}
