//! A client for the WHOIS query protocol ([RFC 3912](https://datatracker.ietf.org/doc/html/rfc3912))
//!
//! A query opens a TCP connection, sends the resource followed by CRLF, reads
//! until the server hangs up and extracts `key: value` fields from the reply
//! with a configurable line oriented pattern.
//!
//! Referrals are not followed: when a server points elsewhere (e.g. the
//! `whois:` field returned by IANA) the caller queries the referred server.
pub mod config;
pub mod error;
mod fields;
mod validation;
mod whois;

pub use config::{ClientConfig, Settings};
pub use error::{ConfigError, ValidationError, WhoisError};
pub use fields::Fields;
pub use validation::{validate_pattern, validate_port};

use serde::Serialize;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// The immutable outcome of a WHOIS query
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    resource: String,
    server: String,
    fields: Fields,
    raw: String,
}

impl Response {
    /// The resource the query was made for
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The server response, verbatim
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The fields extracted from the response
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// The hostname of the server which sent the response
    pub fn server(&self) -> &str {
        &self.server
    }
}

/// A WHOIS client
///
/// The client keeps no per-query state: each query opens and closes its own
/// connection, so a client can be shared freely across threads.
#[derive(Debug, Clone, Default)]
pub struct WhoisClient {
    config: ClientConfig,
}

impl WhoisClient {
    /// Creates a client with the given configuration, or the defaults if `None`
    pub fn new(config: impl Into<Option<ClientConfig>>) -> Self {
        Self {
            config: config.into().unwrap_or_default(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Queries the default server on the default port
    pub fn query(&self, resource: &str) -> Result<Response, WhoisError> {
        self.query_host(resource, self.config.default_host())
    }

    /// Queries `host` on the default port
    pub fn query_host(&self, resource: &str, host: &str) -> Result<Response, WhoisError> {
        self.query_host_port(resource, host, self.config.default_port())
    }

    /// Queries `host` on `port`
    ///
    /// The resource is sent as is and shouldn't carry a trailing CRLF.
    /// The call blocks until the server closes the connection, or until the
    /// read timeout expires if one is configured.
    #[instrument(level = "debug", skip(self, port))]
    pub fn query_host_port(
        &self,
        resource: &str,
        host: &str,
        port: impl Into<i64>,
    ) -> Result<Response, WhoisError> {
        let port = validate_port(port)?;
        let raw = whois::Exchange {
            config: &self.config,
            resource,
            host,
            port,
        }
        .run()?;
        let fields = Fields::parse(&raw, self.config.pattern());
        debug!(
            "WHOIS reply from {} for {}: {} bytes, {} fields",
            host,
            resource,
            raw.len(),
            fields.len()
        );
        Ok(Response {
            resource: resource.to_string(),
            server: host.to_string(),
            fields,
            raw,
        })
    }
}
