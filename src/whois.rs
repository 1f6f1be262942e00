use crate::config::ClientConfig;
use crate::error::WhoisError;
use encoding_rs::{CoderResult, DecoderResult};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// A single RFC 3912 exchange with a WHOIS server
pub(crate) struct Exchange<'a> {
    pub config: &'a ClientConfig,
    pub resource: &'a str,
    pub host: &'a str,
    pub port: u16,
}

impl Exchange<'_> {
    /// Sends the request and returns the decoded response text
    ///
    /// The connection is torn down before this returns.
    pub fn run(&self) -> Result<String, WhoisError> {
        let request = format!("{}\r\n", self.resource);
        let (payload, _, unmappable) = self.config.charset().encode(&request);
        if unmappable {
            warn!(
                "Request for {} is not representable in {}",
                self.resource,
                self.config.charset().name()
            );
        }
        let addrs = self.resolve()?;
        let buf = {
            let stream = self.connect(&addrs)?;
            let buf = self.transfer(&stream, &payload)?;
            if let Err(e) = stream.shutdown(Shutdown::Both) {
                // The peer has usually hung up already
                trace!("Shutdown of connection to {} failed: {e}", self.host);
            }
            buf
        };
        let capped = self
            .config
            .max_response_size()
            .is_some_and(|limit| buf.len() as u64 == limit);
        self.decode(&buf, capped)
    }

    fn resolve(&self) -> Result<Vec<SocketAddr>, WhoisError> {
        debug!("Resolving {}...", self.host);
        let addrs: Vec<SocketAddr> = (self.host, self.port)
            .to_socket_addrs()
            .map_err(|e| {
                warn!("Failed to resolve {} for {}: {e}", self.host, self.resource);
                WhoisError::Resolve {
                    host: self.host.to_string(),
                    source: Some(e),
                }
            })?
            .collect();
        if addrs.is_empty() {
            warn!("No address found for {}", self.host);
            return Err(WhoisError::Resolve {
                host: self.host.to_string(),
                source: None,
            });
        }
        trace!("{} resolved to {:?}", self.host, addrs);
        Ok(addrs)
    }

    fn connect(&self, addrs: &[SocketAddr]) -> Result<TcpStream, WhoisError> {
        let timeout = self.config.connect_timeout();
        let start = Instant::now();
        let mut last_err = None;
        for addr in addrs {
            debug!("Connecting to {} ({addr}) for query on {}...", self.host, self.resource);
            let res = match connect_budget(timeout, start.elapsed()) {
                Budget::Unbounded => TcpStream::connect(addr),
                Budget::Remaining(remaining) => TcpStream::connect_timeout(addr, remaining),
                Budget::Exhausted => break,
            };
            match res {
                Ok(s) => return Ok(s),
                Err(e) => {
                    debug!("Connection to {addr} failed: {e}");
                    last_err = Some(e);
                }
            }
        }
        warn!("Connection to {} for {} failed", self.host, self.resource);
        Err(connect_error(
            self.resource,
            self.host,
            timeout,
            last_err,
            connect_budget(timeout, start.elapsed()) == Budget::Exhausted,
        ))
    }

    fn transfer(&self, mut stream: &TcpStream, payload: &[u8]) -> Result<Vec<u8>, WhoisError> {
        stream
            .write_all(payload)
            .inspect_err(|e| warn!("Send to {} for {} failed: {e}", self.host, self.resource))
            .map_err(|e| self.io_error(e))?;
        debug!("Query sent to {} for {}", self.host, self.resource);

        let read_timeout = self.config.read_timeout();
        stream
            .set_read_timeout(read_timeout)
            .map_err(|e| self.io_error(e))?;
        let limit = self.config.max_response_size().unwrap_or(u64::MAX);
        let mut buf: Vec<u8> = Vec::new();
        stream
            .take(limit)
            .read_to_end(&mut buf)
            .inspect_err(|e| warn!("Recv from {} for {} failed: {e}", self.host, self.resource))
            .map_err(|e| match (e.kind(), read_timeout) {
                (std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut, Some(timeout)) => {
                    WhoisError::ReadTimeout {
                        host: self.host.to_string(),
                        timeout,
                    }
                }
                _ => self.io_error(e),
            })?;
        if buf.len() as u64 == limit {
            debug!("Response from {} reached the {limit} bytes cap", self.host);
        }
        debug!("Received {} bytes from {}", buf.len(), self.host);
        Ok(buf)
    }

    /// Decodes the reply with the configured charset
    ///
    /// A `capped` reply may end in the middle of a character: the incomplete
    /// sequence is dropped rather than treated as malformed.
    fn decode(&self, buf: &[u8], capped: bool) -> Result<String, WhoisError> {
        let charset = self.config.charset();
        let last = !capped;
        let mut decoder = charset.new_decoder_without_bom_handling();
        let mut reply = String::new();
        let mut src = buf;
        if self.config.strict_decoding() {
            loop {
                reply.reserve(
                    decoder
                        .max_utf8_buffer_length_without_replacement(src.len())
                        .unwrap_or(src.len()),
                );
                let (res, read) =
                    decoder.decode_to_string_without_replacement(src, &mut reply, last);
                src = &src[read..];
                match res {
                    DecoderResult::InputEmpty => break,
                    DecoderResult::OutputFull => continue,
                    DecoderResult::Malformed(_, _) => {
                        warn!("Response from {} is not valid {}", self.host, charset.name());
                        return Err(self.io_error(std::io::Error::new(
                            std::io::ErrorKind::InvalidData,
                            format!("response is not valid {}", charset.name()),
                        )));
                    }
                }
            }
        } else {
            let mut had_errors = false;
            loop {
                reply.reserve(
                    decoder
                        .max_utf8_buffer_length(src.len())
                        .unwrap_or(src.len()),
                );
                let (res, read, replaced) = decoder.decode_to_string(src, &mut reply, last);
                src = &src[read..];
                had_errors |= replaced;
                if res == CoderResult::InputEmpty {
                    break;
                }
            }
            if had_errors {
                warn!(
                    "Response from {} contains malformed {} sequences",
                    self.host,
                    charset.name()
                );
            }
        }
        trace!("Response from {} for {}:\n{}", self.host, self.resource, reply);
        Ok(reply)
    }

    fn io_error(&self, source: std::io::Error) -> WhoisError {
        WhoisError::Io {
            resource: self.resource.to_string(),
            host: self.host.to_string(),
            source,
        }
    }
}

/// How long the next connection attempt may take
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Budget {
    /// No deadline is configured
    Unbounded,
    Remaining(Duration),
    /// The deadline has passed
    Exhausted,
}

/// Computes the budget left out of `timeout` after `elapsed`
///
/// A zero `timeout` disables the deadline.
fn connect_budget(timeout: Duration, elapsed: Duration) -> Budget {
    if timeout.is_zero() {
        return Budget::Unbounded;
    }
    match timeout.saturating_sub(elapsed) {
        remaining if remaining.is_zero() => Budget::Exhausted,
        remaining => Budget::Remaining(remaining),
    }
}

/// Classifies a failure to connect
fn connect_error(
    resource: &str,
    host: &str,
    timeout: Duration,
    last_err: Option<std::io::Error>,
    deadline_elapsed: bool,
) -> WhoisError {
    match last_err {
        Some(e) if e.kind() == std::io::ErrorKind::TimedOut => WhoisError::ConnectTimeout {
            host: host.to_string(),
            timeout,
        },
        Some(e) if !deadline_elapsed => WhoisError::Io {
            resource: resource.to_string(),
            host: host.to_string(),
            source: e,
        },
        _ => WhoisError::ConnectTimeout {
            host: host.to_string(),
            timeout,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error, ErrorKind};
    use std::net::TcpListener;

    fn exchange(config: &ClientConfig) -> Exchange<'_> {
        Exchange {
            config,
            resource: "example.com",
            host: "127.0.0.1",
            port: 43,
        }
    }

    #[test]
    fn budget() {
        let timeout = Duration::from_millis(50);
        assert_eq!(
            connect_budget(timeout, Duration::ZERO),
            Budget::Remaining(timeout)
        );
        assert_eq!(
            connect_budget(timeout, Duration::from_millis(20)),
            Budget::Remaining(Duration::from_millis(30))
        );
        assert_eq!(
            connect_budget(timeout, Duration::from_millis(50)),
            Budget::Exhausted
        );
        assert_eq!(
            connect_budget(timeout, Duration::from_secs(3)),
            Budget::Exhausted
        );
        // No deadline at all
        assert_eq!(
            connect_budget(Duration::ZERO, Duration::ZERO),
            Budget::Unbounded
        );
        assert_eq!(
            connect_budget(Duration::ZERO, Duration::from_secs(3600)),
            Budget::Unbounded
        );
    }

    #[test]
    fn connect_falls_through_addresses() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind listener");
        let live = listener.local_addr().expect("local address");
        let dead = TcpListener::bind("127.0.0.1:0")
            .and_then(|l| l.local_addr())
            .expect("local address");
        for timeout in [Duration::ZERO, Duration::from_secs(5)] {
            let config = ClientConfig::default().with_connect_timeout(timeout);
            let stream = exchange(&config)
                .connect(&[dead, live])
                .expect("second address should connect");
            assert_eq!(stream.peer_addr().expect("peer address"), live);
        }
    }

    #[test]
    fn connect_refused_everywhere() {
        let dead = TcpListener::bind("127.0.0.1:0")
            .and_then(|l| l.local_addr())
            .expect("local address");
        let config = ClientConfig::default().with_connect_timeout(Duration::from_secs(5));
        let err = exchange(&config)
            .connect(&[dead])
            .expect_err("connection should be refused");
        assert!(matches!(
            err,
            WhoisError::Io { ref source, .. } if source.kind() == ErrorKind::ConnectionRefused
        ));
    }

    #[test]
    fn capped_multibyte_tail() {
        let utf8 = "Registrant: Soci\u{e9}t\u{e9}\r\n".as_bytes();
        let strict = ClientConfig::default().with_strict_decoding(true);
        let lenient = ClientConfig::default();
        for config in [&strict, &lenient] {
            // The cut lands between the two bytes of the first accent
            assert_eq!(
                exchange(config).decode(&utf8[..17], true).expect("valid prefix"),
                "Registrant: Soci"
            );
            assert_eq!(
                exchange(config).decode(&utf8[..18], true).expect("valid prefix"),
                "Registrant: Soci\u{e9}"
            );
        }
        // Without the cap the same tail is malformed
        assert!(exchange(&strict).decode(&utf8[..17], false).is_err());
        assert_eq!(
            exchange(&lenient).decode(&utf8[..17], false).expect("lenient"),
            "Registrant: Soci\u{fffd}"
        );
    }

    #[test]
    fn capped_malformed_body() {
        let config = ClientConfig::default().with_strict_decoding(true);
        let err = exchange(&config)
            .decode(b"Registrant: Soci\xe9t\xe9\r\n", true)
            .expect_err("malformed before the cut");
        assert!(matches!(
            err,
            WhoisError::Io { ref source, .. } if source.kind() == ErrorKind::InvalidData
        ));
    }

    #[test]
    fn timed_out_connect() {
        let err = connect_error(
            "example.com",
            "whois.example",
            Duration::from_millis(50),
            Some(Error::from(ErrorKind::TimedOut)),
            true,
        );
        assert!(matches!(
            err,
            WhoisError::ConnectTimeout { ref host, timeout }
                if host == "whois.example" && timeout == Duration::from_millis(50)
        ));
        assert_eq!(
            err.to_string(),
            "connection to whois.example timed out after 50 ms"
        );
    }

    #[test]
    fn deadline_exhausted() {
        // Earlier attempts consumed the whole budget
        let err = connect_error(
            "example.com",
            "whois.example",
            Duration::from_millis(50),
            None,
            true,
        );
        assert!(matches!(err, WhoisError::ConnectTimeout { .. }));
    }

    #[test]
    fn refused_connect() {
        let err = connect_error(
            "example.com",
            "whois.example",
            Duration::from_secs(15),
            Some(Error::from(ErrorKind::ConnectionRefused)),
            false,
        );
        assert!(matches!(
            err,
            WhoisError::Io { ref resource, ref host, ref source }
                if resource == "example.com"
                    && host == "whois.example"
                    && source.kind() == ErrorKind::ConnectionRefused
        ));
    }
}
