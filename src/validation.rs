//! Validators for user supplied configuration values
use crate::error::ValidationError;
use regex::{Regex, RegexBuilder};

/// Checks that a port fits in the 0-65535 inclusive range
pub fn validate_port(port: impl Into<i64>) -> Result<u16, ValidationError> {
    let port = port.into();
    u16::try_from(port).map_err(|_| ValidationError::PortOutOfRange(port))
}

/// Validates and compiles a line oriented extraction pattern
///
/// The pattern must start with `^`, end with `$` and expose exactly two capture
/// groups: the first one yields the field name and the second one the value.
///
/// Compilation is multi-line (anchors match at every line boundary) and CRLF
/// aware, so `$` matches before a `\r\n` terminator and `.` never eats the `\r`.
pub fn validate_pattern(pattern: &str) -> Result<Regex, ValidationError> {
    if !pattern.starts_with('^') {
        return Err(ValidationError::MissingStartAnchor);
    }
    if !pattern.ends_with('$') {
        return Err(ValidationError::MissingEndAnchor);
    }
    let compiled = RegexBuilder::new(pattern)
        .multi_line(true)
        .crlf(true)
        .build()?;
    // Group 0 is the implicit whole match
    let groups = compiled.captures_len() - 1;
    if groups != 2 {
        return Err(ValidationError::CaptureGroups(groups));
    }
    Ok(compiled)
}
