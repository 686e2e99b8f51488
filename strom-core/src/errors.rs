// Strom
// Copyright (c) 2026 The Project Strom Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `errors` module defines the common error type and the structured diagnostic model.
//!
//! `Error` is the internal, `Result`-shaped error used between modules. `Diagnostic` is the
//! user-facing record of what went wrong (or was merely suspicious) while decoding a stream;
//! diagnostics are collected rather than propagated so that decoding can continue past
//! recoverable problems.

use std::error::Error as StdError;
use std::fmt;
use std::result;

/// `Error` provides an enumeration of all possible errors reported by Strom.
#[derive(Debug)]
pub enum Error {
    /// The stream contained malformed data and could not be decoded.
    DecodeError(&'static str),
    /// An unsupported container or codec feature was encountered.
    Unsupported(&'static str),
    /// A default or user-defined limit was reached while decoding the stream. Limits are used to
    /// prevent denial-of-service attacks from malicious streams.
    LimitError(&'static str),
    /// Not enough bytes are buffered to complete the operation. The caller should provide more
    /// input and retry.
    Underrun,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Error::DecodeError(msg) => {
                write!(f, "malformed stream: {}", msg)
            }
            Error::Unsupported(feature) => {
                write!(f, "unsupported feature: {}", feature)
            }
            Error::LimitError(constraint) => {
                write!(f, "limit reached: {}", constraint)
            }
            Error::Underrun => {
                write!(f, "buffer underrun")
            }
        }
    }
}

impl StdError for Error {}

pub type Result<T> = result::Result<T, Error>;

/// Convenience function to create a decode error.
pub fn decode_error<T>(desc: &'static str) -> Result<T> {
    Err(Error::DecodeError(desc))
}

/// Convenience function to create an unsupported feature error.
pub fn unsupported_error<T>(feature: &'static str) -> Result<T> {
    Err(Error::Unsupported(feature))
}

/// Convenience function to create a limit error.
pub fn limit_error<T>(constraint: &'static str) -> Result<T> {
    Err(Error::LimitError(constraint))
}

/// Convenience function to create an underrun error.
pub fn underrun_error<T>() -> Result<T> {
    Err(Error::Underrun)
}

/// The severity of a [`Diagnostic`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    /// The stream deviates from the specification, but decoding can continue.
    Warning,
    /// The stream is damaged. Decoding may or may not be able to continue.
    Error,
}

/// A machine-readable classification of a [`Diagnostic`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DiagnosticCode {
    /// The stream is not a RIFF/RIFX WAVE container.
    InvalidContainer,
    /// The format chunk is missing, too small, or semantically impossible.
    InvalidFmt,
    /// A known but unsupported format tag or bit depth.
    UnsupportedFormat,
    /// Chunks appeared in an order the container forbids.
    OrderingViolation,
    /// The stream ended before the declared data was received.
    Truncated,
    /// A declared value disagrees with the observed stream; the observed value wins.
    AdvisoryMismatch,
    /// A non-essential chunk was skipped.
    RecoverableChunkSkip,
    /// Input exceeded the internal buffer capacity without being consumable.
    RingOverflow,
}

/// A structured diagnostic produced while decoding.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    /// Whether the diagnostic is a warning or an error.
    pub severity: Severity,
    /// The machine-readable classification.
    pub code: DiagnosticCode,
    /// A human-readable description.
    pub message: String,
    /// The absolute stream offset the diagnostic refers to.
    pub byte_offset: u64,
}

impl Diagnostic {
    pub fn warning(code: DiagnosticCode, message: impl Into<String>, byte_offset: u64) -> Self {
        Diagnostic { severity: Severity::Warning, code, message: message.into(), byte_offset }
    }

    pub fn error(code: DiagnosticCode, message: impl Into<String>, byte_offset: u64) -> Self {
        Diagnostic { severity: Severity::Error, code, message: message.into(), byte_offset }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{} at byte {}: {}", severity, self.byte_offset, self.message)
    }
}

/// `DiagnosticLog` accumulates the warnings and errors emitted over the life of a decoder.
///
/// Warnings never affect decoder state. Errors may be fatal, in which case the log latches the
/// fatal flag and the owner is expected to stop decoding.
#[derive(Debug, Default)]
pub struct DiagnosticLog {
    warnings: Vec<Diagnostic>,
    errors: Vec<Diagnostic>,
    fatal: bool,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Default::default()
    }

    /// Record a warning.
    pub fn warn(&mut self, code: DiagnosticCode, message: impl Into<String>, byte_offset: u64) {
        let diag = Diagnostic::warning(code, message, byte_offset);
        log::warn!("{}", diag);
        self.warnings.push(diag);
    }

    /// Record a non-fatal error. Decoding may continue.
    pub fn error(&mut self, code: DiagnosticCode, message: impl Into<String>, byte_offset: u64) {
        let diag = Diagnostic::error(code, message, byte_offset);
        log::error!("{}", diag);
        self.errors.push(diag);
    }

    /// Record a fatal error and latch the fatal flag.
    pub fn fatal(&mut self, code: DiagnosticCode, message: impl Into<String>, byte_offset: u64) {
        self.error(code, message, byte_offset);
        self.fatal = true;
    }

    /// Returns true if a fatal error has been recorded.
    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    pub fn errors(&self) -> &[Diagnostic] {
        &self.errors
    }

    /// Forget all recorded diagnostics and clear the fatal flag.
    pub fn clear(&mut self) {
        self.warnings.clear();
        self.errors.clear();
        self.fatal = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_latch() {
        let mut log = DiagnosticLog::new();

        log.warn(DiagnosticCode::AdvisoryMismatch, "declared size is off", 12);
        assert!(!log.is_fatal());

        log.error(DiagnosticCode::Truncated, "stream ended early", 40);
        assert!(!log.is_fatal());

        log.fatal(DiagnosticCode::InvalidContainer, "not a wave file", 0);
        assert!(log.is_fatal());

        assert_eq!(log.warnings().len(), 1);
        assert_eq!(log.errors().len(), 2);

        log.clear();
        assert!(!log.is_fatal());
        assert!(log.errors().is_empty());
    }
}
