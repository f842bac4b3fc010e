// Copyright (C) 2024, Cloudflare, Inc.
// All rights reserved.
//
// Redistribution and use in source and binary forms, with or without
// modification, are permitted provided that the following conditions are
// met:
//
//     * Redistributions of source code must retain the above copyright notice,
//       this list of conditions and the following disclaimer.
//
//     * Redistributions in binary form must reproduce the above copyright
//       notice, this list of conditions and the following disclaimer in the
//       documentation and/or other materials provided with the distribution.
//
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS "AS
// IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED TO,
// THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A PARTICULAR
// PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER OR
// CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL,
// EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO,
// PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR
// PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF
// LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING
// NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE OF THIS
// SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.

/// A specialized [`Result`] type for quicperf operations.
///
/// [`Result`]: https://doc.rust-lang.org/std/result/enum.Result.html
pub type Result<T> = std::result::Result<T, Error>;

/// A quicperf error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The scenario text could not be parsed.
    InvalidScenario(ParseError),

    /// An event referenced a stream the registry does not know.
    ///
    /// The stream ID is provided as associated data.
    UnknownStream(u64),

    /// A stream was activated twice.
    ///
    /// The stream ID is provided as associated data.
    DuplicateStream(u64),

    /// The scenario did not produce any stream to start the connection with.
    NoRunnableStreams,

    /// The transport could not provide a send buffer.
    ///
    /// The stream ID is provided as associated data.
    BufferUnavailable(u64),

    /// The peer finished a stream before sending the promised bytes.
    ///
    /// The stream ID is provided as associated data.
    NotEnoughDataSent(u64),

    /// The peer sent more bytes than promised on a stream.
    ///
    /// The stream ID is provided as associated data.
    TooMuchDataSent(u64),

    /// The server asked the client to stop sending, which the protocol does
    /// not allow.
    ///
    /// The stream ID is provided as associated data.
    UnexpectedStopSending(u64),

    /// The connection context was already detached from its transport.
    InvalidState,

    /// The transport rejected an operation.
    Transport,

    /// Error in congestion control.
    CongestionControl,
}

/// Application error codes carried by connection close frames.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u64)]
pub enum PerfErrorCode {
    /// The benchmark completed.
    NoError           = 0,
    /// The requested feature is not implemented.
    NotImplemented    = 1,
    /// The endpoint failed for reasons unrelated to the peer.
    InternalError     = 2,
    /// The peer finished a stream early.
    NotEnoughDataSent = 3,
    /// The peer sent more data than requested.
    TooMuchDataSent   = 4,
}

impl Error {
    /// Returns the application error code used to close the connection.
    pub fn to_app_code(self) -> u64 {
        let code = match self {
            Error::NotEnoughDataSent(_) => PerfErrorCode::NotEnoughDataSent,
            Error::TooMuchDataSent(_) => PerfErrorCode::TooMuchDataSent,
            Error::CongestionControl => PerfErrorCode::NotImplemented,

            Error::InvalidScenario(_) |
            Error::UnknownStream(_) |
            Error::DuplicateStream(_) |
            Error::NoRunnableStreams |
            Error::BufferUnavailable(_) |
            Error::UnexpectedStopSending(_) |
            Error::InvalidState |
            Error::Transport => PerfErrorCode::InternalError,
        };

        code as u64
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InvalidScenario(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::InvalidScenario(err)
    }
}

/// Why a scenario record was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The record does not start with `d` or `t`.
    InvalidType,

    /// A number is malformed or does not fit in 64 bits.
    InvalidNumber,

    /// A stream ID does not fit in the 62-bit stream ID space.
    InvalidStreamId,

    /// A negative value other than `-0` was given where it is not allowed.
    NegativeValue,

    /// The repeat count is missing or zero.
    InvalidRepeat,

    /// A required field is empty or missing.
    MissingField,

    /// The duration unit is not one of `s`, `ms` or `us`.
    InvalidUnit,

    /// Unexpected characters follow the last field of a record.
    TrailingData,

    /// The number of parsed records does not match the number of segments.
    CountMismatch,
}

/// A scenario parsing failure, with the byte offset it was detected at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParseError {
    pub offset: usize,
    pub kind: ParseErrorKind,
}

impl ParseError {
    pub(crate) fn new(offset: usize, kind: ParseErrorKind) -> Self {
        ParseError { offset, kind }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:?} at offset {}", self.kind, self.offset)
    }
}

impl std::error::Error for ParseError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_codes() {
        assert_eq!(Error::NotEnoughDataSent(0).to_app_code(), 3);
        assert_eq!(Error::TooMuchDataSent(4).to_app_code(), 4);
        assert_eq!(Error::UnexpectedStopSending(0).to_app_code(), 2);
        assert_eq!(Error::NoRunnableStreams.to_app_code(), 2);
        assert_eq!(PerfErrorCode::NoError as u64, 0);
    }

    #[test]
    fn parse_error_display() {
        let err = Error::from(ParseError::new(7, ParseErrorKind::InvalidUnit));

        assert_eq!(
            err.to_string(),
            "InvalidScenario(ParseError { offset: 7, kind: InvalidUnit })"
        );
        assert!(std::error::Error::source(&err).is_some());
    }
}
