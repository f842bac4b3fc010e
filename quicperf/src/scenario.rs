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

//! Benchmark scenario descriptions.
//!
//! A scenario is a `;`-separated list of stream records:
//!
//! ```text
//! d[*repeat]:stream_id:previous_stream_id:post_size:response_size
//! t[*repeat]:stream_id:previous_stream_id:duration
//! ```
//!
//! `stream_id`, `previous_stream_id` and `post_size` may be left empty or
//! written as `-0` to select their default. A `response_size` written with a
//! leading `-` asks the server for an unbounded response that the client
//! stops once that many bytes arrived. Durations take a `s`, `ms` or `us`
//! suffix.

use std::time::Duration;

use serde::Serialize;

use crate::ParseError;
use crate::ParseErrorKind;

/// The largest stream ID representable in QUIC.
pub const MAX_STREAM_ID: u64 = (1 << 62) - 1;

/// Distance between two client-initiated bidirectional stream IDs.
pub const STREAM_ID_INCREMENT: u64 = 4;

const FIRST_STREAM_ID: u64 = 0;

type ParseResult<T> = std::result::Result<T, ParseError>;

/// What bounds a stream transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum StreamKind {
    /// Bounded by the `post_size` and `response_size` byte counts.
    Data,

    /// Bounded by the time elapsed since the stream was activated.
    Time,
}

/// One record of a scenario.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StreamDescriptor {
    pub kind: StreamKind,

    /// Number of sibling streams started from this record, spaced by
    /// [`STREAM_ID_INCREMENT`].
    pub repeat_count: u64,

    pub stream_id: u64,

    /// The stream whose completion starts this one, or `None` to start when
    /// the connection becomes ready.
    pub previous_stream_id: Option<u64>,

    pub post_size: u64,

    pub response_size: u64,

    /// Set when the response size was written as a negative number.
    pub is_infinite: bool,

    pub duration: Duration,
}

/// Parses a scenario.
///
/// Parsing is all-or-nothing: the first malformed record fails the whole
/// scenario. Empty (or blank) text is a valid scenario without streams.
pub fn parse(text: &str) -> ParseResult<Vec<StreamDescriptor>> {
    let expected = count_records(text);

    let mut scenario = Vec::with_capacity(expected);

    let mut cur = Cursor::new(text.as_bytes());

    let mut default_stream = FIRST_STREAM_ID;
    let mut default_previous = None;

    loop {
        cur.skip_spaces();

        if cur.peek().is_none() {
            break;
        }

        let desc = parse_record(&mut cur, default_stream, default_previous)?;

        let span = STREAM_ID_INCREMENT.saturating_mul(desc.repeat_count);

        default_stream = desc.stream_id.saturating_add(span);
        default_previous = Some(desc.stream_id);

        scenario.push(desc);

        if scenario.len() > expected {
            return Err(cur.error(ParseErrorKind::CountMismatch));
        }
    }

    if scenario.len() != expected {
        return Err(cur.error(ParseErrorKind::CountMismatch));
    }

    Ok(scenario)
}

/// Counts the `;`-separated segments that hold something else than blanks.
fn count_records(text: &str) -> usize {
    text.split(';')
        .filter(|segment| segment.bytes().any(|b| !is_space(b)))
        .count()
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r')
}

fn parse_record(
    cur: &mut Cursor, default_stream: u64, default_previous: Option<u64>,
) -> ParseResult<StreamDescriptor> {
    cur.skip_spaces();

    let kind = match cur.peek() {
        Some(b'd') | Some(b'D') => StreamKind::Data,
        Some(b't') | Some(b'T') => StreamKind::Time,
        _ => return Err(cur.error(ParseErrorKind::InvalidType)),
    };

    cur.bump();
    cur.skip_spaces();

    let repeat_count = if cur.eat(b'*') {
        cur.skip_spaces();

        let n = cur.number(false)?;
        if !n.present || n.value == 0 {
            return Err(cur.error(ParseErrorKind::InvalidRepeat));
        }

        n.value
    } else {
        1
    };

    let stream_id = cur.stream_id_field()?.unwrap_or(default_stream);
    if stream_id > MAX_STREAM_ID {
        return Err(cur.error(ParseErrorKind::InvalidStreamId));
    }

    let previous_stream_id = match cur.stream_id_field()? {
        Some(id) => Some(id),
        None => default_previous,
    };

    let mut desc = StreamDescriptor {
        kind,
        repeat_count,
        stream_id,
        previous_stream_id,
        post_size: 0,
        response_size: 0,
        is_infinite: false,
        duration: Duration::ZERO,
    };

    match kind {
        StreamKind::Data => {
            cur.expect_colon()?;

            let post = cur.number(true)?;
            if post.negative && post.value != 0 {
                return Err(cur.error(ParseErrorKind::NegativeValue));
            }
            desc.post_size = post.value;

            cur.expect_colon()?;

            let response = cur.number(true)?;
            if !response.present {
                return Err(cur.error(ParseErrorKind::MissingField));
            }
            desc.response_size = response.value;
            desc.is_infinite = response.negative;
        },

        StreamKind::Time => {
            cur.expect_colon()?;

            if cur.peek() == Some(b'-') {
                return Err(cur.error(ParseErrorKind::NegativeValue));
            }

            let n = cur.number(false)?;
            if !n.present {
                return Err(cur.error(ParseErrorKind::MissingField));
            }

            desc.duration = cur.duration_unit(n.value)?;
        },
    }

    cur.skip_spaces();

    match cur.peek() {
        None => (),
        Some(b';') => cur.bump(),
        Some(_) => return Err(cur.error(ParseErrorKind::TrailingData)),
    }

    Ok(desc)
}

struct Number {
    present: bool,
    negative: bool,
    value: u64,
}

struct Cursor<'a> {
    b: octets::Octets<'a>,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Cursor {
            b: octets::Octets::with_slice(buf),
        }
    }

    fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError::new(self.b.off(), kind)
    }

    fn peek(&mut self) -> Option<u8> {
        self.b.peek_u8().ok()
    }

    fn bump(&mut self) {
        let _ = self.b.skip(1);
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.bump();
            return true;
        }

        false
    }

    fn skip_spaces(&mut self) {
        while self.peek().is_some_and(is_space) {
            self.bump();
        }
    }

    fn expect_colon(&mut self) -> ParseResult<()> {
        self.skip_spaces();

        if !self.eat(b':') {
            return Err(self.error(ParseErrorKind::MissingField));
        }

        self.skip_spaces();

        Ok(())
    }

    /// Reads an optional, possibly signed, decimal number. A sign alone (as
    /// in `-0` minus its digit) counts as present.
    fn number(&mut self, signed: bool) -> ParseResult<Number> {
        let mut n = Number {
            present: false,
            negative: false,
            value: 0,
        };

        if signed && self.eat(b'-') {
            n.present = true;
            n.negative = true;
        }

        while let Some(c) = self.peek().filter(u8::is_ascii_digit) {
            n.value = n
                .value
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(c - b'0')))
                .ok_or_else(|| self.error(ParseErrorKind::InvalidNumber))?;
            n.present = true;

            self.bump();
        }

        self.skip_spaces();

        Ok(n)
    }

    /// Reads a `:stream_id` field. Returns `None` when the default applies.
    fn stream_id_field(&mut self) -> ParseResult<Option<u64>> {
        self.expect_colon()?;

        let n = self.number(true)?;

        if !n.present {
            return Ok(None);
        }

        if n.negative {
            if n.value != 0 {
                return Err(self.error(ParseErrorKind::NegativeValue));
            }

            return Ok(None);
        }

        if n.value > MAX_STREAM_ID {
            return Err(self.error(ParseErrorKind::InvalidStreamId));
        }

        Ok(Some(n.value))
    }

    fn duration_unit(&mut self, value: u64) -> ParseResult<Duration> {
        let multiplier = if self.eat(b's') {
            1_000_000
        } else if self.eat(b'm') {
            if !self.eat(b's') {
                return Err(self.error(ParseErrorKind::InvalidUnit));
            }

            1_000
        } else if self.eat(b'u') {
            if !self.eat(b's') {
                return Err(self.error(ParseErrorKind::InvalidUnit));
            }

            1
        } else {
            return Err(self.error(ParseErrorKind::InvalidUnit));
        };

        let micros = value
            .checked_mul(multiplier)
            .ok_or_else(|| self.error(ParseErrorKind::InvalidNumber))?;

        Ok(Duration::from_micros(micros))
    }
}
