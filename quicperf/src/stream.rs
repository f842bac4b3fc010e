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

//! Per-stream benchmark state and the registry indexing it by stream ID.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::time::Duration;
use std::time::Instant;

use crate::scenario::StreamDescriptor;
use crate::scenario::StreamKind;
use crate::Error;
use crate::Result;

/// Size of the header that opens every client post.
pub const LENGTH_HEADER_LEN: usize = 8;

/// Header value asking the server for an unbounded response.
pub const UNBOUNDED_LENGTH_HEADER: [u8; LENGTH_HEADER_LEN] =
    [0xff; LENGTH_HEADER_LEN];

/// Byte used to fill every payload byte after the header.
pub const FILLER_BYTE: u8 = 0x30;

/// Encodes the response size requested by a client. `None` asks for an
/// unbounded response.
pub fn encode_length_header(
    response_size: Option<u64>,
) -> [u8; LENGTH_HEADER_LEN] {
    let mut header = UNBOUNDED_LENGTH_HEADER;

    if let Some(size) = response_size {
        let mut b = octets::OctetsMut::with_slice(&mut header);

        // The header buffer always holds a u64.
        let _ = b.put_u64(size);
    }

    header
}

/// Decodes a length header. Returns `None` for the unbounded marker.
pub fn decode_length_header(header: &[u8; LENGTH_HEADER_LEN]) -> Option<u64> {
    let mut b = octets::Octets::with_slice(header);

    match b.get_u64() {
        Ok(u64::MAX) | Err(_) => None,
        Ok(size) => Some(size),
    }
}

/// Runtime state of one benchmark stream.
///
/// The same structure serves both roles. `post_*` counters track the bytes
/// flowing from client to server, `response_*` the bytes flowing back.
#[derive(Debug)]
pub struct PerfStream {
    pub(crate) stream_id: u64,

    pub(crate) kind: StreamKind,

    pub(crate) length_header: [u8; LENGTH_HEADER_LEN],

    /// Known from the scenario on the client, unknown on the server.
    pub(crate) post_size: u64,

    /// Sent on the client, received on the server.
    pub(crate) bytes_posted: u64,

    /// From the scenario on the client, from the header on the server.
    pub(crate) response_size: u64,

    /// Received on the client, sent on the server.
    pub(crate) bytes_responded: u64,

    pub(crate) duration: Duration,

    pub(crate) stop_for_fin: bool,

    pub(crate) is_stopped: bool,

    pub(crate) is_closed: bool,

    /// Activation (client) or first byte received (server).
    pub(crate) post_time: Option<Instant>,

    /// Last byte sent (client) or received (server).
    pub(crate) post_fin_time: Option<Instant>,

    /// First byte received (client) or response activation (server).
    pub(crate) response_time: Option<Instant>,

    /// Last byte received (client) or sent (server).
    pub(crate) response_fin_time: Option<Instant>,

    pub(crate) last_report_time: Option<Instant>,

    pub(crate) last_csv_time: Option<Instant>,
}

impl PerfStream {
    fn new(stream_id: u64) -> Self {
        PerfStream {
            stream_id,
            kind: StreamKind::Data,
            length_header: [0; LENGTH_HEADER_LEN],
            post_size: 0,
            bytes_posted: 0,
            response_size: 0,
            bytes_responded: 0,
            duration: Duration::ZERO,
            stop_for_fin: false,
            is_stopped: false,
            is_closed: false,
            post_time: None,
            post_fin_time: None,
            response_time: None,
            response_fin_time: None,
            last_report_time: None,
            last_csv_time: None,
        }
    }

    /// Resolves the client-side sizes of a stream started from `desc`.
    pub(crate) fn configure(&mut self, desc: &StreamDescriptor) {
        self.kind = desc.kind;

        match desc.kind {
            StreamKind::Data => {
                self.post_size = desc.post_size;
                self.response_size = desc.response_size;
            },

            StreamKind::Time => {
                self.duration = desc.duration;
                self.response_size = 0;
            },
        }

        if desc.is_infinite {
            self.stop_for_fin = true;
            self.length_header = encode_length_header(None);
        } else {
            self.length_header = encode_length_header(Some(self.response_size));
        }
    }

    pub fn stream_id(&self) -> u64 {
        self.stream_id
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn bytes_posted(&self) -> u64 {
        self.bytes_posted
    }

    pub fn bytes_responded(&self) -> u64 {
        self.bytes_responded
    }

    pub fn response_size(&self) -> u64 {
        self.response_size
    }

    pub fn is_stopped(&self) -> bool {
        self.is_stopped
    }

    pub fn is_closed(&self) -> bool {
        self.is_closed
    }

    /// Time elapsed since the stream started, zero before that.
    pub(crate) fn uptime(&self, now: Instant) -> Duration {
        self.post_time
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or_default()
    }
}

/// Live streams of a connection, ordered by stream ID.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: BTreeMap<u64, PerfStream>,
}

impl StreamRegistry {
    pub fn find(&self, stream_id: u64) -> Option<&PerfStream> {
        self.streams.get(&stream_id)
    }

    pub fn find_mut(&mut self, stream_id: u64) -> Option<&mut PerfStream> {
        self.streams.get_mut(&stream_id)
    }

    /// Inserts an empty stream. Fails if the ID is already live.
    pub fn insert(&mut self, stream_id: u64) -> Result<&mut PerfStream> {
        match self.streams.entry(stream_id) {
            btree_map::Entry::Vacant(v) =>
                Ok(v.insert(PerfStream::new(stream_id))),

            btree_map::Entry::Occupied(_) =>
                Err(Error::DuplicateStream(stream_id)),
        }
    }

    pub fn remove(&mut self, stream_id: u64) -> Option<PerfStream> {
        self.streams.remove(&stream_id)
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PerfStream> {
        self.streams.values()
    }

    /// Removes every stream matching `f`, returning how many were removed.
    pub fn remove_if<F>(&mut self, mut f: F) -> usize
    where
        F: FnMut(&PerfStream) -> bool,
    {
        let before = self.streams.len();

        self.streams.retain(|_, s| !f(s));

        before - self.streams.len()
    }

    pub fn clear(&mut self) {
        self.streams.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_header_round_trip() {
        for size in [0, 1, 255, 256, 1_000_000, u64::MAX - 1] {
            let header = encode_length_header(Some(size));
            assert_eq!(decode_length_header(&header), Some(size));
        }

        assert_eq!(
            encode_length_header(Some(0x0102_0304_0506_0708)),
            [1, 2, 3, 4, 5, 6, 7, 8]
        );
    }

    #[test]
    fn unbounded_length_header() {
        let header = encode_length_header(None);

        assert_eq!(header, UNBOUNDED_LENGTH_HEADER);
        assert_eq!(decode_length_header(&header), None);
    }

    #[test]
    fn configure_from_descriptor() {
        let scenario = crate::scenario::parse("d:0:-0:10:-300;t:4:0:2s").unwrap();

        let mut s = PerfStream::new(0);
        s.configure(&scenario[0]);
        assert!(s.stop_for_fin);
        assert_eq!(s.response_size, 300);
        assert_eq!(s.length_header, UNBOUNDED_LENGTH_HEADER);

        let mut s = PerfStream::new(4);
        s.configure(&scenario[1]);
        assert!(!s.stop_for_fin);
        assert_eq!(s.kind, StreamKind::Time);
        assert_eq!(s.duration, Duration::from_secs(2));
        assert_eq!(decode_length_header(&s.length_header), Some(0));
    }

    #[test]
    fn registry_insert_find_remove() {
        let mut reg = StreamRegistry::default();
        assert!(reg.is_empty());

        reg.insert(8).unwrap().post_size = 10;
        reg.insert(0).unwrap();
        reg.insert(4).unwrap();

        assert_eq!(reg.insert(4).unwrap_err(), Error::DuplicateStream(4));
        assert_eq!(reg.len(), 3);
        assert_eq!(reg.find(8).map(|s| s.post_size), Some(10));
        assert!(reg.find(12).is_none());

        let ids: Vec<_> = reg.iter().map(|s| s.stream_id()).collect();
        assert_eq!(ids, vec![0, 4, 8]);

        assert_eq!(reg.remove(4).map(|s| s.stream_id()), Some(4));
        assert!(reg.remove(4).is_none());
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn registry_remove_while_iterating() {
        let mut reg = StreamRegistry::default();

        for id in (0..40).step_by(4) {
            reg.insert(id).unwrap().is_closed = id % 8 == 0;
        }

        assert_eq!(reg.remove_if(|s| s.is_closed()), 5);
        assert!(reg.iter().all(|s| !s.is_closed()));

        reg.clear();
        assert!(reg.is_empty());
    }
}
