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

//! The contract between the benchmark driver and the transport carrying it.

use std::time::Instant;

use crate::Result;

/// Operations the driver needs from the transport connection it runs on.
///
/// Requests such as [`close()`] are not awaited: the transport acts on them
/// after the current event handler returns.
///
/// [`close()`]: Transport::close
pub trait Transport {
    /// Current monotonic time.
    fn now(&self) -> Instant;

    /// Time the connection was started.
    fn start_time(&self) -> Instant;

    /// Marks a stream as having (or no longer having) data to send. Active
    /// streams receive [`Event::PrepareToSend`] events.
    fn mark_active_stream(&mut self, stream_id: u64, active: bool) -> Result<()>;

    /// Priority hint, informational only.
    fn set_stream_priority(&mut self, stream_id: u64, priority: u8) -> Result<()>;

    /// Asks the peer to stop sending on a stream.
    fn stop_sending(&mut self, stream_id: u64, error_code: u64) -> Result<()>;

    /// Abruptly terminates the sending side of a stream.
    fn reset_stream(&mut self, stream_id: u64, error_code: u64) -> Result<()>;

    /// Closes the connection with an application error code.
    fn close(&mut self, error_code: u64) -> Result<()>;

    /// Requests path MTU discovery.
    fn set_pmtud_required(&mut self, required: bool);

    /// Stops delivering events to the driver.
    fn detach(&mut self);
}

/// Writable space handed out while preparing stream data.
pub trait SendBuffer {
    /// Returns a buffer of exactly `len` bytes that will be sent on the
    /// stream, with `fin` marking its end. `still_active` tells whether the
    /// stream has more to send later. Returns `None` when the transport
    /// cannot provide the space.
    fn provide(
        &mut self, len: usize, fin: bool, still_active: bool,
    ) -> Option<&mut [u8]>;
}

/// An event delivered by the transport.
pub enum Event<'a> {
    /// Data arrived on a stream.
    StreamData { stream_id: u64, data: &'a [u8] },

    /// The last data of a stream arrived.
    StreamFin { stream_id: u64, data: &'a [u8] },

    /// The transport can send up to `max_len` bytes on an active stream.
    PrepareToSend {
        stream_id: u64,
        max_len: usize,
        buf: &'a mut dyn SendBuffer,
    },

    /// The peer reset a stream.
    StreamReset { stream_id: u64 },

    /// The peer asked us to stop sending on a stream.
    StopSending { stream_id: u64 },

    /// The peer does not know the connection anymore.
    StatelessReset,

    /// The connection was closed.
    Close,

    /// The peer closed the connection with an application error code.
    ApplicationClose,

    /// The server proposed other versions.
    VersionNegotiation,

    /// Stream data was lost for good.
    StreamGap { stream_id: u64 },

    /// The handshake is almost complete.
    AlmostReady,

    /// The connection is ready to carry streams.
    Ready,

    /// The transport asks for the list of supported ALPN values.
    RequestAlpnList,

    /// The transport reports the negotiated ALPN.
    SetAlpn,
}

impl Event<'_> {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Event::StreamData { .. } => "stream_data",
            Event::StreamFin { .. } => "stream_fin",
            Event::PrepareToSend { .. } => "prepare_to_send",
            Event::StreamReset { .. } => "stream_reset",
            Event::StopSending { .. } => "stop_sending",
            Event::StatelessReset => "stateless_reset",
            Event::Close => "close",
            Event::ApplicationClose => "application_close",
            Event::VersionNegotiation => "version_negotiation",
            Event::StreamGap { .. } => "stream_gap",
            Event::AlmostReady => "almost_ready",
            Event::Ready => "ready",
            Event::RequestAlpnList => "request_alpn_list",
            Event::SetAlpn => "set_alpn",
        }
    }
}
