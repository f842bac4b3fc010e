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

//! In-memory loopback transport.
//!
//! A [`Pipe`] connects a client and a server [`PerfContext`] over a simple
//! bottleneck link. Time advances in rounds of one RTT: each round, both
//! endpoints send up to their congestion window in MTU sized frames, the
//! frames are delivered, and each sender's congestion controller receives an
//! RTT sample and an acknowledgement for what it sent. A round sending more
//! than the link can hold (its bandwidth-delay product plus the bottleneck
//! buffer) is cut at that limit and reported to the controller as a loss.

use std::collections::BTreeSet;
use std::time::Duration;
use std::time::Instant;

use crate::recovery::new_controller;
use crate::recovery::AckState;
use crate::recovery::CongestionControl;
use crate::recovery::CongestionPath;
use crate::recovery::Notification;
use crate::recovery::Pacing;
use crate::recovery::Phase;
use crate::transport::Event;
use crate::transport::SendBuffer;
use crate::transport::Transport;
use crate::Config;
use crate::Error;
use crate::PerfContext;
use crate::PerfSummary;
use crate::Result;
use crate::Role;

/// Characteristics of the bottleneck link, identical in both directions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkConfig {
    /// Round trip time of an empty link.
    pub rtt: Duration,

    /// Bytes per second.
    pub bandwidth: u64,

    /// Bytes the bottleneck can queue beyond the bandwidth-delay product.
    pub buffer: u64,

    pub mtu: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        LinkConfig::new(Duration::from_millis(100), 1_250_000)
    }
}

impl LinkConfig {
    /// Creates a link buffering one bandwidth-delay product.
    pub fn new(rtt: Duration, bandwidth: u64) -> Self {
        let mut link = LinkConfig {
            rtt,
            bandwidth,
            buffer: 0,
            mtu: 1440,
        };

        link.buffer = link.bdp();

        link
    }

    /// Bandwidth-delay product in bytes.
    pub fn bdp(&self) -> u64 {
        (self.bandwidth as u128 * self.rtt.as_micros() / 1_000_000) as u64
    }

    /// Bytes one round can carry without loss.
    fn capacity(&self) -> u64 {
        (self.bdp() + self.buffer).max(self.mtu)
    }

    /// RTT seen by `bytes` sent in one round, including queueing delay.
    fn rtt_sample(&self, bytes: u64) -> Duration {
        let queued = bytes.saturating_sub(self.bdp());

        if self.bandwidth == 0 {
            return self.rtt;
        }

        self.rtt +
            Duration::from_micros(
                (queued as u128 * 1_000_000 / self.bandwidth as u128) as u64,
            )
    }

    fn packet_time(&self) -> Duration {
        if self.bandwidth == 0 {
            return Duration::ZERO;
        }

        Duration::from_micros(
            (self.mtu as u128 * 1_000_000 / self.bandwidth as u128) as u64,
        )
    }
}

/// Path state of one sending direction.
#[derive(Debug)]
struct SimPath {
    smoothed_rtt: Duration,
    min_rtt: Duration,
    has_rtt_sample: bool,
    peak_bandwidth: u64,
    mtu: u64,
    packet_time: Duration,
    last_acked_sent: Option<Instant>,
    last_sender_limited: Option<Instant>,
    next_pkt: u64,
    highest_acknowledged: u64,
    ack_sent_time: Option<Instant>,
    cwin: u64,
    ssthresh_initialized: bool,
    pacing: Option<Pacing>,
}

impl SimPath {
    fn new(link: &LinkConfig) -> Self {
        SimPath {
            smoothed_rtt: link.rtt,
            min_rtt: link.rtt,
            has_rtt_sample: false,
            peak_bandwidth: 0,
            mtu: link.mtu,
            packet_time: link.packet_time(),
            last_acked_sent: None,
            last_sender_limited: None,
            next_pkt: 0,
            highest_acknowledged: 0,
            ack_sent_time: None,
            cwin: 0,
            ssthresh_initialized: false,
            pacing: None,
        }
    }

    fn update_rtt(&mut self, sample: Duration) {
        if !self.has_rtt_sample {
            self.smoothed_rtt = sample;
            self.min_rtt = sample;
            self.has_rtt_sample = true;
            return;
        }

        self.smoothed_rtt = self.smoothed_rtt * 7 / 8 + sample / 8;
        self.min_rtt = self.min_rtt.min(sample);
    }
}

impl CongestionPath for SimPath {
    fn smoothed_rtt(&self) -> Duration {
        self.smoothed_rtt
    }

    fn min_rtt(&self) -> Duration {
        self.min_rtt
    }

    fn peak_bandwidth_estimate(&self) -> u64 {
        self.peak_bandwidth
    }

    fn send_mtu(&self) -> u64 {
        self.mtu
    }

    fn last_time_acked_data_frame_sent(&self) -> Option<Instant> {
        self.last_acked_sent
    }

    fn last_sender_limited_time(&self) -> Option<Instant> {
        self.last_sender_limited
    }

    fn sequence_number(&self) -> u64 {
        self.next_pkt
    }

    fn highest_acknowledged(&self) -> u64 {
        self.highest_acknowledged
    }

    fn ack_sent_time(&self) -> Option<Instant> {
        self.ack_sent_time
    }

    fn is_multipath_enabled(&self) -> bool {
        false
    }

    fn is_time_stamp_enabled(&self) -> bool {
        false
    }

    fn packet_time(&self) -> Duration {
        self.packet_time
    }

    fn set_cwin(&mut self, cwin: u64) {
        self.cwin = cwin;
    }

    fn set_ssthresh_initialized(&mut self) {
        self.ssthresh_initialized = true;
    }

    fn set_cc_data_updated(&mut self) {}

    fn set_pacing(&mut self, pacing: Option<Pacing>) {
        self.pacing = pacing;
    }
}

/// Transport side of one endpoint, recording what the driver asks for.
#[derive(Debug)]
pub struct SimTransport {
    now: Instant,

    start_time: Instant,

    /// Streams with data to send, in stream ID order.
    active: BTreeSet<u64>,

    /// Stop-sending requests waiting to be relayed to the peer.
    stop_sending: Vec<u64>,

    /// Resets waiting to be relayed to the peer.
    resets: Vec<u64>,

    /// Streams the peer reset, answered without echoing the reset back.
    peer_resets: BTreeSet<u64>,

    /// Streams whose incoming data is discarded after a stop-sending.
    receive_stopped: BTreeSet<u64>,

    close_code: Option<u64>,

    pmtud_required: bool,

    detached: bool,
}

impl SimTransport {
    fn new(now: Instant) -> Self {
        SimTransport {
            now,
            start_time: now,
            active: BTreeSet::new(),
            stop_sending: Vec::new(),
            resets: Vec::new(),
            peer_resets: BTreeSet::new(),
            receive_stopped: BTreeSet::new(),
            close_code: None,
            pmtud_required: false,
            detached: false,
        }
    }

    /// The application error code this endpoint closed the connection with.
    pub fn close_code(&self) -> Option<u64> {
        self.close_code
    }

    pub fn is_pmtud_required(&self) -> bool {
        self.pmtud_required
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }

    pub fn is_active(&self, stream_id: u64) -> bool {
        self.active.contains(&stream_id)
    }
}

impl Transport for SimTransport {
    fn now(&self) -> Instant {
        self.now
    }

    fn start_time(&self) -> Instant {
        self.start_time
    }

    fn mark_active_stream(&mut self, stream_id: u64, active: bool) -> Result<()> {
        if active {
            self.active.insert(stream_id);
        } else {
            self.active.remove(&stream_id);
        }

        Ok(())
    }

    fn set_stream_priority(
        &mut self, _stream_id: u64, _priority: u8,
    ) -> Result<()> {
        Ok(())
    }

    fn stop_sending(&mut self, stream_id: u64, _error_code: u64) -> Result<()> {
        if self.receive_stopped.insert(stream_id) {
            self.stop_sending.push(stream_id);
        }

        Ok(())
    }

    fn reset_stream(&mut self, stream_id: u64, _error_code: u64) -> Result<()> {
        self.active.remove(&stream_id);

        if !self.peer_resets.remove(&stream_id) {
            self.resets.push(stream_id);
        }

        Ok(())
    }

    fn close(&mut self, error_code: u64) -> Result<()> {
        if self.close_code.is_none() {
            self.close_code = Some(error_code);
        }

        Ok(())
    }

    fn set_pmtud_required(&mut self, required: bool) {
        self.pmtud_required = required;
    }

    fn detach(&mut self) {
        self.detached = true;
    }
}

#[derive(Default)]
struct SimSendBuffer {
    data: Vec<u8>,
    fin: bool,
    still_active: bool,
    provided: bool,
}

impl SendBuffer for SimSendBuffer {
    fn provide(
        &mut self, len: usize, fin: bool, still_active: bool,
    ) -> Option<&mut [u8]> {
        self.data.resize(len, 0);
        self.fin = fin;
        self.still_active = still_active;
        self.provided = true;

        Some(&mut self.data)
    }
}

struct Frame {
    stream_id: u64,
    data: Vec<u8>,
    fin: bool,
}

/// What one endpoint sent during a round.
struct Flight {
    frames: Vec<Frame>,
    bytes: u64,
    first_pkt: u64,
    app_limited: bool,
    lost: bool,
}

struct SimEndpoint {
    role: Role,

    /// Created by the first event on the server.
    ctx: Option<PerfContext>,

    transport: SimTransport,

    path: SimPath,

    cc: Option<Box<dyn CongestionControl>>,

    error: Option<Error>,
}

impl SimEndpoint {
    fn new(
        role: Role, ctx: Option<PerfContext>, config: &Config, link: &LinkConfig,
        now: Instant,
    ) -> Self {
        let mut path = SimPath::new(link);
        let cc = new_controller(config.cc_algorithm, &mut path, now);

        SimEndpoint {
            role,
            ctx,
            transport: SimTransport::new(now),
            path,
            cc: Some(cc),
            error: None,
        }
    }

    fn deliver(&mut self, config: &Config, event: Event) {
        if self.transport.detached {
            return;
        }

        let ctx = self
            .ctx
            .get_or_insert_with(|| PerfContext::server(config));

        if let Err(e) = ctx.on_event(&mut self.transport, event) {
            debug!("{} event failed: {:?}", self.role, e);

            self.error.get_or_insert(e);
        }
    }

    /// Sends up to the congestion window, capped by the link capacity.
    fn flush(
        &mut self, config: &Config, link: &LinkConfig, now: Instant,
    ) -> Flight {
        let mut flight = Flight {
            frames: Vec::new(),
            bytes: 0,
            first_pkt: self.path.next_pkt,
            app_limited: false,
            lost: false,
        };

        if self.transport.detached || self.transport.close_code.is_some() {
            return flight;
        }

        let budget = self.path.cwin.min(link.capacity());

        while flight.bytes < budget {
            let ids: Vec<u64> = self.transport.active.iter().copied().collect();

            if ids.is_empty() {
                flight.app_limited = true;
                break;
            }

            let mut progressed = false;

            for stream_id in ids {
                if flight.bytes >= budget || self.transport.close_code.is_some() {
                    break;
                }

                let max_len = (budget - flight.bytes).min(self.path.mtu) as usize;
                let mut buf = SimSendBuffer::default();

                self.deliver(config, Event::PrepareToSend {
                    stream_id,
                    max_len,
                    buf: &mut buf,
                });

                if !buf.provided || !buf.still_active {
                    self.transport.active.remove(&stream_id);
                }

                if !buf.provided || (buf.data.is_empty() && !buf.fin) {
                    continue;
                }

                progressed |= !buf.data.is_empty();

                flight.bytes += buf.data.len() as u64;
                self.path.next_pkt += 1;

                flight.frames.push(Frame {
                    stream_id,
                    data: buf.data,
                    fin: buf.fin,
                });
            }

            if !progressed {
                flight.app_limited = flight.bytes < budget;
                break;
            }
        }

        // The window overflowed the link, the tail of the round is dropped.
        flight.lost = self.path.cwin > budget && flight.bytes >= budget;

        trace!(
            "{} sent {} bytes in {} frames at {:?}",
            self.role,
            flight.bytes,
            flight.frames.len(),
            now
        );

        flight
    }

    /// Reports the outcome of a round to the congestion controller.
    fn on_flight_acked(
        &mut self, flight: &Flight, sent_time: Instant, rtt: Duration,
        now: Instant,
    ) {
        let Some(cc) = self.cc.as_mut() else {
            return;
        };

        if flight.frames.is_empty() {
            return;
        }

        self.path.update_rtt(rtt);

        let sample = AckState {
            rtt_measurement: rtt,
            one_way_delay: rtt / 2,
            ..Default::default()
        };

        cc.notify(&mut self.path, Notification::RttMeasurement, &sample, now);

        let last_pkt = self.path.next_pkt.saturating_sub(1);

        if flight.lost {
            let lost = AckState {
                lost_packet_number: last_pkt,
                ..Default::default()
            };

            cc.notify(&mut self.path, Notification::Repeat, &lost, now);
        }

        if flight.app_limited {
            self.path.last_sender_limited = Some(sent_time);
        }

        self.path.last_acked_sent = Some(sent_time);
        self.path.ack_sent_time = Some(sent_time);
        self.path.highest_acknowledged = last_pkt.max(flight.first_pkt);

        let micros = rtt.as_micros().max(1);
        let rate = (flight.bytes as u128 * 1_000_000 / micros) as u64;
        self.path.peak_bandwidth = self.path.peak_bandwidth.max(rate);

        let acked = AckState {
            bytes_acknowledged: flight.bytes,
            ..Default::default()
        };

        cc.notify(&mut self.path, Notification::Acknowledgement, &acked, now);
    }
}

/// A client and a server connected over a simulated link.
pub struct Pipe {
    config: Config,

    link: LinkConfig,

    client: SimEndpoint,

    server: SimEndpoint,

    now: Instant,

    rounds: usize,

    handshake_done: bool,

    closed: bool,
}

impl Pipe {
    /// Creates a pipe running `scenario` over the default link.
    pub fn new(scenario: &str, config: &Config) -> Result<Pipe> {
        Pipe::with_link(scenario, config, LinkConfig::default())
    }

    pub fn with_link(
        scenario: &str, config: &Config, link: LinkConfig,
    ) -> Result<Pipe> {
        let client = PerfContext::client(scenario, config)?;

        Ok(Pipe::with_client(client, config, link))
    }

    /// Creates a pipe around an existing client context.
    pub fn with_client(
        client: PerfContext, config: &Config, link: LinkConfig,
    ) -> Pipe {
        let now = Instant::now();

        Pipe {
            config: config.clone(),
            link,
            client: SimEndpoint::new(
                Role::Client,
                Some(client),
                config,
                &link,
                now,
            ),
            server: SimEndpoint::new(Role::Server, None, config, &link, now),
            now,
            rounds: 0,
            handshake_done: false,
            closed: false,
        }
    }

    /// Signals the connection as ready to both endpoints.
    ///
    /// Fails if the client could not start its scenario, in which case the
    /// connection is closed.
    pub fn handshake(&mut self) -> Result<()> {
        if self.handshake_done {
            return Ok(());
        }

        self.handshake_done = true;

        for ep in [&mut self.client, &mut self.server] {
            ep.deliver(&self.config, Event::AlmostReady);
            ep.deliver(&self.config, Event::Ready);
        }

        self.deliver_closes();

        match self.client.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Runs one round. Returns `false` once the connection is closed.
    pub fn step(&mut self) -> bool {
        if self.closed {
            return false;
        }

        if !self.handshake_done {
            let _ = self.handshake();
            return !self.closed;
        }

        let sent_time = self.now;

        let client_flight =
            self.client.flush(&self.config, &self.link, sent_time);
        let server_flight =
            self.server.flush(&self.config, &self.link, sent_time);

        let client_rtt = self.link.rtt_sample(client_flight.bytes);
        let server_rtt = self.link.rtt_sample(server_flight.bytes);

        self.now += client_rtt.max(server_rtt);
        self.rounds += 1;

        self.client.transport.now = self.now;
        self.server.transport.now = self.now;

        self.relay();

        Pipe::deliver_flight(
            &self.config,
            &client_flight,
            &mut self.server,
            &self.client,
        );
        Pipe::deliver_flight(
            &self.config,
            &server_flight,
            &mut self.client,
            &self.server,
        );

        self.relay();

        let now = self.now;

        self.client
            .on_flight_acked(&client_flight, sent_time, client_rtt, now);
        self.server
            .on_flight_acked(&server_flight, sent_time, server_rtt, now);

        self.deliver_closes();

        !self.closed
    }

    /// Runs rounds until the connection closes or `max_rounds` elapsed.
    pub fn run(&mut self, max_rounds: usize) -> Result<()> {
        self.handshake()?;

        for _ in 0..max_rounds {
            if !self.step() {
                break;
            }
        }

        Ok(())
    }

    /// Resets the sending side of a stream as if the endpoint's application
    /// abandoned it. The reset reaches the peer during the next round.
    pub fn inject_reset(&mut self, role: Role, stream_id: u64) {
        let ep = match role {
            Role::Client => &mut self.client,
            Role::Server => &mut self.server,
        };

        let _ = ep.transport.reset_stream(stream_id, 0);
    }

    fn deliver_flight(
        config: &Config, flight: &Flight, to: &mut SimEndpoint,
        from: &SimEndpoint,
    ) {
        for frame in &flight.frames {
            if to.transport.close_code.is_some() ||
                from.transport.close_code.is_some()
            {
                return;
            }

            if to.transport.receive_stopped.contains(&frame.stream_id) {
                continue;
            }

            let event = if frame.fin {
                Event::StreamFin {
                    stream_id: frame.stream_id,
                    data: &frame.data,
                }
            } else {
                Event::StreamData {
                    stream_id: frame.stream_id,
                    data: &frame.data,
                }
            };

            to.deliver(config, event);
        }
    }

    /// Relays stop-sending and reset requests between the endpoints.
    fn relay(&mut self) {
        loop {
            let client_stops =
                std::mem::take(&mut self.client.transport.stop_sending);
            let server_stops =
                std::mem::take(&mut self.server.transport.stop_sending);
            let client_resets = std::mem::take(&mut self.client.transport.resets);
            let server_resets = std::mem::take(&mut self.server.transport.resets);

            if client_stops.is_empty() &&
                server_stops.is_empty() &&
                client_resets.is_empty() &&
                server_resets.is_empty()
            {
                break;
            }

            for stream_id in client_stops {
                self.server
                    .deliver(&self.config, Event::StopSending { stream_id });
            }

            for stream_id in server_stops {
                self.client
                    .deliver(&self.config, Event::StopSending { stream_id });
            }

            for stream_id in client_resets {
                self.server.transport.peer_resets.insert(stream_id);
                self.server
                    .deliver(&self.config, Event::StreamReset { stream_id });
            }

            for stream_id in server_resets {
                self.client.transport.peer_resets.insert(stream_id);
                self.client
                    .deliver(&self.config, Event::StreamReset { stream_id });
            }
        }
    }

    /// Once either endpoint closed the connection, tells the closer it is
    /// closed and the peer that it was closed by the application.
    fn deliver_closes(&mut self) {
        if self.closed {
            return;
        }

        let client_closed = self.client.transport.close_code.is_some();
        let server_closed = self.server.transport.close_code.is_some();

        if !client_closed && !server_closed {
            return;
        }

        for (ep, closer) in [
            (&mut self.client, client_closed),
            (&mut self.server, server_closed),
        ] {
            let event = if closer {
                Event::Close
            } else {
                Event::ApplicationClose
            };

            ep.deliver(&self.config, event);
        }

        if let Some(cc) = self.client.cc.as_ref() {
            debug!("client cc {} state {:?}", cc.name(), cc.observe());
        }

        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    /// Rounds run so far.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn link(&self) -> &LinkConfig {
        &self.link
    }

    pub fn client(&self) -> Option<&PerfContext> {
        self.client.ctx.as_ref()
    }

    /// `None` until the server received its first event.
    pub fn server(&self) -> Option<&PerfContext> {
        self.server.ctx.as_ref()
    }

    pub fn client_transport(&self) -> &SimTransport {
        &self.client.transport
    }

    pub fn server_transport(&self) -> &SimTransport {
        &self.server.transport
    }

    /// Close code requested by the client.
    pub fn client_close_code(&self) -> Option<u64> {
        self.client.transport.close_code
    }

    /// Close code requested by the server.
    pub fn server_close_code(&self) -> Option<u64> {
        self.server.transport.close_code
    }

    /// First error returned by the client context.
    pub fn client_error(&self) -> Option<Error> {
        self.client.error
    }

    /// First error returned by the server context.
    pub fn server_error(&self) -> Option<Error> {
        self.server.error
    }

    /// Congestion window of the client to server direction.
    pub fn client_cwin(&self) -> u64 {
        self.client.path.cwin
    }

    /// Congestion window of the server to client direction.
    pub fn server_cwin(&self) -> u64 {
        self.server.path.cwin
    }

    /// Phase and slow start threshold of the server to client direction.
    pub fn server_cc_state(&self) -> Option<(Phase, u64)> {
        self.server.cc.as_ref().map(|cc| cc.observe())
    }

    pub fn client_summary(&self) -> PerfSummary {
        match self.client.ctx.as_ref() {
            Some(ctx) => ctx.summary(self.now),
            None => PerfContext::server(&self.config).summary(self.now),
        }
    }

    pub fn server_summary(&self) -> Option<PerfSummary> {
        self.server.ctx.as_ref().map(|ctx| ctx.summary(self.now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::recovery::CWIN_INITIAL;

    #[test]
    fn link_model() {
        let link = LinkConfig::new(Duration::from_millis(100), 1_000_000);

        assert_eq!(link.bdp(), 100_000);
        assert_eq!(link.buffer, 100_000);
        assert_eq!(link.capacity(), 200_000);

        assert_eq!(link.rtt_sample(50_000), Duration::from_millis(100));
        assert_eq!(link.rtt_sample(150_000), Duration::from_millis(150));
        assert_eq!(link.packet_time(), Duration::from_micros(1440));
    }

    #[test]
    fn transport_records_requests() {
        let mut t = SimTransport::new(Instant::now());

        t.mark_active_stream(4, true).unwrap();
        assert!(t.is_active(4));

        t.stop_sending(4, 0).unwrap();
        t.stop_sending(4, 0).unwrap();
        assert_eq!(t.stop_sending, vec![4]);

        // Answering a peer reset is not echoed.
        t.peer_resets.insert(8);
        t.reset_stream(8, 0).unwrap();
        t.reset_stream(4, 0).unwrap();
        assert_eq!(t.resets, vec![4]);
        assert!(!t.is_active(4));

        t.close(3).unwrap();
        t.close(0).unwrap();
        assert_eq!(t.close_code(), Some(3));
    }

    #[test]
    fn controllers_start_at_initial_window() {
        let pipe = Pipe::new("d:0:-0:10:10", &Config::new()).unwrap();

        assert_eq!(pipe.client_cwin(), CWIN_INITIAL);
        assert_eq!(pipe.server_cwin(), CWIN_INITIAL);
        assert!(pipe.server().is_none());
    }

    #[test]
    fn window_grows_under_load() {
        let mut pipe =
            Pipe::new("d:0:-0:10:-10000000", &Config::new()).unwrap();

        pipe.handshake().unwrap();

        for _ in 0..6 {
            assert!(pipe.step());
        }

        assert!(pipe.server_cwin() > CWIN_INITIAL);
        assert_eq!(pipe.client_close_code(), None);
    }
}
