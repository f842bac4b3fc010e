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

//! The perf protocol driver.
//!
//! A [`PerfContext`] holds the benchmark state of one connection. The
//! transport feeds it [`Event`]s through [`PerfContext::on_event()`], and the
//! context acts back through the [`Transport`] trait.

use std::time::Instant;

use serde::Serialize;

use crate::report::PerfSummary;
use crate::report::Reporter;
use crate::report::Stats;
use crate::scenario;
use crate::scenario::StreamDescriptor;
use crate::scenario::StreamKind;
use crate::stream::PerfStream;
use crate::stream::StreamRegistry;
use crate::stream::FILLER_BYTE;
use crate::stream::LENGTH_HEADER_LEN;
use crate::transport::Event;
use crate::transport::SendBuffer;
use crate::transport::Transport;
use crate::Config;
use crate::Error;
use crate::Result;

/// The side of the connection a context runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Runs a scenario.
    Client,

    /// Answers whatever the client asks for.
    Server,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Server => write!(f, "server"),
        }
    }
}

/// Benchmark state of a connection.
pub struct PerfContext {
    role: Role,

    scenario: Vec<StreamDescriptor>,

    streams: StreamRegistry,

    stats: Stats,

    /// Streams started and not completed yet.
    open_streams: usize,

    stream_priority: u8,

    reporter: Reporter,

    /// Set once the connection closed, no more events are accepted.
    detached: bool,

    start_time: Option<Instant>,
}

impl PerfContext {
    /// Creates a client context running the given scenario text.
    pub fn client(scenario: &str, config: &Config) -> Result<PerfContext> {
        let scenario = scenario::parse(scenario)?;

        Ok(PerfContext::with_scenario(scenario, config))
    }

    /// Creates a client context running an already parsed scenario.
    pub fn with_scenario(
        scenario: Vec<StreamDescriptor>, config: &Config,
    ) -> PerfContext {
        PerfContext::new(Role::Client, scenario, config)
    }

    /// Creates a server context.
    pub fn server(config: &Config) -> PerfContext {
        PerfContext::new(Role::Server, Vec::new(), config)
    }

    fn new(
        role: Role, scenario: Vec<StreamDescriptor>, config: &Config,
    ) -> PerfContext {
        PerfContext {
            role,
            scenario,
            streams: StreamRegistry::default(),
            stats: Stats::default(),
            open_streams: 0,
            stream_priority: config.stream_priority,
            reporter: Reporter::new(role, config),
            detached: false,
            start_time: None,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn scenario(&self) -> &[StreamDescriptor] {
        &self.scenario
    }

    pub fn streams(&self) -> &StreamRegistry {
        &self.streams
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn open_streams(&self) -> usize {
        self.open_streams
    }

    /// Whether the connection closed and the context stopped taking events.
    pub fn is_detached(&self) -> bool {
        self.detached
    }

    /// Returns the counters and rates of the connection at `now`.
    pub fn summary(&self, now: Instant) -> PerfSummary {
        let elapsed = self
            .start_time
            .map(|t| now.saturating_duration_since(t))
            .unwrap_or_default();

        PerfSummary::new(self.role, self.stats, self.open_streams, elapsed)
    }

    /// Processes a transport event.
    ///
    /// Any error closes the connection with the matching application error
    /// code before being returned. Events received after the context was
    /// detached return [`Error::InvalidState`] and are otherwise ignored.
    pub fn on_event<T: Transport + ?Sized>(
        &mut self, t: &mut T, event: Event,
    ) -> Result<()> {
        if self.detached {
            return Err(Error::InvalidState);
        }

        self.start_time.get_or_insert_with(|| t.start_time());

        trace!("{} event {}", self.role, event.name());

        if let Err(e) = self.handle_event(t, event) {
            warn!("{} closing connection: {:?}", self.role, e);

            if let Err(close_err) = t.close(e.to_app_code()) {
                warn!("{} cannot close connection: {:?}", self.role, close_err);
            }

            return Err(e);
        }

        Ok(())
    }

    fn handle_event<T: Transport + ?Sized>(
        &mut self, t: &mut T, event: Event,
    ) -> Result<()> {
        let now = t.now();

        match event {
            Event::StreamData { stream_id, data } =>
                self.on_stream_data(t, stream_id, data, false, now),

            Event::StreamFin { stream_id, data } =>
                self.on_stream_data(t, stream_id, data, true, now),

            Event::PrepareToSend {
                stream_id,
                max_len,
                buf,
            } => self.prepare_to_send(stream_id, max_len, buf, now),

            Event::StreamReset { stream_id } =>
                self.on_stream_reset(t, stream_id, now),

            Event::StopSending { stream_id } =>
                self.on_stop_sending(stream_id, now),

            Event::StatelessReset | Event::Close | Event::ApplicationClose => {
                self.on_close(t, now);
                Ok(())
            },

            Event::AlmostReady => {
                info!("{} connection almost ready", self.role);
                Ok(())
            },

            Event::Ready => self.on_ready(t, now),

            Event::VersionNegotiation |
            Event::StreamGap { .. } |
            Event::RequestAlpnList |
            Event::SetAlpn => Ok(()),
        }
    }

    fn on_stream_data<T: Transport + ?Sized>(
        &mut self, t: &mut T, stream_id: u64, data: &[u8], fin: bool,
        now: Instant,
    ) -> Result<()> {
        match self.role {
            Role::Client => self.client_stream_data(t, stream_id, data, fin, now),
            Role::Server => self.server_stream_data(t, stream_id, data, fin, now),
        }
    }

    fn on_ready<T: Transport + ?Sized>(
        &mut self, t: &mut T, now: Instant,
    ) -> Result<()> {
        info!("{} connection ready", self.role);

        t.set_pmtud_required(true);

        if self.role == Role::Client && self.streams.is_empty() {
            let started = self.activate_dependents(t, None, now)?;

            if started == 0 || self.open_streams == 0 {
                return Err(Error::NoRunnableStreams);
            }
        }

        self.reporter.start_window(now);

        Ok(())
    }

    fn on_close<T: Transport + ?Sized>(&mut self, t: &mut T, now: Instant) {
        if self.role == Role::Server {
            self.streams.clear();
            self.open_streams = 0;
        }

        t.detach();
        self.detached = true;

        let start = self.start_time.unwrap_or(now);
        self.reporter.connection_done(&self.stats, start, now);

        debug!("{} detached", self.role);
    }

    fn on_stream_reset<T: Transport + ?Sized>(
        &mut self, t: &mut T, stream_id: u64, now: Instant,
    ) -> Result<()> {
        t.reset_stream(stream_id, 0)?;

        self.report_progress(stream_id, now);

        if self.role == Role::Server && self.streams.remove(stream_id).is_some() {
            self.open_streams = self.open_streams.saturating_sub(1);

            debug!("{} stream {} reset by peer", self.role, stream_id);
        }

        Ok(())
    }

    fn on_stop_sending(&mut self, stream_id: u64, now: Instant) -> Result<()> {
        let role = self.role;

        let Some(stream) = self.streams.find_mut(stream_id) else {
            return Ok(());
        };

        match role {
            Role::Client => return Err(Error::UnexpectedStopSending(stream_id)),

            Role::Server => stream.is_stopped = true,
        }

        self.report_progress(stream_id, now);

        Ok(())
    }

    /// Fills the send buffer of a stream, the length header first on the
    /// client and filler bytes after it.
    fn prepare_to_send(
        &mut self, stream_id: u64, max_len: usize, buf: &mut dyn SendBuffer,
        now: Instant,
    ) -> Result<()> {
        let role = self.role;

        let Some(stream) = self.streams.find_mut(stream_id) else {
            debug!("{} nothing to send on stream {}", role, stream_id);

            let _ = buf.provide(0, true, false);

            return Ok(());
        };

        let (len, fin) = send_budget(role, stream, max_len, now);

        let Some(out) = buf.provide(len, fin, !fin) else {
            if len > 0 {
                return Err(Error::BufferUnavailable(stream_id));
            }

            return Ok(());
        };

        let mut written = 0;

        if role == Role::Client {
            let offset =
                stream.bytes_posted.min(LENGTH_HEADER_LEN as u64) as usize;
            let n = (LENGTH_HEADER_LEN - offset).min(out.len());

            out[..n].copy_from_slice(&stream.length_header[offset..offset + n]);

            written = n;
        }

        out[written..].fill(FILLER_BYTE);

        match role {
            Role::Client => stream.bytes_posted += len as u64,
            Role::Server => stream.bytes_responded += len as u64,
        }

        self.stats.bytes_sent += len as u64;

        if !fin {
            self.report_progress(stream_id, now);
            return Ok(());
        }

        match role {
            Role::Client => {
                stream.post_fin_time = Some(now);

                debug!(
                    "{} stream {} posted {} bytes",
                    role, stream_id, stream.bytes_posted
                );
            },

            Role::Server => {
                stream.response_fin_time = Some(now);

                self.reporter.stream_done(stream, now);

                self.stats.streams_completed += 1;
                self.open_streams = self.open_streams.saturating_sub(1);

                self.streams.remove(stream_id);
            },
        }

        Ok(())
    }

    /// Emits the periodic reports due after activity on a stream.
    fn report_progress(&mut self, stream_id: u64, now: Instant) {
        if let Some(stream) = self.streams.find_mut(stream_id) {
            self.reporter.stream_progress(stream, now);
        }

        let start = self.start_time.unwrap_or(now);

        self.reporter
            .aggregate(&self.stats, self.open_streams, start, now);
    }
}

/// Returns how many bytes a stream can send given `max_len` bytes of space,
/// and whether that ends the stream.
fn send_budget(
    role: Role, stream: &PerfStream, max_len: usize, now: Instant,
) -> (usize, bool) {
    if role == Role::Server && stream.is_stopped {
        return (0, true);
    }

    if role == Role::Client && stream.kind == StreamKind::Time {
        if stream.uptime(now) >= stream.duration {
            return (0, true);
        }

        return (max_len, false);
    }

    let (sent, limit) = match role {
        // The length header always goes out in full.
        Role::Client => (
            stream.bytes_posted,
            stream.post_size.max(LENGTH_HEADER_LEN as u64),
        ),

        Role::Server => (stream.bytes_responded, stream.response_size),
    };

    let remaining = limit.saturating_sub(sent);

    if max_len as u64 >= remaining {
        (remaining as usize, true)
    } else {
        (max_len, false)
    }
}

mod client;
mod server;
