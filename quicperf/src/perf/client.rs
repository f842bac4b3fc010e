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

use std::time::Instant;

use crate::scenario::StreamKind;
use crate::scenario::STREAM_ID_INCREMENT;
use crate::transport::Transport;
use crate::Error;
use crate::PerfErrorCode;
use crate::Result;

use super::PerfContext;

impl PerfContext {
    /// Starts every scenario stream depending on `previous`, `None` standing
    /// for the connection start. Returns how many streams were started.
    pub(super) fn activate_dependents<T: Transport + ?Sized>(
        &mut self, t: &mut T, previous: Option<u64>, now: Instant,
    ) -> Result<usize> {
        let ready: Vec<_> = self
            .scenario
            .iter()
            .filter(|desc| desc.previous_stream_id == previous)
            .cloned()
            .collect();

        let mut started = 0;

        for desc in &ready {
            let mut stream_id = desc.stream_id;

            for _ in 0..desc.repeat_count {
                let stream = self.streams.insert(stream_id)?;

                stream.configure(desc);
                stream.post_time = Some(now);
                stream.last_report_time = Some(now);

                self.open_streams += 1;

                t.mark_active_stream(stream_id, true)?;
                t.set_stream_priority(stream_id, self.stream_priority)?;

                debug!(
                    "{} stream {} started after {:?}",
                    self.role, stream_id, previous
                );

                stream_id += STREAM_ID_INCREMENT;
                started += 1;
            }
        }

        if started > 0 {
            self.reporter.open_csv();
        }

        Ok(started)
    }

    pub(super) fn client_stream_data<T: Transport + ?Sized>(
        &mut self, t: &mut T, stream_id: u64, data: &[u8], fin: bool,
        now: Instant,
    ) -> Result<()> {
        let Some(stream) = self.streams.find_mut(stream_id) else {
            // Completed streams are forgotten, late data is dropped.
            debug!("{} data on untracked stream {}", self.role, stream_id);
            return Ok(());
        };

        if stream.is_closed {
            if stream.is_stopped {
                return Ok(());
            }

            return Err(Error::TooMuchDataSent(stream_id));
        }

        if stream.response_time.is_none() {
            stream.response_time = Some(now);
        }

        stream.bytes_responded += data.len() as u64;
        self.stats.bytes_received += data.len() as u64;

        if stream.stop_for_fin {
            let reached = match stream.kind {
                StreamKind::Data =>
                    stream.bytes_responded >= stream.response_size,

                StreamKind::Time => stream.uptime(now) >= stream.duration,
            };

            if reached {
                if !stream.is_stopped {
                    t.stop_sending(stream_id, PerfErrorCode::NoError as u64)?;

                    stream.is_stopped = true;
                    stream.is_closed = true;
                }
            } else if fin {
                if stream.kind != StreamKind::Time {
                    return Err(Error::NotEnoughDataSent(stream_id));
                }

                stream.is_closed = true;
            }
        } else if stream.bytes_responded > stream.response_size {
            return Err(Error::TooMuchDataSent(stream_id));
        } else if fin {
            if stream.bytes_responded != stream.response_size {
                return Err(Error::NotEnoughDataSent(stream_id));
            }

            stream.is_closed = true;
        }

        if !stream.is_closed {
            self.report_progress(stream_id, now);
            return Ok(());
        }

        stream.response_fin_time = Some(now);

        self.reporter.stream_done(stream, now);
        self.stats.streams_completed += 1;

        self.close_stream(t, stream_id, now)
    }

    /// Retires a completed stream, starting the streams waiting for it.
    fn close_stream<T: Transport + ?Sized>(
        &mut self, t: &mut T, stream_id: u64, now: Instant,
    ) -> Result<()> {
        self.open_streams = self
            .open_streams
            .checked_sub(1)
            .ok_or(Error::InvalidState)?;

        self.activate_dependents(t, Some(stream_id), now)?;

        if self.open_streams == 0 {
            info!("{} all streams completed", self.role);

            return t.close(PerfErrorCode::NoError as u64);
        }

        self.streams.remove(stream_id);

        Ok(())
    }
}
