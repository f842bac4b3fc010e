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

use crate::stream::LENGTH_HEADER_LEN;
use crate::transport::Transport;
use crate::Error;
use crate::Result;

use super::PerfContext;

impl PerfContext {
    pub(super) fn server_stream_data<T: Transport + ?Sized>(
        &mut self, t: &mut T, stream_id: u64, data: &[u8], fin: bool,
        now: Instant,
    ) -> Result<()> {
        if self.streams.find(stream_id).is_none() {
            self.reporter.open_csv();

            let stream = self.streams.insert(stream_id)?;
            stream.post_time = Some(now);
            stream.last_report_time = Some(now);

            self.open_streams += 1;

            debug!("{} stream {} opened by peer", self.role, stream_id);
        }

        let stream = self
            .streams
            .find_mut(stream_id)
            .ok_or(Error::UnknownStream(stream_id))?;

        if stream.is_closed {
            return Err(Error::TooMuchDataSent(stream_id));
        }

        // The first bytes carry the big endian size of the response.
        let header_len = (LENGTH_HEADER_LEN as u64)
            .saturating_sub(stream.bytes_posted)
            .min(data.len() as u64) as usize;

        for b in &data[..header_len] {
            stream.response_size = (stream.response_size << 8) | u64::from(*b);
        }

        stream.bytes_posted += data.len() as u64;
        self.stats.bytes_received += data.len() as u64;

        if fin {
            if stream.bytes_posted < LENGTH_HEADER_LEN as u64 {
                stream.response_size = 0;
            }

            stream.post_fin_time = Some(now);
            stream.response_time = Some(now);

            t.mark_active_stream(stream_id, true)?;
            t.set_stream_priority(stream_id, self.stream_priority)?;

            debug!(
                "{} stream {} responding with {} bytes",
                self.role, stream_id, stream.response_size
            );
        }

        self.report_progress(stream_id, now);

        Ok(())
    }
}
