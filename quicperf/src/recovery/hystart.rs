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

// RTT growth test used to leave the initial slow start.
//
// The last few RTT samples are kept in a small ring. Once the ring is full,
// the minimum of the ring is compared with the lowest maximum seen so far:
// when every sample of the ring stays above that floor by more than a quarter
// for several consecutive samples, the queue at the bottleneck is building up
// and slow start should end.

use std::time::Duration;
use std::time::Instant;

/// Number of samples in the ring, and consecutive excesses needed to exit.
const SCOPE: usize = 5;

const MIN_SAMPLE_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
pub(crate) struct MinMaxRtt {
    samples: [Duration; SCOPE],

    sample_current: usize,

    is_init: bool,

    sample_min: Duration,

    sample_max: Duration,

    filtered_min: Option<Duration>,

    nb_excess: usize,

    last_sample_time: Option<Instant>,
}

impl MinMaxRtt {
    fn filter(&mut self, rtt: Duration) {
        self.samples[self.sample_current] = rtt;

        self.sample_current += 1;

        if self.sample_current == SCOPE {
            self.sample_current = 0;
            self.is_init = true;
        }

        let len = if self.is_init {
            SCOPE
        } else {
            self.sample_current
        };

        let window = &self.samples[..len];

        self.sample_min = window.iter().copied().min().unwrap_or_default();
        self.sample_max = window.iter().copied().max().unwrap_or_default();
    }

    /// Adds an RTT sample and returns whether the RTT grew enough to exit
    /// slow start.
    ///
    /// Samples closer than `max(1ms, packet_time)` to the previous accepted
    /// sample are ignored.
    pub(crate) fn hystart_test(
        &mut self, rtt: Duration, packet_time: Duration, now: Instant,
    ) -> bool {
        let interval = packet_time.max(MIN_SAMPLE_INTERVAL);

        if let Some(last) = self.last_sample_time {
            if now.saturating_duration_since(last) < interval {
                return false;
            }
        }

        self.filter(rtt);
        self.last_sample_time = Some(now);

        if !self.is_init {
            return false;
        }

        let filtered_min = match self.filtered_min {
            Some(min) if min <= self.sample_max => min,

            _ => {
                self.filtered_min = Some(self.sample_max);
                self.sample_max
            },
        };

        let delta = (filtered_min / 4).max(packet_time);

        if self.sample_min > filtered_min + delta {
            self.nb_excess += 1;

            return self.nb_excess >= SCOPE;
        }

        self.nb_excess = 0;

        false
    }
}
