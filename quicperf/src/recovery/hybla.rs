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

//! TCP Hybla.
//!
//! Hybla scales the window growth of Reno by `ρ = smoothed_rtt / min_rtt` so
//! that long RTT paths open their window as fast, in wall clock time, as a
//! short reference path: slow start grows by `2^ρ - 1` bytes per acknowledged
//! byte and congestion avoidance by `ρ² * mtu / cwin`.
//!
//! The initial slow start is the phase during which no slow start threshold
//! has been set yet. It can be left on loss, on RTT growth, or when the
//! window is seeded from a previous session.

use std::time::Duration;
use std::time::Instant;

use super::hystart::MinMaxRtt;
use super::update_pacing_data;
use super::AckState;
use super::CongestionControl;
use super::CongestionPath;
use super::Notification;
use super::Phase;
use super::CWIN_INITIAL;
use super::CWIN_MINIMUM;
use super::TARGET_RENO_RTT;
use super::TARGET_SATELLITE_RTT;

/// Floor applied to the minimum RTT before computing `ρ`.
const MIN_RTT_FLOOR: Duration = Duration::from_micros(1);

#[derive(Debug)]
pub struct Hybla {
    phase: Phase,

    cwin: u64,

    /// `None` until the first loss, seed or RTT growth exit.
    ssthresh: Option<u64>,

    recovery_start: Option<Instant>,

    /// Losses of packets sent before this number belong to the current
    /// recovery episode.
    recovery_sequence: u64,

    /// Fractional bytes of window growth not applied yet.
    increment_frac_sum: f64,

    rtt_filter: MinMaxRtt,
}

impl Hybla {
    pub fn new(path: &mut dyn CongestionPath) -> Self {
        let hybla = Hybla::initial();

        path.set_cwin(hybla.cwin);

        hybla
    }

    fn initial() -> Self {
        Hybla {
            phase: Phase::SlowStart,
            cwin: CWIN_INITIAL,
            ssthresh: None,
            recovery_start: None,
            recovery_sequence: 0,
            increment_frac_sum: 0.0,
            rtt_filter: MinMaxRtt::default(),
        }
    }

    fn in_initial_slow_start(&self) -> bool {
        self.phase == Phase::SlowStart && self.ssthresh.is_none()
    }

    /// Returns `smoothed_rtt / min_rtt`, or 1 while the path has no minimum
    /// RTT estimate yet.
    fn rho(path: &dyn CongestionPath) -> f64 {
        if path.min_rtt().is_zero() {
            return 1.0;
        }

        let min_rtt = path.min_rtt().max(MIN_RTT_FLOOR);

        path.smoothed_rtt().as_secs_f64() / min_rtt.as_secs_f64()
    }

    /// Adds the integer part of `increment` to the window and carries the
    /// fractional part over to later increments.
    fn grow(&mut self, increment: f64) {
        // 2^ρ overflows to infinity for very large RTT ratios.
        if !increment.is_finite() {
            if increment > 0.0 {
                self.cwin = u64::MAX;
            }

            return;
        }

        let int_part = increment.floor();

        self.cwin = self.cwin.saturating_add(int_part as u64);

        self.increment_frac_sum += increment - int_part;

        if self.increment_frac_sum >= 1.0 {
            self.cwin = self.cwin.saturating_add(1);
            self.increment_frac_sum -= 1.0;
        }
    }

    fn on_acknowledgement(&mut self, path: &dyn CongestionPath, ack: &AckState) {
        if self.in_initial_slow_start() {
            let bdp = path.peak_bandwidth_estimate() as u128 *
                path.smoothed_rtt().as_micros() /
                1_000_000;

            let min_win = (bdp / 2).min(u64::MAX as u128) as u64;

            self.cwin = self.cwin.max(min_win);
        }

        // Acknowledged data sent while application limited says nothing
        // about the path capacity.
        if path.last_time_acked_data_frame_sent() <=
            path.last_sender_limited_time()
        {
            return;
        }

        let rho = Hybla::rho(path);
        let acked = ack.bytes_acknowledged as f64;

        match self.phase {
            Phase::SlowStart => {
                self.grow(acked * (2f64.powf(rho) - 1.0));

                if self.ssthresh.is_some_and(|ssthresh| self.cwin >= ssthresh) {
                    self.phase = Phase::CongestionAvoidance;
                }
            },

            Phase::CongestionAvoidance => {
                let mtu = path.send_mtu() as f64;

                self.grow(rho * rho * acked * mtu / self.cwin as f64);
            },
        }
    }

    fn seed_cwin(&mut self, bytes_in_flight: u64) {
        if self.in_initial_slow_start() && bytes_in_flight > self.cwin {
            self.cwin = bytes_in_flight;
            self.ssthresh = Some(bytes_in_flight);
            self.phase = Phase::CongestionAvoidance;
        }
    }

    fn enter_recovery(
        &mut self, path: &dyn CongestionPath, notification: Notification,
        now: Instant,
    ) {
        let ssthresh = (self.cwin / 2).max(CWIN_MINIMUM);

        self.ssthresh = Some(ssthresh);

        if notification == Notification::Timeout {
            self.cwin = CWIN_MINIMUM;
            self.phase = Phase::SlowStart;
        } else {
            self.cwin = ssthresh;
            self.phase = Phase::CongestionAvoidance;
        }

        self.recovery_start = Some(now);
        self.recovery_sequence = path.sequence_number();
        self.increment_frac_sum = 0.0;

        trace!(
            "hybla {:?}: enter recovery cwin={} ssthresh={}",
            notification,
            self.cwin,
            ssthresh
        );
    }

    fn on_spurious_repeat(
        &mut self, path: &mut dyn CongestionPath, now: Instant,
    ) {
        let recent = self.recovery_start.is_some_and(|start| {
            now.saturating_duration_since(start) < path.smoothed_rtt()
        });

        let current = if path.is_multipath_enabled() {
            self.recovery_start > path.ack_sent_time()
        } else {
            self.recovery_sequence > path.highest_acknowledged()
        };

        if recent && current {
            if let Some(ssthresh) = self.ssthresh {
                let restored = ssthresh.saturating_mul(2);

                if self.cwin < restored {
                    self.cwin = restored;
                    self.phase = Phase::CongestionAvoidance;
                }
            }
        }

        path.set_ssthresh_initialized();
    }

    fn on_rtt_measurement(
        &mut self, path: &mut dyn CongestionPath, ack: &AckState, now: Instant,
    ) {
        if !self.in_initial_slow_start() {
            return;
        }

        let min_rtt = path.min_rtt();

        if min_rtt > TARGET_RENO_RTT {
            let rtt = min_rtt.min(TARGET_SATELLITE_RTT);

            let min_win = CWIN_INITIAL as u128 * rtt.as_micros() /
                TARGET_RENO_RTT.as_micros();

            self.cwin = self.cwin.max(min_win as u64);
        }

        let sample = if path.is_time_stamp_enabled() {
            ack.one_way_delay
        } else {
            ack.rtt_measurement
        };

        if self.rtt_filter.hystart_test(sample, path.packet_time(), now) {
            trace!("hybla: rtt growth, exit slow start cwin={}", self.cwin);

            self.ssthresh = Some(self.cwin);
            self.phase = Phase::CongestionAvoidance;

            path.set_ssthresh_initialized();
        }
    }
}

impl CongestionControl for Hybla {
    fn name(&self) -> &'static str {
        "hybla"
    }

    fn notify(
        &mut self, path: &mut dyn CongestionPath, notification: Notification,
        ack: &AckState, now: Instant,
    ) {
        path.set_cc_data_updated();

        match notification {
            Notification::Acknowledgement => self.on_acknowledgement(path, ack),

            Notification::SeedCwin => self.seed_cwin(ack.bytes_acknowledged),

            Notification::EcnEc |
            Notification::Repeat |
            Notification::Timeout => {
                // Only the first loss of a window starts a new recovery.
                if self.recovery_sequence <= ack.lost_packet_number {
                    self.enter_recovery(path, notification, now);
                }
            },

            Notification::SpuriousRepeat => self.on_spurious_repeat(path, now),

            Notification::RttMeasurement =>
                self.on_rtt_measurement(path, ack, now),

            Notification::CwinBlocked => (),

            Notification::Reset => *self = Hybla::initial(),
        }

        path.set_cwin(self.cwin);

        update_pacing_data(path, self.cwin, self.in_initial_slow_start());
    }

    fn observe(&self) -> (Phase, u64) {
        (self.phase, self.ssthresh.unwrap_or(0))
    }

    fn cwin(&self) -> u64 {
        self.cwin
    }
}

#[cfg(test)]
pub(crate) mod test_path {
    use std::time::Duration;
    use std::time::Instant;

    use crate::recovery::CongestionPath;
    use crate::recovery::Pacing;
    use crate::recovery::MAX_PACKET_SIZE;

    /// Congestion path whose estimates are set directly by tests.
    pub(crate) struct TestPath {
        pub(crate) smoothed_rtt: Duration,
        pub(crate) min_rtt: Duration,
        pub(crate) peak_bandwidth: u64,
        pub(crate) mtu: u64,
        pub(crate) last_acked_sent: Option<Instant>,
        pub(crate) last_sender_limited: Option<Instant>,
        pub(crate) sequence_number: u64,
        pub(crate) highest_acknowledged: u64,
        pub(crate) ack_sent_time: Option<Instant>,
        pub(crate) multipath: bool,
        pub(crate) time_stamp: bool,
        pub(crate) packet_time: Duration,
        pub(crate) cwin: u64,
        pub(crate) ssthresh_initialized: bool,
        pub(crate) cc_data_updated: bool,
        pub(crate) pacing: Option<Pacing>,
    }

    impl TestPath {
        pub(crate) fn new(rtt: Duration) -> Self {
            TestPath {
                smoothed_rtt: rtt,
                min_rtt: rtt,
                peak_bandwidth: 0,
                mtu: MAX_PACKET_SIZE,
                last_acked_sent: Some(Instant::now()),
                last_sender_limited: None,
                sequence_number: 0,
                highest_acknowledged: 0,
                ack_sent_time: None,
                multipath: false,
                time_stamp: false,
                packet_time: Duration::ZERO,
                cwin: 0,
                ssthresh_initialized: false,
                cc_data_updated: false,
                pacing: None,
            }
        }
    }

    impl CongestionPath for TestPath {
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
            self.sequence_number
        }

        fn highest_acknowledged(&self) -> u64 {
            self.highest_acknowledged
        }

        fn ack_sent_time(&self) -> Option<Instant> {
            self.ack_sent_time
        }

        fn is_multipath_enabled(&self) -> bool {
            self.multipath
        }

        fn is_time_stamp_enabled(&self) -> bool {
            self.time_stamp
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

        fn set_cc_data_updated(&mut self) {
            self.cc_data_updated = true;
        }

        fn set_pacing(&mut self, pacing: Option<Pacing>) {
            self.pacing = pacing;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_path::TestPath;
    use super::*;

    use crate::recovery::Pacing;

    fn acked(bytes: u64) -> AckState {
        AckState {
            bytes_acknowledged: bytes,
            ..Default::default()
        }
    }

    fn lost(pkt_num: u64) -> AckState {
        AckState {
            lost_packet_number: pkt_num,
            ..Default::default()
        }
    }

    fn rtt_sample(rtt: Duration) -> AckState {
        AckState {
            rtt_measurement: rtt,
            ..Default::default()
        }
    }

    fn setup(rtt: Duration) -> (Hybla, TestPath, Instant) {
        let mut path = TestPath::new(rtt);
        let hybla = Hybla::new(&mut path);

        (hybla, path, Instant::now())
    }

    #[test]
    fn init() {
        let (hybla, path, _) = setup(Duration::from_millis(50));

        assert_eq!(path.cwin, CWIN_INITIAL);
        assert_eq!(hybla.cwin(), CWIN_INITIAL);
        assert_eq!(hybla.observe(), (Phase::SlowStart, 0));
    }

    #[test]
    fn slow_start_reference_rtt() {
        let (mut hybla, mut path, now) = setup(Duration::from_millis(50));

        // With ρ = 1 slow start grows by one byte per acknowledged byte.
        hybla.notify(&mut path, Notification::Acknowledgement, &acked(1536), now);

        assert_eq!(hybla.cwin(), CWIN_INITIAL + 1536);
        assert_eq!(path.cwin, CWIN_INITIAL + 1536);
        assert!(path.cc_data_updated);
        assert_eq!(hybla.observe(), (Phase::SlowStart, 0));
    }

    #[test]
    fn slow_start_long_rtt() {
        let (mut hybla, mut path, now) = setup(Duration::from_millis(50));
        path.smoothed_rtt = Duration::from_millis(100);

        // ρ = 2, 2^2 - 1 = 3 bytes per acknowledged byte.
        hybla.notify(&mut path, Notification::Acknowledgement, &acked(1000), now);

        assert_eq!(hybla.cwin(), CWIN_INITIAL + 3000);
    }

    #[test]
    fn fractional_growth_accumulates() {
        let (mut hybla, mut path, now) = setup(Duration::from_millis(40));
        path.smoothed_rtt = Duration::from_millis(60);

        // ρ = 1.5, each acknowledged byte adds 1.83 bytes.
        hybla.notify(&mut path, Notification::Acknowledgement, &acked(1), now);
        assert_eq!(hybla.cwin(), CWIN_INITIAL + 1);

        hybla.notify(&mut path, Notification::Acknowledgement, &acked(1), now);
        assert_eq!(hybla.cwin(), CWIN_INITIAL + 3);
    }

    #[test]
    fn saturated_window_keeps_growing_fractions() {
        let (mut hybla, mut path, now) = setup(Duration::from_millis(1));
        path.smoothed_rtt = Duration::from_millis(70);

        // 2^70 - 1 bytes per acknowledged byte.
        hybla.notify(&mut path, Notification::Acknowledgement, &acked(1), now);
        assert_eq!(hybla.cwin(), u64::MAX);

        // ρ = 1.5 carries a fractional byte on every other ACK.
        path.smoothed_rtt = Duration::from_micros(1500);

        for _ in 0..4 {
            hybla.notify(
                &mut path,
                Notification::Acknowledgement,
                &acked(1),
                now,
            );

            assert_eq!(hybla.cwin(), u64::MAX);
            assert_eq!(path.cwin, u64::MAX);
        }

        assert!(hybla.increment_frac_sum.is_finite());
    }

    #[test]
    fn no_min_rtt_grows_like_reno() {
        let (mut hybla, mut path, now) = setup(Duration::from_millis(333));
        path.min_rtt = Duration::ZERO;

        hybla.notify(&mut path, Notification::Acknowledgement, &acked(1200), now);

        assert_eq!(hybla.cwin(), CWIN_INITIAL + 1200);
        assert_eq!(hybla.increment_frac_sum, 0.0);

        hybla.notify(&mut path, Notification::Repeat, &lost(0), now);

        let cwin = hybla.cwin();

        hybla.notify(&mut path, Notification::Acknowledgement, &acked(1200), now);

        assert!(hybla.cwin() > cwin);
        assert!(hybla.increment_frac_sum.is_finite());
    }

    #[test]
    fn infinite_increment_saturates() {
        let (mut hybla, mut path, now) = setup(Duration::from_micros(1));
        path.smoothed_rtt = Duration::from_secs(2);

        hybla.notify(&mut path, Notification::Acknowledgement, &acked(1200), now);

        assert_eq!(hybla.cwin(), u64::MAX);
        assert_eq!(hybla.increment_frac_sum, 0.0);

        hybla.notify(&mut path, Notification::Repeat, &lost(0), now);

        assert_eq!(hybla.cwin(), u64::MAX / 2);
    }

    #[test]
    fn window_grows_monotonically_without_loss() {
        let (mut hybla, mut path, mut now) = setup(Duration::from_millis(40));
        path.smoothed_rtt = Duration::from_millis(60);

        let mut prev = hybla.cwin();

        for i in 0..200u64 {
            now += Duration::from_millis(2);

            // RTT creeps up until the growth test ends slow start.
            let rtt = Duration::from_millis(40 + i / 2);

            hybla.notify(
                &mut path,
                Notification::RttMeasurement,
                &rtt_sample(rtt),
                now,
            );
            assert!(hybla.cwin() >= prev);
            prev = hybla.cwin();

            hybla.notify(
                &mut path,
                Notification::Acknowledgement,
                &acked(500 + i * 7),
                now,
            );
            assert!(hybla.cwin() >= prev);
            prev = hybla.cwin();
        }

        assert_eq!(hybla.observe().0, Phase::CongestionAvoidance);

        for i in 0..200u64 {
            hybla.notify(
                &mut path,
                Notification::Acknowledgement,
                &acked(1 + i * 13),
                now,
            );
            assert!(hybla.cwin() >= prev);
            assert_eq!(path.cwin, hybla.cwin());
            prev = hybla.cwin();
        }
    }

    #[test]
    fn app_limited_does_not_grow() {
        let (mut hybla, mut path, now) = setup(Duration::from_millis(50));
        path.last_sender_limited = path.last_acked_sent;

        hybla.notify(
            &mut path,
            Notification::Acknowledgement,
            &acked(10_000),
            now,
        );

        assert_eq!(hybla.cwin(), CWIN_INITIAL);

        path.last_acked_sent = None;
        path.last_sender_limited = None;

        hybla.notify(
            &mut path,
            Notification::Acknowledgement,
            &acked(10_000),
            now,
        );

        assert_eq!(hybla.cwin(), CWIN_INITIAL);
    }

    #[test]
    fn bandwidth_delay_floor() {
        let (mut hybla, mut path, now) = setup(Duration::from_millis(100));
        path.peak_bandwidth = 10_000_000;
        path.last_sender_limited = path.last_acked_sent;

        hybla.notify(&mut path, Notification::Acknowledgement, &acked(1), now);

        assert_eq!(hybla.cwin(), 500_000);
        assert_eq!(path.cwin, 500_000);
    }

    #[test]
    fn loss_enters_congestion_avoidance() {
        let (mut hybla, mut path, now) = setup(Duration::from_millis(50));

        hybla.notify(&mut path, Notification::Repeat, &lost(0), now);

        assert_eq!(hybla.cwin(), CWIN_INITIAL / 2);
        assert_eq!(path.cwin, CWIN_INITIAL / 2);
        assert_eq!(
            hybla.observe(),
            (Phase::CongestionAvoidance, CWIN_INITIAL / 2)
        );
    }

    #[test]
    fn ecn_enters_congestion_avoidance() {
        let (mut hybla, mut path, now) = setup(Duration::from_millis(50));

        hybla.notify(&mut path, Notification::EcnEc, &lost(0), now);

        assert_eq!(
            hybla.observe(),
            (Phase::CongestionAvoidance, CWIN_INITIAL / 2)
        );
    }

    #[test]
    fn timeout_resets_to_minimum() {
        let (mut hybla, mut path, now) = setup(Duration::from_millis(50));

        hybla.notify(&mut path, Notification::Timeout, &lost(0), now);

        assert_eq!(hybla.cwin(), CWIN_MINIMUM);
        assert_eq!(hybla.observe(), (Phase::SlowStart, CWIN_INITIAL / 2));

        // Slow start now ends at the threshold.
        hybla.notify(&mut path, Notification::Acknowledgement, &acked(5000), now);

        assert_eq!(hybla.cwin(), CWIN_MINIMUM + 5000);
        assert_eq!(
            hybla.observe(),
            (Phase::CongestionAvoidance, CWIN_INITIAL / 2)
        );
    }

    #[test]
    fn one_reduction_per_recovery_episode() {
        let (mut hybla, mut path, now) = setup(Duration::from_millis(50));
        path.sequence_number = 10;

        hybla.notify(&mut path, Notification::Repeat, &lost(0), now);
        assert_eq!(hybla.cwin(), 7680);

        // Packets sent before recovery started.
        hybla.notify(&mut path, Notification::Repeat, &lost(5), now);
        assert_eq!(hybla.cwin(), 7680);

        hybla.notify(&mut path, Notification::Repeat, &lost(12), now);
        assert_eq!(hybla.cwin(), 3840);
    }

    #[test]
    fn window_never_below_minimum() {
        let (mut hybla, mut path, mut now) = setup(Duration::from_millis(50));

        for i in 0..20 {
            path.sequence_number = i + 1;
            now += Duration::from_millis(10);

            let notification = if i % 3 == 0 {
                Notification::Timeout
            } else {
                Notification::Repeat
            };

            hybla.notify(&mut path, notification, &lost(i), now);

            assert!(hybla.cwin() >= CWIN_MINIMUM);
            assert!(path.cwin >= CWIN_MINIMUM);
        }
    }

    #[test]
    fn congestion_avoidance_growth() {
        let (mut hybla, mut path, now) = setup(Duration::from_millis(50));

        hybla.notify(&mut path, Notification::Repeat, &lost(0), now);
        assert_eq!(hybla.cwin(), 7680);

        // 1536 * 1536 / 7680 = 307.2
        hybla.notify(&mut path, Notification::Acknowledgement, &acked(1536), now);
        assert_eq!(hybla.cwin(), 7987);

        // With ρ = 2 the increment is four times larger.
        path.smoothed_rtt = Duration::from_millis(100);
        hybla.notify(&mut path, Notification::Acknowledgement, &acked(1536), now);

        let expected = 7987 + (4.0 * 1536.0 * 1536.0 / 7987.0 + 0.2) as u64;
        assert_eq!(hybla.cwin(), expected);
        assert_eq!(hybla.observe().0, Phase::CongestionAvoidance);
    }

    #[test]
    fn spurious_repeat_restores_window() {
        let (mut hybla, mut path, now) = setup(Duration::from_millis(50));
        path.sequence_number = 10;
        path.highest_acknowledged = 5;

        hybla.notify(&mut path, Notification::Repeat, &lost(0), now);
        assert_eq!(hybla.cwin(), 7680);

        hybla.notify(
            &mut path,
            Notification::SpuriousRepeat,
            &AckState::default(),
            now + Duration::from_millis(10),
        );

        assert_eq!(hybla.cwin(), 15360);
        assert_eq!(path.cwin, 15360);
        assert_eq!(hybla.observe(), (Phase::CongestionAvoidance, 7680));
        assert!(path.ssthresh_initialized);
    }

    #[test]
    fn late_spurious_repeat_keeps_window() {
        let (mut hybla, mut path, now) = setup(Duration::from_millis(50));
        path.sequence_number = 10;
        path.highest_acknowledged = 5;

        hybla.notify(&mut path, Notification::Repeat, &lost(0), now);

        hybla.notify(
            &mut path,
            Notification::SpuriousRepeat,
            &AckState::default(),
            now + Duration::from_millis(60),
        );

        assert_eq!(hybla.cwin(), 7680);
        assert!(path.ssthresh_initialized);

        // Packets sent after recovery started were already acknowledged.
        path.highest_acknowledged = 11;

        hybla.notify(
            &mut path,
            Notification::SpuriousRepeat,
            &AckState::default(),
            now + Duration::from_millis(10),
        );

        assert_eq!(hybla.cwin(), 7680);
    }

    #[test]
    fn spurious_repeat_multipath() {
        let (mut hybla, mut path, now) = setup(Duration::from_millis(50));
        path.multipath = true;
        path.ack_sent_time = Some(now);

        let recovery = now + Duration::from_millis(1);
        hybla.notify(&mut path, Notification::Repeat, &lost(0), recovery);

        hybla.notify(
            &mut path,
            Notification::SpuriousRepeat,
            &AckState::default(),
            recovery + Duration::from_millis(10),
        );

        assert_eq!(hybla.cwin(), 15360);
    }

    #[test]
    fn spurious_repeat_without_recovery() {
        let (mut hybla, mut path, now) = setup(Duration::from_millis(50));

        hybla.notify(
            &mut path,
            Notification::SpuriousRepeat,
            &AckState::default(),
            now,
        );

        assert_eq!(hybla.cwin(), CWIN_INITIAL);
        assert_eq!(hybla.observe(), (Phase::SlowStart, 0));
        assert!(path.ssthresh_initialized);
    }

    #[test]
    fn seed_cwin() {
        let (mut hybla, mut path, now) = setup(Duration::from_millis(50));

        hybla.notify(&mut path, Notification::SeedCwin, &acked(10_000), now);
        assert_eq!(hybla.observe(), (Phase::SlowStart, 0));

        hybla.notify(&mut path, Notification::SeedCwin, &acked(50_000), now);
        assert_eq!(hybla.cwin(), 50_000);
        assert_eq!(path.cwin, 50_000);
        assert_eq!(hybla.observe(), (Phase::CongestionAvoidance, 50_000));

        // Only the initial slow start can be seeded.
        hybla.notify(&mut path, Notification::SeedCwin, &acked(80_000), now);
        assert_eq!(hybla.cwin(), 50_000);
    }

    #[test]
    fn long_delay_initial_window() {
        let (mut hybla, mut path, now) = setup(Duration::from_millis(300));

        hybla.notify(
            &mut path,
            Notification::RttMeasurement,
            &rtt_sample(Duration::from_millis(300)),
            now,
        );

        assert_eq!(hybla.cwin(), 3 * CWIN_INITIAL);

        let (mut hybla, mut path, now) = setup(Duration::from_secs(1));

        hybla.notify(
            &mut path,
            Notification::RttMeasurement,
            &rtt_sample(Duration::from_secs(1)),
            now,
        );

        assert_eq!(hybla.cwin(), CWIN_INITIAL * 61 / 10);
        assert_eq!(hybla.observe(), (Phase::SlowStart, 0));
    }

    #[test]
    fn rtt_growth_exits_slow_start() {
        let (mut hybla, mut path, mut now) = setup(Duration::from_millis(50));

        for _ in 0..5 {
            now += Duration::from_millis(2);

            hybla.notify(
                &mut path,
                Notification::RttMeasurement,
                &rtt_sample(Duration::from_millis(50)),
                now,
            );
        }

        assert_eq!(hybla.observe(), (Phase::SlowStart, 0));

        for _ in 0..9 {
            now += Duration::from_millis(2);

            hybla.notify(
                &mut path,
                Notification::RttMeasurement,
                &rtt_sample(Duration::from_millis(100)),
                now,
            );
        }

        assert_eq!(
            hybla.observe(),
            (Phase::CongestionAvoidance, CWIN_INITIAL)
        );
        assert!(path.ssthresh_initialized);
    }

    #[test]
    fn timestamps_use_one_way_delay() {
        let (mut hybla, mut path, mut now) = setup(Duration::from_millis(50));
        path.time_stamp = true;

        for i in 0..20 {
            now += Duration::from_millis(2);

            let rtt = if i < 5 { 50 } else { 200 };

            let ack = AckState {
                rtt_measurement: Duration::from_millis(rtt),
                one_way_delay: Duration::from_millis(25),
                ..Default::default()
            };

            hybla.notify(&mut path, Notification::RttMeasurement, &ack, now);
        }

        assert_eq!(hybla.observe(), (Phase::SlowStart, 0));
    }

    #[test]
    fn cwin_blocked_and_reset() {
        let (mut hybla, mut path, now) = setup(Duration::from_millis(50));

        hybla.notify(&mut path, Notification::Repeat, &lost(0), now);
        hybla.notify(
            &mut path,
            Notification::CwinBlocked,
            &AckState::default(),
            now,
        );
        assert_eq!(hybla.cwin(), 7680);

        hybla.notify(&mut path, Notification::Reset, &AckState::default(), now);
        assert_eq!(hybla.cwin(), CWIN_INITIAL);
        assert_eq!(path.cwin, CWIN_INITIAL);
        assert_eq!(hybla.observe(), (Phase::SlowStart, 0));
    }

    #[test]
    fn pacing_follows_phase() {
        let (mut hybla, mut path, now) = setup(Duration::from_millis(50));

        hybla.notify(&mut path, Notification::CwinBlocked, &acked(0), now);

        // 15360 B / 50 ms, boosted while in initial slow start.
        assert_eq!(
            path.pacing,
            Some(Pacing {
                rate: 384_000,
                quantum: CWIN_INITIAL / 4,
            })
        );

        hybla.notify(&mut path, Notification::Repeat, &lost(0), now);

        // 7680 B is below 8 packets.
        assert_eq!(path.pacing, None);
    }
}
