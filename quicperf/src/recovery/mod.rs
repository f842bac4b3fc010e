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

//! Congestion control.
//!
//! Controllers are driven by the transport through [`notify()`], one call per
//! congestion event, and read the path estimates they need through the
//! [`CongestionPath`] trait. Each path owns its controller state.
//!
//! [`notify()`]: CongestionControl::notify

use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use std::time::Instant;

pub use self::hybla::Hybla;

/// Largest packet size the window arithmetic is based on.
pub const MAX_PACKET_SIZE: u64 = 1536;

/// Initial congestion window.
pub const CWIN_INITIAL: u64 = 10 * MAX_PACKET_SIZE;

/// The congestion window never goes below this.
pub const CWIN_MINIMUM: u64 = 2 * MAX_PACKET_SIZE;

/// Paths with a longer minimum RTT get a proportionally larger initial window.
pub const TARGET_RENO_RTT: Duration = Duration::from_millis(100);

/// Cap of the RTT used to scale the initial window of long delay paths.
pub const TARGET_SATELLITE_RTT: Duration = Duration::from_millis(610);

pub const PACING_MULTIPLIER: f64 = 1.25;

/// Available congestion control algorithms.
///
/// This enum provides currently available list of congestion control
/// algorithms.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(C)]
pub enum CongestionControlAlgorithm {
    /// TCP Hybla, tuned for long RTT paths. `hybla` in a string form.
    Hybla = 0,
}

impl FromStr for CongestionControlAlgorithm {
    type Err = crate::Error;

    /// Converts a string to `CongestionControlAlgorithm`.
    ///
    /// If `name` is not valid, `Error::CongestionControl` is returned.
    fn from_str(name: &str) -> std::result::Result<Self, Self::Err> {
        match name {
            "hybla" => Ok(CongestionControlAlgorithm::Hybla),

            _ => Err(crate::Error::CongestionControl),
        }
    }
}

/// Congestion events reported by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Notification {
    Acknowledgement,

    /// Bytes in flight observed when resuming a previous session.
    SeedCwin,

    /// ECN congestion experienced mark.
    EcnEc,

    /// A packet was declared lost and repeated.
    Repeat,

    Timeout,

    /// A repeat turned out to be unnecessary.
    SpuriousRepeat,

    RttMeasurement,

    CwinBlocked,

    Reset,
}

/// Per-notification data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AckState {
    /// Bytes newly acknowledged, or bytes in flight for `SeedCwin`.
    pub bytes_acknowledged: u64,

    pub lost_packet_number: u64,

    pub rtt_measurement: Duration,

    pub one_way_delay: Duration,
}

/// Pacing parameters computed by the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pacing {
    /// Bytes per second.
    pub rate: u64,

    /// Bytes that may be sent back to back.
    pub quantum: u64,
}

/// Congestion control phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum Phase {
    SlowStart           = 0,
    CongestionAvoidance = 1,
}

/// Path estimates and outputs shared between a controller and the transport.
pub trait CongestionPath {
    fn smoothed_rtt(&self) -> Duration;

    fn min_rtt(&self) -> Duration;

    /// Peak delivery rate in bytes per second.
    fn peak_bandwidth_estimate(&self) -> u64;

    fn send_mtu(&self) -> u64;

    /// Send time of the newest acknowledged packet carrying data.
    fn last_time_acked_data_frame_sent(&self) -> Option<Instant>;

    /// Last time the sender ran out of application data.
    fn last_sender_limited_time(&self) -> Option<Instant>;

    /// Number of the next packet to be sent.
    fn sequence_number(&self) -> u64;

    /// Highest packet number acknowledged by the peer.
    fn highest_acknowledged(&self) -> u64;

    /// Send time of the last acknowledged packet.
    fn ack_sent_time(&self) -> Option<Instant>;

    fn is_multipath_enabled(&self) -> bool;

    fn is_time_stamp_enabled(&self) -> bool;

    /// Time it takes to send one packet at the current pacing rate.
    fn packet_time(&self) -> Duration;

    fn set_cwin(&mut self, cwin: u64);

    fn set_ssthresh_initialized(&mut self);

    fn set_cc_data_updated(&mut self);

    /// `None` disables pacing.
    fn set_pacing(&mut self, pacing: Option<Pacing>);
}

pub trait CongestionControl: fmt::Debug {
    fn name(&self) -> &'static str;

    fn notify(
        &mut self, path: &mut dyn CongestionPath, notification: Notification,
        ack: &AckState, now: Instant,
    );

    /// Returns the phase and the slow start threshold, 0 while unset.
    fn observe(&self) -> (Phase, u64);

    fn cwin(&self) -> u64;
}

/// Creates the controller of a path, mirroring its initial window into it.
pub fn new_controller(
    algo: CongestionControlAlgorithm, path: &mut dyn CongestionPath,
    _now: Instant,
) -> Box<dyn CongestionControl> {
    match algo {
        CongestionControlAlgorithm::Hybla => Box::new(Hybla::new(path)),
    }
}

/// Releases the controller of a path. Does nothing if it is already gone.
pub fn delete_controller(cc: &mut Option<Box<dyn CongestionControl>>) {
    if let Some(cc) = cc.take() {
        trace!("{} controller released", cc.name());
    }
}

/// Recomputes the pacing parameters of a path from its window.
pub fn update_pacing_data(
    path: &mut dyn CongestionPath, cwin: u64, slow_start: bool,
) {
    let mtu = path.send_mtu();
    let srtt = path.smoothed_rtt().as_micros() as u64;

    // Small windows are clocked by acknowledgements.
    if cwin < 8 * mtu || srtt == 0 {
        path.set_pacing(None);
        return;
    }

    let mut rate = cwin as f64 * 1_000_000.0 / srtt as f64;

    if slow_start {
        rate *= PACING_MULTIPLIER;
    }

    path.set_pacing(Some(Pacing {
        rate: rate as u64,
        quantum: (cwin / 4).max(2 * mtu),
    }));
}

mod hybla;
mod hystart;
