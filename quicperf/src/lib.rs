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

//! 🏎 QUIC performance measurement.
//!
//! This crate implements the two halves of a QUIC throughput benchmark:
//!
//! * the `perf` application protocol: a client posts data on bidirectional
//!   streams following a scenario, each post starting with an 8-byte header
//!   telling the server how many bytes to send back;
//! * the TCP Hybla congestion controller, which keeps long RTT paths (e.g.
//!   satellite links) from opening their window slower than short ones.
//!
//! Neither is tied to a specific QUIC stack: the driver reacts to [`Event`]s
//! and acts through the [`Transport`] trait, the controller reads path
//! estimates through [`CongestionPath`]. The [`sim`] module connects them
//! over an in-memory link.
//!
//! ## Scenarios
//!
//! A scenario is a `;` separated list of stream descriptions:
//!
//! ```
//! let scenario = quicperf::scenario::parse("d*2:0:-0:1000:10000;t:8:0:2s")?;
//!
//! assert_eq!(scenario.len(), 2);
//! assert_eq!(scenario[0].repeat_count, 2);
//! assert_eq!(scenario[1].previous_stream_id, Some(0));
//! # Ok::<(), quicperf::ParseError>(())
//! ```
//!
//! ## Running a benchmark
//!
//! A client context is created from a scenario and fed transport events
//! until the connection closes:
//!
//! ```
//! let config = quicperf::Config::new();
//!
//! let mut pipe = quicperf::sim::Pipe::new("d:0:-0:1000:5000", &config)?;
//!
//! pipe.handshake()?;
//! pipe.run(10_000)?;
//!
//! let summary = pipe.client_summary();
//! assert_eq!(summary.stats.bytes_received, 5000);
//! # Ok::<(), quicperf::Error>(())
//! ```

#[macro_use]
extern crate log;

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// The ALPN token of the perf protocol.
pub const ALPN: &[u8] = b"perf";

/// Environment variable naming the CSV log file.
pub const CSV_LOG_ENV: &str = "QUICPERF_CSV_LOG_NAME";

/// Default interval between two throughput reports of a stream.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Default interval between two CSV rows of a stream.
pub const DEFAULT_CSV_INTERVAL: Duration = Duration::from_millis(500);

/// Default priority hint of perf streams.
pub const DEFAULT_STREAM_PRIORITY: u8 = 8;

/// Stores configuration shared between multiple connections.
#[derive(Clone, Debug)]
pub struct Config {
    pub(crate) csv_log_path: Option<PathBuf>,

    pub(crate) report_interval: Duration,

    pub(crate) csv_interval: Duration,

    pub(crate) stream_priority: u8,

    pub(crate) cc_algorithm: CongestionControlAlgorithm,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Creates a config object with default values.
    pub fn new() -> Self {
        Config {
            csv_log_path: None,
            report_interval: DEFAULT_REPORT_INTERVAL,
            csv_interval: DEFAULT_CSV_INTERVAL,
            stream_priority: DEFAULT_STREAM_PRIORITY,
            cc_algorithm: CongestionControlAlgorithm::Hybla,
        }
    }

    /// Creates a config object with default values, taking the CSV log path
    /// from the `QUICPERF_CSV_LOG_NAME` environment variable.
    pub fn from_env() -> Self {
        let mut config = Self::new();

        if let Some(path) = std::env::var_os(CSV_LOG_ENV) {
            if !path.is_empty() {
                config.set_csv_log_path(Some(PathBuf::from(path)));
            }
        }

        config
    }

    /// Sets the file CSV throughput rows are appended to.
    ///
    /// The default value is `None`, which disables CSV logging.
    pub fn set_csv_log_path(&mut self, path: Option<PathBuf>) {
        self.csv_log_path = path;
    }

    /// Sets the interval between two console reports of a stream.
    ///
    /// The default value is 5 seconds.
    pub fn set_report_interval(&mut self, interval: Duration) {
        self.report_interval = interval;
    }

    /// Sets the minimum interval between two CSV rows of a stream.
    ///
    /// The default value is 500 milliseconds.
    pub fn set_csv_interval(&mut self, interval: Duration) {
        self.csv_interval = interval;
    }

    /// Sets the priority hint given to the transport for perf streams.
    ///
    /// The default value is 8.
    pub fn set_stream_priority(&mut self, priority: u8) {
        self.stream_priority = priority;
    }

    /// Sets the congestion control algorithm used.
    ///
    /// The default value is `CongestionControlAlgorithm::Hybla`.
    pub fn set_cc_algorithm(&mut self, algo: CongestionControlAlgorithm) {
        self.cc_algorithm = algo;
    }

    /// Sets the congestion control algorithm used by string.
    ///
    /// The default value is `hybla`. On error `Error::CongestionControl`
    /// will be returned.
    pub fn set_cc_algorithm_name(&mut self, name: &str) -> Result<()> {
        self.cc_algorithm = CongestionControlAlgorithm::from_str(name)?;

        Ok(())
    }

    pub fn csv_log_path(&self) -> Option<&std::path::Path> {
        self.csv_log_path.as_deref()
    }

    pub fn report_interval(&self) -> Duration {
        self.report_interval
    }

    pub fn csv_interval(&self) -> Duration {
        self.csv_interval
    }

    pub fn stream_priority(&self) -> u8 {
        self.stream_priority
    }

    pub fn cc_algorithm(&self) -> CongestionControlAlgorithm {
        self.cc_algorithm
    }
}

pub use crate::error::Error;
pub use crate::error::ParseError;
pub use crate::error::ParseErrorKind;
pub use crate::error::PerfErrorCode;
pub use crate::error::Result;

pub use crate::perf::PerfContext;
pub use crate::perf::Role;

pub use crate::recovery::AckState;
pub use crate::recovery::CongestionControl;
pub use crate::recovery::CongestionControlAlgorithm;
pub use crate::recovery::CongestionPath;
pub use crate::recovery::Notification;
pub use crate::recovery::Phase;

pub use crate::report::PerfSummary;
pub use crate::report::Stats;

pub use crate::scenario::StreamDescriptor;
pub use crate::scenario::StreamKind;

pub use crate::stream::PerfStream;
pub use crate::stream::StreamRegistry;

pub use crate::transport::Event;
pub use crate::transport::SendBuffer;
pub use crate::transport::Transport;

mod error;
mod perf;
pub mod recovery;
mod report;
pub mod scenario;
pub mod sim;
pub mod stream;
mod transport;
