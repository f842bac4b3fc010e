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

//! Throughput reporting.
//!
//! Reports never influence the protocol: they only read the counters kept by
//! the driver. Console reports go through the `log` facade at `info` level,
//! CSV rows are appended to the file configured with
//! [`Config::set_csv_log_path()`].
//!
//! [`Config::set_csv_log_path()`]: crate::Config::set_csv_log_path

use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::Instant;

use serde::Serialize;

use crate::perf::Role;
use crate::stream::PerfStream;
use crate::Config;

/// First row of every CSV log.
pub const CSV_HEADER: &str =
    "Time,StreamID,DataPassed,DataReceived,UploadRate,DownloadRate";

/// Aggregate counters of a connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Payload bytes handed to the transport.
    pub bytes_sent: u64,

    /// Payload bytes received from the peer.
    pub bytes_received: u64,

    /// Streams that reached their end.
    pub streams_completed: u64,
}

/// End of run snapshot of a connection.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PerfSummary {
    pub role: Role,

    #[serde(flatten)]
    pub stats: Stats,

    pub open_streams: usize,

    pub elapsed_us: u64,

    pub upload_mbps: f64,

    pub download_mbps: f64,
}

impl PerfSummary {
    pub(crate) fn new(
        role: Role, stats: Stats, open_streams: usize, elapsed: Duration,
    ) -> Self {
        PerfSummary {
            role,
            stats,
            open_streams,
            elapsed_us: elapsed.as_micros() as u64,
            upload_mbps: rate_mbps(stats.bytes_sent, elapsed),
            download_mbps: rate_mbps(stats.bytes_received, elapsed),
        }
    }
}

/// Returns the rate in Mbit/s of `bytes` transferred over `elapsed`.
pub fn rate_mbps(bytes: u64, elapsed: Duration) -> f64 {
    let micros = elapsed.as_micros();

    if micros == 0 {
        return 0.0;
    }

    bytes as f64 * 8.0 / micros as f64
}

/// Counters of a single stream at a point in time, seen from one endpoint.
struct StreamSample {
    uptime: Duration,
    stream_id: u64,
    passed: u64,
    received: u64,
    up_mbps: f64,
    down_mbps: f64,
}

impl StreamSample {
    fn new(role: Role, stream: &PerfStream, now: Instant) -> Self {
        let (passed, received) = match role {
            Role::Client => (stream.bytes_posted, stream.bytes_responded),
            Role::Server => (stream.bytes_responded, stream.bytes_posted),
        };

        let uptime = stream.uptime(now);

        StreamSample {
            uptime,
            stream_id: stream.stream_id,
            passed,
            received,
            up_mbps: rate_mbps(passed, uptime),
            down_mbps: rate_mbps(received, uptime),
        }
    }
}

struct CsvSink {
    file: File,
}

impl CsvSink {
    fn open(path: &Path) -> io::Result<Self> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        if file.metadata()?.len() == 0 {
            writeln!(file, "{CSV_HEADER}")?;
        }

        Ok(CsvSink { file })
    }

    fn write_row(&mut self, s: &StreamSample) -> io::Result<()> {
        writeln!(
            self.file,
            "{},{},{},{},{:.6},{:.6}",
            s.uptime.as_micros(),
            s.stream_id,
            s.passed,
            s.received,
            s.up_mbps,
            s.down_mbps
        )
    }
}

/// Per-connection report scheduling.
pub(crate) struct Reporter {
    role: Role,

    report_interval: Duration,

    csv_interval: Duration,

    csv_path: Option<PathBuf>,

    csv: Option<CsvSink>,

    /// Streams that printed a report since the last aggregate report.
    reports_in_window: usize,

    last_aggregate_time: Option<Instant>,
}

impl Reporter {
    pub(crate) fn new(role: Role, config: &Config) -> Self {
        Reporter {
            role,
            report_interval: config.report_interval,
            csv_interval: config.csv_interval,
            csv_path: config.csv_log_path.clone(),
            csv: None,
            reports_in_window: 0,
            last_aggregate_time: None,
        }
    }

    /// Opens the CSV sink if one is configured and not open yet.
    pub(crate) fn open_csv(&mut self) {
        if self.csv.is_some() {
            return;
        }

        // Only try once.
        let Some(path) = self.csv_path.take() else {
            return;
        };

        match CsvSink::open(&path) {
            Ok(sink) => self.csv = Some(sink),

            Err(e) => warn!(
                "{} cannot open csv log {}: {}",
                self.role,
                path.display(),
                e
            ),
        }
    }

    fn write_csv(&mut self, sample: &StreamSample) {
        let Some(sink) = self.csv.as_mut() else {
            return;
        };

        if let Err(e) = sink.write_row(sample) {
            warn!("{} csv log disabled: {}", self.role, e);
            self.csv = None;
        }
    }

    /// Starts a new aggregate window, as done when the connection gets ready.
    pub(crate) fn start_window(&mut self, now: Instant) {
        self.reports_in_window = 0;
        self.last_aggregate_time = Some(now);
    }

    /// Emits the periodic console report and CSV row of a stream when due.
    pub(crate) fn stream_progress(
        &mut self, stream: &mut PerfStream, now: Instant,
    ) {
        let sample = StreamSample::new(self.role, stream, now);

        let last_report = *stream.last_report_time.get_or_insert(now);

        if now.saturating_duration_since(last_report) >= self.report_interval {
            info!(
                "{} [{:>3}s] stream {}: passed {} B, received {} B, up {:.3} Mbit/s, down {:.3} Mbit/s",
                self.role,
                sample.uptime.as_secs(),
                sample.stream_id,
                sample.passed,
                sample.received,
                sample.up_mbps,
                sample.down_mbps
            );

            stream.last_report_time = Some(now);
            self.reports_in_window += 1;
        }

        if sample.uptime.is_zero() {
            return;
        }

        let csv_due = stream.last_csv_time.map_or(true, |t| {
            now.saturating_duration_since(t) >= self.csv_interval
        });

        if csv_due && self.csv.is_some() {
            self.write_csv(&sample);
            stream.last_csv_time = Some(now);
        }
    }

    /// Emits the final report of a stream.
    pub(crate) fn stream_done(&mut self, stream: &PerfStream, now: Instant) {
        let sample = StreamSample::new(self.role, stream, now);

        info!(
            "{} [{:>3}s] stream {}: passed {} B, received {} B, up {:.3} Mbit/s, down {:.3} Mbit/s, fin",
            self.role,
            sample.uptime.as_secs(),
            sample.stream_id,
            sample.passed,
            sample.received,
            sample.up_mbps,
            sample.down_mbps
        );

        self.write_csv(&sample);
    }

    /// Emits the aggregate report once every open stream reported in the
    /// current window and the report interval elapsed.
    pub(crate) fn aggregate(
        &mut self, stats: &Stats, open_streams: usize, start: Instant,
        now: Instant,
    ) -> bool {
        if open_streams <= 1 || self.reports_in_window < open_streams {
            return false;
        }

        let last = self.last_aggregate_time.unwrap_or(start);

        if now.saturating_duration_since(last) < self.report_interval {
            return false;
        }

        self.log_aggregate(stats, start, now, false);

        self.start_window(now);

        true
    }

    /// Emits the terminal aggregate report.
    pub(crate) fn connection_done(
        &mut self, stats: &Stats, start: Instant, now: Instant,
    ) {
        self.log_aggregate(stats, start, now, true);

        self.reports_in_window = 0;

        if let Some(sink) = self.csv.as_mut() {
            let _ = sink.file.flush();
        }
    }

    fn log_aggregate(
        &self, stats: &Stats, start: Instant, now: Instant, fin: bool,
    ) {
        let uptime = now.saturating_duration_since(start);

        info!(
            "{} [{:>3}s] all streams: passed {} B, received {} B, up {:.3} Mbit/s, down {:.3} Mbit/s{}",
            self.role,
            uptime.as_secs(),
            stats.bytes_sent,
            stats.bytes_received,
            rate_mbps(stats.bytes_sent, uptime),
            rate_mbps(stats.bytes_received, uptime),
            if fin { ", fin" } else { "" }
        );
    }

    #[cfg(test)]
    pub(crate) fn reports_in_window(&self) -> usize {
        self.reports_in_window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("quicperf-{}-{}.csv", name, std::process::id()));
        let _ = std::fs::remove_file(&path);
        path
    }

    fn stream(
        bytes_posted: u64, bytes_responded: u64, start: Instant,
    ) -> PerfStream {
        let mut reg = crate::stream::StreamRegistry::default();
        let s = reg.insert(4).unwrap();
        s.bytes_posted = bytes_posted;
        s.bytes_responded = bytes_responded;
        s.post_time = Some(start);
        reg.remove(4).unwrap()
    }

    #[test]
    fn rates() {
        assert_eq!(rate_mbps(1_000_000, Duration::from_secs(1)), 8.0);
        assert_eq!(rate_mbps(125, Duration::from_micros(1)), 1000.0);
        assert_eq!(rate_mbps(10, Duration::ZERO), 0.0);
    }

    #[test]
    fn summary_rates() {
        let stats = Stats {
            bytes_sent: 2_500_000,
            bytes_received: 500_000,
            streams_completed: 2,
        };

        let summary =
            PerfSummary::new(Role::Client, stats, 0, Duration::from_secs(2));

        assert_eq!(summary.elapsed_us, 2_000_000);
        assert_eq!(summary.upload_mbps, 10.0);
        assert_eq!(summary.download_mbps, 2.0);
    }

    #[test]
    fn stream_reports_are_throttled() {
        let config = Config::new();
        let mut reporter = Reporter::new(Role::Client, &config);

        let start = Instant::now();
        let mut s = stream(0, 0, start);

        reporter.stream_progress(&mut s, start);
        assert_eq!(reporter.reports_in_window(), 0);

        reporter.stream_progress(&mut s, start + Duration::from_secs(1));
        assert_eq!(reporter.reports_in_window(), 0);

        reporter.stream_progress(&mut s, start + Duration::from_secs(5));
        assert_eq!(reporter.reports_in_window(), 1);
        assert_eq!(s.last_report_time, Some(start + Duration::from_secs(5)));
    }

    #[test]
    fn aggregate_waits_for_every_stream() {
        let config = Config::new();
        let mut reporter = Reporter::new(Role::Client, &config);
        let stats = Stats::default();

        let start = Instant::now();
        reporter.start_window(start);

        let mut a = stream(0, 0, start);
        let mut b = stream(0, 0, start);
        a.last_report_time = Some(start);
        b.last_report_time = Some(start);

        let later = start + Duration::from_secs(6);

        reporter.stream_progress(&mut a, later);
        assert!(!reporter.aggregate(&stats, 2, start, later));

        reporter.stream_progress(&mut b, later);
        assert!(reporter.aggregate(&stats, 2, start, later));
        assert_eq!(reporter.reports_in_window(), 0);

        // A single open stream never produces aggregate reports.
        assert!(!reporter.aggregate(&stats, 1, start, later));
    }

    #[test]
    fn csv_rows() {
        let path = csv_path("rows");

        let mut config = Config::new();
        config.set_csv_log_path(Some(path.clone()));

        let start = Instant::now();

        let mut reporter = Reporter::new(Role::Server, &config);
        reporter.open_csv();

        let mut s = stream(100, 50, start);

        // Zero uptime rows are skipped.
        reporter.stream_progress(&mut s, start);

        reporter.stream_progress(&mut s, start + Duration::from_millis(100));
        reporter.stream_progress(&mut s, start + Duration::from_millis(200));
        reporter.stream_progress(&mut s, start + Duration::from_millis(700));
        reporter.stream_done(&s, start + Duration::from_secs(1));
        reporter.connection_done(&Stats::default(), start, start);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();

        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines.len(), 4);

        // The server passes response bytes and receives posted bytes.
        assert_eq!(lines[1], "100000,4,50,100,0.004000,0.008000");

        // A second sink appends without repeating the header.
        let mut reporter = Reporter::new(Role::Server, &config);
        reporter.open_csv();
        reporter.stream_done(&s, start + Duration::from_secs(1));

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches(CSV_HEADER).count(), 1);
        assert_eq!(content.lines().count(), 5);

        let _ = std::fs::remove_file(&path);
    }
}
