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

//! Runs a perf scenario over the in-memory link and prints the summary.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;

use quicperf::sim::LinkConfig;
use quicperf::sim::Pipe;
use quicperf::Config;
use quicperf::PerfContext;

/// Runs a quicperf scenario between a client and a server connected by a
/// simulated bottleneck link.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Scenario, e.g. `d*4:0:-0:1000:1000000;t:16:0:5s`.
    scenario: String,

    /// Round trip time of the link, in milliseconds.
    #[arg(long, default_value_t = 100)]
    rtt_ms: u64,

    /// Bandwidth of the link, in Mbit/s.
    #[arg(long, default_value_t = 10)]
    bandwidth_mbps: u64,

    /// Stop after this many round trips even if the scenario is not done.
    #[arg(long, default_value_t = 100_000)]
    max_rounds: usize,

    /// Interval between two throughput reports of a stream, in milliseconds.
    #[arg(long, default_value_t = 5000)]
    report_interval_ms: u64,

    /// CSV file throughput rows are appended to.
    #[arg(long, env = "QUICPERF_CSV_LOG_NAME")]
    csv: Option<PathBuf>,

    /// Congestion control algorithm.
    #[arg(long, default_value = "hybla")]
    cc: String,

    /// Only parse the scenario and print the streams it describes.
    #[arg(long)]
    parse_only: bool,
}

fn main() -> anyhow::Result<()> {
    let mut log_builder = env_logger::builder();
    if env::var_os("RUST_LOG").is_none() {
        log_builder.filter_level(log::LevelFilter::Info);
    }

    log_builder.format_timestamp_nanos().init();

    let args = Args::parse();

    let scenario = quicperf::scenario::parse(&args.scenario)
        .with_context(|| format!("invalid scenario {:?}", args.scenario))?;

    if args.parse_only {
        println!("{}", serde_json::to_string_pretty(&scenario)?);
        return Ok(());
    }

    let mut config = Config::new();
    config.set_csv_log_path(args.csv);
    config.set_report_interval(Duration::from_millis(args.report_interval_ms));
    config
        .set_cc_algorithm_name(&args.cc)
        .with_context(|| format!("unknown congestion control {:?}", args.cc))?;

    let link = LinkConfig::new(
        Duration::from_millis(args.rtt_ms),
        args.bandwidth_mbps * 1_000_000 / 8,
    );

    let client = PerfContext::with_scenario(scenario, &config);
    let mut pipe = Pipe::with_client(client, &config, link);

    pipe.run(args.max_rounds)?;

    if !pipe.is_closed() {
        log::warn!("scenario not completed after {} rounds", pipe.rounds());
    }

    println!("{}", serde_json::to_string_pretty(&pipe.client_summary())?);

    if let Some(summary) = pipe.server_summary() {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    match pipe.client_close_code().or(pipe.server_close_code()) {
        Some(0) | None => Ok(()),

        Some(code) => anyhow::bail!("connection closed with error {code}"),
    }
}
