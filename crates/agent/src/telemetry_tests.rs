// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::{
    boot_time_from_uptime, parse_cpu_percent, parse_df_root, parse_meminfo, parse_net_dev,
    NetWatermark,
};

#[test]
fn cpu_percent_from_proc_stat() {
    let stat = "cpu  100 0 100 700 50 0 50 0 0 0\ncpu0 50 0 50 350 25 0 25 0 0 0\n";
    // total = 1000, idle = 700 → 30% busy.
    let percent = parse_cpu_percent(stat);
    assert!((percent - 30.0).abs() < 0.01, "unexpected cpu percent: {percent}");
}

#[test]
fn cpu_percent_handles_garbage() {
    assert_eq!(parse_cpu_percent(""), 0.0);
    assert_eq!(parse_cpu_percent("cpu0 1 2 3 4\n"), 0.0);
}

#[test]
fn meminfo_excludes_buffers_and_cache() {
    let meminfo = "MemTotal:       1000 kB\nMemFree:         200 kB\nBuffers:         100 kB\nCached:          300 kB\nSwapTotal:      2000 kB\n";
    let (percent, used, total) = parse_meminfo(meminfo);
    assert_eq!(total, 1_024_000);
    assert_eq!(used, 400 * 1024);
    assert!((percent - 40.0).abs() < 0.01);
}

#[test]
fn net_dev_skips_loopback_and_docker() {
    let net_dev = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:    1000     10    0    0    0     0          0         0     1000     10    0    0    0     0       0          0
  eth0:    5000     50    0    0    0     0          0         0     7000     70    0    0    0     0       0          0
docker0:    9999     99    0    0    0     0          0         0     9999     99    0    0    0     0       0          0
  wlan0:     111      1    0    0    0     0          0         0      222      2    0    0    0     0       0          0
";
    let (rx, tx) = parse_net_dev(net_dev);
    assert_eq!(rx, 5111);
    assert_eq!(tx, 7222);
}

#[test]
fn df_root_parses_percent_and_sizes() {
    let output = "\
Filesystem     1024-blocks    Used Available Capacity Mounted on
/dev/sda1         10485760 5242880   5242880      50% /
";
    let (percent, used, total) = parse_df_root(output);
    assert!((percent - 50.0).abs() < 0.01);
    assert_eq!(used, 5_242_880 * 1024);
    assert_eq!(total, 10_485_760 * 1024);
}

#[test]
fn df_root_tolerates_short_output() {
    assert_eq!(parse_df_root(""), (0.0, 0, 0));
    assert_eq!(parse_df_root("only a header line\n"), (0.0, 0, 0));
}

#[test]
fn rates_derive_from_deltas() {
    let mark = NetWatermark { rx: 1000, tx: 2000, at: std::time::Instant::now() };
    let (rx_rate, tx_rate) = mark.rates(3000, 6000, Duration::from_secs(2));
    assert!((rx_rate - 1000.0).abs() < f64::EPSILON);
    assert!((tx_rate - 2000.0).abs() < f64::EPSILON);
}

#[test]
fn rates_clamp_to_zero_without_elapsed_time() {
    let mark = NetWatermark { rx: 1000, tx: 2000, at: std::time::Instant::now() };
    assert_eq!(mark.rates(3000, 6000, Duration::ZERO), (0.0, 0.0));
}

#[test]
fn counter_reset_does_not_go_negative() {
    let mark = NetWatermark { rx: 5000, tx: 5000, at: std::time::Instant::now() };
    let (rx_rate, tx_rate) = mark.rates(100, 100, Duration::from_secs(1));
    assert_eq!((rx_rate, tx_rate), (0.0, 0.0));
}

#[test]
fn boot_time_renders_gui_format() {
    let rendered = boot_time_from_uptime("12345.67 23456.78\n");
    // dd.mm.yyyy hh:mm:ss
    assert_eq!(rendered.len(), 19);
    assert_eq!(&rendered[2..3], ".");
    assert_eq!(&rendered[5..6], ".");
}
