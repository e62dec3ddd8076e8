// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::{
    format_bytes, humanize_uptime, parse_aplay, parse_cpuinfo_field, parse_df_all, parse_ip_addr,
    parse_lsusb, parse_os_release, parse_v4l2_card_type,
};

#[test]
fn uptime_units_match_gui() {
    assert_eq!(humanize_uptime(0), "0 м");
    assert_eq!(humanize_uptime(59), "0 м");
    assert_eq!(humanize_uptime(60), "1 м");
    assert_eq!(humanize_uptime(3600), "1 ч");
    assert_eq!(humanize_uptime(90_061), "1 д 1 ч 1 м");
    assert_eq!(humanize_uptime(172_800), "2 д");
}

#[test]
fn bytes_format_binary_units() {
    assert_eq!(format_bytes(0.0), "0B");
    assert_eq!(format_bytes(512.0), "512.0 B");
    assert_eq!(format_bytes(2048.0), "2.0 KB");
    assert_eq!(format_bytes(3.5 * 1024.0 * 1024.0 * 1024.0), "3.5 GB");
}

#[test]
fn cpuinfo_field_extraction() {
    let cpuinfo = "processor\t: 0\nmodel name\t: Example CPU @ 2.40GHz\ncpu MHz\t\t: 2400.000\n";
    assert_eq!(parse_cpuinfo_field(cpuinfo, "model name").as_deref(), Some("Example CPU @ 2.40GHz"));
    assert_eq!(parse_cpuinfo_field(cpuinfo, "cpu MHz").as_deref(), Some("2400.000"));
    assert!(parse_cpuinfo_field(cpuinfo, "flags").is_none());
}

#[test]
fn os_release_strips_quotes() {
    let release = "NAME=\"Debian GNU/Linux\"\nVERSION=\"12 (bookworm)\"\nID=debian\n";
    assert_eq!(parse_os_release(release, "NAME").as_deref(), Some("Debian GNU/Linux"));
    assert_eq!(parse_os_release(release, "ID").as_deref(), Some("debian"));
    assert!(parse_os_release(release, "MISSING").is_none());
}

#[test]
fn lsusb_lines_become_devices() {
    let output = "\
Bus 002 Device 001: ID 1d6b:0003 Linux Foundation 3.0 root hub
Bus 001 Device 004: ID 046d:c52b Logitech, Inc. Unifying Receiver
garbage line
";
    let devices = parse_lsusb(output);
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[1]["device"], "Logitech, Inc. Unifying Receiver");
    assert_eq!(devices[1]["vendor"], "046d:c52b");
    assert_eq!(devices[0]["status"], "Подключено");
}

#[test]
fn aplay_cards_become_devices() {
    let output = "\
**** List of PLAYBACK Hardware Devices ****
card 0: PCH [HDA Intel PCH], device 0: ALC255 Analog [ALC255 Analog]
card 1: HDMI [HDA ATI HDMI], device 3: HDMI 0 [HDMI 0]
";
    let devices = parse_aplay(output);
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0]["device"], "HDA Intel PCH");
    assert_eq!(devices[0]["type"], "Аудио (воспроизведение)");
}

#[test]
fn df_all_parses_mounts() {
    let output = "\
Filesystem     1024-blocks    Used Available Capacity Mounted on
/dev/sda1         10485760 5242880   5242880      50% /
tmpfs               102400       0    102400       0% /dev/shm
";
    let mounts = parse_df_all(output);
    assert_eq!(mounts.len(), 2);
    assert_eq!(mounts[0]["device"], "/dev/sda1");
    assert_eq!(mounts[0]["mountpoint"], "/");
    assert_eq!(mounts[0]["size"], "10.0 GB");
    assert_eq!(mounts[0]["used"], "5.0 GB (50%)");
}

#[test]
fn ip_addr_json_becomes_interfaces() {
    let output = r#"[
        {"ifname":"lo","address":"00:00:00:00:00:00","operstate":"UNKNOWN",
         "addr_info":[{"family":"inet","local":"127.0.0.1"}]},
        {"ifname":"eth0","address":"aa:bb:cc:dd:ee:ff","operstate":"UP",
         "addr_info":[{"family":"inet6","local":"fe80::1"},{"family":"inet","local":"192.168.1.5"}]}
    ]"#;
    let interfaces = parse_ip_addr(output);
    assert_eq!(interfaces.len(), 2);
    assert_eq!(interfaces[1]["interface"], "eth0");
    assert_eq!(interfaces[1]["ip"], "192.168.1.5");
    assert_eq!(interfaces[1]["status"], "UP");
}

#[test]
fn ip_addr_garbage_is_empty() {
    assert!(parse_ip_addr("not json").is_empty());
}

#[test]
fn v4l2_card_type_extraction() {
    let output = "Driver Info:\n\tDriver name      : uvcvideo\n\tCard type        : Integrated Camera\n";
    assert_eq!(parse_v4l2_card_type(output).as_deref(), Some("Integrated Camera"));
    assert!(parse_v4l2_card_type("no card here").is_none());
}
