//! Router commands, output patterns and text scrapers.
//!
//! Shell output is parsed line by line against fixed regexes; lines that do
//! not match are logged and skipped. The web UI embeds its data as
//! `{key::value}` tokens inside `*.live.asp` pages, and two of those values
//! are themselves flat quoted arrays that need their own decoding.

use std::collections::HashMap;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

/// DHCP leases written by dnsmasq.
pub const LEASES_CMD: &str = "cat /tmp/dnsmasq.leases";

/// Associated stations on Broadcom radios, both bands.
pub const WL_CMD: &str = "nvram show 2> /dev/null | grep 'wl._ifname' | awk -F '=' \
'{cmd=\"wl -i \" $2 \" assoclist\"; while(cmd | getline var) print var}' | awk '{print $2}'";

/// Associated stations on nl80211 radios.
pub const IW_CMD: &str = "iw dev | grep Interface | awk '{cmd=\"iw dev \" $2 \" station \
dump\"; while(cmd | getline var) print var}' | grep Station | awk '{print $2}'";

/// Probe whose output decides between [`WL_CMD`] and [`IW_CMD`].
pub const WL_VERSION_CMD: &str = "wl ver";

pub const ARP_CMD: &str = "arp -n";
pub const RX_COMMAND: &str = "cat /sys/class/net/eth0/statistics/rx_bytes";
pub const TX_COMMAND: &str = "cat /sys/class/net/eth0/statistics/tx_bytes";

pub const LAN_STATUS_PAGE: &str = "Status_Lan.live.asp";
pub const WIRELESS_STATUS_PAGE: &str = "Status_Wireless.live.asp";

/// Number of array elements describing one lease on the LAN status page.
const LEASE_FIELDS: usize = 5;

pub static LEASES_REGEX: Lazy<Regex> = Lazy::new(|| {
    match Regex::new(concat!(
        r"\w+\s",
        r"(?P<mac>(([0-9a-fA-F]{2}[:-]){5}([0-9a-fA-F]{2})))\s",
        r"(?P<ip>([0-9]{1,3}[\.]){3}[0-9]{1,3})\s",
        r"(?P<host>([^\s]+))",
    )) {
        Ok(re) => re,
        Err(err) => panic!("invalid LEASES_REGEX regex: {err}"),
    }
});

pub static MAC_REGEX: Lazy<Regex> = Lazy::new(|| {
    match Regex::new(r"(?P<mac>([0-9A-Fa-f]{1,2}\:){5}[0-9A-Fa-f]{1,2})") {
        Ok(re) => re,
        Err(err) => panic!("invalid MAC_REGEX regex: {err}"),
    }
});

pub static ARP_REGEX: Lazy<Regex> = Lazy::new(|| {
    match Regex::new(concat!(
        r".+\s",
        r"\((?P<ip>([0-9]{1,3}[\.]){3}[0-9]{1,3})\)\s",
        r".+\s",
        r"(?P<mac>(([0-9a-fA-F]{2}[:-]){5}([0-9a-fA-F]{2})))",
        r"\s",
        r".*",
    )) {
        Ok(re) => re,
        Err(err) => panic!("invalid ARP_REGEX regex: {err}"),
    }
});

static HTTP_DATA: Lazy<Regex> = Lazy::new(|| match Regex::new(r"\{(\w+)::([^\}]*)\}") {
    Ok(re) => re,
    Err(err) => panic!("invalid HTTP_DATA regex: {err}"),
});

/// Named captures of one matched line.
pub type Fields = HashMap<String, String>;

/// One lease record decoded from either the shell or the web UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRecord {
    pub mac: String,
    pub ip: String,
    pub host: String,
}

/// Matches every non-empty line against `regex` and collects its named groups.
///
/// Lines that do not match are skipped with a debug log. Input order is kept.
pub fn parse_lines<S: AsRef<str>>(lines: &[S], regex: &Regex) -> Vec<Fields> {
    let names: Vec<&str> = regex.capture_names().flatten().collect();
    let mut results = Vec::new();
    for line in lines.iter().map(AsRef::as_ref) {
        if line.is_empty() {
            continue;
        }
        let Some(caps) = regex.captures(line) else {
            debug!("Could not parse row: {:?}", line);
            continue;
        };
        let fields = names
            .iter()
            .filter_map(|name| {
                caps.name(name)
                    .map(|m| (name.to_string(), m.as_str().to_string()))
            })
            .collect();
        results.push(fields);
    }
    results
}

/// Extracts every `{key::value}` token of a status page. Later keys win.
pub fn parse_http_data(page: &str) -> HashMap<String, String> {
    HTTP_DATA
        .captures_iter(page)
        .filter_map(|caps| match (caps.get(1), caps.get(2)) {
            (Some(key), Some(value)) => Some((key.as_str().to_string(), value.as_str().to_string())),
            _ => None,
        })
        .collect()
}

/// MAC addresses listed in the `active_wireless` value of the wireless page.
///
/// The value is a flat `'a','b',...` array where only some elements are
/// MACs, so the elements are filtered instead of read in fixed strides.
pub fn parse_http_wireless(page: &str) -> Vec<String> {
    let data = parse_http_data(page);
    let Some(active) = data.get("active_wireless").filter(|v| !v.trim().is_empty()) else {
        debug!("No active_wireless value in wireless page");
        return Vec::new();
    };

    active
        .trim()
        .trim_matches('\'')
        .split("','")
        .filter(|item| MAC_REGEX.find(item).is_some_and(|m| m.start() == 0))
        .map(str::to_string)
        .collect()
}

/// Lease records listed in the `dhcp_leases` value of the LAN page.
///
/// Every five elements form one lease: name, IP, MAC, lease time, vendor id.
/// A trailing partial group is ignored.
pub fn parse_http_leases(page: &str) -> Vec<LeaseRecord> {
    let data = parse_http_data(page);
    let Some(raw) = data.get("dhcp_leases") else {
        debug!("No dhcp_leases value in LAN page");
        return Vec::new();
    };

    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '"' | '\'' | ' '))
        .collect();
    if cleaned.is_empty() {
        return Vec::new();
    }

    let elements: Vec<&str> = cleaned.split(',').collect();
    elements
        .chunks_exact(LEASE_FIELDS)
        .map(|lease| LeaseRecord {
            host: lease[0].to_string(),
            ip: lease[1].to_string(),
            mac: lease[2].to_string(),
        })
        .collect()
}

/// Lease records from `dnsmasq.leases` shell output.
///
/// `duid` lines describe the DHCPv6 server itself and are dropped first.
pub fn parse_shell_leases<S: AsRef<str>>(lines: &[S]) -> Vec<LeaseRecord> {
    let lines: Vec<&str> = lines
        .iter()
        .map(AsRef::as_ref)
        .filter(|line| !line.starts_with("duid "))
        .collect();

    parse_lines(&lines, &LEASES_REGEX)
        .into_iter()
        .filter_map(|mut fields| {
            Some(LeaseRecord {
                mac: fields.remove("mac")?,
                ip: fields.remove("ip")?,
                host: fields.remove("host")?,
            })
        })
        .collect()
}

/// `(mac, ip)` pairs from `arp -n` output.
pub fn parse_arp<S: AsRef<str>>(lines: &[S]) -> Vec<(String, String)> {
    parse_lines(lines, &ARP_REGEX)
        .into_iter()
        .filter_map(|mut fields| Some((fields.remove("mac")?, fields.remove("ip")?)))
        .collect()
}

/// MAC addresses from an association list.
pub fn parse_macs<S: AsRef<str>>(lines: &[S]) -> Vec<String> {
    parse_lines(lines, &MAC_REGEX)
        .into_iter()
        .filter_map(|mut fields| fields.remove("mac"))
        .collect()
}

/// Picks the association-list command from `wl ver` output.
pub fn select_wireless_command<S: AsRef<str>>(version_output: &[S]) -> &'static str {
    if version_output
        .iter()
        .any(|line| line.as_ref().contains("version"))
    {
        WL_CMD
    } else {
        IW_CMD
    }
}

/// Parses a byte counter line such as `2703926881\r`.
pub fn parse_counter(line: &str) -> Option<u64> {
    line.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const WL_DATA: &[&str] = &[
        "01:02:03:04:06:08\r",
        "08:09:10:11:12:14\r",
        "not a mac address\r",
        "AB:CD:DE:AB:CD:EF\r",
    ];

    const LEASES_DATA: &[&str] = &[
        "duid 00:01:00:01:2a:3b:4c:5d:00:11:22:33:44:55\r",
        "51910 01:02:03:04:06:08 123.123.123.125 TV 01:02:03:04:06:08\r",
        "79986 01:02:03:04:06:10 123.123.123.127 android 01:02:03:04:06:15\r",
        "23523 08:09:10:11:12:14 123.123.123.126 * 08:09:10:11:12:14\r",
    ];

    const HTTP_WL_DATA: &str = "
{wl_mac::AA:BB:CC:DD:EE:FF}
{wl_ssid::WIFI_SSD}
{active_wireless::'AA:BB:CC:DD:EE:00','eth1','3:13:14','72M','24M','HT20','-9','-92','83','1048','AA:BB:CC:DD:EE:01','eth1','10:48:22','72M','72M','HT20','-40','-92','52','664'}
{active_wds::}
";

    #[test]
    fn mac_list_skips_garbage_and_keeps_order() {
        let macs = parse_macs(WL_DATA);
        assert_eq!(
            macs,
            vec!["01:02:03:04:06:08", "08:09:10:11:12:14", "AB:CD:DE:AB:CD:EF"]
        );
    }

    #[test]
    fn parse_lines_ignores_empty_lines() {
        let lines = ["", "01:02:03:04:06:08", ""];
        assert_eq!(parse_lines(&lines, &MAC_REGEX).len(), 1);
    }

    #[test]
    fn shell_leases_drop_duid_lines() {
        let leases = parse_shell_leases(LEASES_DATA);
        assert_eq!(leases.len(), 3);
        assert_eq!(
            leases[0],
            LeaseRecord {
                mac: "01:02:03:04:06:08".to_string(),
                ip: "123.123.123.125".to_string(),
                host: "TV".to_string(),
            }
        );
        assert_eq!(leases[2].host, "*");
    }

    #[test]
    fn http_data_last_key_wins() {
        let data = parse_http_data("{a::1}{b::two words}{a::3}");
        assert_eq!(data.get("a").map(String::as_str), Some("3"));
        assert_eq!(data.get("b").map(String::as_str), Some("two words"));
    }

    #[test]
    fn http_wireless_keeps_only_macs() {
        let macs = parse_http_wireless(HTTP_WL_DATA);
        assert_eq!(macs, vec!["AA:BB:CC:DD:EE:00", "AA:BB:CC:DD:EE:01"]);
    }

    #[test]
    fn http_wireless_without_clients_is_empty() {
        assert!(parse_http_wireless("{active_wireless::}").is_empty());
        assert!(parse_http_wireless("{wl_mac::AA:BB:CC:DD:EE:FF}").is_empty());
    }

    #[test]
    fn http_leases_ignore_trailing_partial_record() {
        let page = "{dhcp_leases:: 'TV','10.0.0.2','01:02:03:04:06:08','1 day','113','half','10.0.0.3'}";
        let leases = parse_http_leases(page);
        assert_eq!(leases.len(), 1);
        assert_eq!(leases[0].host, "TV");
        assert_eq!(leases[0].ip, "10.0.0.2");
        assert_eq!(leases[0].mac, "01:02:03:04:06:08");
    }

    #[test]
    fn http_leases_empty_value() {
        assert!(parse_http_leases("{dhcp_leases::}").is_empty());
        assert!(parse_http_leases("{lan_ip::192.168.1.1}").is_empty());
    }

    #[test]
    fn wireless_command_follows_version_probe() {
        assert_eq!(select_wireless_command(&["wl ver", "version 6.37.14"]), WL_CMD);
        assert_eq!(select_wireless_command(&["wl: not found"]), IW_CMD);
        assert_eq!(select_wireless_command::<&str>(&[]), IW_CMD);
    }

    #[test]
    fn counters_tolerate_line_endings() {
        assert_eq!(parse_counter("2703926881\r"), Some(2_703_926_881));
        assert_eq!(parse_counter("n/a"), None);
    }
}
