use std::fmt;
use std::net::IpAddr;

use super::dns::{DnsFeatureExtractor, DNS_PORT};
use super::stats::RunningStats;

/// Flows idle longer than this are evicted and exported.
pub const FLOW_TIMEOUT_MS: u64 = 120_000; // 2 minutes

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directional 5-tuple. "src" is whatever side sent the first packet of the
/// conversation; the reverse tuple is a distinct key and the manager looks
/// both up explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src_ip: IpAddr,
    pub dst_ip: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: Protocol,
}

impl FlowKey {
    pub fn new(src_ip: IpAddr, dst_ip: IpAddr, src_port: u16, dst_port: u16, protocol: Protocol) -> Self {
        Self { src_ip, dst_ip, src_port, dst_port, protocol }
    }

    pub fn reversed(&self) -> Self {
        Self {
            src_ip: self.dst_ip,
            dst_ip: self.src_ip,
            src_port: self.dst_port,
            dst_port: self.src_port,
            protocol: self.protocol,
        }
    }

    pub fn is_dns(&self) -> bool {
        self.src_port == DNS_PORT || self.dst_port == DNS_PORT
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{} [{}]",
            self.src_ip, self.src_port, self.dst_ip, self.dst_port, self.protocol
        )
    }
}

const COLUMNS: [&str; 40] = [
    // identity
    "src_ip",
    "dst_ip",
    "src_port",
    "dst_port",
    "protocol",
    // DNS-critical
    "dns_amplification_factor",
    "query_response_ratio",
    "dns_any_query_ratio",
    "dns_txt_query_ratio",
    "dns_server_fanout",
    "dns_response_inconsistency",
    "ttl_violation_rate",
    "dns_queries_per_second",
    "dns_mean_answers_per_query",
    "port_53_traffic_ratio",
    // flow rates
    "flow_bytes_per_sec",
    "flow_packets_per_sec",
    "fwd_packets_per_sec",
    "bwd_packets_per_sec",
    // flow stats
    "flow_duration",
    "total_fwd_packets",
    "total_bwd_packets",
    "total_fwd_bytes",
    "total_bwd_bytes",
    // DNS aggregates
    "dns_total_queries",
    "dns_total_responses",
    "dns_response_bytes",
    // timing
    "flow_iat_mean",
    "flow_iat_std",
    "flow_iat_min",
    "flow_iat_max",
    "fwd_iat_mean",
    "bwd_iat_mean",
    // sizes
    "fwd_packet_length_mean",
    "bwd_packet_length_mean",
    "packet_size_std",
    "flow_length_min",
    "flow_length_max",
    // advanced
    "response_time_variance",
    "average_packet_size",
];

fn fmt4(value: f64) -> String {
    format!("{value:.4}")
}

/// One bidirectional conversation and everything accumulated over it.
#[derive(Debug, Clone)]
pub struct Flow {
    key: FlowKey,
    start_time: u64,
    last_packet_time: u64,
    last_fwd_time: u64,
    last_bwd_time: u64,

    fwd_count: u64,
    bwd_count: u64,

    fwd_length_stats: RunningStats,
    bwd_length_stats: RunningStats,
    fwd_iat_stats: RunningStats,
    bwd_iat_stats: RunningStats,
    flow_iat_stats: RunningStats,
    flow_length_stats: RunningStats,

    dns: Option<DnsFeatureExtractor>,
    label: Option<String>,
}

impl Flow {
    pub fn new(key: FlowKey, start_time: u64, label: Option<String>) -> Self {
        let dns = key.is_dns().then(DnsFeatureExtractor::new);
        Self {
            key,
            start_time,
            last_packet_time: start_time,
            last_fwd_time: 0,
            last_bwd_time: 0,
            fwd_count: 0,
            bwd_count: 0,
            fwd_length_stats: RunningStats::new(),
            bwd_length_stats: RunningStats::new(),
            fwd_iat_stats: RunningStats::new(),
            bwd_iat_stats: RunningStats::new(),
            flow_iat_stats: RunningStats::new(),
            flow_length_stats: RunningStats::new(),
            dns,
            label,
        }
    }

    pub fn key(&self) -> &FlowKey {
        &self.key
    }

    pub fn start_time(&self) -> u64 {
        self.start_time
    }

    pub fn last_packet_time(&self) -> u64 {
        self.last_packet_time
    }

    pub fn duration_ms(&self) -> u64 {
        self.last_packet_time - self.start_time
    }

    pub fn fwd_packets(&self) -> u64 {
        self.fwd_count
    }

    pub fn bwd_packets(&self) -> u64 {
        self.bwd_count
    }

    pub fn total_packets(&self) -> u64 {
        self.fwd_count + self.bwd_count
    }

    pub fn dns(&self) -> Option<&DnsFeatureExtractor> {
        self.dns.as_ref()
    }

    /// Fold one packet into the flow.
    ///
    /// A packet whose timestamp precedes the newest one seen keeps its
    /// volumetric contribution (lengths, direction counters) but is excluded
    /// from every inter-arrival statistic, and it never rewinds
    /// `last_packet_time`. Timing features stay non-negative that way.
    pub fn add_packet(&mut self, payload: &[u8], wire_len: u32, timestamp_ms: u64, is_forward: bool) {
        let in_order = timestamp_ms >= self.last_packet_time;

        if in_order && self.total_packets() > 0 {
            self.flow_iat_stats.add((timestamp_ms - self.last_packet_time) as f64);
        }

        self.flow_length_stats.add(wire_len as f64);

        if is_forward {
            if in_order && self.fwd_count > 0 && timestamp_ms >= self.last_fwd_time {
                self.fwd_iat_stats.add((timestamp_ms - self.last_fwd_time) as f64);
            }
            self.last_fwd_time = timestamp_ms;
            self.fwd_length_stats.add(wire_len as f64);
            self.fwd_count += 1;
        } else {
            if in_order && self.bwd_count > 0 && timestamp_ms >= self.last_bwd_time {
                self.bwd_iat_stats.add((timestamp_ms - self.last_bwd_time) as f64);
            }
            self.last_bwd_time = timestamp_ms;
            self.bwd_length_stats.add(wire_len as f64);
            self.bwd_count += 1;
        }

        if in_order {
            self.last_packet_time = timestamp_ms;
        }

        if let Some(dns) = self.dns.as_mut() {
            dns.process_packet(payload, wire_len, timestamp_ms, self.key.protocol == Protocol::Tcp);
        }
    }

    pub fn header(include_label: bool) -> Vec<&'static str> {
        let mut header: Vec<&'static str> = COLUMNS.to_vec();
        if include_label {
            header.push("label");
        }
        header
    }

    /// Serialize the flow into the fixed column schema. Non-DNS flows fill
    /// the DNS columns with zeros so every row stays rectangular.
    pub fn to_row(&self) -> Vec<String> {
        let duration_sec = (self.duration_ms() as f64 / 1_000.0).max(1.0);
        let total_bytes = self.flow_length_stats.sum();
        let d = self.dns.as_ref();

        let mut row = Vec::with_capacity(COLUMNS.len() + 1);

        // identity
        row.push(self.key.src_ip.to_string());
        row.push(self.key.dst_ip.to_string());
        row.push(self.key.src_port.to_string());
        row.push(self.key.dst_port.to_string());
        row.push(self.key.protocol.to_string());

        // DNS-critical
        row.push(fmt4(d.map_or(0.0, |x| x.amplification_factor())));
        row.push(fmt4(d.map_or(0.0, |x| x.query_response_ratio())));
        row.push(fmt4(d.map_or(0.0, |x| x.any_query_ratio())));
        row.push(fmt4(d.map_or(0.0, |x| x.txt_query_ratio())));
        // fanout needs visibility across flows; a single 5-tuple sees one server
        row.push("0".to_string());
        row.push(d.map_or(0, |x| x.response_inconsistency()).to_string());
        row.push(fmt4(d.map_or(0, |x| x.ttl_violation_count()) as f64));
        row.push(fmt4(d.map_or(0.0, |x| x.queries_per_second(duration_sec))));
        row.push(fmt4(d.map_or(0.0, |x| x.mean_answers_per_query())));
        row.push(fmt4(d.map_or(0.0, |x| x.port53_traffic_ratio(total_bytes))));

        // flow rates
        row.push(fmt4(total_bytes / duration_sec));
        row.push(fmt4(self.total_packets() as f64 / duration_sec));
        row.push(fmt4(self.fwd_count as f64 / duration_sec));
        row.push(fmt4(self.bwd_count as f64 / duration_sec));

        // flow stats
        row.push(self.duration_ms().to_string());
        row.push(self.fwd_count.to_string());
        row.push(self.bwd_count.to_string());
        row.push((self.fwd_length_stats.sum() as u64).to_string());
        row.push((self.bwd_length_stats.sum() as u64).to_string());

        // DNS aggregates
        row.push(d.map_or(0, |x| x.total_queries()).to_string());
        row.push(d.map_or(0, |x| x.total_responses()).to_string());
        row.push(d.map_or(0, |x| x.response_bytes()).to_string());

        // timing
        row.push(fmt4(self.flow_iat_stats.mean()));
        row.push(fmt4(self.flow_iat_stats.std_dev()));
        row.push(fmt4(self.flow_iat_stats.min()));
        row.push(fmt4(self.flow_iat_stats.max()));
        row.push(fmt4(self.fwd_iat_stats.mean()));
        row.push(fmt4(self.bwd_iat_stats.mean()));

        // sizes
        row.push(fmt4(self.fwd_length_stats.mean()));
        row.push(fmt4(self.bwd_length_stats.mean()));
        row.push(fmt4(self.flow_length_stats.std_dev()));
        row.push(fmt4(self.flow_length_stats.min()));
        row.push(fmt4(self.flow_length_stats.max()));

        // advanced
        row.push(fmt4(d.map_or(0.0, |x| x.response_time_variance())));
        row.push(fmt4(self.flow_length_stats.mean()));

        if let Some(label) = &self.label {
            row.push(label.clone());
        }

        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn udp_key(src_port: u16, dst_port: u16) -> FlowKey {
        FlowKey::new(
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
            IpAddr::V4(Ipv4Addr::new(8, 8, 8, 8)),
            src_port,
            dst_port,
            Protocol::Udp,
        )
    }

    fn col(row: &[String], name: &str) -> String {
        let idx = COLUMNS.iter().position(|c| *c == name).unwrap();
        row[idx].clone()
    }

    #[test]
    fn key_reversal() {
        let key = udp_key(40000, 53);
        let rev = key.reversed();
        assert_eq!(rev.src_port, 53);
        assert_eq!(rev.dst_port, 40000);
        assert_eq!(rev.reversed(), key);
        assert_ne!(key, rev);
    }

    #[test]
    fn dns_extractor_only_on_port_53() {
        let dns_flow = Flow::new(udp_key(40000, 53), 1_000, None);
        assert!(dns_flow.dns().is_some());

        let plain = Flow::new(udp_key(40000, 80), 1_000, None);
        assert!(plain.dns().is_none());
    }

    #[test]
    fn counts_and_lengths() {
        let mut flow = Flow::new(udp_key(40000, 80), 1_000, None);
        flow.add_packet(&[], 60, 1_000, true);
        flow.add_packet(&[], 300, 1_060, false);

        assert_eq!(flow.fwd_packets(), 1);
        assert_eq!(flow.bwd_packets(), 1);
        assert_eq!(flow.duration_ms(), 60);

        let row = flow.to_row();
        assert_eq!(col(&row, "total_fwd_bytes"), "60");
        assert_eq!(col(&row, "total_bwd_bytes"), "300");
        assert_eq!(col(&row, "flow_iat_mean"), "60.0000");
        assert_eq!(col(&row, "packet_size_std"), "120.0000");
        assert_eq!(col(&row, "average_packet_size"), "180.0000");
    }

    #[test]
    fn out_of_order_packet_skips_timing() {
        let mut flow = Flow::new(udp_key(40000, 80), 1_000, None);
        flow.add_packet(&[], 100, 1_000, true);
        flow.add_packet(&[], 100, 1_100, true);
        flow.add_packet(&[], 100, 1_050, true);

        // the straggler still counts toward volume
        assert_eq!(flow.fwd_packets(), 3);
        assert_eq!(flow.duration_ms(), 100);
        // but contributes no inter-arrival sample
        let row = flow.to_row();
        assert_eq!(col(&row, "flow_iat_mean"), "100.0000");
        assert_eq!(col(&row, "flow_iat_max"), "100.0000");
    }

    #[test]
    fn single_packet_flow_row() {
        let mut flow = Flow::new(udp_key(40000, 53), 1_000, None);
        flow.add_packet(&[], 60, 1_000, true);

        let row = flow.to_row();
        assert_eq!(col(&row, "flow_duration"), "0");
        assert_eq!(col(&row, "flow_iat_mean"), "0.0000");
        assert_eq!(col(&row, "flow_iat_std"), "0.0000");
        // rates divide by the clamped 1s duration, never by zero
        assert_eq!(col(&row, "flow_bytes_per_sec"), "60.0000");
        assert_eq!(col(&row, "flow_packets_per_sec"), "1.0000");
    }

    #[test]
    fn row_matches_header_width() {
        let mut flow = Flow::new(udp_key(40000, 80), 1_000, None);
        flow.add_packet(&[], 60, 1_000, true);
        assert_eq!(flow.to_row().len(), Flow::header(false).len());

        let mut labeled = Flow::new(udp_key(40000, 80), 1_000, Some("BENIGN".into()));
        labeled.add_packet(&[], 60, 1_000, true);
        let row = labeled.to_row();
        assert_eq!(row.len(), Flow::header(true).len());
        assert_eq!(row.last().unwrap(), "BENIGN");
    }

    #[test]
    fn average_between_min_and_max() {
        let mut flow = Flow::new(udp_key(40000, 80), 1_000, None);
        for (i, len) in [60u32, 1_400, 300, 90].iter().enumerate() {
            flow.add_packet(&[], *len, 1_000 + i as u64 * 10, i % 2 == 0);
        }
        let row = flow.to_row();
        let min: f64 = col(&row, "flow_length_min").parse().unwrap();
        let avg: f64 = col(&row, "average_packet_size").parse().unwrap();
        let max: f64 = col(&row, "flow_length_max").parse().unwrap();
        assert!(min <= avg && avg <= max);
    }

    #[test]
    fn non_dns_flow_zero_fills_dns_columns() {
        let mut flow = Flow::new(udp_key(40000, 80), 1_000, None);
        flow.add_packet(&[], 60, 1_000, true);
        let row = flow.to_row();
        assert_eq!(col(&row, "dns_amplification_factor"), "0.0000");
        assert_eq!(col(&row, "dns_total_queries"), "0");
        assert_eq!(col(&row, "dns_response_bytes"), "0");
        assert_eq!(col(&row, "response_time_variance"), "0.0000");
    }

    #[test]
    fn directional_iat_means() {
        let mut flow = Flow::new(udp_key(40000, 80), 1_000, None);
        flow.add_packet(&[], 100, 1_000, true);
        flow.add_packet(&[], 100, 1_040, false);
        flow.add_packet(&[], 100, 1_100, true);
        flow.add_packet(&[], 100, 1_180, false);

        let row = flow.to_row();
        assert_eq!(col(&row, "fwd_iat_mean"), "100.0000");
        assert_eq!(col(&row, "bwd_iat_mean"), "140.0000");
        // flow-wide gaps: 40, 60, 80
        assert_eq!(col(&row, "flow_iat_mean"), "60.0000");
    }
}
