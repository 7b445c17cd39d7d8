//! DNS payload inspection for port-53 flows.
//!
//! Every packet of a DNS flow is parsed defensively into a [`DnsMessage`]
//! view first; only a fully parsed message mutates extractor state, so a
//! truncated or garbled payload leaves all counters untouched.

use std::collections::{HashMap, HashSet};

use super::stats::RunningStats;

pub const DNS_PORT: u16 = 53;

const DNS_HEADER_SIZE: usize = 12;
const DNS_TCP_PAYLOAD_OFFSET: usize = 2;
const DNS_HEADER_QR_MASK: u16 = 0x8000;
const DNS_NAME_COMPRESS_POINTER: u8 = 0xc0;
const DNS_NAME_MAX_SIZE: usize = 255;
const RR_TYPE_OPT: u16 = 41;
const QTYPE_TXT: u16 = 16;
const QTYPE_ANY: u16 = 255;
const RCODE_NXDOMAIN: u8 = 3;

const PENDING_QUERY_CAP: usize = 10_000;
const PENDING_QUERY_MAX_AGE_MS: u64 = 5_000;
const UNIQUE_DOMAIN_CAP: usize = 10_000;

/// Stand-in for an undefined response/query byte ratio: responses were seen
/// but not a single query byte, the classic reflection signature.
const AMPLIFICATION_SENTINEL: f64 = 999.0;

struct Question {
    qtype: u16,
    qname: String,
}

struct RecordHead {
    rtype: u16,
    class: u16,
    ttl: u32,
}

/// Parsed view of one DNS message. Building the view never mutates anything,
/// which is what makes the per-packet abort-on-error rule cheap to honor.
struct DnsMessage {
    tx_id: u16,
    is_response: bool,
    opcode: u8,
    rcode: u8,
    qd_count: u16,
    an_count: u16,
    ns_count: u16,
    ar_count: u16,
    questions: Vec<Question>,
    answer_ttls: Vec<u32>,
    edns_udp_size: Option<u16>,
}

impl DnsMessage {
    fn parse(payload: &[u8], is_tcp: bool) -> Option<Self> {
        let data = if is_tcp {
            strip_tcp_length_prefix(payload)
        } else {
            payload
        };
        if data.len() < DNS_HEADER_SIZE {
            return None;
        }

        let tx_id = u16::from_be_bytes([data[0], data[1]]);
        let flags = u16::from_be_bytes([data[2], data[3]]);
        let is_response = flags & DNS_HEADER_QR_MASK != 0;
        let opcode = ((flags >> 11) & 0x0f) as u8;
        let rcode = (flags & 0x000f) as u8;
        let qd_count = u16::from_be_bytes([data[4], data[5]]);
        let an_count = u16::from_be_bytes([data[6], data[7]]);
        let ns_count = u16::from_be_bytes([data[8], data[9]]);
        let ar_count = u16::from_be_bytes([data[10], data[11]]);

        let mut cursor = DNS_HEADER_SIZE;

        let mut questions = Vec::with_capacity(qd_count as usize);
        for _ in 0..qd_count {
            let qname = read_name(data, &mut cursor)?;
            let fixed = data.get(cursor..cursor + 4)?;
            let qtype = u16::from_be_bytes([fixed[0], fixed[1]]);
            cursor += 4;
            questions.push(Question { qtype, qname });
        }

        let mut answer_ttls = Vec::with_capacity(an_count as usize);
        for _ in 0..an_count {
            let rr = read_record(data, &mut cursor)?;
            answer_ttls.push(rr.ttl);
        }
        for _ in 0..ns_count {
            read_record(data, &mut cursor)?;
        }

        let mut edns_udp_size: Option<u16> = None;
        for _ in 0..ar_count {
            let rr = read_record(data, &mut cursor)?;
            if rr.rtype == RR_TYPE_OPT {
                // The OPT pseudo-RR carries the advertised UDP payload size
                // in its class field.
                let size = rr.class & 0xffff;
                edns_udp_size = Some(edns_udp_size.map_or(size, |cur| cur.max(size)));
            }
        }

        Some(Self {
            tx_id,
            is_response,
            opcode,
            rcode,
            qd_count,
            an_count,
            ns_count,
            ar_count,
            questions,
            answer_ttls,
            edns_udp_size,
        })
    }
}

/// DNS over TCP prefixes each message with a 2-byte length. Strip it when it
/// matches the remaining payload, otherwise hand back the raw slice and let
/// the header parse decide.
fn strip_tcp_length_prefix(payload: &[u8]) -> &[u8] {
    if payload.len() >= DNS_TCP_PAYLOAD_OFFSET {
        let declared = u16::from_be_bytes([payload[0], payload[1]]) as usize;
        if declared == payload.len() - DNS_TCP_PAYLOAD_OFFSET {
            return &payload[DNS_TCP_PAYLOAD_OFFSET..];
        }
    }
    payload
}

/// Decode a label sequence into a lowercased dotted name. Compression
/// pointers terminate the walk (the cursor never follows them backwards, so
/// malicious pointer loops cannot stall the parser).
fn read_name(data: &[u8], cursor: &mut usize) -> Option<String> {
    let mut name = String::new();
    let mut i = *cursor;
    loop {
        let len_byte = *data.get(i)?;
        if len_byte == 0 {
            i += 1;
            break;
        }
        if len_byte & DNS_NAME_COMPRESS_POINTER == DNS_NAME_COMPRESS_POINTER {
            data.get(i + 1)?;
            i += 2;
            break;
        }
        if len_byte & DNS_NAME_COMPRESS_POINTER != 0 {
            // 0x40/0x80 label types are reserved
            return None;
        }
        let len = len_byte as usize;
        let label = data.get(i + 1..i + 1 + len)?;
        if !name.is_empty() {
            name.push('.');
        }
        for &c in label {
            name.push(c.to_ascii_lowercase() as char);
        }
        if name.len() > DNS_NAME_MAX_SIZE {
            return None;
        }
        i += 1 + len;
    }
    *cursor = i;
    Some(name)
}

fn skip_name(data: &[u8], cursor: &mut usize) -> Option<()> {
    let mut i = *cursor;
    loop {
        let len_byte = *data.get(i)?;
        if len_byte == 0 {
            i += 1;
            break;
        }
        if len_byte & DNS_NAME_COMPRESS_POINTER == DNS_NAME_COMPRESS_POINTER {
            data.get(i + 1)?;
            i += 2;
            break;
        }
        if len_byte & DNS_NAME_COMPRESS_POINTER != 0 {
            return None;
        }
        i += 1 + len_byte as usize;
        if i > data.len() {
            return None;
        }
    }
    *cursor = i;
    Some(())
}

/// Skip one resource record, returning its fixed header fields.
fn read_record(data: &[u8], cursor: &mut usize) -> Option<RecordHead> {
    skip_name(data, cursor)?;
    let fixed = data.get(*cursor..*cursor + 10)?;
    let rtype = u16::from_be_bytes([fixed[0], fixed[1]]);
    let class = u16::from_be_bytes([fixed[2], fixed[3]]);
    let ttl = u32::from_be_bytes([fixed[4], fixed[5], fixed[6], fixed[7]]);
    let rd_len = u16::from_be_bytes([fixed[8], fixed[9]]) as usize;
    let end = cursor.checked_add(10 + rd_len)?;
    if end > data.len() {
        return None;
    }
    *cursor = end;
    Some(RecordHead { rtype, class, ttl })
}

/// Per-flow DNS counters and derived abuse features.
#[derive(Debug, Clone, Default)]
pub struct DnsFeatureExtractor {
    query_packets: u64,
    response_packets: u64,
    query_bytes: u64,
    response_bytes: u64,

    total_qd_count: u64,
    total_an_count: u64,
    total_ns_count: u64,
    total_ar_count: u64,

    last_opcode: Option<u8>,
    last_rcode: Option<u8>,
    last_query_type: Option<u16>,
    query_type_counts: HashMap<u16, u64>,
    any_queries: u64,
    txt_queries: u64,
    nxdomain_responses: u64,

    has_edns: bool,
    edns_udp_size: u16,

    unique_domains: HashSet<String>,

    // tx-id -> outbound query timestamp (ms)
    pending_queries: HashMap<u16, u64>,
    response_time_sum: f64,
    response_time_sum_sq: f64,
    response_time_count: u64,

    ttl_violations: u64,

    packet_size_stats: RunningStats,
    answer_ttl_stats: RunningStats,
}

impl DnsFeatureExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect one packet of the owning flow. Payloads that don't parse as a
    /// DNS message are ignored without touching any counter.
    pub fn process_packet(&mut self, payload: &[u8], wire_len: u32, timestamp_ms: u64, is_tcp: bool) {
        let Some(msg) = DnsMessage::parse(payload, is_tcp) else {
            return;
        };

        if msg.is_response {
            self.response_packets += 1;
            self.response_bytes += wire_len as u64;
            if let Some(sent) = self.pending_queries.remove(&msg.tx_id) {
                let elapsed = timestamp_ms.saturating_sub(sent) as f64;
                self.response_time_sum += elapsed;
                self.response_time_sum_sq += elapsed * elapsed;
                self.response_time_count += 1;
            }
            if msg.rcode == RCODE_NXDOMAIN {
                self.nxdomain_responses += 1;
            }
            for &ttl in &msg.answer_ttls {
                self.answer_ttl_stats.add(ttl as f64);
            }
        } else {
            self.query_packets += 1;
            self.query_bytes += wire_len as u64;
            self.pending_queries.insert(msg.tx_id, timestamp_ms);
            if self.pending_queries.len() > PENDING_QUERY_CAP {
                self.pending_queries
                    .retain(|_, &mut sent| timestamp_ms.saturating_sub(sent) <= PENDING_QUERY_MAX_AGE_MS);
            }
        }

        self.packet_size_stats.add(wire_len as f64);

        self.last_opcode = Some(msg.opcode);
        self.last_rcode = Some(msg.rcode);
        self.total_qd_count += msg.qd_count as u64;
        self.total_an_count += msg.an_count as u64;
        self.total_ns_count += msg.ns_count as u64;
        self.total_ar_count += msg.ar_count as u64;

        if let Some(size) = msg.edns_udp_size {
            self.has_edns = true;
            self.edns_udp_size = self.edns_udp_size.max(size);
        }

        for q in &msg.questions {
            *self.query_type_counts.entry(q.qtype).or_insert(0) += 1;
            self.last_query_type = Some(q.qtype);
            if q.qtype == QTYPE_ANY {
                self.any_queries += 1;
            }
            if q.qtype == QTYPE_TXT {
                self.txt_queries += 1;
            }
            if !q.qname.is_empty() && self.unique_domains.len() < UNIQUE_DOMAIN_CAP {
                self.unique_domains.insert(q.qname.clone());
            }
        }
    }

    // Raw counters

    pub fn total_queries(&self) -> u64 {
        self.query_packets
    }

    pub fn total_responses(&self) -> u64 {
        self.response_packets
    }

    pub fn query_bytes(&self) -> u64 {
        self.query_bytes
    }

    pub fn response_bytes(&self) -> u64 {
        self.response_bytes
    }

    pub fn total_qd_count(&self) -> u64 {
        self.total_qd_count
    }

    pub fn total_an_count(&self) -> u64 {
        self.total_an_count
    }

    pub fn total_ns_count(&self) -> u64 {
        self.total_ns_count
    }

    pub fn total_ar_count(&self) -> u64 {
        self.total_ar_count
    }

    pub fn last_opcode(&self) -> u8 {
        self.last_opcode.unwrap_or(0)
    }

    pub fn last_rcode(&self) -> u8 {
        self.last_rcode.unwrap_or(0)
    }

    pub fn last_query_type(&self) -> u16 {
        self.last_query_type.unwrap_or(0)
    }

    pub fn query_type_count(&self, qtype: u16) -> u64 {
        self.query_type_counts.get(&qtype).copied().unwrap_or(0)
    }

    pub fn has_edns(&self) -> bool {
        self.has_edns
    }

    pub fn edns_udp_size(&self) -> u16 {
        self.edns_udp_size
    }

    pub fn unique_domain_count(&self) -> usize {
        self.unique_domains.len()
    }

    pub fn pending_query_count(&self) -> usize {
        self.pending_queries.len()
    }

    pub fn response_time_count(&self) -> u64 {
        self.response_time_count
    }

    pub fn ttl_violation_count(&self) -> u64 {
        self.ttl_violations
    }

    // Derived features

    /// 1 once any response was seen on the flow.
    pub fn dns_qr(&self) -> u8 {
        (self.response_packets > 0) as u8
    }

    /// Total response bytes over total query bytes. Responses without a
    /// single query byte yield the sentinel.
    pub fn amplification_factor(&self) -> f64 {
        if self.query_bytes == 0 {
            if self.response_bytes > 0 {
                AMPLIFICATION_SENTINEL
            } else {
                0.0
            }
        } else if self.response_bytes == 0 {
            0.0
        } else {
            self.response_bytes as f64 / self.query_bytes as f64
        }
    }

    /// Queries per response; with no responses the query count itself stands
    /// in for the unbounded ratio.
    pub fn query_response_ratio(&self) -> f64 {
        if self.response_packets == 0 {
            self.query_packets as f64
        } else {
            self.query_packets as f64 / self.response_packets as f64
        }
    }

    pub fn any_query_ratio(&self) -> f64 {
        if self.query_packets == 0 {
            0.0
        } else {
            self.any_queries as f64 / self.query_packets as f64
        }
    }

    pub fn txt_query_ratio(&self) -> f64 {
        if self.query_packets == 0 {
            0.0
        } else {
            self.txt_queries as f64 / self.query_packets as f64
        }
    }

    pub fn queries_per_second(&self, duration_sec: f64) -> f64 {
        self.query_packets as f64 / duration_sec.max(1.0)
    }

    pub fn mean_answers_per_query(&self) -> f64 {
        if self.response_packets == 0 {
            0.0
        } else {
            self.total_an_count as f64 / self.response_packets as f64
        }
    }

    pub fn response_inconsistency(&self) -> u64 {
        self.query_packets.abs_diff(self.response_packets)
    }

    /// Population variance of query->response latencies, clamped at zero
    /// against rounding in the sum-of-squares form.
    pub fn response_time_variance(&self) -> f64 {
        if self.response_time_count <= 1 {
            return 0.0;
        }
        let n = self.response_time_count as f64;
        let mean = self.response_time_sum / n;
        (self.response_time_sum_sq / n - mean * mean).max(0.0)
    }

    pub fn port53_traffic_ratio(&self, flow_total_bytes: f64) -> f64 {
        if flow_total_bytes <= 0.0 {
            0.0
        } else {
            (self.query_bytes + self.response_bytes) as f64 / flow_total_bytes
        }
    }

    pub fn packet_size_std_dev(&self) -> f64 {
        self.packet_size_stats.std_dev()
    }

    pub fn nxdomain_rate(&self) -> f64 {
        if self.response_packets == 0 {
            0.0
        } else {
            self.nxdomain_responses as f64 / self.response_packets as f64
        }
    }

    pub fn answer_ttl_mean(&self) -> f64 {
        self.answer_ttl_stats.mean()
    }

    pub fn answer_ttl_min(&self) -> f64 {
        self.answer_ttl_stats.min()
    }

    pub fn answer_ttl_max(&self) -> f64 {
        self.answer_ttl_stats.max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_name(buf: &mut Vec<u8>, name: &str) {
        for label in name.split('.').filter(|l| !l.is_empty()) {
            buf.push(label.len() as u8);
            buf.extend_from_slice(label.as_bytes());
        }
        buf.push(0);
    }

    fn header(tx_id: u16, flags: u16, counts: [u16; 4]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(DNS_HEADER_SIZE);
        buf.extend_from_slice(&tx_id.to_be_bytes());
        buf.extend_from_slice(&flags.to_be_bytes());
        for c in counts {
            buf.extend_from_slice(&c.to_be_bytes());
        }
        buf
    }

    fn query(tx_id: u16, qtype: u16, name: &str) -> Vec<u8> {
        let mut buf = header(tx_id, 0x0100, [1, 0, 0, 0]);
        push_name(&mut buf, name);
        buf.extend_from_slice(&qtype.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf
    }

    fn response(tx_id: u16, rcode: u8, answers: u16, ttl: u32, name: &str) -> Vec<u8> {
        let mut buf = header(tx_id, 0x8180 | rcode as u16, [1, answers, 0, 0]);
        push_name(&mut buf, name);
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        for _ in 0..answers {
            // compressed pointer back to the question name
            buf.extend_from_slice(&[0xc0, 0x0c]);
            buf.extend_from_slice(&1u16.to_be_bytes());
            buf.extend_from_slice(&1u16.to_be_bytes());
            buf.extend_from_slice(&ttl.to_be_bytes());
            buf.extend_from_slice(&4u16.to_be_bytes());
            buf.extend_from_slice(&[8, 8, 8, 8]);
        }
        buf
    }

    fn query_with_opt(tx_id: u16, udp_size: u16, name: &str) -> Vec<u8> {
        let mut buf = header(tx_id, 0x0100, [1, 0, 0, 1]);
        push_name(&mut buf, name);
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        // OPT pseudo-RR: root name, type 41, class = udp payload size
        buf.push(0);
        buf.extend_from_slice(&RR_TYPE_OPT.to_be_bytes());
        buf.extend_from_slice(&udp_size.to_be_bytes());
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf
    }

    #[test]
    fn parses_query_header() {
        let payload = query(0x1234, 1, "example.com");
        let msg = DnsMessage::parse(&payload, false).unwrap();
        assert_eq!(msg.tx_id, 0x1234);
        assert!(!msg.is_response);
        assert_eq!(msg.opcode, 0);
        assert_eq!(msg.qd_count, 1);
        assert_eq!(msg.questions.len(), 1);
        assert_eq!(msg.questions[0].qtype, 1);
        assert_eq!(msg.questions[0].qname, "example.com");
    }

    #[test]
    fn parses_response_with_answers() {
        let payload = response(0x1234, 0, 2, 300, "example.com");
        let msg = DnsMessage::parse(&payload, false).unwrap();
        assert!(msg.is_response);
        assert_eq!(msg.an_count, 2);
        assert_eq!(msg.answer_ttls, vec![300, 300]);
    }

    #[test]
    fn truncated_payload_is_rejected() {
        let payload = query(1, 1, "example.com");
        assert!(DnsMessage::parse(&payload[..8], false).is_none());
        // truncated mid-question
        assert!(DnsMessage::parse(&payload[..payload.len() - 3], false).is_none());
    }

    #[test]
    fn tcp_length_prefix_is_stripped() {
        let inner = query(7, 1, "example.com");
        let mut framed = (inner.len() as u16).to_be_bytes().to_vec();
        framed.extend_from_slice(&inner);
        let msg = DnsMessage::parse(&framed, true).unwrap();
        assert_eq!(msg.tx_id, 7);
        // a TCP segment without the prefix still parses
        let msg = DnsMessage::parse(&inner, true).unwrap();
        assert_eq!(msg.tx_id, 7);
    }

    #[test]
    fn malformed_payload_mutates_nothing() {
        let mut x = DnsFeatureExtractor::new();
        x.process_packet(&[0u8; 5], 60, 1_000, false);
        x.process_packet(b"not a dns message at all....", 60, 1_000, false);
        assert_eq!(x.total_queries(), 0);
        assert_eq!(x.total_responses(), 0);
        assert_eq!(x.packet_size_std_dev(), 0.0);
    }

    #[test]
    fn query_response_pair() {
        let mut x = DnsFeatureExtractor::new();
        x.process_packet(&query(1, 1, "example.com"), 60, 1_000, false);
        x.process_packet(&response(1, 0, 1, 300, "example.com"), 300, 1_060, false);

        assert_eq!(x.total_queries(), 1);
        assert_eq!(x.total_responses(), 1);
        assert_eq!(x.query_bytes(), 60);
        assert_eq!(x.response_bytes(), 300);
        assert_eq!(x.dns_qr(), 1);
        assert_eq!(x.query_response_ratio(), 1.0);
        assert_eq!(x.amplification_factor(), 5.0);
        assert_eq!(x.response_inconsistency(), 0);
        assert_eq!(x.response_time_count(), 1);
        assert_eq!(x.mean_answers_per_query(), 1.0);
        assert_eq!(x.unique_domain_count(), 1);
        // matched entry is consumed
        assert_eq!(x.pending_query_count(), 0);
    }

    #[test]
    fn any_and_txt_ratios() {
        let mut x = DnsFeatureExtractor::new();
        for i in 0..4u16 {
            x.process_packet(&query(i, QTYPE_ANY, "victim.example"), 60, 1_000 + i as u64, false);
        }
        x.process_packet(&query(9, QTYPE_TXT, "tunnel.example"), 60, 2_000, false);
        assert_eq!(x.any_query_ratio(), 0.8);
        assert_eq!(x.txt_query_ratio(), 0.2);
        assert_eq!(x.query_type_count(QTYPE_ANY), 4);
        assert_eq!(x.last_query_type(), QTYPE_TXT);
    }

    #[test]
    fn amplification_sentinel_without_query_bytes() {
        let mut x = DnsFeatureExtractor::new();
        x.process_packet(&response(5, 0, 1, 60, "example.com"), 3_000, 1_000, false);
        assert_eq!(x.amplification_factor(), 999.0);

        let empty = DnsFeatureExtractor::new();
        assert_eq!(empty.amplification_factor(), 0.0);
    }

    #[test]
    fn flood_without_responses() {
        let mut x = DnsFeatureExtractor::new();
        for i in 0..1_000u64 {
            x.process_packet(&query(i as u16, 1, "flood.example"), 60, 1_000 + i, false);
        }
        assert_eq!(x.total_queries(), 1_000);
        assert_eq!(x.total_responses(), 0);
        assert_eq!(x.query_response_ratio(), 1_000.0);
        assert_eq!(x.amplification_factor(), 0.0);
        assert_eq!(x.queries_per_second(1.0), 1_000.0);
    }

    #[test]
    fn pending_table_age_based_eviction() {
        let mut x = DnsFeatureExtractor::new();
        // tx-id space is 16 bits, so distinct ids keep all entries live
        for i in 0..10_000u64 {
            x.process_packet(&query(i as u16, 1, "a.example"), 60, 1_000, false);
        }
        assert_eq!(x.pending_query_count(), 10_000);

        // the insert that pushes past the cap evicts everything stale
        x.process_packet(&query(10_000, 1, "a.example"), 60, 10_000, false);
        assert_eq!(x.pending_query_count(), 1);
    }

    #[test]
    fn pending_table_preserves_fresh_entries() {
        let mut x = DnsFeatureExtractor::new();
        for i in 0..10_000u64 {
            // fresh entries, all younger than the 5s age limit at sweep time
            x.process_packet(&query(i as u16, 1, "a.example"), 60, 8_000, false);
        }
        x.process_packet(&query(10_000, 1, "a.example"), 60, 10_000, false);
        assert_eq!(x.pending_query_count(), 10_001);
    }

    #[test]
    fn response_time_variance_clamped() {
        let mut x = DnsFeatureExtractor::new();
        x.process_packet(&query(1, 1, "a.example"), 60, 1_000, false);
        x.process_packet(&response(1, 0, 1, 300, "a.example"), 300, 1_050, false);
        // single latency sample -> no variance
        assert_eq!(x.response_time_variance(), 0.0);

        x.process_packet(&query(2, 1, "a.example"), 60, 2_000, false);
        x.process_packet(&response(2, 0, 1, 300, "a.example"), 300, 2_150, false);
        // latencies {50, 150}: population variance 2500
        assert!((x.response_time_variance() - 2_500.0).abs() < 1e-9);
    }

    #[test]
    fn edns_opt_record() {
        let mut x = DnsFeatureExtractor::new();
        assert!(!x.has_edns());
        x.process_packet(&query_with_opt(1, 4_096, "example.com"), 72, 1_000, false);
        assert!(x.has_edns());
        assert_eq!(x.edns_udp_size(), 4_096);
        // the advertised size only ratchets up
        x.process_packet(&query_with_opt(2, 1_232, "example.com"), 72, 1_001, false);
        assert_eq!(x.edns_udp_size(), 4_096);
    }

    #[test]
    fn nxdomain_tracking() {
        let mut x = DnsFeatureExtractor::new();
        x.process_packet(&query(1, 1, "missing.example"), 60, 1_000, false);
        x.process_packet(&response(1, RCODE_NXDOMAIN, 0, 0, "missing.example"), 120, 1_020, false);
        assert_eq!(x.last_rcode(), RCODE_NXDOMAIN);
        assert_eq!(x.nxdomain_rate(), 1.0);
    }

    #[test]
    fn answer_ttl_stats() {
        let mut x = DnsFeatureExtractor::new();
        x.process_packet(&response(1, 0, 1, 60, "a.example"), 120, 1_000, false);
        x.process_packet(&response(2, 0, 1, 300, "a.example"), 120, 1_010, false);
        assert_eq!(x.answer_ttl_min(), 60.0);
        assert_eq!(x.answer_ttl_max(), 300.0);
        assert_eq!(x.answer_ttl_mean(), 180.0);
    }

    #[test]
    fn qd_an_aggregation() {
        let mut x = DnsFeatureExtractor::new();
        x.process_packet(&query(1, 1, "a.example"), 60, 1_000, false);
        x.process_packet(&response(1, 0, 3, 60, "a.example"), 200, 1_050, false);
        assert_eq!(x.total_qd_count(), 2);
        assert_eq!(x.total_an_count(), 3);
        assert_eq!(x.total_ns_count(), 0);
        assert_eq!(x.total_ar_count(), 0);
        assert_eq!(x.last_opcode(), 0);
        assert_eq!(x.mean_answers_per_query(), 3.0);
    }
}
