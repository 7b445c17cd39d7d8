use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, error, info, warn};

use crate::capture::{CaptureEvent, ParsedPacket};
use crate::output::RowSink;
use crate::types::RunStats;

use super::flow::{Flow, FlowKey, FLOW_TIMEOUT_MS};

/// Capture timestamps outside [2017-01-01, 2030-01-01] are treated as
/// corrupted and dropped before they can poison duration statistics.
pub const TIMESTAMP_MIN_MS: u64 = 1_483_228_800_000;
pub const TIMESTAMP_MAX_MS: u64 = 1_893_456_000_000;

const SWEEP_PACKET_INTERVAL: u64 = 5_000;
const SWEEP_TIME_INTERVAL_MS: u64 = 30_000;

/// Owns the active-flow table and drives the flow lifecycle: keying,
/// direction resolution, idle-timeout eviction, and the final dump.
pub struct FlowManager {
    flows: HashMap<FlowKey, Flow>,
    sinks: Vec<Box<dyn RowSink>>,
    label: Option<String>,
    packet_counter: u64,
    last_timeout_check: u64,
    dumped: bool,
    stats: RunStats,
}

impl FlowManager {
    pub fn new(sinks: Vec<Box<dyn RowSink>>, label: Option<String>) -> Self {
        let mut manager = Self {
            flows: HashMap::new(),
            sinks,
            label,
            packet_counter: 0,
            last_timeout_check: 0,
            dumped: false,
            stats: RunStats::default(),
        };

        let header = Flow::header(manager.label.is_some());
        for sink in &mut manager.sinks {
            if let Err(e) = sink.write_header(&header) {
                error!("failed to write header: {e:#}");
            }
        }
        manager
    }

    pub fn process_packet(&mut self, pkt: &ParsedPacket) {
        self.stats.total_packets += 1;

        let ts = pkt.timestamp_ms;
        if !(TIMESTAMP_MIN_MS..=TIMESTAMP_MAX_MS).contains(&ts) {
            warn!("invalid capture timestamp skipped: {ts} ms");
            self.stats.skipped_packets += 1;
            return;
        }

        let fwd_key = pkt.flow_key();
        let bwd_key = fwd_key.reversed();

        let mut active_key = if self.flows.contains_key(&fwd_key) {
            Some(fwd_key.clone())
        } else if self.flows.contains_key(&bwd_key) {
            Some(bwd_key.clone())
        } else {
            None
        };

        // An idle flow is exported before this packet can touch it; the
        // packet then opens a fresh conversation.
        if let Some(key) = active_key.clone() {
            let timed_out = self
                .flows
                .get(&key)
                .is_some_and(|flow| ts.saturating_sub(flow.last_packet_time()) > FLOW_TIMEOUT_MS);
            if timed_out {
                if let Some(expired) = self.flows.remove(&key) {
                    debug!("idle timeout on {}", expired.key());
                    self.export_flow(&expired);
                }
                active_key = None;
            }
        }

        let (key, is_forward) = match active_key {
            Some(key) => {
                let is_forward = key == fwd_key;
                (key, is_forward)
            }
            None => {
                self.flows
                    .insert(fwd_key.clone(), Flow::new(fwd_key.clone(), ts, self.label.clone()));
                (fwd_key, true)
            }
        };

        if let Some(flow) = self.flows.get_mut(&key) {
            flow.add_packet(&pkt.payload, pkt.wire_len, ts, is_forward);
        }

        self.packet_counter += 1;
        if self.packet_counter % SWEEP_PACKET_INTERVAL == 0
            || ts.saturating_sub(self.last_timeout_check) > SWEEP_TIME_INTERVAL_MS
        {
            self.sweep(ts);
            self.last_timeout_check = ts;
        }
    }

    /// Count a packet the decoder could not turn into a flow update.
    pub fn record_skipped(&mut self) {
        self.stats.total_packets += 1;
        self.stats.skipped_packets += 1;
    }

    /// Export every remaining flow and flush the sinks. Safe to call from
    /// both the EOF path and the shutdown path; only the first call acts.
    pub fn dump_all(&mut self) {
        if self.dumped {
            return;
        }

        let drained: Vec<Flow> = self.flows.drain().map(|(_, flow)| flow).collect();
        info!("dumping {} remaining flows", drained.len());
        for flow in &drained {
            self.export_flow(flow);
        }

        for sink in &mut self.sinks {
            if let Err(e) = sink.flush() {
                error!("sink flush failed: {e:#}");
            }
        }
        self.dumped = true;
    }

    pub fn active_flows(&self) -> usize {
        self.flows.len()
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    fn sweep(&mut self, current_ms: u64) {
        let expired: Vec<FlowKey> = self
            .flows
            .iter()
            .filter(|(_, flow)| current_ms.saturating_sub(flow.last_packet_time()) > FLOW_TIMEOUT_MS)
            .map(|(key, _)| key.clone())
            .collect();

        if expired.is_empty() {
            return;
        }
        debug!("evicting {} idle flows", expired.len());
        for key in expired {
            if let Some(flow) = self.flows.remove(&key) {
                self.export_flow(&flow);
            }
        }
    }

    fn export_flow(&mut self, flow: &Flow) {
        let row = flow.to_row();
        for sink in &mut self.sinks {
            if let Err(e) = sink.write_row(&row) {
                warn!("sink write failed: {e:#}");
            }
        }
    }
}

/// Drain capture events until EOF, channel close, or shutdown, then dump.
pub fn processing_loop(running: Arc<AtomicBool>, rx: Receiver<CaptureEvent>, manager: &mut FlowManager) {
    loop {
        if !running.load(Ordering::Relaxed) {
            break;
        }
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(CaptureEvent::Packet(pkt)) => manager.process_packet(&pkt),
            Ok(CaptureEvent::Skipped) => manager.record_skipped(),
            Ok(CaptureEvent::Eof) => break,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    manager.dump_all();
}
