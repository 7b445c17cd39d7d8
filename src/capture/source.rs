use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use log::{debug, error, info};
use pcap::{Active, Capture, Device, Offline};

use super::decoder::{self, ParsedPacket};

/// What the capture thread hands to the processing loop.
#[derive(Debug)]
pub enum CaptureEvent {
    Packet(ParsedPacket),
    /// Frame seen but not usable: malformed, non-IP, or non-TCP/UDP.
    Skipped,
    Eof,
}

#[derive(Debug, Clone)]
pub struct NetworkInterface {
    pub name: String,
    pub description: String,
    pub is_up: bool,
}

pub fn list_interfaces() -> Result<Vec<NetworkInterface>> {
    let devices = Device::list().context("failed to enumerate capture devices")?;

    Ok(devices
        .into_iter()
        .map(|d| {
            let description = d.desc.unwrap_or_else(|| {
                if d.name.starts_with("br-") || d.name == "docker0" {
                    "Docker Bridge".into()
                } else if d.name.starts_with("en") || d.name.starts_with("eth") {
                    "Ethernet Interface".into()
                } else if d.name.starts_with("wl") {
                    "Wi-Fi Interface".into()
                } else {
                    "Network Interface".into()
                }
            });
            NetworkInterface {
                name: d.name,
                description,
                is_up: d.flags.is_up(),
            }
        })
        .collect())
}

/// A libpcap handle, offline or live, ready to feed the processing loop.
pub enum PacketSource {
    File(Capture<Offline>),
    Live(Capture<Active>),
}

impl PacketSource {
    pub fn open_file(path: &str) -> Result<Self> {
        let cap = Capture::from_file(path).with_context(|| format!("failed to open capture file {path}"))?;
        info!("Reading from file: {path}");
        Ok(Self::File(cap))
    }

    pub fn open_live(interface: &str) -> Result<Self> {
        let cap = Capture::from_device(interface)
            .with_context(|| format!("interface not found: {interface}"))?
            .promisc(true)
            .immediate_mode(true)
            .timeout(10)
            .open()
            .with_context(|| format!("failed to open interface {interface}"))?;
        let cap = cap
            .setnonblock()
            .context("failed to switch capture to non-blocking mode")?;
        info!("Listening on interface: {interface}");
        Ok(Self::Live(cap))
    }

    /// Move the handle into its own thread and stream events until EOF or
    /// shutdown.
    pub fn start(self, running: Arc<AtomicBool>, tx: Sender<CaptureEvent>) -> JoinHandle<()> {
        thread::spawn(move || match self {
            Self::File(cap) => capture_loop(cap, running, tx, false),
            Self::Live(cap) => capture_loop(cap, running, tx, true),
        })
    }
}

fn capture_loop<T: pcap::Activated>(
    mut cap: Capture<T>,
    running: Arc<AtomicBool>,
    tx: Sender<CaptureEvent>,
    live: bool,
) {
    while running.load(Ordering::Relaxed) {
        match cap.next_packet() {
            Ok(packet) => {
                let ts_ms = packet.header.ts.tv_sec as u64 * 1_000 + packet.header.ts.tv_usec as u64 / 1_000;
                let event = match decoder::decode(ts_ms, packet.header.len, packet.data) {
                    Ok(Some(parsed)) => CaptureEvent::Packet(parsed),
                    Ok(None) => CaptureEvent::Skipped,
                    Err(e) => {
                        debug!("dropping malformed frame: {e}");
                        CaptureEvent::Skipped
                    }
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
            Err(pcap::Error::TimeoutExpired) if live => {
                thread::sleep(Duration::from_millis(1));
            }
            Err(pcap::Error::NoMorePackets) => {
                let _ = tx.send(CaptureEvent::Eof);
                break;
            }
            Err(e) => {
                error!("capture error: {e}");
                let _ = tx.send(CaptureEvent::Eof);
                break;
            }
        }
    }
    debug!("capture thread exiting");
}
