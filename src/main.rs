use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use clap::Parser;
use crossbeam_channel::unbounded;
use log::{error, info};

use dnsflow::capture::{self, PacketSource};
use dnsflow::output::{CsvSink, RowSink, SheetsSink};
use dnsflow::processor::{processing_loop, FlowManager};

/// Aggregates captured packets into bidirectional flows and exports one
/// DNS-abuse feature row per flow.
#[derive(Parser, Debug)]
#[command(name = "dnsflow", version, about)]
struct Cli {
    /// Input pcap file
    #[arg(short = 'f', long = "file", value_name = "PATH")]
    file: Option<String>,

    /// Live capture interface
    #[arg(short = 'i', long = "interface", value_name = "IFACE")]
    interface: Option<String>,

    /// Output CSV file
    #[arg(short = 'o', long = "output", value_name = "PATH", default_value = "flow_output.csv")]
    output: String,

    /// List capture interfaces and exit
    #[arg(short = 'l', long = "list-interfaces")]
    list_interfaces: bool,

    /// Label exported rows as ATTACK
    #[arg(short = 'a', long = "attack", conflicts_with = "benign")]
    attack: bool,

    /// Label exported rows as BENIGN
    #[arg(short = 'b', long = "benign")]
    benign: bool,

    /// Google service-account credentials JSON (enables the Sheets sink)
    #[arg(short = 'g', long = "google-creds", value_name = "PATH", requires = "sheet")]
    google_creds: Option<String>,

    /// Spreadsheet id to append to, or a title for a new spreadsheet
    #[arg(short = 's', long = "sheet", value_name = "ID", requires = "google_creds")]
    sheet: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if cli.list_interfaces {
        for iface in capture::list_interfaces()? {
            let state = if iface.is_up { "up" } else { "down" };
            println!("{:<16} {} [{}]", iface.name, iface.description, state);
        }
        return Ok(());
    }

    let source = match (&cli.file, &cli.interface) {
        (Some(path), _) => PacketSource::open_file(path)?,
        (None, Some(iface)) => PacketSource::open_live(iface)?,
        (None, None) => bail!("specify an input file (-f) or a capture interface (-i)"),
    };

    let label = if cli.attack {
        Some("ATTACK".to_string())
    } else if cli.benign {
        Some("BENIGN".to_string())
    } else {
        None
    };

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || {
            info!("shutdown requested, dumping flows");
            running.store(false, Ordering::Relaxed);
        })?;
    }

    let mut sinks: Vec<Box<dyn RowSink>> = vec![Box::new(CsvSink::create(&cli.output)?)];
    if let (Some(creds), Some(sheet)) = (&cli.google_creds, &cli.sheet) {
        // a broken Sheets setup downgrades to CSV-only instead of aborting
        match SheetsSink::new(creds, sheet) {
            Ok(sink) => {
                info!("Google Sheets sink enabled: {}", sink.url());
                sinks.push(Box::new(sink));
            }
            Err(e) => error!("Google Sheets sink disabled: {e:#}"),
        }
    }

    let mut manager = FlowManager::new(sinks, label);

    let started_wall = chrono::Local::now();
    let started = Instant::now();

    let (tx, rx) = unbounded();
    let capture_thread = source.start(running.clone(), tx);

    processing_loop(running.clone(), rx, &mut manager);
    running.store(false, Ordering::Relaxed);
    let _ = capture_thread.join();

    let finished_wall = chrono::Local::now();
    let stats = manager.stats();
    println!(
        "Processed {} packets ({} skipped, {:.2}%)",
        stats.total_packets,
        stats.skipped_packets,
        stats.skip_percentage()
    );
    println!("Started:  {}", started_wall.format("%Y-%m-%d %H:%M:%S"));
    println!("Finished: {}", finished_wall.format("%Y-%m-%d %H:%M:%S"));
    println!("Elapsed:  {:.2}s", started.elapsed().as_secs_f64());
    println!("Done. Output written to {}", cli.output);
    Ok(())
}
