//! `radtrack` CLI: track a measurement file, a live datagram feed, or a
//! simulated scenario, and write the detail / summary / snapshot reports.

mod report;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use ingest::{
    run_consumer, scan_queue, spawn_file_producer, CancelToken, ConsumerStats, IngestError,
    IngestStats, OverflowPolicy, RecordLayout, ScanReceiver, UdpConfig, UdpListener,
};
use report::{ReportPaths, ReportWriter};
use sim::{save_replay, write_records, Scenario, ScenarioKind};
use std::{
    fs::File,
    net::SocketAddr,
    path::PathBuf,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tracing::{error, info};
use tracker_core::{AssociationStrategy, Scan, ScanProcessor, TrackStore, TrackerConfig};

#[derive(Parser)]
#[command(name = "radtrack", about = "Multi-target radar tracker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track every record in a measurement file.
    Process {
        /// Comma-separated measurement file
        input: PathBuf,
        /// Column layout of the file
        #[arg(long, value_enum, default_value_t = Layout::Tabular)]
        layout: Layout,
        /// Scan grouping window in seconds (0 = identical timestamps)
        #[arg(long, default_value_t = 0.0)]
        window: f64,
        #[command(flatten)]
        tracker: TrackerArgs,
        #[command(flatten)]
        reports: ReportArgs,
    },
    /// Track one-record-per-datagram input on a UDP port.
    Listen {
        #[arg(long, default_value = "0.0.0.0:12345")]
        addr: SocketAddr,
        #[arg(long, default_value_t = 0.0)]
        window: f64,
        /// Flush the open scan after this many milliseconds without traffic
        #[arg(long, default_value_t = 500)]
        idle_flush_ms: u64,
        /// Stop after this many seconds (runs until killed otherwise)
        #[arg(long)]
        duration: Option<f64>,
        #[command(flatten)]
        tracker: TrackerArgs,
        #[command(flatten)]
        reports: ReportArgs,
    },
    /// Run a named scenario through the tracker.
    Simulate {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Also write the simulated measurements as datagram-layout records
        #[arg(long)]
        records: Option<PathBuf>,
        /// Also save the full replay log (scans + ground truth)
        #[arg(long)]
        save_replay: Option<PathBuf>,
        #[command(flatten)]
        tracker: TrackerArgs,
        #[command(flatten)]
        reports: ReportArgs,
    },
    /// Load and track a previously recorded replay log.
    Replay {
        /// Path to replay JSON file
        input: PathBuf,
        #[command(flatten)]
        tracker: TrackerArgs,
        #[command(flatten)]
        reports: ReportArgs,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Layout {
    /// range,azimuth,elevation,timestamp,auxiliary[,x,y,z]
    Datagram,
    /// MR,MA,ME,MT,MD in columns 10..14, header row
    Tabular,
}

impl From<Layout> for RecordLayout {
    fn from(l: Layout) -> Self {
        match l {
            Layout::Datagram => RecordLayout::DATAGRAM,
            Layout::Tabular => RecordLayout::TABULAR,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Association {
    Gnn,
    Jpda,
}

#[derive(Clone, Copy, ValueEnum)]
enum Overflow {
    Block,
    DropNewest,
}

#[derive(Args)]
struct TrackerArgs {
    /// Tracker configuration (JSON); defaults apply to missing fields
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the association strategy from the configuration
    #[arg(long, value_enum)]
    association: Option<Association>,
    /// Capacity of the scan queue between ingestion and tracking
    #[arg(long, default_value_t = 64)]
    queue_capacity: usize,
    /// What ingestion does when the scan queue is full
    #[arg(long, value_enum, default_value_t = Overflow::Block)]
    overflow: Overflow,
}

#[derive(Args)]
struct ReportArgs {
    /// Per-scan detail log (CSV)
    #[arg(long)]
    detail_log: Option<PathBuf>,
    /// Per-track summary (CSV)
    #[arg(long)]
    summary: Option<PathBuf>,
    /// Per-scan snapshots (JSON lines)
    #[arg(long)]
    snapshots: Option<PathBuf>,
}

impl TrackerArgs {
    fn load(&self) -> Result<TrackerConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("opening config {}", path.display()))?;
                serde_json::from_reader(file)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => TrackerConfig::default(),
        };
        if let Some(a) = self.association {
            config.association = match a {
                Association::Gnn => AssociationStrategy::OptimalAssignment,
                Association::Jpda => AssociationStrategy::ProbabilisticJoint,
            };
        }
        Ok(config)
    }

    fn policy(&self) -> OverflowPolicy {
        match self.overflow {
            Overflow::Block => OverflowPolicy::Block,
            Overflow::DropNewest => OverflowPolicy::DropNewest,
        }
    }
}

impl From<&ReportArgs> for ReportPaths {
    fn from(r: &ReportArgs) -> Self {
        ReportPaths {
            detail: r.detail_log.clone(),
            summary: r.summary.clone(),
            snapshots: r.snapshots.clone(),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Process {
            input,
            layout,
            window,
            tracker,
            reports,
        } => {
            let (tx, rx) = scan_queue(tracker.queue_capacity, tracker.policy());
            let producer = spawn_file_producer(input, layout.into(), window, tx);
            track(&tracker, &reports, rx, &CancelToken::new(), producer)?;
        }
        Commands::Listen {
            addr,
            window,
            idle_flush_ms,
            duration,
            tracker,
            reports,
        } => {
            // Bind failure is fatal and reported before any tracking starts.
            let listener = UdpListener::bind(UdpConfig {
                addr,
                window,
                idle_flush: Duration::from_millis(idle_flush_ms),
                ..Default::default()
            })?;
            let cancel = CancelToken::new();
            if let Some(secs) = duration {
                let stop = cancel.clone();
                thread::spawn(move || {
                    thread::sleep(Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO));
                    stop.cancel();
                });
            }
            let (tx, rx) = scan_queue(tracker.queue_capacity, tracker.policy());
            println!("Listening on {addr}...");
            let producer = listener.spawn(tx, cancel.clone());
            track(&tracker, &reports, rx, &cancel, producer)?;
        }
        Commands::Simulate {
            scenario,
            seed,
            records,
            save_replay: replay_path,
            tracker,
            reports,
        } => {
            let scenario = Scenario::build(scenario, seed);
            println!(
                "Running scenario '{}' (seed={}, duration={:.0}s, {} targets)...",
                scenario.name,
                seed,
                scenario.duration,
                scenario.targets.len()
            );
            let log = scenario.run();
            if let Some(path) = records {
                let file = File::create(&path)
                    .with_context(|| format!("creating {}", path.display()))?;
                write_records(&log.scans, file)?;
                println!("Records saved to {}", path.display());
            }
            if let Some(path) = replay_path {
                save_replay(&log, &path)?;
                println!("Replay saved to {}", path.display());
            }
            run_scans(&tracker, &reports, log.scans)?;
        }
        Commands::Replay {
            input,
            tracker,
            reports,
        } => {
            let log = sim::load_replay(&input)?;
            println!(
                "Replaying '{}' ({} scans)...",
                log.scenario_name,
                log.scans.len()
            );
            run_scans(&tracker, &reports, log.scans)?;
        }
    }

    Ok(())
}

/// Feed in-memory scans through the same queue the live sources use.
fn run_scans(tracker: &TrackerArgs, reports: &ReportArgs, scans: Vec<Scan>) -> Result<()> {
    let (tx, rx) = scan_queue(tracker.queue_capacity, tracker.policy());
    let producer = thread::spawn(move || -> Result<IngestStats, IngestError> {
        let mut stats = IngestStats::default();
        for scan in scans {
            stats.records += scan.len() as u64;
            if tx.send(scan)? {
                stats.scans += 1;
            } else {
                stats.dropped_scans += 1;
            }
        }
        Ok(stats)
    });
    track(tracker, reports, rx, &CancelToken::new(), producer)
}

/// Consume the queue on this thread until cancelled or the producer is
/// done, then write the reports.
fn track(
    tracker: &TrackerArgs,
    reports: &ReportArgs,
    rx: ScanReceiver,
    cancel: &CancelToken,
    producer: JoinHandle<Result<IngestStats, IngestError>>,
) -> Result<()> {
    let config = tracker.load()?;
    let mut processor = ScanProcessor::new(config)?;
    let mut store = TrackStore::new();
    let mut writer = ReportWriter::create(&ReportPaths::from(reports))?;

    let start = Instant::now();
    let mut report_error: Option<anyhow::Error> = None;
    let consumed: ConsumerStats = run_consumer(&rx, &mut processor, &mut store, cancel, |out| {
        if report_error.is_none() {
            if let Err(e) = writer.record(out) {
                error!(error = %e, "report write failed; further report output skipped");
                report_error = Some(e);
            }
        }
    });
    let elapsed = start.elapsed();

    // A live source only stops once told to; dropping the receiver also
    // releases a producer blocked on a full queue.
    cancel.cancel();
    drop(rx);
    let ingested = producer
        .join()
        .map_err(|_| anyhow::anyhow!("ingestion thread panicked"))??;

    let (seen, confirmed) = writer.track_counts();
    info!(?ingested, ?consumed, "run complete");
    println!(
        "Done: {} scans processed ({} out of order, {} rejected, {} dropped), \
         {} records ({} malformed), elapsed={:.2}s",
        consumed.processed,
        consumed.out_of_order,
        consumed.rejected,
        ingested.dropped_scans,
        ingested.records,
        ingested.malformed,
        elapsed.as_secs_f64(),
    );
    println!(
        "Tracks: {} seen, {} confirmed, {} alive at end",
        seen,
        confirmed,
        store.len()
    );

    if let Some(e) = report_error {
        return Err(e);
    }
    writer.finish()?;
    report_summary(reports);
    Ok(())
}

fn report_summary(reports: &ReportArgs) {
    let written = [&reports.detail_log, &reports.summary, &reports.snapshots];
    for path in written.into_iter().flatten() {
        println!("Report saved to {}", path.display());
    }
}
