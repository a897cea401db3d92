//! scourctl: journal inspection and recovery CLI
//!
//! Command-line tool for investigating and recovering metadata-server
//! journals with damaged or missing objects.
//!
//! ## Quick Start
//!
//! ```bash
//! # Point at the pool's backing directory (one file per object)
//! export SCOUR_DATA_DIR=/var/lib/pool
//!
//! # Health-check the journal for rank 0
//! scourctl --rank 0 --pool 7 journal inspect
//!
//! # Dump the journal's raw byte range to a sparse local file
//! scourctl journal export backup.bin
//!
//! # ...and restore it into a pool later
//! scourctl journal import backup.bin
//!
//! # Decode the header
//! scourctl header get
//!
//! # Extract events, filtered, as JSON or per-event binary files
//! scourctl event get --by-path-prefix /home/alice json
//! scourctl event get --by-type update binary -o dump/
//! ```
//!
//! ## Exit Codes
//!
//! `0` means the requested operation ran; for `journal inspect` that
//! includes scans of unhealthy journals, since damage is reported in the
//! output, not the exit code. Non-zero means an operational failure: store
//! I/O, unreadable dump files, bad arguments.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use object_store::local::LocalFileSystem;
use tracing_subscriber::EnvFilter;

use scour_core::{object_name, Header};
use scour_journal::{
    Dumper, EventFilter, FilterSet, JournalScanner, PoolClient, ReadOutcome, ScanConfig,
};

#[derive(Parser)]
#[command(name = "scourctl")]
#[command(about = "Inspect and recover damaged metadata-server journals", long_about = None)]
struct Cli {
    /// Journal rank
    #[arg(long, default_value = "0")]
    rank: u32,

    /// Metadata pool id
    #[arg(long, default_value = "0")]
    pool: i64,

    /// Root directory of the object pool
    #[arg(long, env = "SCOUR_DATA_DIR")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Operations on the journal as a whole
    Journal {
        #[command(subcommand)]
        command: JournalCommands,
    },
    /// Operations on the journal header
    Header {
        #[command(subcommand)]
        command: HeaderCommands,
    },
    /// Operations on individual log events
    Event {
        #[command(subcommand)]
        command: EventCommands,
    },
}

#[derive(Subcommand)]
enum JournalCommands {
    /// Scan the journal and report gaps, missing objects and header damage
    Inspect,
    /// Dump the journal's raw byte range to a sparse local file
    Export {
        /// Output file
        file: PathBuf,
    },
    /// Restore a dumped journal file into the pool
    Import {
        /// Previously exported dump file
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum HeaderCommands {
    /// Decode the journal header and print it as JSON
    Get,
}

#[derive(Subcommand)]
enum EventCommands {
    /// Scan the journal and emit the selected events
    Get {
        #[command(flatten)]
        filters: FilterArgs,

        /// Output style
        #[arg(value_enum)]
        output: OutputFormat,

        /// Output directory for binary output
        #[arg(short, long, default_value = "dump")]
        output_dir: PathBuf,
    },
}

#[derive(Args)]
struct FilterArgs {
    /// Keep only events with this type tag (e.g. "update", "session")
    #[arg(long)]
    by_type: Option<String>,

    /// Keep only update events touching this inode
    #[arg(long, value_parser = parse_number)]
    by_inode: Option<u64>,

    /// Keep only update events whose path starts with this prefix
    #[arg(long)]
    by_path_prefix: Option<String>,

    /// Keep only events in the offset range LO..HI (hex accepted)
    #[arg(long)]
    by_range: Option<String>,

    /// Keep only update events naming NAME in directory DIR_INODE
    /// (format: DIR_INODE,NAME)
    #[arg(long)]
    by_dirfrag_name: Option<String>,
}

impl FilterArgs {
    fn into_filter_set(self) -> Result<FilterSet> {
        let mut set = FilterSet::default();
        if let Some(tag) = self.by_type {
            set.push(EventFilter::ByType(tag));
        }
        if let Some(inode) = self.by_inode {
            set.push(EventFilter::ByInode(inode));
        }
        if let Some(prefix) = self.by_path_prefix {
            set.push(EventFilter::ByPathPrefix(prefix));
        }
        if let Some(range) = self.by_range {
            let (lo, hi) = range
                .split_once("..")
                .context("--by-range expects LO..HI")?;
            set.push(EventFilter::ByRange {
                lo: parse_number(lo)?,
                hi: parse_number(hi)?,
            });
        }
        if let Some(dirfrag) = self.by_dirfrag_name {
            let (dir_inode, name) = dirfrag
                .split_once(',')
                .context("--by-dirfrag-name expects DIR_INODE,NAME")?;
            set.push(EventFilter::ByDirfragName {
                dir_inode: parse_number(dir_inode)?,
                name: name.to_string(),
            });
        }
        Ok(set)
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// One line per event
    Summary,
    /// The full report as JSON
    Json,
    /// One binary file per event payload
    Binary,
}

fn parse_number(s: &str) -> Result<u64> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x") {
        u64::from_str_radix(hex, 16).with_context(|| format!("bad hex value '{s}'"))
    } else {
        s.parse().with_context(|| format!("bad value '{s}'"))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli {
        rank,
        pool: pool_id,
        data_dir,
        command,
    } = Cli::parse();
    let store = LocalFileSystem::new_with_prefix(&data_dir)
        .with_context(|| format!("Failed to open pool directory {}", data_dir.display()))?;
    let pool = PoolClient::new(Arc::new(store));

    match command {
        Commands::Journal { command } => handle_journal(rank, pool_id, &pool, command).await,
        Commands::Header { command } => handle_header(rank, &pool, command).await,
        Commands::Event { command } => handle_event(rank, pool_id, &pool, command).await,
    }
}

async fn handle_journal(
    rank: u32,
    pool_id: i64,
    pool: &PoolClient,
    command: JournalCommands,
) -> Result<()> {
    match command {
        JournalCommands::Inspect => {
            let scanner = JournalScanner::new(pool.clone(), ScanConfig::new(rank, pool_id));
            let report = scanner.scan().await.context("Failed to scan journal")?;

            if !report.header_present {
                println!("Header object is missing");
            } else if !report.header_valid {
                println!(
                    "Header is corrupt: {}",
                    report.header_error.as_deref().unwrap_or("unknown reason")
                );
            }
            for index in &report.objects_missing {
                println!("Missing object {}", object_name(rank, *index));
            }
            for range in &report.ranges_invalid {
                match range.hi {
                    Some(hi) => println!("Corrupt region 0x{:x}..0x{:x}", range.lo, hi),
                    None => println!("Corrupt region 0x{:x}..end", range.lo),
                }
            }
            println!(
                "Recovered {} events ({} filtered out)",
                report.events_valid.len(),
                report.events_filtered
            );
            println!("{}", report.summary());
        }
        JournalCommands::Export { file } => {
            let info = Dumper::new(pool.clone(), rank, pool_id)
                .dump(&file)
                .await
                .context("Failed to export journal")?;
            println!(
                "Wrote {} bytes at offset 0x{:x} to {}",
                info.len,
                info.start,
                file.display()
            );
            println!("NOTE: the output is a sparse file; copy it with sparse-aware tools");
        }
        JournalCommands::Import { file } => {
            let info = Dumper::new(pool.clone(), rank, pool_id)
                .undump(&file)
                .await
                .context("Failed to import journal")?;
            println!(
                "Restored {} bytes at offset 0x{:x} from {}",
                info.len,
                info.start,
                file.display()
            );
        }
    }
    Ok(())
}

async fn handle_header(rank: u32, pool: &PoolClient, command: HeaderCommands) -> Result<()> {
    match command {
        HeaderCommands::Get => {
            let name = object_name(rank, 0);
            let data = match pool.read(&name).await? {
                ReadOutcome::Present(data) => data,
                ReadOutcome::Missing => bail!("Header object {name} is missing"),
            };
            let header = Header::decode(&data).context("Failed to decode header")?;
            println!("{}", serde_json::to_string_pretty(&header)?);
        }
    }
    Ok(())
}

async fn handle_event(
    rank: u32,
    pool_id: i64,
    pool: &PoolClient,
    command: EventCommands,
) -> Result<()> {
    match command {
        EventCommands::Get {
            filters,
            output,
            output_dir,
        } => {
            let config = ScanConfig {
                filter: filters.into_filter_set()?,
                ..ScanConfig::new(rank, pool_id)
            };
            let scanner = JournalScanner::new(pool.clone(), config);
            let report = scanner.scan().await.context("Failed to scan journal")?;

            match output {
                OutputFormat::Summary => {
                    for (offset, event) in &report.events {
                        let path = event.as_update().map(|u| u.path).unwrap_or_default();
                        println!("0x{offset:x} {}: {path}", event.type_tag);
                    }
                    println!("{}", report.summary());
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                OutputFormat::Binary => {
                    tokio::fs::create_dir_all(&output_dir).await.with_context(|| {
                        format!("Failed to create output directory {}", output_dir.display())
                    })?;
                    for (offset, event) in &report.events {
                        let Some(raw) = &event.raw else {
                            continue;
                        };
                        let file =
                            output_dir.join(format!("0x{offset:x}_{}.bin", event.type_tag));
                        tokio::fs::write(&file, raw).await.with_context(|| {
                            format!("Failed to write {}", file.display())
                        })?;
                    }
                    println!(
                        "Wrote {} events to {}",
                        report.events.len(),
                        output_dir.display()
                    );
                    println!("{}", report.summary());
                }
            }
        }
    }
    Ok(())
}
