use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use exdent_core::{DirectoryListing, ExFatImage, NameParseConfig, ParseStats};
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser, Debug)]
#[command(name = "exdent", version, about = "exdent - exFAT directory name recovery")]
struct Cli {
	/// Increase log verbosity (-v debug, -vv trace)
	#[arg(short, long, action = clap::ArgAction::Count, global = true)]
	verbose: u8,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Check whether an image holds an exFAT volume
	Detect {
		/// Path to image file
		image: PathBuf,
	},
	/// Show the volume layout
	Info {
		/// Path to image file
		image: PathBuf,
	},
	/// List the names in a directory, deleted entries included
	Ls {
		/// Path to image file
		image: PathBuf,
		/// First cluster of the directory (defaults to the root directory)
		#[arg(long)]
		cluster: Option<u32>,
		/// Number of consecutive clusters the directory occupies
		#[arg(long, default_value = "1")]
		clusters: u32,
		/// Print the listing as JSON
		#[arg(long)]
		json: bool,
		/// JSON configuration file (defaults to <config dir>/exdent/config.json)
		#[arg(long)]
		config: Option<PathBuf>,
	},
}

#[derive(Serialize)]
struct LsOutput<'a> {
	listing: &'a DirectoryListing,
	stats: &'a ParseStats,
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	let level = match cli.verbose {
		0 => LevelFilter::WARN,
		1 => LevelFilter::DEBUG,
		_ => LevelFilter::TRACE,
	};
	tracing_subscriber::fmt()
		.with_max_level(level)
		.with_writer(std::io::stderr)
		.init();

	match cli.command {
		Commands::Detect { image } => {
			println!("🔍 Detecting file system type for: {}", image.display());

			if exdent_core::fs::detect_exfat(&image)? {
				println!("✅ Detected: exFAT");
			} else {
				println!("❌ Not an exFAT volume");
			}
		}
		Commands::Info { image } => {
			let info = exdent_core::fs::get_filesystem_info(&image)
				.with_context(|| format!("Failed to read filesystem info from {}", image.display()))?;
			println!("📋 File System Information:");
			println!("{}", info);
		}
		Commands::Ls { image, cluster, clusters, json, config } => {
			let config = load_config(config.as_deref())?;
			let volume = ExFatImage::open(&image)?;
			let first = cluster.unwrap_or_else(|| volume.root_cluster());

			let (listing, stats) = volume.list_directory(first, clusters, &config)?;

			if json {
				let output = LsOutput { listing: &listing, stats: &stats };
				println!("{}", serde_json::to_string_pretty(&output)?);
				return Ok(());
			}

			print_listing(&listing, &stats);
		}
	}
	Ok(())
}

/// Explicit path first, then the per-user config file, then defaults
fn load_config(path: Option<&Path>) -> Result<NameParseConfig> {
	if let Some(path) = path {
		return NameParseConfig::from_json_file(path)
			.with_context(|| format!("Failed to load config {}", path.display()));
	}

	if let Some(default_path) = dirs::config_dir().map(|dir| dir.join("exdent").join("config.json")) {
		if default_path.exists() {
			tracing::debug!("Using config {}", default_path.display());
			return NameParseConfig::from_json_file(&default_path)
				.with_context(|| format!("Failed to load config {}", default_path.display()));
		}
	}

	Ok(NameParseConfig::default())
}

fn print_listing(listing: &DirectoryListing, stats: &ParseStats) {
	for record in listing.names() {
		// Deleted or free-space entries are starred
		let marker = if record.allocated { " " } else { "*" };
		println!("{}/{} {}{}:\t{}", record.name_type, record.name_type, marker, record.meta_addr, record.name);
	}

	println!();
	println!("📈 Names Found: {}", stats.records_emitted);
	println!("🗑️  Unallocated: {}", listing.unallocated().count());
	if stats.incomplete_sets > 0 {
		println!("⚠️  Incomplete Entry Sets: {}", stats.incomplete_sets);
	}
	if stats.checksum_mismatches > 0 {
		println!("⚠️  Checksum Mismatches: {}", stats.checksum_mismatches);
	}
	if stats.strict_mode {
		println!("⚠️  Directory looked corrupt; strict entry checks were used");
	}
}
