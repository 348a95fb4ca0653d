use std::env;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use cdda::cd::{derive_lengths, DiscIdentity, RawTocEntry, TocReader, TrackLength};
use cdda::track_set::DiscTrackSetBuilder;
use cdda::{CdDevice, Config, DeviceContext, DiscTrackSet, EnrichState};

struct Options {
    device: Option<PathBuf>,
    lookup: bool,
    json: bool,
}

#[tokio::main]
async fn main() {
    // Use RUST_LOG env var if set, otherwise default to info level; logs go to stderr
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    let options = parse_args(&args);

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    let device_path = options
        .device
        .clone()
        .unwrap_or_else(|| config.default_device.clone());

    let reader = TocReader::system();
    let entries = match reader.read(&device_path) {
        Ok(entries) => entries,
        Err(e) => {
            error!("Failed to read TOC: {}", e);
            std::process::exit(1);
        }
    };
    let lengths = match derive_lengths(&entries) {
        Ok(lengths) => lengths,
        Err(e) => {
            error!("Unusable TOC: {}", e);
            std::process::exit(1);
        }
    };
    let identity = DiscIdentity::from_toc(&entries);

    let (set, state) = if options.lookup {
        lookup(&config, &device_path).await
    } else {
        let mut builder = DiscTrackSetBuilder::new();
        if let Some(identity) = &identity {
            builder = builder.with_session(identity.hex());
        }
        (builder.build(&lengths, &device_path), None)
    };

    if options.json {
        print_json(&device_path, identity.as_ref(), &entries, &lengths, &set, state);
    } else {
        print_text(identity.as_ref(), &entries, &lengths, &set, state);
    }
}

fn parse_args(args: &[String]) -> Options {
    let mut options = Options {
        device: None,
        lookup: false,
        json: false,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--device" => {
                if i + 1 >= args.len() {
                    error!("--device requires a path");
                    print_usage(&args[0]);
                    std::process::exit(1);
                }
                options.device = Some(PathBuf::from(&args[i + 1]));
                i += 2;
            }
            "--lookup" => {
                options.lookup = true;
                i += 1;
            }
            "--json" => {
                options.json = true;
                i += 1;
            }
            "--help" | "-h" => {
                print_usage(&args[0]);
                std::process::exit(0);
            }
            _ => {
                error!("Unknown argument: {}", args[i]);
                print_usage(&args[0]);
                std::process::exit(1);
            }
        }
    }

    options
}

/// Connect the disc like a host would and wait for enrichment to finish
async fn lookup(config: &Config, device_path: &Path) -> (DiscTrackSet, Option<EnrichState>) {
    let config = Config {
        cddb_enabled: true,
        ..config.clone()
    };
    let context = match DeviceContext::from_config(&config, tokio::runtime::Handle::current()) {
        Ok(context) => context,
        Err(e) => {
            error!("Failed to set up CDDB client: {}", e);
            std::process::exit(1);
        }
    };

    let mut device = CdDevice::new(device_path);
    let shared = match device.connect(&context) {
        Ok(shared) => shared,
        Err(e) => {
            error!("Failed to open disc: {}", e);
            std::process::exit(1);
        }
    };

    let state = match device.take_enrichment() {
        Some(task) => match task.await {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("Enrichment task panicked: {}", e);
                Some(EnrichState::Failed)
            }
        },
        None => None,
    };
    info!("Lookup finished: {:?}", state);

    let set = shared.snapshot().await;
    device.disconnect();
    (set, state)
}

fn print_text(
    identity: Option<&DiscIdentity>,
    entries: &[RawTocEntry],
    lengths: &[TrackLength],
    set: &DiscTrackSet,
    state: Option<EnrichState>,
) {
    if let Some(identity) = identity {
        println!("Disc ID: {}", identity);
    }

    println!("TOC:");
    for entry in entries {
        let msf = entry.msf();
        let label = if entry.is_leadout() {
            "lead-out".to_string()
        } else {
            format!("track {:2}", entry.track_number)
        };
        println!(
            "  {:<9} {:02}:{:02}.{:02}  {:>7} frames{}",
            label,
            msf.minutes,
            msf.seconds,
            msf.frames,
            entry.absolute_frames,
            if entry.is_data { "  (data)" } else { "" }
        );
    }

    println!("Lengths:");
    for length in lengths {
        println!(
            "  track {:2}  {:>3}:{:02}",
            length.track_number,
            length.length_seconds / 60,
            length.length_seconds % 60
        );
    }

    if let Some(state) = state {
        println!("Lookup: {}", state);
    }
    println!("{}:", set.name);
    for track in &set.tracks {
        let artist = track
            .artist
            .as_deref()
            .map(|a| format!(" - {}", a))
            .unwrap_or_default();
        println!(
            "  {:2}. {}{} [{}:{:02}]  {}",
            track.ordinal,
            track.title,
            artist,
            track.length_seconds / 60,
            track.length_seconds % 60,
            track.location
        );
    }
}

fn print_json(
    device_path: &Path,
    identity: Option<&DiscIdentity>,
    entries: &[RawTocEntry],
    lengths: &[TrackLength],
    set: &DiscTrackSet,
    state: Option<EnrichState>,
) {
    let report = serde_json::json!({
        "device": device_path,
        "disc_id": identity.map(|i| i.hex()),
        "toc": entries,
        "lengths": lengths,
        "lookup": state.map(|s| s.to_string()),
        "set": set,
    });
    match serde_json::to_string_pretty(&report) {
        Ok(text) => println!("{}", text),
        Err(e) => {
            error!("Failed to encode report: {}", e);
            std::process::exit(1);
        }
    }
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} [--device PATH] [--lookup] [--json]", program);
    eprintln!();
    eprintln!("Reads the table of contents of an audio CD and prints its tracks.");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --device PATH  Drive to read (default: CDDA_DEFAULT_DEVICE or /dev/cdrom)");
    eprintln!("  --lookup       Look the disc up on the CDDB server and apply the result");
    eprintln!("  --json         Print a JSON report instead of text");
}
