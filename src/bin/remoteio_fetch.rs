use std::error::Error;
use std::fs::File;
use std::io::{self, Write};

use remoteio::cli::{ByteRange, UriArg};
use remoteio::config::ReaderConfig;
use remoteio::default_registry;
use remoteio::error::{PlaybackFailure, Stage};
use remoteio::io::ReaderStream;
use sarge::prelude::*;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  remoteio_fetch --uri <uri> [--range <start>-[<end>]] [--output <path>] [--config <file>]");
    eprintln!();
    eprintln!("Supported URIs:");
    eprintln!("  ftp://[user[:pass]@]host[:port]/path");
    eprintln!("  nfs://host:/export:/path");
    eprintln!("  http(s)://[user[:pass]@]host[:port]/path   (WebDAV)");
    eprintln!();
    eprintln!("Output defaults to stdout. Set RUST_LOG=remoteio=debug for throughput samples.");
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<(), Box<dyn Error>> {
    let mut reader = ArgumentReader::new();

    let uri_ref = reader.add::<UriArg>(tag::both('u', "uri"));
    let range_ref = reader.add::<ByteRange>(tag::both('r', "range"));
    let output_ref = reader.add::<String>(tag::both('o', "output"));
    let config_ref = reader.add::<String>(tag::both('c', "config"));

    let args = reader.parse()?;

    let uri = match uri_ref.get(&args) {
        Some(Ok(v)) => v.into_inner(),
        Some(Err(e)) => return Err(e.into()),
        None => return Err("missing --uri".into()),
    };
    let range = match range_ref.get(&args) {
        Some(Ok(v)) => v,
        Some(Err(e)) => return Err(e.into()),
        None => ByteRange::default(),
    };
    let config = match config_ref.get(&args) {
        Some(Ok(path)) => ReaderConfig::from_path(path)?,
        _ => ReaderConfig::default(),
    };
    let output = match output_ref.get(&args) {
        Some(Ok(path)) if path != "-" => Some(path),
        _ => None,
    };

    let registry = default_registry(config)?;
    let descriptor = range.to_descriptor(uri);
    let reader = registry.create_reader(&descriptor.uri)?;

    let declared = reader.open(&descriptor).map_err(|e| {
        format!("{}: {e}", PlaybackFailure::classify(Stage::Open, 0))
    })?;
    info!(uri = %descriptor.uri, ?declared, "opened");

    let mut out: Box<dyn Write> = match &output {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(io::stdout().lock()),
    };
    let mut stream = ReaderStream::new(reader);
    let copied = io::copy(&mut stream, &mut out).map_err(|e| {
        format!(
            "{}: {e}",
            PlaybackFailure::classify(Stage::Read, stream.delivered())
        )
    })?;
    out.flush()?;

    if let Some(report) = stream.finish().filter(|r| !r.is_clean()) {
        warn!("{report}");
    }
    info!(bytes = copied, "done");
    Ok(())
}

fn main() {
    init_tracing();
    if let Err(e) = run() {
        eprintln!("remoteio_fetch error: {e}");
        print_usage();
        std::process::exit(1);
    }
}
