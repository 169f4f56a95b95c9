use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use mp4clip::{
    clip::{build_clip_with, ClipOptions},
    parser::decode,
    samples::track_samples_from_mp4,
    source::{ByteRangeSource, FileSource},
    Mp4,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(version, about = "Inspect, copy and clip MP4/ISOBMFF files")]
struct MainOpts {
    /// Log filter (e.g. debug, mp4clip=trace). Overrides RUST_LOG.
    #[arg(long, global = true)]
    log: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the box structure.
    Info(InfoOpts),
    /// List the samples of every track as JSON.
    Samples(SamplesOpts),
    /// Write a copy that starts at the given time.
    Clip(ClipOpts),
    /// Decode and re-encode a file.
    Copy(CopyOpts),
}

#[derive(Args, Debug)]
struct InfoOpts {
    /// Emit JSON instead of a text tree
    #[arg(long)]
    json: bool,

    /// Input filename.
    input: String,
}

#[derive(Args, Debug)]
struct SamplesOpts {
    /// Input filename.
    input: String,
}

#[derive(Args, Debug)]
struct ClipOpts {
    /// Start time in seconds.
    #[arg(short, long)]
    start: f64,

    /// Move the start of each track forward to its next sync sample.
    #[arg(long)]
    sync_align: bool,

    /// Input filename.
    input: String,

    /// Output filename.
    output: String,
}

#[derive(Args, Debug)]
struct CopyOpts {
    /// Input filename.
    input: String,

    /// Output filename.
    output: String,
}

fn main() -> Result<()> {
    let opts = MainOpts::parse();

    let mut builder = env_logger::Builder::new();
    if let Some(ref log_opts) = opts.log {
        builder.parse_filters(log_opts);
    } else if let Ok(ref log_opts) = std::env::var("RUST_LOG") {
        builder.parse_filters(log_opts);
    } else {
        builder.parse_filters("info");
    }
    builder.init();

    match opts.cmd {
        Command::Info(opts) => info(opts),
        Command::Samples(opts) => samples(opts),
        Command::Clip(opts) => clip(opts),
        Command::Copy(opts) => copy(opts),
    }
}

fn open(path: &str) -> Result<(Arc<FileSource>, Mp4)> {
    let src = Arc::new(FileSource::open(path).with_context(|| format!("opening {}", path))?);
    let size = src.size();
    let mp4 = decode(src.clone(), size).with_context(|| format!("decoding {}", path))?;
    Ok((src, mp4))
}

fn info(opts: InfoOpts) -> Result<()> {
    let (_, mp4) = open(&opts.input)?;
    if opts.json {
        println!("{}", serde_json::to_string_pretty(&mp4.summaries())?);
    } else {
        print!("{}", mp4.dump());
    }
    Ok(())
}

fn samples(opts: SamplesOpts) -> Result<()> {
    let (_, mp4) = open(&opts.input)?;
    let tracks = track_samples_from_mp4(&mp4).context("expanding sample tables")?;
    println!("{}", serde_json::to_string_pretty(&tracks)?);
    Ok(())
}

fn clip(opts: ClipOpts) -> Result<()> {
    let start = Duration::try_from_secs_f64(opts.start)
        .with_context(|| format!("clip: invalid start time {}", opts.start))?;
    let (src, mp4) = open(&opts.input)?;

    let clip_opts = ClipOptions {
        align_to_sync: opts.sync_align,
    };
    let clip = build_clip_with(&mp4, start, &*src, &clip_opts)
        .with_context(|| format!("clipping {} at {:?}", opts.input, start))?;

    let mut out = BufWriter::new(
        File::create(&opts.output).with_context(|| format!("creating {}", opts.output))?,
    );
    let n = clip.export(&mut out).context("writing clip")?;
    out.flush()?;
    log::info!("wrote {} bytes to {}", n, opts.output);
    Ok(())
}

fn copy(opts: CopyOpts) -> Result<()> {
    let (_, mp4) = open(&opts.input)?;
    let mut out = BufWriter::new(
        File::create(&opts.output).with_context(|| format!("creating {}", opts.output))?,
    );
    mp4.encode(&mut out).context("writing copy")?;
    out.flush()?;
    log::info!("wrote {} bytes to {}", mp4.size(), opts.output);
    Ok(())
}
