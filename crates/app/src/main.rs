// Copyright 2025-2026 CEMAXECUTER LLC

mod pipeline;

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "duo-capture")]
#[command(about = "Synchronized dual-tuner IQ capture")]
struct Cli {
    /// Dual-tuner IQ recording (AI,AQ,BI,BQ as ci16 LE)
    #[arg(short = 'f', long)]
    file: Option<PathBuf>,

    /// Raw output file for synchronized frames
    #[arg(short = 'w', long)]
    write: Option<PathBuf>,

    /// Samples per channel in each synchronized frame
    #[arg(short = 'n', long, default_value = "10000")]
    chunk_len: usize,

    /// Frame handoff queue depth (0 = deliver only to a waiting writer)
    #[arg(short = 'd', long, default_value = "16")]
    depth: usize,

    /// Samples per tuner per replayed callback
    #[arg(long, default_value = "1008")]
    block_size: usize,

    /// Per-tuner sample rate in Hz
    #[arg(short = 'r', long, default_value = "2000000")]
    sample_rate: u32,

    /// Write f32 samples instead of int16
    #[arg(long)]
    float: bool,

    /// ADC resolution used to scale float output
    #[arg(long, default_value = "16")]
    num_bits: u32,

    /// Write samples big-endian
    #[arg(long)]
    big_endian: bool,

    /// Skip every Nth replayed block to exercise drop recovery
    #[arg(long)]
    drop_every: Option<usize>,

    /// Verbose output
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Print statistics
    #[arg(long)]
    stats: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if cli.verbose {
        log::info!("duo-capture starting");
        log::info!("chunk length: {} samples", cli.chunk_len);
        log::info!("handoff depth: {}", cli.depth);
    }

    let Some(ref file) = cli.file else {
        eprintln!("no input specified. Use -f <file> to replay a dual-tuner recording.");
        std::process::exit(1);
    };

    if cli.chunk_len == 0 {
        eprintln!("chunk length must be non-zero");
        std::process::exit(1);
    }

    let opts = pipeline::CaptureOptions {
        chunk_len: cli.chunk_len,
        depth: cli.depth,
        block_size: cli.block_size,
        sample_rate: cli.sample_rate,
        float: cli.float,
        num_bits: cli.num_bits,
        big_endian: cli.big_endian,
        drop_every: cli.drop_every,
        stats: cli.stats,
    };

    match pipeline::run_file(file, cli.write.as_deref(), &opts) {
        Ok(summary) => {
            if cli.stats {
                eprintln!("{}", summary);
            }
        }
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}
