use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{ArgGroup, Parser};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "arcodec")]
#[command(about = "Adaptive arithmetic coding file compressor")]
#[command(version)]
#[command(group(ArgGroup::new("mode").required(true).args(["compress", "decompress"])))]
struct Cli {
    /// Compress INPUT into OUTPUT
    #[arg(short = 'c', long)]
    compress: bool,

    /// Decompress INPUT into OUTPUT
    #[arg(short = 'd', long)]
    decompress: bool,

    /// Overwrite OUTPUT without prompting
    #[arg(short = 'f', long)]
    force: bool,

    /// Source file
    input: PathBuf,

    /// Destination file
    output: PathBuf,
}

fn main() -> ExitCode {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "fatal error");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> arcodec::Result<()> {
    if cli.output.exists() && !cli.force && !confirm_overwrite(&cli.output)? {
        return Ok(());
    }

    let input = BufReader::new(File::open(&cli.input)?);
    let output = BufWriter::new(File::create(&cli.output)?);

    let start = Instant::now();
    if cli.compress {
        let summary = arcodec::compress(input, output)?;
        info!(
            data_bytes = summary.data_bytes,
            archive_bytes = summary.archive_bytes,
            ratio = summary.ratio(),
            duration_secs = start.elapsed().as_secs_f64(),
            "compression complete"
        );
    } else {
        debug_assert!(cli.decompress);
        let summary = arcodec::decompress(input, output)?;
        info!(
            archive_bytes = summary.archive_bytes,
            data_bytes = summary.data_bytes,
            duration_secs = start.elapsed().as_secs_f64(),
            "decompression complete"
        );
    }
    Ok(())
}

fn confirm_overwrite(path: &Path) -> io::Result<bool> {
    print!("Overwrite {}? (y = yes, else quit) ", path.display());
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().read_line(&mut answer)?;
    Ok(answer.trim_start().starts_with('y'))
}
