use std::{
    fs,
    io::{self, BufRead as _},
    path::{Path, PathBuf},
};

use anyhow::{anyhow, Context as _};
use clap::Parser;
use indicatif::ProgressBar;
use log::LevelFilter;
use reedline::{DefaultPrompt, DefaultPromptSegment, Reedline, Signal};
use terrapen_motion::{storage, Config};

use crate::runner::Runner;

mod render;
mod runner;

/// Runs the terrapen motion core against a simulated board.
///
/// Input is one JSON command frame per line, e.g. `{"cmd":2,"x":0,"y":10}`.
/// Every response frame is printed on stdout.
#[derive(Parser)]
struct Args {
    /// A file of command frames. Without one, commands are read interactively
    /// (or from stdin, if it isn't a terminal).
    path: Option<PathBuf>,

    /// Hardware configuration, as JSON. Defaults to the stock robot.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Simulated time between ticks, in microseconds.
    #[arg(long, default_value_t = 200)]
    tick_us: u64,

    /// Draw the travelled path to this SVG file on exit.
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Also print the periodic status frames sent while moving.
    #[arg(long)]
    status: bool,

    /// Print the configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,

    /// Write the configuration as a persisted flash record to this file and exit.
    #[arg(long)]
    write_record: Option<PathBuf>,

    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let mut builder = pretty_env_logger::formatted_builder();
    builder.filter_level(if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let data = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    // A flash record dumped by --write-record, or plain JSON.
    let config = if data.starts_with(&storage::MAGIC) {
        let block: [u8; storage::BLOCK_SIZE] = data
            .get(..storage::BLOCK_SIZE)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| anyhow!("{} is a truncated record", path.display()))?;
        storage::decode(&block)?
    } else {
        let config: Config = serde_json::from_slice(&data)?;
        config.validate()?;
        config
    };
    Ok(config)
}

fn run_file(runner: &mut Runner, path: &Path) -> anyhow::Result<()> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let lines: Vec<&str> = text.lines().collect();
    let bar = ProgressBar::new(lines.len() as u64);
    for line in lines {
        for out in runner.feed(line) {
            bar.suspend(|| println!("{out}"));
        }
        bar.inc(1);
    }
    bar.finish_and_clear();
    Ok(())
}

fn run_stdin(runner: &mut Runner) -> anyhow::Result<()> {
    for line in io::stdin().lock().lines() {
        for out in runner.feed(&line?) {
            println!("{out}");
        }
    }
    Ok(())
}

fn command_mode(runner: &mut Runner) -> anyhow::Result<()> {
    let mut reed = Reedline::create();
    let prompt = DefaultPrompt::new(
        DefaultPromptSegment::Basic("terrapen".to_owned()),
        DefaultPromptSegment::Empty,
    );
    loop {
        let s = match reed.read_line(&prompt)? {
            Signal::Success(s) => s,
            Signal::CtrlC | Signal::CtrlD => break,
        };
        let s = s.trim();
        if s == "quit" {
            break;
        }
        for out in runner.feed(s) {
            println!("{out}");
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = load_config(args.config.as_deref())?;
    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }
    if let Some(path) = &args.write_record {
        fs::write(path, storage::encode(&config)?)?;
        eprintln!("wrote {} byte record to {}", storage::BLOCK_SIZE, path.display());
        return Ok(());
    }

    let mut runner = Runner::new(config, args.tick_us).with_status_reports(args.status);
    if let Some(path) = &args.path {
        run_file(&mut runner, path)?;
    } else if io::IsTerminal::is_terminal(&io::stdin()) {
        command_mode(&mut runner)?;
    } else {
        run_stdin(&mut runner)?;
    }

    if let Some(path) = &args.svg {
        render::save(path, runner.trace(), &config.workspace)?;
        eprintln!("wrote {}", path.display());
    }
    Ok(())
}
