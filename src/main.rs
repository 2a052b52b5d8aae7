use anyhow::{Context, Result as AnyhowResult};
use blocktext::{config::Config, editor::Editor, model::file_io::LineEnding};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Inspect, search and convert files through the block store
#[derive(Parser, Debug)]
#[command(name = "blocktext")]
#[command(about = "Load a file into block storage, report on it and optionally rewrite it", long_about = None)]
#[command(version)]
struct Args {
    /// File to open (a missing file opens as an empty buffer)
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Path to log file (default: stderr)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// Print the effective configuration as JSON and exit
    #[arg(long)]
    dump_config: bool,

    /// Print the configuration JSON schema and exit
    #[arg(long)]
    dump_schema: bool,

    /// Move the cursor to the first match of this regular expression
    #[arg(long, value_name = "REGEX")]
    find: Option<String>,

    /// Save the file back with this line ending
    #[arg(long, value_name = "ENDING")]
    convert: Option<LineEndingArg>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LineEndingArg {
    Lf,
    Crlf,
}

impl From<LineEndingArg> for LineEnding {
    fn from(arg: LineEndingArg) -> Self {
        match arg {
            LineEndingArg::Lf => LineEnding::LF,
            LineEndingArg::Crlf => LineEnding::CRLF,
        }
    }
}

fn init_tracing(log_file: Option<&Path>) -> AnyhowResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match log_file {
        Some(path) => {
            let file = std::fs::File::create(path)
                .with_context(|| format!("Failed to create log file {}", path.display()))?;
            builder
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> AnyhowResult<Config> {
    match path {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn main() -> AnyhowResult<()> {
    let args = Args::parse();
    init_tracing(args.log_file.as_deref())?;

    if args.dump_schema {
        println!("{}", serde_json::to_string_pretty(&Config::json_schema())?);
        return Ok(());
    }

    let config = load_config(args.config.as_deref())?;
    if args.dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let mut editor = Editor::new(config);
    editor.open_buffer(args.file.as_deref())?;

    if let Some(pattern) = &args.find {
        match editor.find_next(pattern) {
            Some(offset) => println!("match at offset {}", offset),
            None => println!("no match"),
        }
    }

    if let Some(buffer) = editor.current_buffer() {
        let store = buffer.store();
        println!(
            "{}: {} bytes, {} lines, {} blocks, {}{}",
            buffer
                .filename()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "[No Name]".to_string()),
            store.len(),
            store.line_count(),
            store.block_count(),
            buffer.line_ending().display_name(),
            if buffer.is_read_only() { ", read-only" } else { "" }
        );
    }
    if let Some(display) = editor.cursor_display() {
        println!(
            "cursor: line {}, column {} (char {}, byte {})",
            display.row + 1,
            display.display_col + 1,
            display.char_col + 1,
            display.byte_col + 1
        );
    }

    if let Some(ending) = args.convert {
        let ending = LineEnding::from(ending);
        editor.save_current(None, Some(ending))?;
        println!("saved as {}", ending.display_name());
    }

    Ok(())
}
