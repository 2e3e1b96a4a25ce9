use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mews", version, about = "Browse a discussion thread as a lazily loaded tree")]
pub struct Cli {
    /// JSON thread document served by the in-process backend
    #[arg(short, long)]
    pub thread: PathBuf,

    /// Node to open (defaults to the first node without a parent)
    #[arg(long)]
    pub root: Option<String>,

    /// Simulated backend latency per request, in milliseconds
    #[arg(long, default_value_t = 0)]
    pub latency_ms: u64,

    /// Depth below the root at which replies stop loading automatically
    #[arg(long, default_value_t = crate::config::DEFAULT_MAX_DEPTH)]
    pub max_depth: usize,

    /// Enable debug logging to ~/.local/state/mews/debug.log
    #[arg(short, long)]
    pub verbose: bool,

    /// Write the log to this file instead (implies logging)
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}
