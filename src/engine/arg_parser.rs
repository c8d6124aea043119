use clap::Parser;
use std::path::PathBuf;

struct DefaultArgs;

impl DefaultArgs {
    pub const ROOT: &'static str = ".";
}

/// Find files by metadata: walk, probe, select.
#[derive(Clone, Parser)]
#[command(name = "metasift")]
#[command(about = "Walk directories, zip archives or stdin paths, enrich each file with probe scripts, and print the ones that match.")]
pub struct Cli {
    /// Root directories or files. `-` reads paths from stdin. Default: current directory.
    #[arg(value_name = "ROOT")]
    pub roots: Vec<PathBuf>,

    /// Walk the members of this zip archive instead of ROOTs. Repeatable.
    #[arg(long, short = 'z')]
    pub zip: Vec<PathBuf>,

    /// Read records from this JSONL file (`-` for stdin) instead of walking. Repeatable.
    #[arg(long, short = 'i')]
    pub index: Vec<PathBuf>,

    /// Config file. Default: `.metasift.toml` in the working directory, if present.
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Workers per stage. Default: available threads.
    #[arg(long, short = 'w', value_parser = clap::value_parser!(usize))]
    pub workers: Option<usize>,

    /// Capacity of the channels between stages.
    #[arg(long, value_parser = clap::value_parser!(usize))]
    pub buffer: Option<usize>,

    /// Probe script, run once per file with the path as $1 (`@ARG` quoted, `@RAWARG` raw).
    /// Must print a JSON object or key=value lines. `@FILE` reads the script from FILE.
    #[arg(long, short = 'p')]
    pub probe: Vec<String>,

    /// Name of the next probe, in order; repeatable. Default: p0, p1, ...
    #[arg(long)]
    pub probe_name: Vec<String>,

    /// Shell command running probe scripts, one word per flag (`--shell bash --shell=-eu`). Default: sh.
    #[arg(long, allow_hyphen_values = true)]
    pub shell: Vec<String>,

    /// Skip paths during the walk: `key=glob`, `key!=glob`, or a glob on name/path. Repeatable; any match excludes; excluded directories are not descended into.
    #[arg(long, short = 'x')]
    pub exclude: Vec<String>,

    /// Output only records matching this; repeatable, all must match: `key=glob`, `key!=glob` (dotted keys reach probe output), or a glob on name/path.
    #[arg(long, short = 's')]
    pub select: Vec<String>,

    /// Print whole records as JSON lines instead of paths.
    #[arg(long, short = 'j', num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub json: Option<bool>,

    /// Output file. Default: stdout.
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,

    /// Cancel the run after this many seconds.
    #[arg(long, short = 't', value_parser = clap::value_parser!(u64))]
    pub timeout: Option<u64>,

    /// Strict mode: fail when the walk skipped any path because of an error.
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub strict: Option<bool>,

    /// Verbose output (debug logs).
    #[arg(long, short = 'v', num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,

    /// Only log errors.
    #[arg(long, short = 'q', num_args = 0..=1, require_equals = true, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub quiet: Option<bool>,
}

impl Cli {
    /// Roots to walk; the current directory when nothing else names an input.
    pub fn roots_or_default(&self) -> Vec<PathBuf> {
        if self.roots.is_empty() && self.zip.is_empty() && self.index.is_empty() {
            vec![PathBuf::from(DefaultArgs::ROOT)]
        } else {
            self.roots.clone()
        }
    }
}
