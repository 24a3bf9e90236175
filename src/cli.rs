use crate::config::AnalyzerConfig;
use crate::io::OutputFormat;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "jsguard")]
#[command(about = "Finds raw host calls that bypass the recovery boundary", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Files or directories to analyze
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Increase verbosity level (can be repeated: -v, -vv, -vvv)
    ///
    /// Logs go to stderr. RUST_LOG overrides this.
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Analyze files one at a time
    #[arg(long = "no-parallel")]
    pub no_parallel: bool,

    /// Configuration file (skips discovery of .jsguard.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Report raw calls even inside recovery closures
    ///
    /// Without it, a closure the recovery closure returns directly is
    /// still checked, since it runs after recovery has ended. A closure
    /// bound to a variable first and returned later is treated as wrapped.
    #[arg(long)]
    pub strict: bool,

    /// Raw module path to check, replacing the configured ones
    #[arg(long = "unsafe-path")]
    pub unsafe_paths: Vec<String>,

    /// Glob pattern of files to skip (can be repeated)
    #[arg(long = "ignore")]
    pub ignore: Vec<String>,
}

impl Cli {
    /// Applies command line overrides on top of file configuration.
    pub fn apply_overrides(&self, mut config: AnalyzerConfig) -> AnalyzerConfig {
        if !self.unsafe_paths.is_empty() {
            config.unsafe_paths = self.unsafe_paths.clone();
        }
        config.strict |= self.strict;
        config.ignore.extend(self.ignore.iter().cloned());
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from([
            "jsguard",
            "-vv",
            "--format",
            "json",
            "--unsafe-path",
            "crate::raw",
            "--ignore",
            "target/**",
            "src",
        ])
        .unwrap();
        assert_eq!(cli.verbosity, 2);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.paths, vec![PathBuf::from("src")]);
        assert!(!cli.no_parallel);
    }

    #[test]
    fn test_paths_are_required() {
        assert!(Cli::try_parse_from(["jsguard"]).is_err());
    }

    #[test]
    fn test_overrides() {
        let cli = Cli::try_parse_from(["jsguard", "--strict", "--unsafe-path", "a::raw", "x.rs"])
            .unwrap();
        let config = cli.apply_overrides(AnalyzerConfig {
            ignore: vec!["gen/**".to_string()],
            ..AnalyzerConfig::default()
        });
        assert!(config.strict);
        assert_eq!(config.unsafe_paths, vec!["a::raw"]);
        assert_eq!(config.ignore, vec!["gen/**"]);
    }
}
