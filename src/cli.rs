use clap::{Parser, Subcommand, ValueEnum};
use siteclone_lib::Viewport;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "siteclone")]
#[command(
    version,
    about = "Site Replication Pipeline - Clone live web pages into generated HTML replicas",
    long_about = "Site Replication Pipeline (siteclone)\n\nModes:\n- clone: render a page, detect its UI components, and generate an HTML replica (optionally refined against a visual diff).\n- detect: render a page and print the detected UI components.\n\nUse --help on any subcommand for details."
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Optional config file (TOML) to set defaults for viewport/timeouts/retry/budget; CLI flags override config"
    )]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Clone a web page into a generated HTML replica
    Clone {
        #[arg(help = "URL of the page to clone (http/https)")]
        url: String,

        #[arg(
            long,
            default_value = "1920x1080",
            help = "Viewport dimensions (WIDTHxHEIGHT) for rendering and screenshots"
        )]
        viewport: Viewport,

        #[arg(long, default_value = "6", help = "Maximum DOM extraction depth")]
        max_depth: u32,

        #[arg(long, help = "Skip asset download and path localization")]
        no_assets: bool,

        #[arg(long, help = "Skip the visual-feedback refinement pass")]
        no_refine: bool,

        #[arg(
            long,
            short,
            value_name = "PATH",
            help = "Write the generated HTML to this file (JSON status goes to stdout)"
        )]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "json", help = "Output format")]
        format: OutputFormat,
    },

    /// Detect UI components on a web page without generating HTML
    Detect {
        #[arg(help = "URL of the page to analyze (http/https)")]
        url: String,

        #[arg(
            long,
            default_value = "1920x1080",
            help = "Viewport dimensions (WIDTHxHEIGHT)"
        )]
        viewport: Viewport,

        #[arg(long, default_value = "6", help = "Maximum DOM extraction depth")]
        max_depth: u32,

        #[arg(long, short, help = "Output file path (stdout if omitted)")]
        output: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "json", help = "Output format")]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Pretty,
}

pub fn parse() -> Cli {
    Cli::parse()
}
