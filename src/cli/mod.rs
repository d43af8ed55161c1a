use clap::{Parser, Subcommand};
use log::{Level, error, info, log_enabled};
use std::{path::PathBuf, process::ExitCode};

use crate::config::{self, Overrides};
use crate::export::{ExportSummary, Exporter, api::WebApi, auth::OAuthFlow};
use crate::fetch::{FfmpegTranscoder, YtDlpFetcher};
use crate::logging;
use crate::pipeline::{Pipeline, PipelineConfig, RunSummary, plan};
use crate::tagging::{DefaultArtworkLoader, Id3Tagger};

#[derive(Parser)]
#[command(name = "playlist-dl")]
#[command(version)]
#[command(about = "Download the tracks of exported playlists as tagged MP3 files")]
pub struct Cli {
    /// Path to the config TOML file [default: ./playlist-dl.toml if present]
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory with playlist CSV exports
    #[arg(long, global = true)]
    pub playlists_dir: Option<PathBuf>,

    /// Directory the MP3 files are written to
    #[arg(long, global = true)]
    pub output_dir: Option<PathBuf>,

    /// Directory for per-run log files
    #[arg(long, global = true)]
    pub logs_dir: Option<PathBuf>,

    /// Constant MP3 bitrate in kbps
    #[arg(long, global = true)]
    pub bitrate: Option<u32>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download every track that is not in the output directory yet (default)
    Download {
        /// Do not write ID3 tags
        #[arg(long)]
        no_tags: bool,
    },
    /// Show how many tracks of each playlist are already downloaded
    Status,
    /// Export liked songs and all playlists from Spotify into the playlists directory
    Export,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            playlists_dir: self.playlists_dir.clone(),
            output_dir: self.output_dir.clone(),
            logs_dir: self.logs_dir.clone(),
            bitrate_kbps: self.bitrate,
        }
    }
}

/// How a command ended, and the process exit code for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Every playlist was processed; single tracks may have failed
    Complete,
    /// Nothing could be processed: bad config, missing tools or directories
    Fatal,
    /// The run finished but some playlists failed as a whole
    FileErrors,
}

impl RunStatus {
    pub fn code(self) -> u8 {
        match self {
            RunStatus::Complete => 0,
            RunStatus::Fatal => 1,
            RunStatus::FileErrors => 2,
        }
    }
}

impl From<RunStatus> for ExitCode {
    fn from(status: RunStatus) -> Self {
        ExitCode::from(status.code())
    }
}

impl From<&RunSummary> for RunStatus {
    fn from(summary: &RunSummary) -> Self {
        if summary.has_file_errors() {
            RunStatus::FileErrors
        } else {
            RunStatus::Complete
        }
    }
}

impl From<&ExportSummary> for RunStatus {
    fn from(summary: &ExportSummary) -> Self {
        if summary.has_failures() {
            RunStatus::FileErrors
        } else {
            RunStatus::Complete
        }
    }
}

/// Entrypoint for CLI
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    finish(execute(&cli)).into()
}

/// Reports a run-level error and turns it into [`RunStatus::Fatal`].
fn finish(result: anyhow::Result<RunStatus>) -> RunStatus {
    match result {
        Ok(status) => status,
        Err(err) => {
            if log_enabled!(Level::Error) {
                error!("{err:#}");
            } else {
                eprintln!("error: {err:#}");
            }
            RunStatus::Fatal
        }
    }
}

fn execute(cli: &Cli) -> anyhow::Result<RunStatus> {
    let cfg = config::Config::resolve(cli.config.as_deref())?.apply(cli.overrides());
    let pipeline_config = PipelineConfig::from_config(&cfg)?;

    match cli.command.as_ref().unwrap_or(&Commands::Download { no_tags: false }) {
        Commands::Download { no_tags } => {
            let log_path = logging::init(&cfg.logs_dir)?;
            info!("writing run log to {}", log_path.display());

            let fetcher = YtDlpFetcher::new(&cfg.tools.yt_dlp, &cfg.tools.search_suffix);
            let transcoder = FfmpegTranscoder::new(&cfg.tools.ffmpeg);
            let tagger = (cfg.tagging.enabled && !no_tags).then(|| {
                Id3Tagger::new(
                    cfg.tagging
                        .embed_artwork
                        .then(|| DefaultArtworkLoader::new(cfg.tools.artwork_timeout())),
                )
            });

            let summary = Pipeline::new(pipeline_config, fetcher, transcoder, tagger).run()?;

            println!("{summary}");
            Ok(RunStatus::from(&summary))
        }

        Commands::Status => {
            logging::init_console()?;

            let plans = plan(&pipeline_config)?;
            if plans.is_empty() {
                println!(
                    "No playlist files found in {}",
                    pipeline_config.playlists_dir.display()
                );
            }
            for entry in &plans {
                match &entry.error {
                    Some(err) => println!("  [UNREADABLE]  {}: {err}", entry.name),
                    None => {
                        println!(
                            "  {}: {} downloaded, {} pending",
                            entry.name, entry.present, entry.pending
                        );
                        if entry.row_errors > 0 {
                            println!("    - {} rows cannot be parsed", entry.row_errors);
                        }
                    }
                }
            }
            Ok(RunStatus::Complete)
        }

        Commands::Export => {
            logging::init_console()?;

            let (client_id, client_secret) = cfg.spotify.credentials()?;
            let flow = OAuthFlow::new(
                client_id,
                client_secret,
                &cfg.spotify.redirect_uri,
                cfg.spotify.auth_timeout(),
            )?;
            let token = flow.authorize(|url| {
                println!("Open this URL in a browser to allow access to your library:\n\n  {url}\n");
            })?;

            let api = WebApi::new(token, cfg.spotify.request_timeout())?;
            let summary = Exporter::new(api, &cfg.playlists_dir).run()?;

            println!("{summary}");
            Ok(RunStatus::from(&summary))
        }
    }
}
