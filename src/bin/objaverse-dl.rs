//! Command line interface for objaverse-dl

use clap::{Parser, Subcommand, ValueEnum};
use objaverse_dl::sources::SaveRepoFormat;
use objaverse_dl::utils::write_atomic;
use objaverse_dl::{
    AnnotationTable, Config, DownloadOptions, ObjaverseDownloader, ObjectHandlers, Result, Source,
    run_until_signal,
};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const FALLBACK_DOWNLOAD_DIR: &str = "~/.objaverse";

#[derive(Parser, Debug)]
#[command(name = "objaverse-dl", version, about = "Download Objaverse-XL objects and annotations")]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print annotation tables as JSON Lines
    Annotations {
        /// Alignment annotations (github and sketchfab only)
        #[arg(long)]
        alignment: bool,

        /// Re-download cached tables
        #[arg(long)]
        refresh: bool,

        /// Cache directory (default from config, then ~/.objaverse)
        #[arg(long)]
        download_dir: Option<PathBuf>,

        /// Restrict to these sources, comma separated
        #[arg(long, value_delimiter = ',', conflicts_with = "alignment")]
        sources: Vec<Source>,

        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Download the objects listed in an annotation table
    Download {
        /// Table of records (JSON Lines; .json for a JSON array, .csv for CSV)
        table: PathBuf,

        /// Where to keep downloaded objects (default from config, then ~/.objaverse)
        #[arg(long)]
        download_dir: Option<PathBuf>,

        /// Discard objects once they have been handled
        #[arg(long, conflicts_with = "download_dir")]
        discard: bool,

        /// Concurrent downloads per source
        #[arg(long, short)]
        processes: Option<usize>,

        /// How github repositories are stored
        #[arg(long, value_enum)]
        save_repo_format: Option<RepoFormat>,

        /// Only download the first N records
        #[arg(long)]
        limit: Option<usize>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RepoFormat {
    Files,
    Zip,
    Tar,
    #[value(name = "tar.gz")]
    TarGz,
}

impl From<RepoFormat> for SaveRepoFormat {
    fn from(format: RepoFormat) -> Self {
        match format {
            RepoFormat::Files => SaveRepoFormat::Files,
            RepoFormat::Zip => SaveRepoFormat::Zip,
            RepoFormat::Tar => SaveRepoFormat::Tar,
            RepoFormat::TarGz => SaveRepoFormat::TarGz,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "objaverse-dl failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    let configured_dir = config.download_dir();
    let downloader = ObjaverseDownloader::new(config)?;

    match cli.command {
        Command::Annotations {
            alignment,
            refresh,
            download_dir,
            sources,
            output,
        } => {
            let dir = download_dir
                .or(configured_dir)
                .unwrap_or_else(|| PathBuf::from(FALLBACK_DOWNLOAD_DIR));
            let table = run_until_signal(async {
                if alignment {
                    downloader.get_alignment_annotations(&dir, refresh).await
                } else if sources.is_empty() {
                    downloader.get_annotations(&dir, refresh).await
                } else {
                    downloader.get_annotations_for(&sources, &dir, refresh).await
                }
            })
            .await?;

            let body = table.to_json_lines()?;
            match output {
                Some(path) => {
                    write_atomic(&path, body.as_bytes()).await?;
                    tracing::info!(rows = table.len(), path = %path.display(), "annotations written");
                }
                None => print!("{body}"),
            }
        }
        Command::Download {
            table,
            download_dir,
            discard,
            processes,
            save_repo_format,
            limit,
        } => {
            let objects = AnnotationTable::read_from(&table).await?;
            let objects = match limit {
                Some(n) => objects.head(n),
                None => objects,
            };
            let dir = if discard {
                None
            } else {
                download_dir.or(configured_dir)
            };

            let mut options = DownloadOptions::new().handlers(logging_handlers());
            if let Some(processes) = processes {
                options = options.processes(processes);
            }
            if let Some(format) = save_repo_format {
                options = options.source_option(
                    "save_repo_format",
                    serde_json::to_value(SaveRepoFormat::from(format))?,
                );
            }

            let downloaded = run_until_signal(downloader.download_objects(
                &objects,
                dir.as_deref(),
                &options,
            ))
            .await?;

            let sorted: BTreeMap<_, _> = downloaded.into_iter().collect();
            println!("{}", serde_json::to_string_pretty(&sorted)?);
        }
    }

    Ok(())
}

fn logging_handlers() -> ObjectHandlers {
    ObjectHandlers::new()
        .on_found(|obj| {
            tracing::debug!(
                file_identifier = %obj.file_identifier,
                path = %obj.local_path.display(),
                "found"
            );
        })
        .on_modified(|obj| {
            tracing::warn!(
                file_identifier = %obj.file_identifier,
                old_sha256 = %obj.old_sha256,
                new_sha256 = %obj.new_sha256,
                "modified"
            );
        })
        .on_missing(|obj| {
            tracing::warn!(file_identifier = %obj.file_identifier, "missing");
        })
}
