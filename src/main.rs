//! # enote CLI
//!
//! The `enote` binary sends Markdown documents to the note service, brings
//! notes back as Markdown, manages attachments and reports duplicate titles.
//!
//! ## Usage
//!
//! ```bash
//! enote --config ./config/enote.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `enote dups` | Print the number of notes, then every title used more than once |
//! | `enote new` | Print a new-note template |
//! | `enote send FILE` | Create a note from a Markdown file |
//! | `enote save FILE` | Update the note a file is bound to |
//! | `enote push FILE` | Save if bound, send otherwise |
//! | `enote open NOTE` | Download a note as Markdown |
//! | `enote revert FILE` | Replace a bound file with the note's version |
//! | `enote delete NOTE` | Delete a note |
//! | `enote search QUERY` | Find notes |
//! | `enote notebooks` / `enote notebook-create NAME` | Notebooks |
//! | `enote tags` | Tags |
//! | `enote attach NOTE SOURCE` | Attach a file or URL |
//! | `enote attachments NOTE` | List attachments |
//! | `enote fetch-attachment NOTE INDEX -o FILE` | Download an attachment |
//! | `enote detach NOTE --hash H` | Remove an attachment |
//! | `enote link NOTE` | Print a Markdown link to a note |
//! | `enote links FILE` | List note links in a file |
//! | `enote status FILE` | Binding of a file |
//! | `enote convert to-enml FILE` | Offline conversion |
//!
//! `NOTE` is a guid or any link ending with the guid.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use enote::attachments::{self, AttachmentSelector};
use enote::codec::encode_document;
use enote::config::{self, Config};
use enote::error::ServiceError;
use enote::links::{self, DEFAULT_LINK_TEMPLATE};
use enote::metadata::parse_tags;
use enote::notes::{self, SendOptions};
use enote::progress::ProgressMode;
use enote::session::Session;
use enote::tasks::TaskRunner;
use enote::{catalog, scan};

/// enote: Markdown notes on a remote note service.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/enote.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "enote",
    about = "Markdown round-trip, duplicate detection and attachments for a remote note service",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/enote.toml")]
    config: PathBuf,

    /// Log at debug level (overrides RUST_LOG).
    #[arg(long, global = true)]
    debug: bool,

    /// Progress on stderr. Defaults to `human` on a terminal, `off` otherwise.
    #[arg(long, global = true, value_enum)]
    progress: Option<ProgressArg>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ProgressArg {
    Off,
    Human,
    Json,
}

impl From<ProgressArg> for ProgressMode {
    fn from(arg: ProgressArg) -> Self {
        match arg {
            ProgressArg::Off => ProgressMode::Off,
            ProgressArg::Human => ProgressMode::Human,
            ProgressArg::Json => ProgressMode::Json,
        }
    }
}

/// Header overrides shared by `send` and `push`.
#[derive(clap::Args, Clone)]
struct SendArgs {
    /// Title when the document header has none.
    #[arg(long)]
    title: Option<String>,

    /// Tags when the document header has none (JSON list or comma separated).
    #[arg(long)]
    tags: Option<String>,

    /// Notebook name when the document header has none.
    #[arg(long)]
    notebook: Option<String>,

    /// Create the notebook if no notebook has that name.
    #[arg(long)]
    create_notebook: bool,

    /// Retry up to N times when the service refuses the request (expired
    /// token, rate limit).
    #[arg(long, default_value_t = 0)]
    retry: u32,
}

impl SendArgs {
    fn options(&self) -> SendOptions {
        SendOptions {
            title: self.title.clone(),
            tags: self.tags.as_deref().map(parse_tags),
            notebook: self.notebook.clone(),
            create_notebook: self.create_notebook,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Report note titles used more than once.
    ///
    /// Prints the number of notes scanned, then one duplicated title per line.
    Dups,

    /// Print a new-note template.
    New {
        /// Template file; defaults to `notes.default_template`.
        #[arg(long)]
        template: Option<PathBuf>,
    },

    /// Create a note from a Markdown file and bind the file to it.
    Send {
        file: PathBuf,

        #[command(flatten)]
        args: SendArgs,

        /// Send the file as a fenced code block titled "Clip from NAME".
        #[arg(long)]
        clip: bool,
    },

    /// Update the note a file is bound to.
    Save {
        file: PathBuf,

        /// Retry up to N times on authentication or transient service errors.
        #[arg(long, default_value_t = 0)]
        retry: u32,
    },

    /// Save if the file is bound to a note, send it otherwise.
    Push {
        file: PathBuf,

        #[command(flatten)]
        args: SendArgs,
    },

    /// Download a note as Markdown.
    Open {
        /// Note guid or link.
        note: String,

        /// Keep the note markup instead of converting it.
        #[arg(long)]
        raw: bool,

        /// Write to FILE and bind it to the note instead of printing.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace a bound file with the note's current version.
    Revert {
        file: PathBuf,

        /// Replace the file even if it changed since the last sync.
        #[arg(long)]
        force: bool,
    },

    /// Delete a note.
    Delete {
        /// Note guid, link, or a Markdown file bound to a note.
        note: String,

        /// Do not ask for confirmation.
        #[arg(long)]
        yes: bool,
    },

    /// Search notes.
    Search {
        /// Search words; `intitle:word` matches titles only.
        #[arg(default_value = "")]
        query: String,

        /// Only notes in this notebook.
        #[arg(long)]
        notebook: Option<String>,

        /// Only notes with this tag (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Maximum number of results (defaults to `service.max_notes`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// List notebooks.
    Notebooks,

    /// Create a notebook.
    NotebookCreate { name: String },

    /// List tags.
    Tags,

    /// Attach a file or URL to a note.
    Attach {
        /// Note guid, link, or a Markdown file bound to a note.
        note: String,

        /// File path or http(s) URL.
        source: String,

        /// Do not reference the attachment in the note content.
        #[arg(long)]
        no_insert: bool,
    },

    /// List the attachments of a note.
    Attachments {
        /// Note guid, link, or a Markdown file bound to a note.
        note: String,
    },

    /// Download an attachment.
    FetchAttachment {
        /// Note guid, link, or a Markdown file bound to a note.
        note: String,

        /// Attachment index, as printed by `enote attachments`.
        index: usize,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Remove an attachment and its references in the content.
    Detach {
        /// Note guid, link, or a Markdown file bound to a note.
        note: String,

        /// Body hash (hex), as printed by `enote attachments`.
        #[arg(long, conflicts_with = "index")]
        hash: Option<String>,

        /// Attachment index, as printed by `enote attachments`.
        #[arg(long)]
        index: Option<usize>,
    },

    /// Print a Markdown link to a note.
    Link {
        /// Note guid or link.
        note: String,

        /// Link template with `{title}` and `{url}` placeholders.
        #[arg(long, default_value = DEFAULT_LINK_TEMPLATE)]
        template: String,
    },

    /// List note links found in a Markdown file.
    Links { file: PathBuf },

    /// Show which note a file is bound to and whether it changed.
    Status { file: PathBuf },

    /// Convert between Markdown and note markup without the service.
    Convert {
        #[command(subcommand)]
        direction: ConvertDirection,
    },
}

#[derive(Subcommand)]
enum ConvertDirection {
    /// Markdown file to note markup.
    ToEnml { file: PathBuf },
    /// Note markup file to Markdown.
    ToMarkdown { file: PathBuf },
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("enote=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn connect(config_path: &Path) -> Result<Session> {
    Session::connect(config::load_config(config_path)?)
}

/// Config for commands that work without the service.
fn offline_config(config_path: &Path) -> Config {
    config::load_config(config_path).unwrap_or_else(|_| Config::minimal())
}

fn service_error(err: &anyhow::Error) -> Option<&ServiceError> {
    err.chain().find_map(|e| e.downcast_ref::<ServiceError>())
}

/// Explanation of a service failure followed by the raw diagnostic.
fn describe(err: &anyhow::Error) -> String {
    match service_error(err) {
        Some(service) => format!("{}\n{:#}", service.explain(), err),
        None => format!("{:#}", err),
    }
}

/// How often, and on which service failures, `run_task` retries.
#[derive(Clone, Copy)]
struct Retry {
    times: u32,
    refusals_only: bool,
}

impl Retry {
    const NEVER: Retry = Retry {
        times: 0,
        refusals_only: false,
    };

    /// Auth and transient errors; for operations that are safe to repeat.
    fn transient(times: u32) -> Self {
        Self {
            times,
            refusals_only: false,
        }
    }

    /// Only requests the service refused outright; for creates.
    fn refusals(times: u32) -> Self {
        Self {
            times,
            refusals_only: true,
        }
    }

    fn applies_to(&self, err: &anyhow::Error) -> bool {
        service_error(err).is_some_and(|e| {
            if self.refusals_only {
                e.is_refusal()
            } else {
                e.is_transient() || e.is_auth_error()
            }
        })
    }
}

/// Run `op` in the background, reconnecting and retrying as `retry` allows.
async fn run_task<T, F, Fut>(
    config_path: &Path,
    runner: &TaskRunner,
    key: Option<&str>,
    label: &str,
    retry: Retry,
    op: F,
) -> Result<T>
where
    F: Fn(Arc<Session>) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    let mut attempt = 0;
    loop {
        // Reloaded each time so a refreshed token is picked up
        let session = Arc::new(connect(config_path)?);
        let handle = runner.submit(key, label, op(session))?;
        match handle.wait().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < retry.times && retry.applies_to(&err) => {
                attempt += 1;
                warn!(attempt, retries = retry.times, "retrying after service error");
                eprintln!("{}\nRetrying ({}/{})...", describe(&err), attempt, retry.times);
            }
            Err(err) => return Err(err),
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mode = cli
        .progress
        .map(ProgressMode::from)
        .unwrap_or_else(ProgressMode::default_for_tty);
    let reporter = mode.reporter();
    let runner = TaskRunner::new(Arc::clone(&reporter));
    let config_path = cli.config.as_path();

    match cli.command {
        Commands::Dups => {
            let session = connect(config_path)?;
            scan::run_dups(&session, reporter.as_ref()).await?;
        }
        Commands::New { template } => {
            notes::run_new(&offline_config(config_path), template.as_deref())?;
        }
        Commands::Send { file, args, clip } => {
            let options = args.options();
            let note = run_task(config_path, &runner, None, "Sending note", Retry::refusals(args.retry), |s| {
                let file = file.clone();
                let options = options.clone();
                async move { notes::send_file(&s, &file, &options, clip).await }
            })
            .await?;
            notes::print_posted(&note);
        }
        Commands::Save { file, retry } => {
            let key = file.display().to_string();
            let note = run_task(config_path, &runner, Some(&key), "Updating note", Retry::transient(retry), |s| {
                let file = file.clone();
                async move { notes::save_file(&s, &file).await }
            })
            .await?;
            notes::print_updated(&note);
        }
        Commands::Push { file, args } => {
            let options = args.options();
            let key = file.display().to_string();
            let note = run_task(config_path, &runner, Some(&key), "Pushing note", Retry::refusals(args.retry), |s| {
                let file = file.clone();
                let options = options.clone();
                async move { notes::push_file(&s, &file, &options).await }
            })
            .await?;
            notes::print_updated(&note);
        }
        Commands::Open { note, raw, output } => {
            let session = connect(config_path)?;
            notes::run_open(&session, &note, raw, output.as_deref()).await?;
        }
        Commands::Revert { file, force } => {
            let session = connect(config_path)?;
            notes::run_revert(&session, &file, force).await?;
        }
        Commands::Delete { note, yes } => {
            let session = connect(config_path)?;
            notes::run_delete(&session, &note, yes).await?;
        }
        Commands::Search {
            query,
            notebook,
            tags,
            limit,
        } => {
            let session = connect(config_path)?;
            notes::run_search(&session, &query, notebook.as_deref(), &tags, limit).await?;
        }
        Commands::Notebooks => {
            catalog::run_notebooks(&connect(config_path)?).await?;
        }
        Commands::NotebookCreate { name } => {
            catalog::run_notebook_create(&connect(config_path)?, &name).await?;
        }
        Commands::Tags => {
            catalog::run_tags(&connect(config_path)?).await?;
        }
        Commands::Attach {
            note,
            source,
            no_insert,
        } => {
            let target = notes::resolve_target(&note)?;
            let key = target.guid.clone();
            let attached = run_task(config_path, &runner, Some(&key), "Uploading attachment", Retry::NEVER, |s| {
                let target = target.clone();
                let source = attachments::AttachmentSource::parse(&source);
                let insert = !no_insert;
                async move { attachments::attach(&s, &target, &source, insert).await }
            })
            .await?;
            println!("Successfully attached to note '{}'", attached.title);
            println!("hash: {}", attached.hash);
        }
        Commands::Attachments { note } => {
            let session = connect(config_path)?;
            let target = notes::resolve_target(&note)?;
            attachments::run_attachments(&session, &target.guid).await?;
        }
        Commands::FetchAttachment {
            note,
            index,
            output,
        } => {
            let session = connect(config_path)?;
            let target = notes::resolve_target(&note)?;
            attachments::run_fetch(&session, &target.guid, index, &output).await?;
        }
        Commands::Detach { note, hash, index } => {
            let selector = match (hash, index) {
                (Some(hash), None) => AttachmentSelector::Hash(hash),
                (None, Some(index)) => AttachmentSelector::Index(index),
                _ => bail!("Pass one of --hash or --index"),
            };
            let session = connect(config_path)?;
            let target = notes::resolve_target(&note)?;
            attachments::run_detach(&session, &target, &selector).await?;
        }
        Commands::Link { note, template } => {
            let session = connect(config_path)?;
            links::run_link(&session, &note, &template).await?;
        }
        Commands::Links { file } => {
            links::run_links(&notes::read_document(&file)?);
        }
        Commands::Status { file } => {
            notes::run_status(&file)?;
        }
        Commands::Convert { direction } => {
            let config = offline_config(config_path);
            match direction {
                ConvertDirection::ToEnml { file } => {
                    let text = notes::read_document(&file)?;
                    let encoded = encode_document(&text, &config.markdown.render_options());
                    println!("{}", encoded.content);
                }
                ConvertDirection::ToMarkdown { file } => {
                    let content = notes::read_document(&file)?;
                    print!(
                        "{}",
                        notes::convert_to_markdown(&content, &config.text.text_options())
                    );
                }
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {}", describe(&err));
            ExitCode::FAILURE
        }
    }
}
