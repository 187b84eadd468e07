//! `pulley` command line: enqueue one upload and follow it, or inspect persisted results.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use pulley_core::{
    EnqueueBinaryRequest, EnqueueBlockRequest, EnqueueRequest, FileItem, FormField, TaskId,
    UploadInspector, UploadResult, UploadWorkflow, parse_flag,
};
use pulley_events::UploadEvent;
use tokio_stream::StreamExt;

use crate::error::{AppError, AppResult};
use crate::manager::UploadManager;

/// Top-level arguments.
#[derive(Debug, Parser)]
#[command(name = "pulley", about = "Background file uploads over HTTP")]
pub struct Cli {
    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload files and form fields as multipart/form-data.
    Upload(MultipartArgs),
    /// Upload one file as the raw request body.
    Binary(BinaryArgs),
    /// Upload one file as consecutive `Content-Range` blocks.
    Blocks(BlockArgs),
    /// Print persisted results as JSON lines.
    Results,
    /// Remove every persisted result.
    ClearResults,
}

impl Command {
    /// Short name recorded on the application span.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Upload(_) => "upload",
            Self::Binary(_) => "binary",
            Self::Blocks(_) => "blocks",
            Self::Results => "results",
            Self::ClearResults => "clear-results",
        }
    }
}

/// Destination and options shared by every upload command.
#[derive(Debug, Args)]
pub struct TargetArgs {
    /// Destination URL.
    #[arg(long)]
    pub url: String,
    /// HTTP method: POST, PUT or PATCH.
    #[arg(long, default_value = "POST")]
    pub method: String,
    /// Extra request header as `name=value`; repeatable.
    #[arg(long = "header", value_parser = parse_pair)]
    pub headers: Vec<(String, String)>,
    /// Correlation tag echoed on every event.
    #[arg(long)]
    pub tag: Option<String>,
    /// Whether metered connections may carry the upload (`true`/`false`).
    #[arg(long, default_value = "true")]
    pub allow_cellular: String,
}

impl TargetArgs {
    fn headers(&self) -> BTreeMap<String, String> {
        self.headers.iter().cloned().collect()
    }

    fn allow_cellular(&self) -> UploadResult<bool> {
        parse_flag("allow_cellular", &self.allow_cellular)
    }
}

/// Multipart upload arguments.
#[derive(Debug, Args)]
pub struct MultipartArgs {
    /// Target options.
    #[command(flatten)]
    pub target: TargetArgs,
    /// File part as `field=path`; repeatable.
    #[arg(long = "file", value_parser = parse_pair)]
    pub files: Vec<(String, String)>,
    /// Form field as `key=value`; repeatable.
    #[arg(long = "field", value_parser = parse_pair)]
    pub fields: Vec<(String, String)>,
}

/// Raw-body upload arguments.
#[derive(Debug, Args)]
pub struct BinaryArgs {
    /// Target options.
    #[command(flatten)]
    pub target: TargetArgs,
    /// File sent as the body.
    #[arg(long)]
    pub path: PathBuf,
}

/// Block upload arguments.
#[derive(Debug, Args)]
pub struct BlockArgs {
    /// Target options.
    #[command(flatten)]
    pub target: TargetArgs,
    /// File sent in blocks.
    #[arg(long)]
    pub path: PathBuf,
    /// Bytes per block; the configured default when omitted.
    #[arg(long)]
    pub block_size: Option<u64>,
}

/// Run a command against the manager, writing JSON lines to `out`.
///
/// Upload commands print every event for the new task and return once it reaches a
/// terminal state. A rejected request prints `{code, message}` and returns an error.
///
/// # Errors
///
/// Returns an error when the request is rejected, output cannot be written, or the
/// result log cannot be cleared.
pub async fn execute<W: Write>(
    manager: &UploadManager,
    command: Command,
    out: &mut W,
) -> AppResult<()> {
    let enqueued = match command {
        Command::Upload(args) => match multipart_request(args) {
            Ok(request) => manager.enqueue(request).await,
            Err(err) => Err(err),
        },
        Command::Binary(args) => match args.target.allow_cellular() {
            Ok(allow_cellular) => {
                manager
                    .enqueue_binary(EnqueueBinaryRequest {
                        headers: args.target.headers(),
                        url: args.target.url,
                        method: args.target.method,
                        path: args.path,
                        tag: args.target.tag,
                        allow_cellular,
                    })
                    .await
            }
            Err(err) => Err(err),
        },
        Command::Blocks(args) => match args.target.allow_cellular() {
            Ok(allow_cellular) => {
                manager
                    .enqueue_blocks(EnqueueBlockRequest {
                        headers: args.target.headers(),
                        url: args.target.url,
                        method: args.target.method,
                        path: args.path,
                        block_size: args.block_size,
                        tag: args.target.tag,
                        allow_cellular,
                    })
                    .await
            }
            Err(err) => Err(err),
        },
        Command::Results => return print_results(manager, out).await,
        Command::ClearResults => {
            return manager.clear_results().await.map_err(|err| {
                AppError::io("cli.clear_results", None, std::io::Error::other(err))
            });
        }
    };

    match enqueued {
        Ok(task_id) => follow(manager, &task_id, out).await,
        Err(err) => {
            serde_json::to_writer(&mut *out, &err.payload())
                .map_err(|source| AppError::io("cli.write", None, source.into()))?;
            writeln!(out).map_err(|source| AppError::io("cli.write", None, source))?;
            Err(AppError::upload("cli.enqueue", err))
        }
    }
}

fn multipart_request(args: MultipartArgs) -> UploadResult<EnqueueRequest> {
    let allow_cellular = args.target.allow_cellular()?;
    Ok(EnqueueRequest {
        headers: args.target.headers(),
        url: args.target.url,
        method: args.target.method,
        files: args
            .files
            .into_iter()
            .map(|(field_name, path)| FileItem {
                field_name,
                path: PathBuf::from(path),
            })
            .collect(),
        data: args
            .fields
            .into_iter()
            .map(|(key, value)| FormField { key, value })
            .collect(),
        tag: args.target.tag,
        allow_cellular,
    })
}

async fn follow<W: Write>(
    manager: &UploadManager,
    task_id: &TaskId,
    out: &mut W,
) -> AppResult<()> {
    let mut progress = manager.hub().listen_progress();
    let mut results = manager.hub().listen_results();
    loop {
        // Progress first: a task's final progress is always emitted before its result.
        let event = tokio::select! {
            biased;
            Some(event) = progress.next() => UploadEvent::Progress(event),
            Some(event) = results.next() => UploadEvent::Result(event),
            else => {
                return Err(AppError::StreamClosed {
                    task_id: task_id.to_string(),
                });
            }
        };
        if event.task_id() != task_id {
            continue;
        }
        let terminal =
            matches!(&event, UploadEvent::Result(result) if result.status().is_terminal());
        write_event(out, &event)?;
        if terminal {
            return Ok(());
        }
    }
}

async fn print_results<W: Write>(manager: &UploadManager, out: &mut W) -> AppResult<()> {
    let results = manager
        .results()
        .await
        .map_err(|err| AppError::io("cli.results", None, std::io::Error::other(err)))?;
    for result in results {
        write_event(out, &UploadEvent::Result(result))?;
    }
    Ok(())
}

fn write_event<W: Write>(out: &mut W, event: &UploadEvent) -> AppResult<()> {
    let line = event
        .to_json_line()
        .map_err(|err| AppError::encode("cli.encode", err))?;
    writeln!(out, "{line}").map_err(|source| AppError::io("cli.write", None, source))
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected `name=value`, got `{raw}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_split_on_first_equals() {
        assert_eq!(
            parse_pair("Authorization=Bearer a=b"),
            Ok(("Authorization".to_string(), "Bearer a=b".to_string()))
        );
        assert!(parse_pair("novalue").is_err());
        assert!(parse_pair("=value").is_err());
    }

    #[test]
    fn upload_command_parses_repeated_parts() -> Result<(), clap::Error> {
        let cli = Cli::try_parse_from([
            "pulley",
            "upload",
            "--url",
            "http://localhost/upload",
            "--file",
            "avatar=/tmp/a.png",
            "--file",
            "doc=/tmp/b.pdf",
            "--field",
            "user=42",
            "--header",
            "x-trace=abc",
            "--allow-cellular",
            "false",
        ])?;
        let Command::Upload(args) = cli.command else {
            panic!("expected upload command");
        };
        assert_eq!(args.files.len(), 2);
        assert_eq!(args.fields, vec![("user".to_string(), "42".to_string())]);
        assert_eq!(args.target.method, "POST");

        let request = multipart_request(args).map_err(|err| {
            clap::Error::raw(clap::error::ErrorKind::InvalidValue, err.to_string())
        })?;
        assert!(!request.allow_cellular);
        assert_eq!(request.files[1].field_name, "doc");
        assert_eq!(request.headers.get("x-trace").map(String::as_str), Some("abc"));
        Ok(())
    }

    #[test]
    fn invalid_cellular_flag_is_rejected() -> Result<(), clap::Error> {
        let cli = Cli::try_parse_from([
            "pulley",
            "upload",
            "--url",
            "http://localhost/upload",
            "--file",
            "a=/tmp/a",
            "--allow-cellular",
            "sometimes",
        ])?;
        let Command::Upload(args) = cli.command else {
            panic!("expected upload command");
        };
        let err = multipart_request(args).err().map(|err| err.code());
        assert_eq!(err, Some("invalid_flag"));
        Ok(())
    }
}
