use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, debug, info};
use tokio::io::{AsyncRead, AsyncReadExt};

use ttyscribe::TranscriptRecorder;
use ttyscribe::clock::SystemClock;
use ttyscribe::config::AppConfig;
use ttyscribe::ids::UuidIds;
use ttyscribe::session::SessionStore;
use ttyscribe::storage::{KvStore, StoreConfig, create_store};
use ttyscribe::transcript::{Message, ParserState, TranscriptBuilder};

const READ_CHUNK_BYTES: usize = 8 * 1024;

fn main() {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "{err:?}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let ctx = RuntimeContext::new(cli.common)?;
    ctx.init_logging()?;
    debug!("effective config: {:?}", ctx.config);

    match cli.command {
        Command::Parse(cmd) => handle_parse(&ctx, cmd),
        Command::Config => handle_config(&ctx),
        command => async_main(ctx, command),
    }
}

#[tokio::main]
async fn async_main(ctx: RuntimeContext, command: Command) -> Result<()> {
    match command {
        Command::Record(cmd) => handle_record(&ctx, cmd).await,
        Command::Sessions { command } => handle_sessions(&ctx, command).await,
        Command::Parse(_) | Command::Config => Ok(()),
    }
}

// ========== CLI ==========

#[derive(Debug, Parser)]
#[command(
    name = "ttyscribe",
    version,
    about = "Rebuild assistant chat transcripts from pseudo-terminal output"
)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Args)]
struct CommonOpts {
    /// Config file (or directory containing config.toml)
    #[arg(long, value_name = "PATH", global = true, env = "TTYSCRIBE_CONFIG")]
    config: Option<PathBuf>,
    /// Directory for stored sessions (overrides storage.data_dir)
    #[arg(long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    /// Disable logging
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    /// Emit logs as JSON
    #[arg(long = "log-json", global = true)]
    log_json: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay a captured pty log and print the transcript
    Parse(ParseCommand),
    /// Stream pty output into the session of a terminal
    Record(RecordCommand),
    /// Inspect or manage stored sessions
    Sessions {
        #[command(subcommand)]
        command: SessionsCommand,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Debug, Clone, Args)]
struct ParseCommand {
    /// Captured pty output
    #[arg(value_name = "FILE")]
    file: PathBuf,
    /// Print messages as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Args)]
struct RecordCommand {
    /// Terminal identity to record into
    #[arg(long = "terminal", value_name = "ID")]
    terminal: String,
    /// Input file; stdin when omitted
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum SessionsCommand {
    /// List sessions, most recent first
    List,
    /// Print one session
    Show {
        id: String,
        /// Print the session record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a session
    Delete { id: String },
    /// Delete all sessions
    Clear,
}

// ========== Runtime ==========

#[derive(Debug)]
struct RuntimeContext {
    common: CommonOpts,
    config: AppConfig,
}

impl RuntimeContext {
    fn new(common: CommonOpts) -> Result<Self> {
        let mut config = AppConfig::load(common.config.as_deref())?;
        if let Some(dir) = &common.data_dir {
            config.storage.data_dir = Some(dir.display().to_string());
        }
        Ok(Self { common, config })
    }

    fn init_logging(&self) -> Result<()> {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

        if self.common.quiet {
            log::set_max_level(LevelFilter::Off);
            return Ok(());
        }

        let level = match self.effective_log_level() {
            LevelFilter::Off => "off",
            LevelFilter::Error => "error",
            LevelFilter::Warn => "warn",
            LevelFilter::Info => "info",
            LevelFilter::Debug => "debug",
            LevelFilter::Trace => "trace",
        };
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("ttyscribe={level}")));

        if self.common.log_json || self.config.logging.json {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
                .try_init()
                .ok();
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_target(self.common.verbose > 1),
                )
                .try_init()
                .ok();
        }

        // Also init env_logger for compatibility with log crate users
        let mut builder =
            env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
        builder.filter_level(self.effective_log_level());
        builder.try_init().ok();

        Ok(())
    }

    fn effective_log_level(&self) -> LevelFilter {
        match self.common.verbose {
            0 => self
                .config
                .logging
                .level
                .parse()
                .unwrap_or(LevelFilter::Info),
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    fn builder(&self) -> TranscriptBuilder {
        TranscriptBuilder::new(self.config.builder_options())
    }

    async fn open_store(&self) -> Result<SessionStore> {
        let data_dir = self.config.data_dir()?;
        debug!("using session store at {}", data_dir.display());
        let kv: Arc<dyn KvStore> = create_store(StoreConfig::File(data_dir));
        Ok(SessionStore::load(
            kv,
            Arc::new(UuidIds),
            Arc::new(SystemClock),
            self.config.store_options(),
        )
        .await)
    }
}

// ========== Handlers ==========

fn handle_parse(ctx: &RuntimeContext, cmd: ParseCommand) -> Result<()> {
    let bytes = std::fs::read(&cmd.file)
        .with_context(|| format!("reading {}", cmd.file.display()))?;
    let buffer = String::from_utf8_lossy(&bytes);

    let advance = ctx
        .builder()
        .advance(&buffer, Vec::new(), ParserState::new());
    info!(
        "parsed {} bytes into {} messages ({:?} mode)",
        bytes.len(),
        advance.messages.len(),
        advance.state.mode
    );

    if cmd.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&advance.messages).context("serializing messages")?
        );
    } else {
        print_transcript(&advance.messages);
    }
    Ok(())
}

async fn handle_record(ctx: &RuntimeContext, cmd: RecordCommand) -> Result<()> {
    let store = ctx.open_store().await?;
    let mut recorder = TranscriptRecorder::new(ctx.builder(), store);
    let session = recorder.bind(&cmd.terminal).await;
    info!("recording terminal {} into session {}", cmd.terminal, session.id);

    match &cmd.file {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening {}", path.display()))?;
            pump(file, &mut recorder).await?;
        }
        None => pump(tokio::io::stdin(), &mut recorder).await?,
    }

    info!(
        "session {} now holds {} messages",
        session.id,
        recorder.messages().len()
    );
    Ok(())
}

/// Feed a reader into the recorder, one batch of complete lines at a time.
///
/// A line split across reads is held back until its newline arrives, so the
/// builder never sees half of an event.
async fn pump<R>(mut reader: R, recorder: &mut TranscriptRecorder) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    let mut carry = Vec::new();
    let mut pending = String::new();
    loop {
        let n = reader.read(&mut buf).await.context("reading input")?;
        if n == 0 {
            break;
        }
        pending.push_str(&decode_utf8_chunk(&mut carry, &buf[..n]));
        if let Some(end) = pending.rfind('\n') {
            let rest = pending.split_off(end + 1);
            recorder.push(&pending).await;
            pending = rest;
        }
    }
    if !carry.is_empty() {
        pending.push_str(&String::from_utf8_lossy(&carry));
    }
    if !pending.is_empty() {
        recorder.push(&pending).await;
    }
    Ok(())
}

/// Decode `bytes` after any bytes carried over from the previous chunk.
///
/// An incomplete sequence at the end is kept in `carry`; invalid bytes elsewhere
/// become U+FFFD.
fn decode_utf8_chunk(carry: &mut Vec<u8>, bytes: &[u8]) -> String {
    carry.extend_from_slice(bytes);
    let mut text = String::with_capacity(carry.len());
    let mut rest = &carry[..];
    let tail = loop {
        match std::str::from_utf8(rest) {
            Ok(valid) => {
                text.push_str(valid);
                break Vec::new();
            }
            Err(e) => {
                let (valid, after) = rest.split_at(e.valid_up_to());
                text.push_str(&String::from_utf8_lossy(valid));
                match e.error_len() {
                    Some(len) => {
                        text.push(char::REPLACEMENT_CHARACTER);
                        rest = &after[len..];
                    }
                    // Incomplete sequence at the end; wait for the next read.
                    None => break after.to_vec(),
                }
            }
        }
    };
    *carry = tail;
    text
}

async fn handle_sessions(ctx: &RuntimeContext, command: SessionsCommand) -> Result<()> {
    let mut store = ctx.open_store().await?;
    match command {
        SessionsCommand::List => {
            if store.is_empty() {
                println!("no sessions");
            }
            for session in store.get_all() {
                println!(
                    "{}  {:<20} {:>4} msgs  {}  {}",
                    session.id,
                    session.terminal_session_id,
                    session.messages.len(),
                    session.updated_at.format("%Y-%m-%d %H:%M:%S"),
                    session.name
                );
            }
            Ok(())
        }
        SessionsCommand::Show { id, json } => {
            let session = store
                .get(&id)
                .ok_or_else(|| anyhow!("session not found: {id}"))?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(session).context("serializing session")?
                );
            } else {
                println!("{} ({})", session.name, session.terminal_session_id);
                print_transcript(&session.messages);
            }
            Ok(())
        }
        SessionsCommand::Delete { id } => {
            if !store.delete(&id).await {
                return Err(anyhow!("session not found: {id}"));
            }
            println!("deleted {id}");
            Ok(())
        }
        SessionsCommand::Clear => {
            let count = store.len();
            store.clear_all().await;
            println!("deleted {count} sessions");
            Ok(())
        }
    }
}

fn handle_config(ctx: &RuntimeContext) -> Result<()> {
    print!("{}", ctx.config.to_toml()?);
    Ok(())
}

fn print_transcript(messages: &[Message]) {
    for message in messages {
        let marker = if message.is_complete { "" } else { " (streaming)" };
        println!("[{}]{}", message.role, marker);
        if !message.content.is_empty() {
            println!("{}", message.content);
        }
        for tool in &message.tools {
            match &tool.args {
                Some(args) => println!("  tool {} [{}] {}", tool.name, tool.status, args),
                None => println!("  tool {} [{}]", tool.name, tool.status),
            }
            if let Some(result) = &tool.result {
                println!("    -> {}", result);
            }
        }
        println!();
    }
}
