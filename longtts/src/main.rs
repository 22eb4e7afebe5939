// longtts - Convert long text files to a single audio file using parallel text-to-speech

mod backends;
mod config;
mod progress;

use anyhow::{Context, Result, bail};
use backends::BackendKind;
use chunked_tts::{
    ByteConcat, DispatchSettings, FfmpegConcat, Job, JobReport, MergeTool, PipelineError,
    PipelineOptions, SegmentMode, segment,
};
use clap::{Parser, Subcommand};
use config::{LongttsConfig, MergeToolKind};
use progress::BarReporter;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "longtts")]
#[command(about = "Convert long text files to a single audio file using parallel text-to-speech", long_about = None)]
#[command(version)]
struct Args {
    /// Text file to read ("-" for stdin)
    input: Option<PathBuf>,

    /// Output file path (default: <input-name>.<output_format>)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Voice to use
    #[arg(short, long)]
    voice: Option<String>,

    /// TTS backend to use (macos-say, openai)
    #[arg(short, long)]
    backend: Option<BackendKind>,

    /// Segmentation mode (fixed, smart, punctuation, sentence, paragraph)
    #[arg(short, long)]
    mode: Option<SegmentMode>,

    /// Target characters per chunk
    #[arg(long)]
    max_chars: Option<usize>,

    /// Workers sharing each credential
    #[arg(short, long)]
    workers: Option<usize>,

    /// Directory for chunk files (default: <output-name>.chunks next to the output)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Keep chunk files after a successful merge
    #[arg(long, default_value_t = false)]
    keep_chunks: bool,

    /// Enable debug output
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show how a file would be split, without synthesizing
    Split {
        /// Text file to read ("-" for stdin)
        input: PathBuf,

        /// Segmentation mode
        #[arg(short, long)]
        mode: Option<SegmentMode>,

        /// Target characters per chunk
        #[arg(long)]
        max_chars: Option<usize>,
    },
    /// List voices offered by a backend
    Voices {
        /// Backend to query (default: configured backend)
        #[arg(short, long)]
        backend: Option<BackendKind>,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Key, e.g. mode, max_chars, retry.max_attempts, merge.tool
        key: String,
        /// New value ("none" clears optional values)
        value: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    match &args.command {
        Some(Commands::Config { action }) => return handle_config_command(action),
        Some(Commands::Split {
            input,
            mode,
            max_chars,
        }) => return split(input, *mode, *max_chars),
        Some(Commands::Voices { backend }) => return voices(*backend),
        None => {}
    }

    let config = LongttsConfig::load().context("Failed to load configuration")?;
    run(args, config).await
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        return Ok(text);
    }

    if !path.exists() {
        bail!("Input file not found: {}", path.display());
    }
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn default_output(input: &Path, format: &str) -> PathBuf {
    if input == Path::new("-") {
        return PathBuf::from(format!("longtts-output.{}", format));
    }
    input.with_extension(format)
}

fn default_work_dir(output: &Path) -> PathBuf {
    let stem = output.file_stem().unwrap_or_default().to_string_lossy();
    output.with_file_name(format!("{}.chunks", stem))
}

async fn run(args: Args, mut config: LongttsConfig) -> Result<()> {
    let input = args
        .input
        .ok_or_else(|| anyhow::anyhow!("Input file path is required (use - for stdin)"))?;

    // Command-line flags override the config file for this run
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(max_chars) = args.max_chars {
        config.max_chars = max_chars;
    }
    if args.workers.is_some() {
        config.workers_per_credential = args.workers;
    }
    if args.voice.is_some() {
        config.voice = args.voice;
    }
    config.validate()?;

    let text = read_input(&input)?;
    let output = args
        .output
        .unwrap_or_else(|| default_output(&input, &config.output_format));
    let work_dir = args.work_dir.unwrap_or_else(|| default_work_dir(&output));

    let factory = backends::create_factory(config.backend, &config)?;
    let credentials = backends::credentials_for(config.backend, &config)?;
    let merge_tool: Arc<dyn MergeTool> = match config.merge.tool {
        MergeToolKind::Ffmpeg => Arc::new(FfmpegConcat::new(&config.merge.ffmpeg_path)),
        MergeToolKind::Concat => Arc::new(ByteConcat),
    };

    log::debug!("Input: {}", input.display());
    log::debug!("Output: {}", output.display());
    log::debug!("Work dir: {}", work_dir.display());
    log::debug!("Backend: {}", config.backend);
    log::debug!("Credentials: {:?}", credentials);

    let options = PipelineOptions {
        segment: config.segment_options(),
        dispatch: DispatchSettings {
            voice: config.voice.clone().unwrap_or_default(),
            retry: config.retry_policy(),
            breaker: config.breaker_settings(),
            strip_trailing_punctuation: config.strip_trailing_punctuation,
            ..DispatchSettings::default()
        },
        workers_per_credential: config.workers_per_credential,
        keep_intermediates: args.keep_chunks,
    };

    let reporter = Arc::new(BarReporter::new());
    let cancel = CancellationToken::new();
    let job = Job::new(
        factory,
        merge_tool,
        reporter.clone(),
        credentials,
        options,
    )
    .with_cancel_token(cancel.clone());

    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, letting in-flight chunks finish...");
            signal_token.cancel();
        }
    });

    match job.run(&text, &work_dir, &output).await {
        Ok(report) => {
            reporter.finish("Done!");
            print_summary(&report).await;
            Ok(())
        }
        Err(e) => {
            reporter.abandon("Failed");
            if let PipelineError::Cancelled { .. } | PipelineError::IncompleteJob { .. } = e {
                eprintln!("Run the same command again to resume.");
            }
            Err(e).context("Failed to synthesize audio")
        }
    }
}

async fn print_summary(report: &JobReport) {
    eprintln!("Chunks: {}", report.total_chunks);
    if report.resumed > 0 {
        eprintln!("Resumed: {} chunk(s) from an earlier run", report.resumed);
    }
    if let Some(recovery) = &report.recovery {
        eprintln!(
            "Recovered: {} of {} chunk(s) with {} worker(s)",
            recovery.recovered.len(),
            recovery.targeted.len(),
            recovery.workers
        );
    }

    match tokio::fs::metadata(&report.output).await {
        Ok(metadata) => {
            let size_mb = metadata.len() as f64 / (1024.0 * 1024.0);
            eprintln!("Output: {} ({:.1} MB)", report.output.display(), size_mb);
        }
        Err(_) => eprintln!("Output: {}", report.output.display()),
    }
}

fn split(input: &Path, mode: Option<SegmentMode>, max_chars: Option<usize>) -> Result<()> {
    let config = LongttsConfig::load().context("Failed to load configuration")?;
    let mut options = config.segment_options();
    if let Some(mode) = mode {
        options.mode = mode;
    }
    if let Some(max_chars) = max_chars {
        options.max_chars = max_chars;
    }

    let text = read_input(input)?;
    let chunks = segment(&text, &options);

    for chunk in &chunks {
        println!("[{}] ({} chars) {}", chunk.index, chunk.original_length, chunk.text);
    }
    eprintln!(
        "{} chunk(s) in {} mode, max {} chars",
        chunks.len(),
        options.mode,
        options.max_chars
    );
    Ok(())
}

fn voices(backend: Option<BackendKind>) -> Result<()> {
    let kind = match backend {
        Some(kind) => kind,
        None => LongttsConfig::load()?.backend,
    };

    println!("Available voices for {} backend:", kind);
    println!();
    for voice in backends::list_voices(kind)? {
        println!("  {}", voice);
    }
    Ok(())
}

fn handle_config_command(action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = LongttsConfig::load()?;
            println!("Configuration file: {:?}", LongttsConfig::config_path()?);
            println!();
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Set { key, value } => {
            let mut config = LongttsConfig::load()?;
            config.set(key, value)?;
            config.save()?;
            println!("{} set to: {}", key, value);
        }
    }
    Ok(())
}
