// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, anyhow};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, error, info, warn};
use std::io::Write;
use std::path::PathBuf;

use sublingo::app_config::{self, Config, TranslationEngine};
use sublingo::app_controller::{Controller, RunOptions, RunReport};

/// CLI Wrapper for TranslationEngine to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliTranslationEngine {
    Google,
    Gemini,
}

impl From<CliTranslationEngine> for TranslationEngine {
    fn from(cli_engine: CliTranslationEngine) -> Self {
        match cli_engine {
            CliTranslationEngine::Google => TranslationEngine::Google,
            CliTranslationEngine::Gemini => TranslationEngine::Gemini,
        }
    }
}

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

fn level_filter(level: &app_config::LogLevel) -> LevelFilter {
    match level {
        app_config::LogLevel::Error => LevelFilter::Error,
        app_config::LogLevel::Warn => LevelFilter::Warn,
        app_config::LogLevel::Info => LevelFilter::Info,
        app_config::LogLevel::Debug => LevelFilter::Debug,
        app_config::LogLevel::Trace => LevelFilter::Trace,
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Translate subtitle files
    Translate(TranslateArgs),

    /// Write a Markdown summary of subtitle files
    Summarize(SummarizeArgs),

    /// Export the plain text of subtitle files
    Text(TextArgs),

    /// Generate shell completions for sublingo
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Options shared by every command that reads the configuration
#[derive(Args, Debug, Clone)]
struct CommonArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "conf.json", global = true)]
    config_path: PathBuf,

    /// Set logging level
    #[arg(short, long, value_enum, global = true)]
    log_level: Option<CliLogLevel>,

    /// Gemini API key(s), comma or newline separated
    #[arg(long = "gemini-api-key", env = "GEMINI_API_KEY", hide_env_values = true, global = true)]
    gemini_api_keys: Vec<String>,
}

#[derive(Args, Debug)]
struct TranslateArgs {
    /// Input subtitle file or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: PathBuf,

    /// Output directory, or output file for a single input
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Force overwrite of existing output files
    #[arg(short, long)]
    force_overwrite: bool,

    /// Target language code (e.g., 'en', 'es', 'pt-BR')
    #[arg(short, long)]
    target_language: Option<String>,

    /// Translation engine to use
    #[arg(short, long, value_enum)]
    engine: Option<CliTranslationEngine>,

    /// Model name for the Gemini engine
    #[arg(short, long)]
    model: Option<String>,

    /// Also write a summary of every translated file
    #[arg(long)]
    summary: bool,
}

#[derive(Args, Debug)]
struct SummarizeArgs {
    /// Input subtitle file or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: PathBuf,

    /// Output directory, or output file for a single input
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Force overwrite of existing output files
    #[arg(short, long)]
    force_overwrite: bool,

    /// Summary language code; defaults to the subtitle language
    #[arg(short = 'L', long)]
    language: Option<String>,

    /// Model name for the Gemini engine
    #[arg(short, long)]
    model: Option<String>,
}

#[derive(Args, Debug)]
struct TextArgs {
    /// Input subtitle file or directory to process
    #[arg(value_name = "INPUT_PATH")]
    input_path: PathBuf,

    /// Output directory, or output file for a single input
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Force overwrite of existing output files
    #[arg(short, long)]
    force_overwrite: bool,
}

/// sublingo - subtitle translation and summaries through lossy providers
#[derive(Parser, Debug)]
#[command(name = "sublingo")]
#[command(version)]
#[command(about = "Subtitle translation and summaries through machine translation providers")]
#[command(long_about = "sublingo translates SRT subtitles with Google Translate or Gemini and writes long-form summaries with Gemini.

EXAMPLES:
    sublingo translate movie.srt -t es                 # Translate to Spanish with Google Translate
    sublingo translate movie_en.srt -t pt-BR -e gemini # Translate with Gemini
    sublingo translate /shows/ -t fr -o /out/ --summary
    sublingo summarize lecture_en.srt                  # Summary in the subtitle language
    sublingo text movie_es.srt                         # Plain-text export
    sublingo completions bash > sublingo.bash          # Generate bash completions

CONFIGURATION:
    Configuration is stored in conf.json by default. You can specify a different
    config file with --config-path. If the config file doesn't exist, a default one
    will be created automatically.

ENGINES:
    google - Google Translate, no key needed
    gemini - Gemini, needs GEMINI_API_KEY or --gemini-api-key (selected automatically when a key is set)")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    common: CommonArgs,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        // Filtering happens through set_max_level so the level can change after init
        let logger = Box::new(CustomLogger::new(LevelFilter::Trace));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: Emoji for log level
    fn get_emoji_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "❌ ",
            Level::Warn => "🚧 ",
            Level::Info => " ",
            Level::Debug => "🔍 ",
            Level::Trace => "📋 ",
        }
    }

    // @returns: ANSI color for log level
    fn get_color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "\x1B[1;31m",
            Level::Warn => "\x1B[1;33m",
            Level::Info => "\x1B[1;32m",
            Level::Debug => "\x1B[1;36m",
            Level::Trace => "\x1B[1;35m",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level && metadata.target().starts_with("sublingo")
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let level = record.level();
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "{}{} {} {}\x1B[0m",
                Self::get_color_for_level(level),
                now,
                Self::get_emoji_for_level(level),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize the logger once with info level by default
    // We'll update the level after loading the config if needed
    CustomLogger::init(LevelFilter::Info)?;

    let cli = CommandLineOptions::parse();

    match cli.command {
        Commands::Completions { shell } => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "sublingo", &mut std::io::stdout());
            Ok(())
        }
        Commands::Translate(args) => run_translate(cli.common, args).await,
        Commands::Summarize(args) => run_summarize(cli.common, args).await,
        Commands::Text(args) => run_text(cli.common, args),
    }
}

/// Load or create the configuration and apply the shared CLI overrides
fn load_config(common: &CommonArgs) -> Result<Config> {
    // If log level is set via command line, apply it immediately
    if let Some(level) = &common.log_level {
        log::set_max_level(level_filter(&level.clone().into()));
    }

    let (mut config, created) = Config::load_or_create(&common.config_path)?;
    if created {
        warn!("Config file not found at {:?}, created default config.", common.config_path);
    }

    if let Some(level) = &common.log_level {
        config.log_level = level.clone().into();
    } else {
        log::set_max_level(level_filter(&config.log_level));
    }

    config.add_api_keys(&common.gemini_api_keys);
    Ok(config)
}

/// Cancel every run on Ctrl-C
fn cancel_on_interrupt(controller: &Controller) {
    let token = controller.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling outstanding requests");
            token.cancel();
        }
    });
}

fn finish(report: RunReport) -> Result<()> {
    info!("Done: {} written, {} skipped, {} failed", report.processed, report.skipped, report.failed);
    if report.failed > 0 {
        return Err(anyhow!("{} file(s) failed", report.failed));
    }
    Ok(())
}

async fn run_translate(common: CommonArgs, args: TranslateArgs) -> Result<()> {
    let mut config = load_config(&common)?;

    if let Some(target_language) = args.target_language {
        config.target_language = target_language;
    }
    if let Some(engine) = args.engine {
        config.engine = Some(engine.into());
    }
    if let Some(model) = args.model {
        config.gemini.model = model;
    }

    // Validate the configuration after loading and overriding
    config.validate().context("Configuration validation failed")?;
    info!(
        "Translating to {} with {}",
        config.target_language,
        config.effective_engine().display_name()
    );

    let controller = Controller::with_config(config)?;
    cancel_on_interrupt(&controller);

    let options = RunOptions {
        output: args.output,
        force: args.force_overwrite,
        summary: args.summary,
    };
    match controller.translate(args.input_path, options).await {
        Ok(report) => finish(report),
        Err(e) => {
            error!("{}", e);
            Err(e.into())
        }
    }
}

async fn run_summarize(common: CommonArgs, args: SummarizeArgs) -> Result<()> {
    let mut config = load_config(&common)?;
    if let Some(model) = args.model {
        config.gemini.model = model;
    }
    config.validate().context("Configuration validation failed")?;
    config.validate_summary().context("Configuration validation failed")?;

    let controller = Controller::with_config(config)?;
    cancel_on_interrupt(&controller);

    match controller
        .summarize(args.input_path, args.output, args.force_overwrite, args.language)
        .await
    {
        Ok(report) => finish(report),
        Err(e) => {
            error!("{}", e);
            Err(e.into())
        }
    }
}

fn run_text(common: CommonArgs, args: TextArgs) -> Result<()> {
    let mut config = load_config(&common)?;
    // No provider is contacted for text export
    config.engine = Some(TranslationEngine::Google);
    let controller = Controller::with_config(config)?;
    let report = controller.export_text(&args.input_path, args.output.as_deref(), args.force_overwrite)?;
    finish(report)
}
