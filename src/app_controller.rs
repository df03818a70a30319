use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::app_config::{Config, TranslationEngine};
use crate::errors::{AppError, TranslationError};
use crate::file_utils::{FileManager, FileType};
use crate::providers::gemini::Gemini;
use crate::providers::google::GoogleTranslate;
use crate::subtitle_processor::SubtitleDocument;
use crate::summary::SummaryGenerator;
use crate::translation::{
    ApiKeyRing, BatchTranslator, BulkTranslator, JobGuard, JobSlot, ProgressUpdate,
};

// @module: Application controller for subtitle processing

/// Options for one translation run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Output directory, or output file when a single input is processed
    pub output: Option<PathBuf>,
    /// Overwrite existing outputs
    pub force: bool,
    /// Also write a summary of every translated file
    pub summary: bool,
}

/// Counts reported at the end of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunReport {
    fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Written(_) => self.processed += 1,
            FileOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// What happened to one input file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Written(PathBuf),
    Skipped,
}

/// Translator selected for a run
enum Engine {
    Bulk(BulkTranslator<GoogleTranslate>),
    Batch(BatchTranslator<Gemini, GoogleTranslate>),
}

impl Engine {
    async fn translate_document<F>(
        &self,
        document: &SubtitleDocument,
        cancel: &CancellationToken,
        on_progress: F,
    ) -> Result<SubtitleDocument, TranslationError>
    where
        F: FnMut(ProgressUpdate<'_>),
    {
        match self {
            Self::Bulk(translator) => translator.translate_document(document, cancel, on_progress).await,
            Self::Batch(translator) => translator.translate_document(document, cancel, on_progress).await,
        }
    }
}

/// Main application controller for subtitle translation
pub struct Controller {
    // @field: App configuration
    config: Config,
    // @field: At most one translation run at a time
    translation_slot: JobSlot,
    // @field: At most one summary run at a time
    summary_slot: JobSlot,
    // @field: Cancelled on shutdown; every run works on a child token
    shutdown: CancellationToken,
}

impl Controller {
    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            translation_slot: JobSlot::new("translation"),
            summary_slot: JobSlot::new("summary"),
            shutdown: CancellationToken::new(),
        })
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Token that cancels every run when triggered
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    fn acquire(slot: &JobSlot) -> Result<JobGuard, AppError> {
        slot.try_start().ok_or(AppError::Busy(slot.name()))
    }

    fn build_engine(&self) -> Result<Engine, AppError> {
        let bulk = BulkTranslator::new(
            GoogleTranslate::new(self.config.bulk_endpoint(), self.config.bulk.timeout_secs),
            self.config.bulk_options(),
        );

        match self.config.effective_engine() {
            TranslationEngine::Google => Ok(Engine::Bulk(bulk)),
            TranslationEngine::Gemini => {
                let keys = ApiKeyRing::new(self.config.api_keys())?;
                info!("Using {} with {} API key(s)", TranslationEngine::Gemini.display_name(), keys.len());
                let gemini = Gemini::new(
                    self.config.gemini.endpoint.clone(),
                    self.config.gemini.model.clone(),
                    self.config.gemini.timeout_secs,
                );
                Ok(Engine::Batch(BatchTranslator::new(gemini, keys, bulk, self.config.batch_options())))
            }
        }
    }

    fn build_summarizer(&self, language: Option<&str>) -> Result<SummaryGenerator<Gemini>, AppError> {
        self.config.validate_summary().map_err(|e| AppError::Config(e.to_string()))?;
        let keys = ApiKeyRing::new(self.config.api_keys())?;
        let gemini = Gemini::new(
            self.config.gemini.endpoint.clone(),
            self.config.gemini.model.clone(),
            self.config.gemini.timeout_secs,
        );
        Ok(SummaryGenerator::new(gemini, keys, self.config.summary_options(language)))
    }

    /// Resolve the input into subtitle files and the root their relative
    /// output paths are computed from
    pub fn collect_inputs(&self, input: &Path, skip_language: Option<&str>) -> Result<(Vec<PathBuf>, Option<PathBuf>), AppError> {
        match FileManager::detect_file_type(input)? {
            FileType::Directory => {
                let files = FileManager::find_subtitle_files(input, skip_language)?;
                if files.is_empty() {
                    return Err(AppError::File(format!("No subtitle files found in directory: {:?}", input)));
                }
                Ok((files, Some(input.to_path_buf())))
            }
            FileType::Subtitle => Ok((vec![input.to_path_buf()], None)),
            FileType::Unknown => Err(AppError::File(format!("Not a subtitle file: {:?}", input))),
        }
    }

    /// Output path for one file; `output` names a file only for single inputs
    fn output_for(
        file: &Path,
        root: Option<&Path>,
        output: Option<&Path>,
        extension: &str,
        default_path: impl FnOnce(Option<&Path>) -> PathBuf,
    ) -> PathBuf {
        match output {
            Some(path) if Self::names_file(path, extension) => path.to_path_buf(),
            _ => {
                debug!("Deriving output path for {:?} (input root {:?})", file, root);
                default_path(output)
            }
        }
    }

    fn names_file(path: &Path, extension: &str) -> bool {
        path.extension().is_some_and(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
    }

    fn check_single_output(files: &[PathBuf], output: Option<&Path>, extension: &str) -> Result<(), AppError> {
        match output {
            Some(path) if files.len() > 1 && Self::names_file(path, extension) => Err(AppError::Config(format!(
                "Output {:?} is a file but {} inputs were found; pass a directory",
                path,
                files.len()
            ))),
            _ => Ok(()),
        }
    }

    /// Translate a subtitle file or every subtitle file under a directory
    pub async fn translate(&self, input: PathBuf, options: RunOptions) -> Result<RunReport, AppError> {
        let _translation = Self::acquire(&self.translation_slot)?;
        let _summary = if options.summary { Some(Self::acquire(&self.summary_slot)?) } else { None };

        let start_time = Instant::now();
        let target = self.config.target_language.clone();
        let (files, root) = self.collect_inputs(&input, Some(&target))?;
        Self::check_single_output(&files, options.output.as_deref(), "srt")?;

        let engine = self.build_engine()?;
        let summarizer = if options.summary { Some(self.build_summarizer(Some(&target))?) } else { None };
        let cancel = self.shutdown.child_token();

        let multi_progress = MultiProgress::new();
        let files_pb = (files.len() > 1).then(|| {
            let pb = multi_progress.add(ProgressBar::new(files.len() as u64));
            pb.set_style(Self::bar_style("files"));
            pb
        });

        let mut report = RunReport::default();
        for file in &files {
            if let Some(pb) = &files_pb {
                pb.set_message(Self::display_name(file));
            }

            let outcome = self
                .translate_file(&engine, summarizer.as_ref(), file, root.as_deref(), &options, &multi_progress, &cancel)
                .await;

            match outcome {
                Ok(outcome) => report.record(outcome),
                Err(AppError::Translation(e)) if e.is_aborted() => {
                    warn!("Translation cancelled");
                    return Err(AppError::Translation(TranslationError::Aborted));
                }
                Err(e) => {
                    error!("Failed to translate {:?}: {}", file, e);
                    report.failed += 1;
                }
            }

            if let Some(pb) = &files_pb {
                pb.inc(1);
            }
        }

        if let Some(pb) = files_pb {
            pb.finish_and_clear();
        }

        info!(
            "Translated {} file(s), skipped {}, failed {} in {}",
            report.processed,
            report.skipped,
            report.failed,
            Self::format_duration(start_time.elapsed())
        );
        Ok(report)
    }

    #[allow(clippy::too_many_arguments)]
    async fn translate_file(
        &self,
        engine: &Engine,
        summarizer: Option<&SummaryGenerator<Gemini>>,
        file: &Path,
        root: Option<&Path>,
        options: &RunOptions,
        multi_progress: &MultiProgress,
        cancel: &CancellationToken,
    ) -> Result<FileOutcome, AppError> {
        let target = &self.config.target_language;

        if let Some(source) = FileManager::language_from_name(file) {
            if FileManager::same_suffix(target, &source) {
                info!("Translation is unnecessary for {:?}: already in {}", file, target);
                return Ok(FileOutcome::Skipped);
            }
        }

        let output_path = Self::output_for(file, root, options.output.as_deref(), "srt", |dir| {
            FileManager::translated_path(file, root, dir, target)
        });
        let translation_needed = options.force || !FileManager::file_is_valid(&output_path);
        if !translation_needed {
            warn!("Skipping {:?}, translation already exists (use -f to force overwrite)", output_path);
        }

        // A single-file output puts the summary beside it
        let summary_dir = match options.output.as_deref() {
            Some(path) if Self::names_file(path, "srt") => path.parent(),
            other => other,
        };
        let summary_path = summarizer.map(|_| FileManager::summary_path(file, root, summary_dir, target));

        if !translation_needed && summary_path.as_ref().is_none_or(|p| !options.force && FileManager::file_is_valid(p)) {
            return Ok(FileOutcome::Skipped);
        }

        let document = SubtitleDocument::from_file(file)?;
        info!("Translating {:?} ({} entries) to {}", file, document.len(), target);

        let translate = async {
            if !translation_needed {
                return Ok::<_, AppError>(None);
            }
            let pb = multi_progress.add(ProgressBar::new(0));
            pb.set_style(Self::bar_style("chunks"));
            pb.set_message(Self::display_name(file));

            let start_time = Instant::now();
            let translated = engine
                .translate_document(&document, cancel, |update| {
                    pb.set_length(update.total as u64);
                    pb.set_position(update.completed as u64);
                })
                .await;
            pb.finish_and_clear();

            let translated = translated?;
            FileManager::write_to_file(&output_path, &translated.to_srt())?;
            info!("Success: {} ({})", output_path.display(), Self::format_duration(start_time.elapsed()));
            Ok::<_, AppError>(Some(output_path.clone()))
        };

        let summarize = async {
            match (summarizer, &summary_path) {
                (Some(generator), Some(path)) if options.force || !FileManager::file_is_valid(path) => {
                    self.write_summary(generator, &document, path, cancel).await.map(Some)
                }
                (Some(_), Some(path)) => {
                    warn!("Existing summary {:?}. Skipping.", path);
                    Ok(None)
                }
                _ => Ok(None),
            }
        };

        let (translated, summarized) = tokio::join!(translate, summarize);
        if let Err(e) = &summarized {
            if !matches!(e, AppError::Translation(t) if t.is_aborted()) {
                error!("Summary failed for {:?}: {}", file, e);
            }
        }

        match (translated?, summarized) {
            (Some(path), _) => Ok(FileOutcome::Written(path)),
            (None, Ok(Some(path))) => Ok(FileOutcome::Written(path)),
            (None, Ok(None)) => Ok(FileOutcome::Skipped),
            (None, Err(e)) => Err(e),
        }
    }

    async fn write_summary(
        &self,
        generator: &SummaryGenerator<Gemini>,
        document: &SubtitleDocument,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, AppError> {
        let start_time = Instant::now();
        let summary = generator
            .generate(document, cancel, |round, text| {
                debug!("Summary round {} produced {} characters", round, text.chars().count());
            })
            .await?;
        FileManager::write_to_file(path, &format!("{}\n", summary))?;
        info!("Summary written: {} ({})", path.display(), Self::format_duration(start_time.elapsed()));
        Ok(path.to_path_buf())
    }

    /// Summarize a subtitle file or every subtitle file under a directory
    pub async fn summarize(
        &self,
        input: PathBuf,
        output: Option<PathBuf>,
        force: bool,
        language: Option<String>,
    ) -> Result<RunReport, AppError> {
        let _summary = Self::acquire(&self.summary_slot)?;
        let (files, root) = self.collect_inputs(&input, None)?;
        Self::check_single_output(&files, output.as_deref(), "md")?;

        let language = language.filter(|l| !l.is_empty()).or_else(|| {
            (!self.config.summary.language.is_empty()).then(|| self.config.summary.language.clone())
        });
        let cancel = self.shutdown.child_token();

        let mut report = RunReport::default();
        for file in &files {
            let file_language = language.clone().or_else(|| FileManager::language_from_name(file));
            let generator = self.build_summarizer(file_language.as_deref())?;
            let path = Self::output_for(file, root.as_deref(), output.as_deref(), "md", |dir| {
                FileManager::summary_path(file, root.as_deref(), dir, file_language.as_deref().unwrap_or("auto"))
            });

            if !force && FileManager::file_is_valid(&path) {
                warn!("Existing summary {:?}. Skipping.", path);
                report.skipped += 1;
                continue;
            }

            let result = match SubtitleDocument::from_file(file) {
                Ok(document) => self.write_summary(&generator, &document, &path, &cancel).await,
                Err(e) => Err(e.into()),
            };
            match result {
                Ok(_) => report.processed += 1,
                Err(AppError::Translation(e)) if e.is_aborted() => {
                    warn!("Summary cancelled");
                    return Err(AppError::Translation(TranslationError::Aborted));
                }
                Err(e) => {
                    error!("Failed to summarize {:?}: {}", file, e);
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Write the plain text of every subtitle file next to it or under `output`
    pub fn export_text(&self, input: &Path, output: Option<&Path>, force: bool) -> Result<RunReport, AppError> {
        let (files, root) = self.collect_inputs(input, None)?;
        Self::check_single_output(&files, output, "txt")?;

        let mut report = RunReport::default();
        for file in &files {
            let path = Self::output_for(file, root.as_deref(), output, "txt", |dir| match dir {
                Some(dir) => {
                    let relative = root
                        .as_deref()
                        .and_then(|r| file.strip_prefix(r).ok())
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| PathBuf::from(file.file_name().unwrap_or_default()));
                    FileManager::text_path(dir.join(relative))
                }
                None => FileManager::text_path(file),
            });

            if !force && FileManager::file_is_valid(&path) {
                report.skipped += 1;
                continue;
            }

            let document = SubtitleDocument::from_file(file)?;
            FileManager::write_to_file(&path, &document.plain_text())?;
            info!("Text written: {}", path.display());
            report.processed += 1;
        }

        Ok(report)
    }

    fn bar_style(unit: &str) -> ProgressStyle {
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} ({{percent}}%) {{msg}} {{eta}}",
                unit
            ))
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░")
    }

    fn display_name(file: &Path) -> String {
        file.file_name()
            .map(|f| f.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string())
    }

    // Format duration in a human-readable format
    fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
