//! C8 — file facade (spec §4.8): orchestrates `inspect`/`analyse`/`transform`
//! over a file path, classifies printability, and materialises the
//! finalisation retro-patches.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::Path;

use crate::actions::{self, mark_removed};
use crate::analysis::{AnalysisResult, FullFields, QuickFields};
use crate::bookmark::{BookmarkKey, BookmarkRegistry, BookmarkingEncoder, EncoderItem};
use crate::cancel::CancellationToken;
use crate::error::{PostProcessError, Result};
use crate::identification::{Flavour, GeneratorIdentification};
use crate::metadata;
use crate::state::{BookmarkedLine, ProcessingConfig, ProcessingState};
use crate::warning::WarningSink;
use crate::window::{LineSink, Window};

/// A classification of whether a file can be printed as-is or must be
/// (re)processed (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Printability {
    Ready,
    MustProcess,
    MustReprocess,
    CouldReprocess,
    NotSupported,
    Unknown,
}

/// The result of an [`PostProcessor::inspect`] call.
#[derive(Debug, Clone)]
pub struct InspectResult {
    pub identification: Option<GeneratorIdentification>,
    pub printability: Printability,
    pub reasons: Vec<String>,
    pub can_deprocess: bool,
}

/// Options threaded through every facade entry point. Constructed by the CLI
/// (or an embedding caller) from explicit flags — no implicit global
/// configuration (spec §9 "Configuration").
#[derive(Debug, Clone)]
pub struct FacadeOpts {
    pub config: ProcessingConfig,
    pub current_post_processor_version: semver::Version,
    pub current_file_format_version: u32,
    pub overwrite: bool,
    pub cancellation: CancellationToken,
}

/// Orchestrates the streaming pipeline over a single file path. Carries no
/// state of its own between calls.
#[derive(Debug, Default)]
pub struct PostProcessor;

impl PostProcessor {
    pub fn new() -> Self {
        Self
    }

    /// Reads the header (first 4 lines) and classifies printability without
    /// running the full pipeline (spec §4.8).
    #[tracing::instrument(skip(self, opts))]
    pub fn inspect(&self, path: &Path, opts: &FacadeOpts) -> Result<InspectResult> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut blob = String::new();
        for line in reader.lines().take(4) {
            blob.push_str(&line?);
            blob.push('\n');
        }

        let ident = metadata::parse_header(&blob)?;

        if !ident.is_processed() && ident.generator_name.is_empty() {
            if opts.config.allow_unknown_generator {
                tracing::warn!("no generator identification found; treating as unknown");
                return Ok(InspectResult {
                    identification: None,
                    printability: Printability::Unknown,
                    reasons: vec!["no identification".to_string()],
                    can_deprocess: false,
                });
            }
            return Err(PostProcessError::SlicerIdentificationNotFound);
        }

        // A file that was already processed doesn't need its original
        // generator's version re-validated here; `classify_printability`
        // handles re-processing entirely from the "processed by" fields.
        let version_supported = ident.is_processed() || version_supported(&ident, opts);
        let (printability, reasons) = classify_printability(&ident, opts, version_supported);
        let can_deprocess = ident.is_processed();

        tracing::debug!(?printability, "inspected file");

        Ok(InspectResult {
            identification: Some(ident),
            printability,
            reasons,
            can_deprocess,
        })
    }

    /// Runs the full stream pass into a discarding sink and returns the
    /// resulting analysis result (spec §4.8).
    #[tracing::instrument(skip(self, opts, warnings))]
    pub fn analyse(
        &self,
        input: &Path,
        opts: &FacadeOpts,
        warnings: &mut dyn WarningSink,
    ) -> Result<AnalysisResult> {
        let (state, _) = self.run_pipeline(input, DiscardSink::default(), opts)?;
        drain_warnings(&state, warnings);
        Ok(build_analysis_result(&state))
    }

    /// Runs the full stream pass into `output` via the bookmarking encoder,
    /// then applies the finalisation retro-patches and appends the analysis
    /// trailer (spec §4.8).
    #[tracing::instrument(skip(self, opts, warnings))]
    pub fn transform(
        &self,
        input: &Path,
        output: &Path,
        opts: &FacadeOpts,
        warnings: &mut dyn WarningSink,
    ) -> Result<AnalysisResult> {
        opts.cancellation.check()?;

        if output.exists() && !opts.overwrite {
            return Err(PostProcessError::AlreadyExists(
                output.display().to_string(),
            ));
        }

        let out_file = File::create(output)?;
        let encoder = BookmarkingEncoder::new(out_file);

        let (state, encoder) = self.run_pipeline(input, encoder, opts)?;
        opts.cancellation.check()?;

        let (mut out_file, registry) = encoder.finish()?;
        let trailer_offset = out_file.seek(SeekFrom::End(0))?;

        self.apply_retro_patches(&mut out_file, &registry, &state, opts, trailer_offset)?;

        let result = build_analysis_result(&state);
        let trailer = metadata::render_trailer(&result)?;
        out_file.seek(SeekFrom::Start(trailer_offset))?;
        out_file.write_all(trailer.as_bytes())?;
        out_file.flush()?;

        drain_warnings(&state, warnings);
        Ok(result)
    }

    /// Feeds every line of `input` through the window/dispatcher pipeline.
    /// Stops early (without error) if a quick-inspection-only run throws the
    /// `InspectionComplete` control signal once its minimal fields are known.
    fn run_pipeline<S: LineSink>(
        &self,
        input: &Path,
        sink: S,
        opts: &FacadeOpts,
    ) -> Result<(ProcessingState, S)> {
        let file = File::open(input)?;
        let reader = BufReader::new(file);

        let mut window = Window::new(sink, opts.config.lines_behind, opts.config.lines_ahead);
        let mut state = ProcessingState::new(opts.config.clone());
        let mut sequence = actions::build_default_sequence();

        let mut inspection_complete = false;

        for line in reader.lines() {
            let line = line?;
            opts.cancellation.check()?;

            match window.feed_line(line, |win, h| sequence.dispatch(win, h, &mut state)) {
                Ok(()) => {}
                Err(PostProcessError::InspectionComplete) => {
                    inspection_complete = true;
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        if !inspection_complete {
            match window.flush(|win, h| sequence.dispatch(win, h, &mut state)) {
                Ok(()) => {}
                Err(PostProcessError::InspectionComplete) => {}
                Err(e) => return Err(e),
            }
        }

        Ok((state, window.into_sink()))
    }

    /// Applies the four finalisation retro-patches in order (spec §4.8).
    fn apply_retro_patches(
        &self,
        out_file: &mut File,
        registry: &BookmarkRegistry,
        state: &ProcessingState,
        opts: &FacadeOpts,
        trailer_offset: u64,
    ) -> Result<()> {
        if let Some(BookmarkedLine { key, .. }) = state.first_line {
            let original = registry.get(key)?.original_text.trim_end().to_string();
            let processed_by = metadata::render_processed_by_line(
                &opts.current_post_processor_version,
                chrono::Utc::now(),
                opts.current_file_format_version,
                trailer_offset,
                opts.config.printer_has_idex,
            );
            let replacement = format!("{processed_by}\n{original}");
            write_bookmark_replacement(out_file, registry, key, &replacement)?;
        }

        if let Some(BookmarkedLine { key, .. }) = state.start_print_line {
            let original = registry.get(key)?.original_text.trim_end().to_string();
            let mut flags = Vec::new();
            flags.push(format!(
                "TOTAL_TOOLSHIFTS={}",
                state.tool_change_count.saturating_sub(1)
            ));
            if let Some(x) = state.first_move_x {
                flags.push(format!("FIRST_X={x}"));
            }
            if let Some(y) = state.first_move_y {
                flags.push(format!("FIRST_Y={y}"));
            }
            if state.min_x.is_finite() {
                flags.push(format!("MIN_X={}", state.min_x));
            }
            if state.max_x.is_finite() {
                flags.push(format!("MAX_X={}", state.max_x));
            }
            if !state.used_tools.is_empty() {
                let csv = state
                    .used_tools
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(",");
                flags.push(format!("USED_TOOLS={csv}"));
            }
            let replacement = format!("{original} {}", flags.join(" "));
            write_bookmark_replacement(out_file, registry, key, &replacement)?;
        }

        if let Some(BookmarkedLine { key, .. }) = state.layer2_line {
            if !state.extruder_temps.is_empty() {
                let original = registry.get(key)?.original_text.trim_end().to_string();
                let mut lines = vec![original];
                for temp in &state.extruder_temps {
                    lines.push(format!("M104 S{} T{}", temp.temp, temp.tool));
                }
                let replacement = lines.join("\n");
                write_bookmark_replacement(out_file, registry, key, &replacement)?;
            }
        }

        for BookmarkedLine { key, .. } in &state.extruder_temp_lines {
            let original = registry.get(*key)?.original_text.trim_end().to_string();
            write_bookmark_replacement(out_file, registry, *key, &mark_removed(&original))?;
        }

        Ok(())
    }
}

fn version_supported(ident: &GeneratorIdentification, opts: &FacadeOpts) -> bool {
    let on_allow_list = match ident.flavour {
        Some(Flavour::Unknown) | None => opts.config.allow_unknown_generator,
        Some(_) => crate::actions::identify_generator::version_allowed(ident),
    };
    on_allow_list || opts.config.allow_unsupported_slicers
}

/// Implements the printability decision table of spec §4.8, evaluated top to
/// bottom; the first match wins.
fn classify_printability(
    ident: &GeneratorIdentification,
    opts: &FacadeOpts,
    version_supported: bool,
) -> (Printability, Vec<String>) {
    if !version_supported {
        return (Printability::NotSupported, vec!["version rejected".to_string()]);
    }

    if ident.is_processed() {
        if let Some(file_format_version) = ident.file_format_version {
            if file_format_version < opts.current_file_format_version {
                return (
                    Printability::NotSupported,
                    vec!["re-upload required".to_string()],
                );
            }
            if file_format_version > opts.current_file_format_version {
                return (Printability::NotSupported, vec!["update host".to_string()]);
            }
        }

        if ident.processed_for_idex != Some(opts.config.printer_has_idex) {
            return (Printability::MustReprocess, vec!["IDEX axis".to_string()]);
        }

        if let Some(processed_version) = &ident.post_processor_version {
            if *processed_version == opts.current_post_processor_version {
                return (Printability::Ready, Vec::new());
            }
            if *processed_version > opts.current_post_processor_version {
                return (Printability::MustReprocess, Vec::new());
            }
            if processed_version.major < opts.current_post_processor_version.major {
                return (
                    Printability::MustReprocess,
                    vec!["incompatible change".to_string()],
                );
            }
            return (
                Printability::CouldReprocess,
                vec!["enhancements/fixes available".to_string()],
            );
        }

        return (Printability::Ready, Vec::new());
    }

    if opts.config.printer_has_idex {
        (Printability::MustProcess, vec!["transform needed".to_string()])
    } else {
        (Printability::Ready, vec!["no transform needed".to_string()])
    }
}

fn drain_warnings(state: &ProcessingState, warnings: &mut dyn WarningSink) {
    for warning in state.warnings.iter().cloned() {
        warnings.warn(warning);
    }
}

fn build_analysis_result(state: &ProcessingState) -> AnalysisResult {
    let quick_fields = QuickFields {
        extruder_temps: (!state.extruder_temps.is_empty())
            .then(|| state.extruder_temps.iter().map(|t| t.temp).collect()),
        first_move_x: state.first_move_x,
        first_move_y: state.first_move_y,
        has_purge_tower: state.has_purge_tower,
        slicer_config: (!state.slicer_config.is_empty()).then(|| state.slicer_config.clone()),
    };

    if state.config.quick_inspection_only {
        return AnalysisResult::quick(quick_fields);
    }

    let full_fields = FullFields {
        tool_change_count: state.tool_change_count,
        min_x: state.min_x,
        max_x: state.max_x,
        used_tools: state.used_tools.clone(),
    };
    AnalysisResult::full(quick_fields, full_fields)
}

/// Writes `text` into the byte range reserved by `key`, right-padded with
/// spaces to fill the reserved extent exactly (spec §4.3, §4.8: "must fit in
/// the reserved padding; otherwise raise a cannot-replace-in-place error").
fn write_bookmark_replacement(
    file: &mut File,
    registry: &BookmarkRegistry,
    key: BookmarkKey,
    text: &str,
) -> Result<()> {
    let bookmark = registry.get(key)?;
    let available = bookmark.length.saturating_sub(1) as usize;
    if text.len() > available {
        return Err(PostProcessError::ReplacementTooLarge {
            key,
            needed: text.len(),
            available,
        });
    }

    let mut line = String::with_capacity(available + 1);
    line.push_str(text);
    for _ in 0..(available - text.len()) {
        line.push(' ');
    }
    line.push('\n');

    file.seek(SeekFrom::Start(bookmark.offset))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Discards every line pushed to it; used by [`PostProcessor::analyse`],
/// which only needs the final [`ProcessingState`], not the rewritten bytes.
#[derive(Debug, Default)]
struct DiscardSink {
    next_key: BookmarkKey,
}

impl LineSink for DiscardSink {
    fn push(&mut self, _item: EncoderItem) -> Result<()> {
        Ok(())
    }

    fn allocate_key(&mut self) -> BookmarkKey {
        let key = self.next_key;
        self.next_key += 1;
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(config: ProcessingConfig) -> FacadeOpts {
        FacadeOpts {
            config,
            current_post_processor_version: semver::Version::new(0, 2, 0),
            current_file_format_version: 3,
            overwrite: false,
            cancellation: CancellationToken::new(),
        }
    }

    fn ident(flavour: Flavour, version: &str) -> GeneratorIdentification {
        GeneratorIdentification {
            generator_name: "PrusaSlicer".to_string(),
            generator_version: Some(semver::Version::parse(version).unwrap()),
            flavour: Some(flavour),
            ..Default::default()
        }
    }

    #[test]
    fn unprocessed_idex_target_must_process() {
        let o = opts(ProcessingConfig {
            printer_has_idex: true,
            ..ProcessingConfig::default()
        });
        let (p, _) = classify_printability(&ident(Flavour::PrusaSlicer, "2.8.1"), &o, true);
        assert_eq!(p, Printability::MustProcess);
    }

    #[test]
    fn unprocessed_non_idex_target_ready() {
        let o = opts(ProcessingConfig::default());
        let (p, _) = classify_printability(&ident(Flavour::PrusaSlicer, "2.8.1"), &o, true);
        assert_eq!(p, Printability::Ready);
    }

    #[test]
    fn unsupported_version_and_strict_is_not_supported() {
        let o = opts(ProcessingConfig::default());
        let (p, _) = classify_printability(&ident(Flavour::PrusaSlicer, "1.0.0"), &o, false);
        assert_eq!(p, Printability::NotSupported);
    }

    #[test]
    fn processed_idex_mismatch_must_reprocess() {
        let o = opts(ProcessingConfig {
            printer_has_idex: true,
            ..ProcessingConfig::default()
        });
        let mut i = ident(Flavour::PrusaSlicer, "2.8.1");
        i.post_processor_version = Some(semver::Version::new(0, 2, 0));
        i.processed_for_idex = Some(false);
        i.file_format_version = Some(3);
        let (p, reasons) = classify_printability(&i, &o, true);
        assert_eq!(p, Printability::MustReprocess);
        assert!(reasons.iter().any(|r| r.contains("IDEX")));
    }

    #[test]
    fn processed_same_version_is_ready() {
        let o = opts(ProcessingConfig::default());
        let mut i = ident(Flavour::PrusaSlicer, "2.8.1");
        i.post_processor_version = Some(semver::Version::new(0, 2, 0));
        i.processed_for_idex = Some(false);
        i.file_format_version = Some(3);
        let (p, _) = classify_printability(&i, &o, true);
        assert_eq!(p, Printability::Ready);
    }

    #[test]
    fn processed_older_major_must_reprocess() {
        let o = opts(ProcessingConfig::default());
        let mut i = ident(Flavour::PrusaSlicer, "2.8.1");
        i.post_processor_version = Some(semver::Version::new(0, 1, 0));
        i.processed_for_idex = Some(false);
        i.file_format_version = Some(3);
        let o_newer = FacadeOpts {
            current_post_processor_version: semver::Version::new(1, 0, 0),
            ..o
        };
        let (p, reasons) = classify_printability(&i, &o_newer, true);
        assert_eq!(p, Printability::MustReprocess);
        assert!(reasons.iter().any(|r| r.contains("incompatible")));
    }

    #[test]
    fn processed_older_minor_could_reprocess() {
        let o = opts(ProcessingConfig::default());
        let mut i = ident(Flavour::PrusaSlicer, "2.8.1");
        i.post_processor_version = Some(semver::Version::new(0, 1, 0));
        i.processed_for_idex = Some(false);
        i.file_format_version = Some(3);
        let (p, _) = classify_printability(&i, &o, true);
        assert_eq!(p, Printability::CouldReprocess);
    }

    #[test]
    fn file_format_older_than_current_not_supported() {
        let o = opts(ProcessingConfig::default());
        let mut i = ident(Flavour::PrusaSlicer, "2.8.1");
        i.post_processor_version = Some(semver::Version::new(0, 2, 0));
        i.processed_for_idex = Some(false);
        i.file_format_version = Some(1);
        let (p, _) = classify_printability(&i, &o, true);
        assert_eq!(p, Printability::NotSupported);
    }

    #[test]
    fn write_bookmark_replacement_rejects_oversized_text() {
        let mut buf = Vec::new();
        let mut enc = BookmarkingEncoder::new(&mut buf);
        let key = enc.allocate_key();
        enc.push(EncoderItem::bookmarked("short", key)).unwrap();
        let (_, registry) = enc.finish().unwrap();

        let dir = std::env::temp_dir().join(format!(
            "ratos_postprocessor_test_{}",
            std::process::id()
        ));
        let mut file = File::create(&dir).unwrap();
        let err = write_bookmark_replacement(&mut file, &registry, key, "way too long now")
            .unwrap_err();
        assert!(matches!(err, PostProcessError::ReplacementTooLarge { .. }));
        let _ = std::fs::remove_file(&dir);
    }
}
