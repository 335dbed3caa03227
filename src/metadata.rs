//! C2 — metadata codec (spec §4.2, §6): the identification/"processed by"
//! header lines and the base64-encoded analysis trailer.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::analysis::AnalysisResult;
use crate::error::{PostProcessError, Result, Warning};
use crate::identification::{Flavour, GeneratorIdentification};

const TRAILER_LINE_WIDTH: usize = 78;

fn flavour_for_generator_name(name: &str) -> Flavour {
    match name.to_ascii_lowercase().as_str() {
        "prusaslicer" => Flavour::PrusaSlicer,
        "orcaslicer" => Flavour::OrcaSlicer,
        "superslicer" => Flavour::SuperSlicer,
        _ => Flavour::Unknown,
    }
}

fn strip_ci_prefix<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Parses the identification/"processed by" header out of the first few
/// lines of a file, tolerating either line being absent (spec §4.2: "may
/// examine the first three lines... as one blob").
pub fn parse_header(blob: &str) -> Result<GeneratorIdentification> {
    let mut ident = GeneratorIdentification::default();
    for (idx, line) in blob.lines().enumerate() {
        let line_number = idx + 1;
        let trimmed = line.trim_start();
        if let Some(rest) = strip_ci_prefix(trimmed, "; generated by ")
            .or_else(|| strip_ci_prefix(trimmed, "; generated with "))
        {
            parse_generated_line(rest, &mut ident, line_number, line)?;
        } else if let Some(rest) = strip_ci_prefix(trimmed, "; processed by ") {
            parse_processed_line(rest, &mut ident, line_number, line)?;
        }
    }
    Ok(ident)
}

fn parse_generated_line(
    rest: &str,
    ident: &mut GeneratorIdentification,
    line_number: usize,
    text: &str,
) -> Result<()> {
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let mut i = 0;

    let generator_name = *tokens.first().ok_or_else(|| PostProcessError::GCodeError {
        line: line_number,
        text: text.to_string(),
        reason: "empty 'generated by' line".to_string(),
    })?;
    i += 1;
    let version_str = *tokens.get(i).ok_or_else(|| PostProcessError::GCodeError {
        line: line_number,
        text: text.to_string(),
        reason: "'generated by' line missing version".to_string(),
    })?;
    i += 1;
    let version = semver::Version::parse(version_str).map_err(|e| PostProcessError::GCodeError {
        line: line_number,
        text: text.to_string(),
        reason: format!("invalid generator version {version_str:?}: {e}"),
    })?;

    ident.generator_name = generator_name.to_string();
    ident.generator_version = Some(version);
    ident.flavour = Some(flavour_for_generator_name(generator_name));

    if tokens.get(i) == Some(&"in")
        && tokens.get(i + 1).is_some_and(|t| t.eq_ignore_ascii_case("ratos"))
        && tokens.get(i + 2).is_some_and(|t| t.eq_ignore_ascii_case("dialect"))
    {
        if let Some(dialect) = tokens.get(i + 3) {
            ident.ratos_dialect_version = Some((*dialect).to_string());
            ident.flavour = Some(Flavour::RatOsDialect);
            i += 4;
        }
    }

    if tokens.get(i) == Some(&"on") {
        let date = tokens.get(i + 1).copied().unwrap_or("");
        let time = tokens.get(i + 3).copied().unwrap_or("");
        let timestamp = format!("{date} {time}");
        let timestamp = timestamp.trim();
        if !timestamp.is_empty() {
            ident.generator_timestamp = Some(timestamp.to_string());
        }
    }

    Ok(())
}

/// Parses the tail of a "processed by" line (everything after the literal
/// `; processed by ` prefix). Tolerates the historical forms by treating
/// every tail field (`v:`, `m:`, `idex`) as optional.
fn parse_processed_line(
    rest: &str,
    ident: &mut GeneratorIdentification,
    line_number: usize,
    text: &str,
) -> Result<()> {
    let tokens: Vec<&str> = rest.split_whitespace().collect();

    let version_str = *tokens.get(1).ok_or_else(|| PostProcessError::GCodeError {
        line: line_number,
        text: text.to_string(),
        reason: "'processed by' line missing version".to_string(),
    })?;
    let version = semver::Version::parse(version_str).map_err(|e| PostProcessError::GCodeError {
        line: line_number,
        text: text.to_string(),
        reason: format!("invalid post-processor version {version_str:?}: {e}"),
    })?;
    ident.post_processor_version = Some(version);

    if tokens.get(2) == Some(&"on") {
        let date = tokens.get(3).copied().unwrap_or("");
        let time = tokens.get(5).copied().unwrap_or("");
        let timestamp = format!("{date} {time}");
        let timestamp = timestamp.trim();
        if !timestamp.is_empty() {
            ident.post_processor_timestamp = Some(timestamp.to_string());
        }
    }

    let mut idex = false;
    for tok in &tokens {
        if let Some(v) = tok.strip_prefix("v:") {
            ident.file_format_version = v.parse().ok();
        } else if tok.eq_ignore_ascii_case("idex") {
            idex = true;
        }
    }
    ident.processed_for_idex = Some(idex);

    Ok(())
}

/// Renders the "processed by" line emitted at finalisation (spec §4.2,
/// exact form). `trailer_offset` is the byte offset the analysis trailer
/// will begin at, rendered as lowercase hex.
pub fn render_processed_by_line(
    version: &semver::Version,
    timestamp: chrono::DateTime<chrono::Utc>,
    file_format_version: u32,
    trailer_offset: u64,
    idex: bool,
) -> String {
    let date = timestamp.format("%Y-%m-%d");
    let time = timestamp.format("%H:%M:%S");
    let suffix = if idex { " idex" } else { "" };
    format!(
        "; processed by RatOS.PostProcessor {version} on {date} at {time} UTC v:{file_format_version} m:{trailer_offset:x}{suffix}"
    )
}

/// Renders the full analysis trailer block (spec §4.2, §6).
pub fn render_trailer(result: &AnalysisResult) -> Result<String> {
    let json = serde_json::to_string(result)
        .map_err(|e| PostProcessError::Internal(format!("failed to serialise analysis result: {e}")))?;
    let payload = STANDARD.encode(json.as_bytes());

    let mut out = String::new();
    out.push_str(&format!("; ratos_meta begin {}\n", payload.len()));
    let mut line_count = 0;
    for chunk in chunk_str(&payload, TRAILER_LINE_WIDTH) {
        out.push_str("; ");
        out.push_str(chunk);
        out.push('\n');
        line_count += 1;
    }
    out.push_str(&format!("; ratos_meta end {line_count}\n"));
    Ok(out)
}

fn chunk_str(s: &str, width: usize) -> Vec<&str> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len() / width + 1);
    let mut start = 0;
    while start < bytes.len() {
        let end = (start + width).min(bytes.len());
        out.push(&s[start..end]);
        start = end;
    }
    if out.is_empty() {
        out.push(s);
    }
    out
}

/// Outcome of attempting to parse an analysis trailer out of a tail blob.
pub enum TrailerParseOutcome {
    /// A well-formed trailer was found and decoded.
    Found(AnalysisResult),
    /// No `; ratos_meta begin` marker is present in this blob at all.
    NotFound,
    /// A trailer marker was found but failed its length or decode check
    /// (spec §4.2/§7: non-fatal, proceed without the analysis result).
    Invalid(Warning),
}

/// If `tail` contains only the `; ratos_meta end <N>` marker without a
/// matching `begin`, returns `N` (the declared line count) so the caller
/// can retry with a larger tail read (spec §4.2).
pub fn trailer_end_hint(tail: &str) -> Option<usize> {
    for line in tail.lines().rev() {
        if let Some(rest) = strip_ci_prefix(line.trim_start(), "; ratos_meta end ") {
            return rest.trim().parse().ok();
        }
    }
    None
}

/// Parses the trailer out of `tail`, a blob containing at least the last
/// portion of the file (spec §4.2).
pub fn parse_trailer(tail: &str) -> TrailerParseOutcome {
    let lines: Vec<&str> = tail.lines().collect();

    let begin_idx = lines.iter().position(|l| {
        strip_ci_prefix(l.trim_start(), "; ratos_meta begin ").is_some()
    });
    let Some(begin_idx) = begin_idx else {
        return TrailerParseOutcome::NotFound;
    };
    let expected_chars: usize = match strip_ci_prefix(lines[begin_idx].trim_start(), "; ratos_meta begin ")
        .and_then(|n| n.trim().parse().ok())
    {
        Some(n) => n,
        None => {
            return TrailerParseOutcome::Invalid(Warning::InvalidMetadata {
                detail: "trailer begin marker has a non-numeric character count".to_string(),
            })
        }
    };

    let end_idx = lines[begin_idx + 1..]
        .iter()
        .position(|l| strip_ci_prefix(l.trim_start(), "; ratos_meta end ").is_some())
        .map(|rel| begin_idx + 1 + rel);
    let Some(end_idx) = end_idx else {
        return TrailerParseOutcome::Invalid(Warning::InvalidMetadata {
            detail: "trailer begin marker has no matching end marker in range".to_string(),
        });
    };

    let mut payload = String::new();
    for line in &lines[begin_idx + 1..end_idx] {
        match strip_ci_prefix(line, "; ") {
            Some(chunk) => payload.push_str(chunk),
            None => {
                return TrailerParseOutcome::Invalid(Warning::InvalidMetadata {
                    detail: format!("trailer payload line missing '; ' prefix: {line:?}"),
                })
            }
        }
    }

    if payload.len() != expected_chars {
        return TrailerParseOutcome::Invalid(Warning::InvalidMetadata {
            detail: format!(
                "trailer declared {expected_chars} base64 chars but found {}",
                payload.len()
            ),
        });
    }

    let decoded = match STANDARD.decode(payload.as_bytes()) {
        Ok(bytes) => bytes,
        Err(e) => {
            return TrailerParseOutcome::Invalid(Warning::InvalidMetadata {
                detail: format!("trailer payload is not valid base64: {e}"),
            })
        }
    };

    match serde_json::from_slice::<AnalysisResult>(&decoded) {
        Ok(result) => TrailerParseOutcome::Found(result),
        Err(e) => TrailerParseOutcome::Invalid(Warning::InvalidMetadata {
            detail: format!("trailer payload is not a valid analysis result: {e}"),
        }),
    }
}
