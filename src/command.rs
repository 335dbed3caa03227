//! C1 — line command parser (spec §4.1).
//!
//! Recognises only `G0`/`G1` (collapsed to value `"1"`), `G2`/`G3`, and `Tn`.
//! Everything else — comments, blank lines, unrecognised words — returns
//! `None` on the fast path without touching the parameter scan.

/// A parsed view of a single instruction line.
///
/// Parameters are kept as their original textual slices (never parsed to
/// `f64`) so no float round-trip artefacts are introduced when a line is
/// re-emitted unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Command {
    pub letter: char,
    pub value: String,
    pub x: Option<String>,
    pub y: Option<String>,
    pub z: Option<String>,
    pub e: Option<String>,
    pub f: Option<String>,
    pub i: Option<String>,
    pub j: Option<String>,
}

impl Command {
    pub fn is_motion(&self) -> bool {
        self.letter == 'G' && self.value == "1"
    }

    pub fn is_arc(&self) -> bool {
        self.letter == 'G' && (self.value == "2" || self.value == "3")
    }

    pub fn is_tool_change(&self) -> bool {
        self.letter == 'T'
    }

    /// Parses the `Tn` tool index. Only meaningful when [`is_tool_change`]
    /// is true.
    pub fn tool_number(&self) -> Option<u32> {
        self.is_tool_change().then(|| self.value.parse().ok()).flatten()
    }

    pub fn has_xy(&self) -> bool {
        self.x.is_some() && self.y.is_some()
    }
}

/// Parses `line` (without its trailing newline) into a [`Command`].
///
/// The caller is responsible for skipping comment-only lines at the
/// dispatcher level; this function itself tolerates and strips a trailing
/// `; ...` inline comment so parameters after `;` are never captured.
pub fn parse(line: &str) -> Option<Command> {
    let bytes = line.as_bytes();
    let mut start = 0;
    while start < bytes.len() && (bytes[start] == b' ' || bytes[start] == b'\t') {
        start += 1;
    }
    // Fast path: blank or comment-only lines are the overwhelming minority
    // case we want to reject without any further work, but the overwhelming
    // majority case (a bare movement word) also exits here in one check.
    if start >= bytes.len() || bytes[start] == b';' {
        return None;
    }

    let code_part = match line[start..].find(';') {
        Some(idx) => &line[start..start + idx],
        None => &line[start..],
    };

    let mut tokens = code_part.split_whitespace();
    let head = tokens.next()?;
    let (letter, value) = parse_head(head)?;

    let mut cmd = Command {
        letter,
        value,
        ..Default::default()
    };

    for tok in tokens {
        let mut chars = tok.chars();
        let Some(p_letter) = chars.next() else {
            continue;
        };
        let p_value = chars.as_str();
        if p_value.is_empty() {
            continue;
        }
        match p_letter.to_ascii_uppercase() {
            'X' => cmd.x = Some(p_value.to_string()),
            'Y' => cmd.y = Some(p_value.to_string()),
            'Z' => cmd.z = Some(p_value.to_string()),
            'E' => cmd.e = Some(p_value.to_string()),
            'F' => cmd.f = Some(p_value.to_string()),
            'I' => cmd.i = Some(p_value.to_string()),
            'J' => cmd.j = Some(p_value.to_string()),
            _ => {}
        }
    }

    Some(cmd)
}

fn parse_head(head: &str) -> Option<(char, String)> {
    let mut chars = head.chars();
    let letter = chars.next()?.to_ascii_uppercase();
    let rest = chars.as_str();

    match letter {
        'G' => match rest {
            "0" | "1" => Some(('G', "1".to_string())),
            "2" => Some(('G', "2".to_string())),
            "3" => Some(('G', "3".to_string())),
            _ => None,
        },
        'T' => {
            if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) {
                Some(('T', rest.to_string()))
            } else {
                None
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_line_returns_none() {
        assert_eq!(parse(""), None);
        assert_eq!(parse("   "), None);
    }

    #[test]
    fn comment_only_line_returns_none() {
        assert_eq!(parse("; a comment"), None);
        assert_eq!(parse("  ; indented comment"), None);
    }

    #[test]
    fn g0_collapses_to_g1() {
        let cmd = parse("G0 X10 Y20").unwrap();
        assert_eq!(cmd.letter, 'G');
        assert_eq!(cmd.value, "1");
        assert_eq!(cmd.x.as_deref(), Some("10"));
        assert_eq!(cmd.y.as_deref(), Some("20"));
    }

    #[test]
    fn g1_keeps_value_one() {
        let cmd = parse("G1 X1.5 Y2.5 E0.01 F1200").unwrap();
        assert_eq!(cmd.value, "1");
        assert_eq!(cmd.e.as_deref(), Some("0.01"));
        assert_eq!(cmd.f.as_deref(), Some("1200"));
    }

    #[test]
    fn g2_keeps_arc_params() {
        let cmd = parse("G2 X10 Y10 I5 J0 E1").unwrap();
        assert!(cmd.is_arc());
        assert_eq!(cmd.i.as_deref(), Some("5"));
        assert_eq!(cmd.j.as_deref(), Some("0"));
    }

    #[test]
    fn g3_is_recognised() {
        let cmd = parse("G3 X0 Y0 I1 J1").unwrap();
        assert_eq!(cmd.value, "3");
        assert!(cmd.is_arc());
    }

    #[test]
    fn tool_change_captures_tool_number() {
        let cmd = parse("T3").unwrap();
        assert!(cmd.is_tool_change());
        assert_eq!(cmd.tool_number(), Some(3));
    }

    #[test]
    fn inline_comment_is_not_captured_as_parameter() {
        let cmd = parse("G1 X10 Y20 ; move to position").unwrap();
        assert_eq!(cmd.x.as_deref(), Some("10"));
        assert_eq!(cmd.y.as_deref(), Some("20"));
        assert!(cmd.z.is_none());
    }

    #[test]
    fn unrecognised_word_returns_none() {
        assert_eq!(parse("M104 S210"), None);
        assert_eq!(parse("G28"), None);
    }

    #[test]
    fn whitespace_is_tolerated() {
        let cmd = parse("   G1    X10   Y20  ").unwrap();
        assert_eq!(cmd.x.as_deref(), Some("10"));
        assert_eq!(cmd.y.as_deref(), Some("20"));
    }

    #[test]
    fn has_xy_requires_both() {
        let only_x = parse("G1 X10").unwrap();
        assert!(!only_x.has_xy());
        let both = parse("G1 X10 Y20").unwrap();
        assert!(both.has_xy());
    }

    #[test]
    fn params_preserve_original_text_without_float_round_trip() {
        // .5 has no leading zero and must be preserved verbatim, not
        // reformatted to 0.5.
        let cmd = parse("G1 X.5").unwrap();
        assert_eq!(cmd.x.as_deref(), Some(".5"));
    }
}
