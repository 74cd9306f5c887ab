//! Stanza scanning for semi-structured status output.
//!
//! Output is a sequence of sections. A section starts at a top-level header
//! line and runs until the next one. Registered stanzas pick out the
//! sections they care about by header pattern; everything else is skipped.

use super::PfError;
use crate::metric::Metric;
use regex::Regex;
use std::sync::LazyLock;

/// Line-level patterns for one tool's output layout.
///
/// The scanner only talks to this trait, so a different tool or locale can
/// supply its own patterns without touching the state machine.
pub trait OutputFormat: Send + Sync {
    /// Whether `line` begins a new top-level section.
    fn is_section_start(&self, line: &str) -> bool;

    /// Split a counter line into label and value text.
    fn match_counter_line<'a>(&self, line: &'a str) -> Option<CounterLine<'a>>;
}

/// A `<label> <value>` pair as it appears in the output, not yet parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterLine<'a> {
    pub label: &'a str,
    pub value: &'a str,
}

/// Any line starting with an uppercase letter opens a section.
///
/// Known fragility: an uppercase-led data line would also end the current
/// section. pfctl never prints one, so the heuristic is kept as-is.
static PFCTL_SECTION_START: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z]").unwrap());

/// Two-space indent, label, whitespace, then the first token that starts
/// with a digit. Anything after that token (pfctl's rate column) is ignored.
/// The whole token is captured so `12x4` is rejected instead of read as 12.
static PFCTL_COUNTER_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^  (.*?)\s+(\d\S*)(?:\s.*)?$").unwrap());

/// Layout of `pfctl -s info` output.
#[derive(Debug, Default, Clone, Copy)]
pub struct PfctlFormat;

impl OutputFormat for PfctlFormat {
    fn is_section_start(&self, line: &str) -> bool {
        PFCTL_SECTION_START.is_match(line)
    }

    fn match_counter_line<'a>(&self, line: &'a str) -> Option<CounterLine<'a>> {
        let caps = PFCTL_COUNTER_LINE.captures(line)?;
        Some(CounterLine {
            label: caps.get(1)?.as_str(),
            value: caps.get(2)?.as_str(),
        })
    }
}

/// What a stanza parser gets besides its lines.
pub struct ParseContext<'a> {
    pub format: &'a dyn OutputFormat,
    /// Command that produced the output, for error messages.
    pub command: &'a str,
}

/// Turns one stanza's body lines into a metric.
pub type ParseFn = fn(&[&str], &ParseContext<'_>) -> Result<Metric, PfError>;

/// A registered section: header pattern plus the parser for its body.
pub struct Stanza {
    pub name: &'static str,
    header: &'static LazyLock<Regex>,
    parse: ParseFn,
}

impl Stanza {
    pub fn new(name: &'static str, header: &'static LazyLock<Regex>, parse: ParseFn) -> Self {
        Self {
            name,
            header,
            parse,
        }
    }

    fn matches_header(&self, line: &str) -> bool {
        self.header.is_match(line)
    }
}

enum ScanState<'a> {
    SeekingHeader,
    Collecting { stanza: usize, lines: Vec<&'a str> },
}

/// Scan `output` for every registered stanza and parse each one found.
///
/// The line right after a header is always taken as body. From the second
/// body line on, the first section-start line closes the stanza and is then
/// checked against the registered headers itself. Fails with
/// [`PfError::HeaderNotFound`] if any stanza never appears; a parser error
/// aborts the scan immediately.
pub fn scan(
    output: &str,
    stanzas: &[Stanza],
    ctx: &ParseContext<'_>,
) -> Result<Vec<Metric>, PfError> {
    let mut found = vec![false; stanzas.len()];
    let mut metrics = Vec::with_capacity(stanzas.len());
    let mut state = ScanState::SeekingHeader;

    let mut finish = |stanza: usize, lines: &[&str]| -> Result<(), PfError> {
        tracing::debug!(
            stanza = stanzas[stanza].name,
            lines = lines.len(),
            "parsing stanza"
        );
        metrics.push((stanzas[stanza].parse)(lines, ctx)?);
        found[stanza] = true;
        Ok(())
    };
    let seek = |line: &str| match stanzas.iter().position(|s| s.matches_header(line)) {
        Some(stanza) => ScanState::Collecting {
            stanza,
            lines: Vec::new(),
        },
        None => ScanState::SeekingHeader,
    };

    for line in output.lines() {
        state = match state {
            ScanState::SeekingHeader => seek(line),
            ScanState::Collecting { stanza, mut lines } => {
                if !lines.is_empty() && ctx.format.is_section_start(line) {
                    finish(stanza, &lines[..])?;
                    seek(line)
                } else {
                    lines.push(line);
                    ScanState::Collecting { stanza, lines }
                }
            }
        };
    }
    if let ScanState::Collecting { stanza, lines } = state {
        finish(stanza, &lines[..])?;
    }

    if let Some(missing) = found.iter().position(|f| !f) {
        tracing::debug!(stanza = stanzas[missing].name, "stanza header not found");
        return Err(PfError::HeaderNotFound {
            command: ctx.command.to_string(),
        });
    }
    Ok(metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::FieldValue;
    use chrono::Utc;
    use std::collections::HashMap;

    static ALPHA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^Alpha").unwrap());
    static BETA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^Beta").unwrap());

    /// Emits the body lines joined with `|` so tests can see exactly what
    /// the scanner handed over.
    fn echo(lines: &[&str], _ctx: &ParseContext<'_>) -> Result<Metric, PfError> {
        let fields = HashMap::from([("body".to_string(), FieldValue::Str(lines.join("|")))]);
        Ok(Metric::new("echo", HashMap::new(), fields, Utc::now()))
    }

    fn fail(_lines: &[&str], ctx: &ParseContext<'_>) -> Result<Metric, PfError> {
        Err(PfError::MissingData {
            label: "x".to_string(),
            command: ctx.command.to_string(),
        })
    }

    fn body(m: &Metric) -> &str {
        match m.fields.get("body") {
            Some(FieldValue::Str(s)) => s,
            other => panic!("unexpected body field {other:?}"),
        }
    }

    fn run(output: &str, stanzas: &[Stanza]) -> Result<Vec<Metric>, PfError> {
        let ctx = ParseContext {
            format: &PfctlFormat,
            command: "pfctl",
        };
        scan(output, stanzas, &ctx)
    }

    #[test]
    fn counter_line_splits_label_and_value() {
        let c = PfctlFormat
            .match_counter_line("  current entries                        42")
            .unwrap();
        assert_eq!(c.label, "current entries");
        assert_eq!(c.value, "42");
    }

    #[test]
    fn counter_line_ignores_rate_column() {
        let c = PfctlFormat
            .match_counter_line("  searches                         5443924          188.4/s")
            .unwrap();
        assert_eq!(c.label, "searches");
        assert_eq!(c.value, "5443924");
    }

    #[test]
    fn counter_line_keeps_trailing_garbage_in_value() {
        let c = PfctlFormat.match_counter_line("  searches   12x4").unwrap();
        assert_eq!(c.label, "searches");
        assert_eq!(c.value, "12x4");
    }

    #[test]
    fn counter_line_rejects_unindented_and_valueless_lines() {
        assert!(PfctlFormat.match_counter_line("searches 12").is_none());
        assert!(PfctlFormat.match_counter_line("  searches").is_none());
        assert!(PfctlFormat.match_counter_line("").is_none());
    }

    #[test]
    fn section_start_is_uppercase_first_char() {
        assert!(PfctlFormat.is_section_start("State Table"));
        assert!(PfctlFormat.is_section_start("Unrelated Section"));
        assert!(!PfctlFormat.is_section_start("  current entries 1"));
        assert!(!PfctlFormat.is_section_start("lowercase"));
        assert!(!PfctlFormat.is_section_start(""));
    }

    #[test]
    fn stanza_ends_at_next_section_start() {
        let stanzas = [Stanza::new("alpha", &ALPHA, echo)];
        let out = "Alpha\n  one\n  two\nUnrelated Section\n  three\n";
        let metrics = run(out, &stanzas).unwrap();
        assert_eq!(metrics.len(), 1);
        assert_eq!(body(&metrics[0]), "  one|  two");
    }

    #[test]
    fn first_body_line_is_never_a_section_start() {
        let stanzas = [Stanza::new("alpha", &ALPHA, echo)];
        let out = "Alpha\nFirst\n  two\nNext\n";
        let metrics = run(out, &stanzas).unwrap();
        assert_eq!(body(&metrics[0]), "First|  two");
    }

    #[test]
    fn stanza_runs_to_end_of_input() {
        let stanzas = [Stanza::new("alpha", &ALPHA, echo)];
        let metrics = run("Status: Enabled\nAlpha\n  one\n  two", &stanzas).unwrap();
        assert_eq!(body(&metrics[0]), "  one|  two");
    }

    #[test]
    fn header_on_last_line_yields_empty_body() {
        let stanzas = [Stanza::new("alpha", &ALPHA, echo)];
        let metrics = run("Other\nAlpha", &stanzas).unwrap();
        assert_eq!(body(&metrics[0]), "");
    }

    #[test]
    fn adjacent_registered_stanzas_are_both_found() {
        let stanzas = [
            Stanza::new("alpha", &ALPHA, echo),
            Stanza::new("beta", &BETA, echo),
        ];
        let out = "Alpha\n  a1\n  a2\nBeta\n  b1\n";
        let metrics = run(out, &stanzas).unwrap();
        assert_eq!(metrics.len(), 2);
        assert_eq!(body(&metrics[0]), "  a1|  a2");
        assert_eq!(body(&metrics[1]), "  b1");
    }

    #[test]
    fn missing_stanza_is_header_not_found() {
        let stanzas = [
            Stanza::new("alpha", &ALPHA, echo),
            Stanza::new("beta", &BETA, echo),
        ];
        let err = run("Alpha\n  a1\n", &stanzas).unwrap_err();
        assert!(matches!(err, PfError::HeaderNotFound { ref command } if command == "pfctl"));
    }

    #[test]
    fn empty_output_is_header_not_found() {
        let stanzas = [Stanza::new("alpha", &ALPHA, echo)];
        assert!(matches!(
            run("", &stanzas),
            Err(PfError::HeaderNotFound { .. })
        ));
    }

    #[test]
    fn parser_error_aborts_scan() {
        let stanzas = [
            Stanza::new("alpha", &ALPHA, fail),
            Stanza::new("beta", &BETA, echo),
        ];
        let err = run("Alpha\n  a1\nBeta\n  b1\n", &stanzas).unwrap_err();
        assert!(matches!(err, PfError::MissingData { .. }));
    }
}
