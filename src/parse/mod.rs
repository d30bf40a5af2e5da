//! Hand-written grammars for loose version ranges and yarn lockfiles.
//!
//! Both parsers share one configuration surface ([`ParseOptions`]), one error
//! type ([`ParseError`]) and one work meter, so callers can cap parse cost and
//! tell a syntax error apart from a blown expression budget.
//!
//! - [`range`] - loose-to-strict version range normalizer
//! - [`yarnlock`] - yarn.lock block format to a flat package list

pub mod range;
pub mod yarnlock;

use std::borrow::Cow;
use std::collections::BTreeMap;

use tracing::trace;

/// Grammar entry point override.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Entrypoint {
    /// Full range expression (OR groups of AND-ed comparators).
    #[default]
    Expression,
    /// A single version, with nothing after it.
    Version,
}

/// Options accepted by both grammars, passed by value into the entry points.
///
/// The defaults are what the library uses everywhere: no debug tracing, no
/// memoization, strict UTF-8, the full-expression entry point, and no cap on
/// parse work.
#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Trace every rule evaluation through `tracing` at TRACE level.
    pub debug: bool,
    /// Cache sub-expression parse results. Purely a performance toggle; the
    /// output never changes.
    pub memoize: bool,
    /// Replace invalid UTF-8 byte sequences instead of erroring, when parsing
    /// from bytes.
    pub lenient_utf8: bool,
    /// Which grammar rule to start from.
    pub entrypoint: Entrypoint,
    /// Upper bound on internal expressions evaluated during one parse.
    /// `0` means unlimited. Exceeding the bound yields
    /// [`ParseErrorKind::BudgetExceeded`], not a syntax error.
    pub max_expressions: u64,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            debug: false,
            memoize: false,
            lenient_utf8: false,
            entrypoint: Entrypoint::Expression,
            max_expressions: 0,
        }
    }
}

/// Choice-point statistics collected by the `*_traced` entry points.
///
/// Diagnostic only; the counts depend on grammar internals and are not part
/// of any stability promise.
#[derive(Debug, Clone, Default)]
pub struct Stats {
    /// Total expressions evaluated.
    pub expressions: u64,
    /// Evaluations per grammar rule.
    pub rules: BTreeMap<&'static str, u64>,
}

/// Where and why a parse failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct ParseError {
    /// Name of the input, e.g. `yarn.lock`, when parsing a file.
    pub source_name: Option<String>,
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
    /// Byte offset into the input.
    pub offset: usize,
    pub kind: ParseErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// The input does not match the grammar. `expected` names what would have
    /// been accepted at the error position.
    Syntax { expected: String },
    /// The expression budget ([`ParseOptions::max_expressions`]) ran out
    /// while evaluating `rule`. A configuration problem, not bad input.
    BudgetExceeded { rule: &'static str },
    /// The input bytes are not valid UTF-8 and leniency was off.
    InvalidUtf8,
}

impl ParseError {
    pub(crate) fn new(offset: usize, line: usize, column: usize, kind: ParseErrorKind) -> Self {
        Self {
            source_name: None,
            line,
            column,
            offset,
            kind,
        }
    }

    pub(crate) fn at(input: &str, offset: usize, kind: ParseErrorKind) -> Self {
        let (line, column) = position(input, offset);
        Self::new(offset, line, column, kind)
    }

    /// Attaches the name of the input (shown as a `name:` prefix).
    pub fn with_source_name(mut self, name: impl Into<String>) -> Self {
        self.source_name = Some(name.into());
        self
    }

    /// True when the parse ran out of expression budget rather than hitting
    /// malformed input.
    pub fn is_budget_exceeded(&self) -> bool {
        matches!(self.kind, ParseErrorKind::BudgetExceeded { .. })
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(name) = &self.source_name {
            write!(f, "{}:", name)?;
        }
        write!(f, "{}:{} ({}): ", self.line, self.column, self.offset)?;
        match &self.kind {
            ParseErrorKind::Syntax { expected } => {
                write!(f, "no match found, expected: {}", expected)
            }
            ParseErrorKind::BudgetExceeded { rule } => {
                write!(f, "rule {}: maximum number of expressions parsed", rule)
            }
            ParseErrorKind::InvalidUtf8 => write!(f, "input is not valid UTF-8"),
        }
    }
}

/// Computes the 1-based (line, column) of a byte offset.
pub(crate) fn position(input: &str, offset: usize) -> (usize, usize) {
    let offset = offset.min(input.len());
    let mut line = 1;
    let mut last_newline = None;
    for (i, b) in input.as_bytes()[..offset].iter().enumerate() {
        if *b == b'\n' {
            line += 1;
            last_newline = Some(i);
        }
    }
    let column = match last_newline {
        Some(i) => offset - i,
        None => offset + 1,
    };
    (line, column)
}

/// Decodes raw file bytes according to the UTF-8 leniency option.
pub fn decode(bytes: &[u8], lenient: bool) -> Result<Cow<'_, str>, ParseError> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Ok(Cow::Borrowed(text)),
        Err(_) if lenient => Ok(String::from_utf8_lossy(bytes)),
        Err(err) => {
            let valid = &bytes[..err.valid_up_to()];
            // Safe: valid_up_to marks the end of the valid prefix.
            let prefix = std::str::from_utf8(valid).unwrap_or_default();
            let (line, column) = position(prefix, prefix.len());
            Err(ParseError::new(
                err.valid_up_to(),
                line,
                column,
                ParseErrorKind::InvalidUtf8,
            ))
        }
    }
}

/// Work meter shared by both grammars: counts rule evaluations, feeds the
/// optional statistics sink, and trips when the budget runs out.
pub(crate) struct Meter<'s> {
    used: u64,
    limit: u64,
    debug: bool,
    stats: Option<&'s mut Stats>,
}

impl<'s> Meter<'s> {
    pub(crate) fn new(opts: &ParseOptions, stats: Option<&'s mut Stats>) -> Self {
        Self {
            used: 0,
            limit: opts.max_expressions,
            debug: opts.debug,
            stats,
        }
    }

    /// Records one rule evaluation. Returns the rule name as the error when
    /// the budget is exceeded; the caller attaches position information.
    pub(crate) fn tick(&mut self, rule: &'static str) -> Result<(), &'static str> {
        self.used += 1;
        if self.debug {
            trace!(rule, used = self.used, "grammar rule");
        }
        if let Some(stats) = self.stats.as_deref_mut() {
            stats.expressions += 1;
            *stats.rules.entry(rule).or_default() += 1;
        }
        if self.limit != 0 && self.used > self.limit {
            return Err(rule);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_first_line() {
        assert_eq!(position("abc", 0), (1, 1));
        assert_eq!(position("abc", 2), (1, 3));
    }

    #[test]
    fn test_position_after_newlines() {
        let input = "a\nbc\nd";
        assert_eq!(position(input, 2), (2, 1));
        assert_eq!(position(input, 5), (3, 1));
    }

    #[test]
    fn test_decode_strict_rejects_invalid_utf8() {
        let err = decode(b"ok\xff", false).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::InvalidUtf8);
        assert_eq!(err.offset, 2);
    }

    #[test]
    fn test_decode_lenient_replaces_invalid_utf8() {
        let text = decode(b"ok\xff", true).unwrap();
        assert!(text.starts_with("ok"));
    }

    #[test]
    fn test_error_display_includes_source_name() {
        let err = ParseError::new(
            0,
            1,
            1,
            ParseErrorKind::Syntax {
                expected: "a version".into(),
            },
        )
        .with_source_name("yarn.lock");
        assert_eq!(
            err.to_string(),
            "yarn.lock:1:1 (0): no match found, expected: a version"
        );
    }

    #[test]
    fn test_meter_trips_past_limit() {
        let opts = ParseOptions {
            max_expressions: 2,
            ..Default::default()
        };
        let mut meter = Meter::new(&opts, None);
        assert!(meter.tick("a").is_ok());
        assert!(meter.tick("b").is_ok());
        assert_eq!(meter.tick("c"), Err("c"));
    }
}
