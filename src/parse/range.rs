//! Loose-to-strict version range normalizer.
//!
//! Version and range strings found in package manifests and vulnerability
//! feeds are only loosely semver: components go missing (`1.0`, `<0.8`),
//! prerelease separators are mangled (`1.0.rc.1`, `0.8.beta-1`), operators
//! grow spaces (`>= 2.0.1`), and OR alternatives are spelled with `|`, `||`
//! or nothing at all. [`normalize`] parses all of that and renders a canonical
//! range string a strict evaluator can consume:
//!
//! - AND-ed comparators joined with `", "`
//! - OR groups joined with `" || "`
//! - every version filled out to `major.minor.patch`, prereleases attached
//!   with `-`, build metadata with `+`
//! - hyphen ranges and x-ranges kept in shape
//!
//! Only the ordering comparators (`<`, `<=`, `>`, `>=`) chain into AND
//! groups; a space or single `|` next to any other kind of term separates OR
//! alternatives. Comma-joined AND groups are re-sorted so lower bounds come
//! first; space-joined terms keep their order.
//!
//! # Example
//!
//! ```
//! use nodescan::parse::range::normalize;
//!
//! assert_eq!(normalize(">=1.1.0 <=1.1.1").unwrap(), ">=1.1.0, <=1.1.1");
//! assert_eq!(normalize("0.8.beta-1").unwrap(), "0.8.0-beta-1");
//! assert_eq!(normalize("^1.1 || 2.0.x").unwrap(), "^1.1.0 || 2.0.x");
//! ```

use std::collections::HashMap;

use super::{Entrypoint, Meter, ParseError, ParseErrorKind, ParseOptions, Stats};

const EXPECTED_TERM: &str =
    "one of \"!\", \"<\", \"<=\", \"=\", \">\", \">=\", \"^\", \"~\" or a version";
const EXPECTED_VERSION: &str = "a version number";

/// Normalizes a loose version or range expression with default options.
///
/// # Errors
///
/// Returns a [`ParseError`] when the expression does not match the grammar;
/// empty input is a parse error, not a wildcard.
pub fn normalize(input: &str) -> Result<String, ParseError> {
    normalize_with(input, ParseOptions::default())
}

/// Normalizes with explicit [`ParseOptions`].
pub fn normalize_with(input: &str, opts: ParseOptions) -> Result<String, ParseError> {
    Parser::new(input, opts, None).parse()
}

/// Normalizes while collecting choice-point statistics into `stats`.
pub fn normalize_traced(
    input: &str,
    opts: ParseOptions,
    stats: &mut Stats,
) -> Result<String, ParseError> {
    Parser::new(input, opts, Some(stats)).parse()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Not,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Caret,
    Tilde,
}

impl Op {
    fn is_ordering(self) -> bool {
        matches!(self, Op::Lt | Op::Le | Op::Gt | Op::Ge)
    }

    fn as_str(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Not => "!",
            Op::NotEq => "!=",
            Op::Lt => "<",
            Op::Le => "<=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Caret => "^",
            Op::Tilde => "~",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Num(u64),
    /// Wildcard component, keeping the character as written (`x`, `X`, `*`).
    Wild(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Version {
    parts: Vec<Part>,
    prerelease: Option<String>,
    build: Option<String>,
}

impl Version {
    fn has_wildcard(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::Wild(_)))
    }

    fn render(&self, out: &mut String) {
        if self.has_wildcard() {
            // X-ranges pass through in shape; missing components stay missing.
            for (i, part) in self.parts.iter().enumerate() {
                if i > 0 {
                    out.push('.');
                }
                match part {
                    Part::Num(n) => out.push_str(&n.to_string()),
                    Part::Wild(c) => out.push(*c),
                }
            }
        } else {
            for i in 0..3 {
                if i > 0 {
                    out.push('.');
                }
                let value = match self.parts.get(i) {
                    Some(Part::Num(n)) => *n,
                    _ => 0,
                };
                out.push_str(&value.to_string());
            }
        }
        if let Some(pre) = &self.prerelease {
            out.push('-');
            out.push_str(pre);
        }
        if let Some(build) = &self.build {
            out.push('+');
            out.push_str(build);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    Cmp { op: Option<Op>, version: Version },
    Hyphen { lo: Version, hi: Version },
}

impl Term {
    fn is_ordering(&self) -> bool {
        matches!(self, Term::Cmp { op: Some(op), .. } if op.is_ordering())
    }

    /// Sort rank inside a comma-joined AND group: lower bounds first.
    fn bound_rank(&self) -> u8 {
        match self {
            Term::Cmp {
                op: Some(Op::Gt | Op::Ge),
                ..
            } => 0,
            _ => 1,
        }
    }

    fn render(&self, out: &mut String) {
        match self {
            Term::Cmp { op, version } => {
                if let Some(op) = op {
                    out.push_str(op.as_str());
                }
                version.render(out);
            }
            Term::Hyphen { lo, hi } => {
                lo.render(out);
                out.push_str(" - ");
                hi.render(out);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sep {
    Space,
    Pipe,
    Comma,
    DblPipe,
}

struct Parser<'a, 's> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
    opts: ParseOptions,
    meter: Meter<'s>,
    memo: HashMap<usize, (Version, usize)>,
}

impl<'a, 's> Parser<'a, 's> {
    fn new(input: &'a str, opts: ParseOptions, stats: Option<&'s mut Stats>) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
            opts,
            meter: Meter::new(&opts, stats),
            memo: HashMap::new(),
        }
    }

    fn parse(mut self) -> Result<String, ParseError> {
        self.tick("input")?;
        self.skip_ws();
        if self.at_end() {
            return Err(self.err_expected(EXPECTED_TERM));
        }
        match self.opts.entrypoint {
            Entrypoint::Version => {
                let version = self.parse_version()?;
                self.skip_ws();
                if !self.at_end() {
                    return Err(self.err_expected("end of input"));
                }
                let mut out = String::new();
                version.render(&mut out);
                Ok(out)
            }
            Entrypoint::Expression => {
                let mut items = vec![(None, self.parse_term()?)];
                while let Some(sep) = self.parse_separator()? {
                    items.push((Some(sep), self.parse_term()?));
                }
                Ok(assemble(items))
            }
        }
    }

    fn parse_term(&mut self) -> Result<Term, ParseError> {
        self.tick("term")?;
        if let Some(op) = self.parse_op() {
            // `>= 2.0.1` is accepted; the space is dropped on render.
            self.skip_ws();
            let version = self.parse_version()?;
            return Ok(Term::Cmp {
                op: Some(op),
                version,
            });
        }

        let lo = self.parse_version()?;

        // Hyphen range lookahead: the dash must be spaced on both sides to
        // keep it apart from a prerelease dash.
        let save = self.pos;
        if self.skip_ws() && self.peek() == Some(b'-') {
            self.pos += 1;
            if self.skip_ws() {
                let hi = self.parse_version()?;
                return Ok(Term::Hyphen { lo, hi });
            }
        }
        self.pos = save;

        Ok(Term::Cmp { op: None, version: lo })
    }

    fn parse_separator(&mut self) -> Result<Option<Sep>, ParseError> {
        self.tick("separator")?;
        self.skip_ws();
        if self.at_end() {
            return Ok(None);
        }
        let sep = if self.peek() == Some(b',') {
            self.pos += 1;
            Sep::Comma
        } else if self.input[self.pos..].starts_with("||") {
            self.pos += 2;
            Sep::DblPipe
        } else if self.peek() == Some(b'|') {
            self.pos += 1;
            Sep::Pipe
        } else {
            return Ok(Some(Sep::Space));
        };
        self.skip_ws();
        Ok(Some(sep))
    }

    fn parse_op(&mut self) -> Option<Op> {
        let rest = &self.input[self.pos..];
        let (op, len) = if rest.starts_with(">=") {
            (Op::Ge, 2)
        } else if rest.starts_with("<=") {
            (Op::Le, 2)
        } else if rest.starts_with("==") {
            (Op::Eq, 2)
        } else if rest.starts_with("!=") {
            (Op::NotEq, 2)
        } else if rest.starts_with('>') {
            (Op::Gt, 1)
        } else if rest.starts_with('<') {
            (Op::Lt, 1)
        } else if rest.starts_with('=') {
            (Op::Eq, 1)
        } else if rest.starts_with('!') {
            (Op::Not, 1)
        } else if rest.starts_with('^') {
            (Op::Caret, 1)
        } else if rest.starts_with('~') {
            (Op::Tilde, 1)
        } else {
            return None;
        };
        self.pos += len;
        Some(op)
    }

    fn parse_version(&mut self) -> Result<Version, ParseError> {
        self.tick("version")?;
        let start = self.pos;
        if self.opts.memoize {
            if let Some((version, end)) = self.memo.get(&start) {
                let (version, end) = (version.clone(), *end);
                self.pos = end;
                return Ok(version);
            }
        }
        let version = self.parse_version_inner()?;
        if self.opts.memoize {
            self.memo.insert(start, (version.clone(), self.pos));
        }
        Ok(version)
    }

    fn parse_version_inner(&mut self) -> Result<Version, ParseError> {
        let mut parts = vec![self.parse_part()?];
        let mut prerelease = None;

        while parts.len() < 3 && prerelease.is_none() {
            if self.at_ident_start() {
                // Prerelease glued straight onto digits: `0.08beta-1`.
                prerelease = Some(self.parse_prerelease());
                break;
            }
            if self.peek() != Some(b'.') {
                break;
            }
            let save = self.pos;
            self.pos += 1;
            if self.at_part_start() {
                parts.push(self.parse_part()?);
            } else if self.at_ident_start() {
                // Mangled separator: `1.0.rc.1` carries a prerelease after a dot.
                prerelease = Some(self.parse_prerelease());
            } else {
                self.pos = save;
                break;
            }
        }

        if prerelease.is_none() {
            if self.peek() == Some(b'-') && self.peek_at(1).is_some_and(is_ident_char) {
                self.pos += 1;
                prerelease = Some(self.parse_prerelease());
            } else if self.at_ident_start() {
                prerelease = Some(self.parse_prerelease());
            }
        }

        let mut build = None;
        if self.peek() == Some(b'+') {
            self.pos += 1;
            let start = self.pos;
            while self
                .peek()
                .is_some_and(|b| is_ident_char(b) || b == b'.')
            {
                self.pos += 1;
            }
            if self.pos == start {
                return Err(self.err_expected("build metadata after \"+\""));
            }
            build = Some(self.input[start..self.pos].to_string());
        }

        Ok(Version {
            parts,
            prerelease,
            build,
        })
    }

    fn parse_part(&mut self) -> Result<Part, ParseError> {
        self.tick("part")?;
        match self.peek() {
            Some(c @ (b'x' | b'X')) if !self.peek_at(1).is_some_and(is_ident_char) => {
                self.pos += 1;
                Ok(Part::Wild(c as char))
            }
            Some(b'*') => {
                self.pos += 1;
                Ok(Part::Wild('*'))
            }
            Some(c) if c.is_ascii_digit() => {
                let mut value: u64 = 0;
                while let Some(d) = self.peek().filter(u8::is_ascii_digit) {
                    value = value
                        .saturating_mul(10)
                        .saturating_add(u64::from(d - b'0'));
                    self.pos += 1;
                }
                Ok(Part::Num(value))
            }
            _ => Err(self.err_expected(EXPECTED_VERSION)),
        }
    }

    /// Dot-separated prerelease identifiers of `[0-9A-Za-z-]`, e.g. `rc.1`
    /// or `beta-1`. The cursor is known to sit on an identifier character.
    fn parse_prerelease(&mut self) -> String {
        let start = self.pos;
        loop {
            while self.peek().is_some_and(is_ident_char) {
                self.pos += 1;
            }
            if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(is_ident_char) {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.input[start..self.pos].to_string()
    }

    fn at_part_start(&self) -> bool {
        match self.peek() {
            Some(b'*') => true,
            Some(b'x' | b'X') => !self.peek_at(1).is_some_and(is_ident_char),
            Some(c) => c.is_ascii_digit(),
            None => false,
        }
    }

    fn at_ident_start(&self) -> bool {
        self.peek().is_some_and(|b| b.is_ascii_alphabetic())
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|b| matches!(b, b' ' | b'\t' | b'\n' | b'\r'))
        {
            self.pos += 1;
        }
        self.pos > start
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, ahead: usize) -> Option<u8> {
        self.bytes.get(self.pos + ahead).copied()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn tick(&mut self, rule: &'static str) -> Result<(), ParseError> {
        self.meter.tick(rule).map_err(|rule| {
            ParseError::at(
                self.input,
                self.pos,
                ParseErrorKind::BudgetExceeded { rule },
            )
        })
    }

    fn err_expected(&self, expected: &str) -> ParseError {
        ParseError::at(
            self.input,
            self.pos,
            ParseErrorKind::Syntax {
                expected: expected.to_string(),
            },
        )
    }
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-'
}

/// Groups parsed terms into OR alternatives of AND-ed comparators and renders
/// the canonical string.
fn assemble(items: Vec<(Option<Sep>, Term)>) -> String {
    let mut groups: Vec<(Vec<Term>, bool)> = Vec::new();
    let mut current: Vec<Term> = Vec::new();
    let mut comma_joined = false;

    for (sep, term) in items {
        let joins_and = match sep {
            None => {
                current.push(term);
                continue;
            }
            Some(Sep::Comma) => true,
            Some(Sep::DblPipe) => false,
            Some(Sep::Space) | Some(Sep::Pipe) => {
                current.last().is_some_and(Term::is_ordering) && term.is_ordering()
            }
        };
        if joins_and {
            if sep == Some(Sep::Comma) {
                comma_joined = true;
            }
            current.push(term);
        } else {
            groups.push((
                std::mem::take(&mut current),
                std::mem::replace(&mut comma_joined, false),
            ));
            current.push(term);
        }
    }
    groups.push((current, comma_joined));

    let mut out = String::new();
    for (i, (mut terms, comma)) in groups.into_iter().enumerate() {
        if i > 0 {
            out.push_str(" || ");
        }
        if comma && terms.iter().all(Term::is_ordering) {
            // Explicitly comma-joined bounds render lower bound first; the
            // sort is stable so space-joined order is never touched here.
            terms.sort_by_key(Term::bound_rank);
        }
        for (j, term) in terms.iter().enumerate() {
            if j > 0 {
                out.push_str(", ");
            }
            term.render(&mut out);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semver_version_passes_through() {
        assert_eq!(normalize("1.0.0-rc1").unwrap(), "1.0.0-rc1");
    }

    #[test]
    fn test_dotted_prerelease_separator_is_fixed() {
        assert_eq!(normalize("1.0.rc.1").unwrap(), "1.0.0-rc.1");
    }

    #[test]
    fn test_glued_prerelease_and_missing_patch() {
        assert_eq!(normalize("0.8.beta-1").unwrap(), "0.8.0-beta-1");
    }

    #[test]
    fn test_missing_components_are_filled() {
        assert_eq!(normalize("1.0").unwrap(), "1.0.0");
        assert_eq!(normalize("<0.8").unwrap(), "<0.8.0");
    }

    #[test]
    fn test_leading_zeros_collapse() {
        assert_eq!(normalize("0.08beta-1").unwrap(), "0.8.0-beta-1");
    }

    #[test]
    fn test_space_joined_bounds_become_comma_and() {
        assert_eq!(normalize(">=1.1.0 <=1.1.1").unwrap(), ">=1.1.0, <=1.1.1");
    }

    #[test]
    fn test_comma_and_is_kept() {
        assert_eq!(normalize(">=1.1.0, <=1.1.1").unwrap(), ">=1.1.0, <=1.1.1");
    }

    #[test]
    fn test_single_pipe_between_bounds_is_and() {
        assert_eq!(normalize(">=1.1.0|<=1.1.1").unwrap(), ">=1.1.0, <=1.1.1");
    }

    #[test]
    fn test_comma_joined_bounds_resort_lower_bound_first() {
        assert_eq!(normalize("<=1.1.1, >=1.1.0").unwrap(), ">=1.1.0, <=1.1.1");
    }

    #[test]
    fn test_space_joined_bounds_keep_their_order() {
        assert_eq!(normalize("<=1.1.1 >=1.1.0").unwrap(), "<=1.1.1, >=1.1.0");
    }

    #[test]
    fn test_hyphen_range_passes_through() {
        assert_eq!(normalize("1.1.0 - 1.1.1").unwrap(), "1.1.0 - 1.1.1");
    }

    #[test]
    fn test_caret_and_tilde_operands_are_filled() {
        assert_eq!(normalize("^1.1").unwrap(), "^1.1.0");
        assert_eq!(normalize("~1.1").unwrap(), "~1.1.0");
    }

    #[test]
    fn test_x_ranges_pass_through() {
        assert_eq!(normalize("1.1.x").unwrap(), "1.1.x");
        assert_eq!(normalize("1.1.X").unwrap(), "1.1.X");
        assert_eq!(normalize("1.1.*").unwrap(), "1.1.*");
        assert_eq!(normalize("*").unwrap(), "*");
    }

    #[test]
    fn test_comparator_spacing_is_dropped() {
        assert_eq!(normalize(">= 2.0.1").unwrap(), ">=2.0.1");
        assert_eq!(normalize("<=1.1.1").unwrap(), "<=1.1.1");
    }

    #[test]
    fn test_or_expression_is_kept() {
        assert_eq!(normalize(">=1.1.0 || <=1.1.1").unwrap(), ">=1.1.0 || <=1.1.1");
    }

    #[test]
    fn test_multi_range_keeps_grouping() {
        assert_eq!(
            normalize(">=1.3.0 <1.3.2 || >=1.4.0 <1.4.11 || >=1.5.0 <1.5.2").unwrap(),
            ">=1.3.0, <1.3.2 || >=1.4.0, <1.4.11 || >=1.5.0, <1.5.2"
        );
    }

    #[test]
    fn test_bare_versions_separated_by_space_or_pipe_are_or() {
        assert_eq!(
            normalize("2.0.0 2.0.0-x | 2.1.0-x 2.1.1 2.1.2").unwrap(),
            "2.0.0 || 2.0.0-x || 2.1.0-x || 2.1.1 || 2.1.2"
        );
    }

    #[test]
    fn test_complex_expression() {
        assert_eq!(
            normalize(">=0.08beta-1 || !1.rc.1 <=1.rc+build.543 || ^2 ~3 4.0.x").unwrap(),
            ">=0.8.0-beta-1 || !1.0.0-rc.1 || <=1.0.0-rc+build.543 || ^2.0.0 || ~3.0.0 || 4.0.x"
        );
    }

    #[test]
    fn test_negation_is_preserved() {
        assert_eq!(normalize("!1.0.0").unwrap(), "!1.0.0");
        assert_eq!(normalize("!=1.0.0").unwrap(), "!=1.0.0");
    }

    #[test]
    fn test_empty_input_is_a_parse_error() {
        let err = normalize("").unwrap_err();
        assert!(!err.is_budget_exceeded());
        assert_eq!((err.line, err.column, err.offset), (1, 1, 0));
    }

    #[test]
    fn test_garbage_is_a_syntax_error() {
        let err = normalize("not a version").unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::Syntax { .. }));
    }

    #[test]
    fn test_expression_budget_error_is_distinct() {
        let opts = ParseOptions {
            max_expressions: 1,
            ..Default::default()
        };
        let err = normalize_with("1.0.0-rc1", opts).unwrap_err();
        assert!(err.is_budget_exceeded());
        assert_eq!((err.line, err.column), (1, 1));
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let inputs = [
            "1.0.rc.1",
            "0.8.beta-1",
            ">=1.1.0 <=1.1.1",
            "<=1.1.1, >=1.1.0",
            "1.1.0 - 1.1.1",
            "^1.1",
            "1.1.x",
            ">=0.08beta-1 || !1.rc.1 <=1.rc+build.543 || ^2 ~3 4.0.x",
            "2.0.0 2.0.0-x | 2.1.0-x 2.1.1 2.1.2",
        ];
        for input in inputs {
            let once = normalize(input).unwrap();
            let twice = normalize(&once).unwrap();
            assert_eq!(once, twice, "not a fixed point for {input:?}");
        }
    }

    #[test]
    fn test_version_entrypoint_rejects_trailing_input() {
        let opts = ParseOptions {
            entrypoint: Entrypoint::Version,
            ..Default::default()
        };
        assert_eq!(normalize_with("1.0", opts).unwrap(), "1.0.0");
        assert!(normalize_with("1.0 2.0", opts).is_err());
    }

    #[test]
    fn test_memoize_does_not_change_output() {
        let opts = ParseOptions {
            memoize: true,
            ..Default::default()
        };
        let input = ">=1.3.0 <1.3.2 || >=1.4.0 <1.4.11";
        assert_eq!(
            normalize_with(input, opts).unwrap(),
            normalize(input).unwrap()
        );
    }

    #[test]
    fn test_traced_collects_statistics() {
        let mut stats = Stats::default();
        let out = normalize_traced("^1.1 || 2.0.x", ParseOptions::default(), &mut stats).unwrap();
        assert_eq!(out, "^1.1.0 || 2.0.x");
        assert!(stats.expressions > 0);
        assert!(stats.rules.contains_key("version"));
    }
}
