//! yarn.lock block-format grammar.
//!
//! A yarn v1 lockfile is line oriented: a comment/header region, then blocks.
//! Each block opens with one or more comma-separated descriptors (quoted or
//! bare) ending in `:`, and indents key/value lines, one of which carries the
//! resolved `version "x.y.z"`. Nested sub-blocks such as `dependencies:` are
//! insignificant here.
//!
//! ```text
//! "@scope/name@^1.0.0", "@scope/name@^1.1.0":
//!   version "1.2.3"
//!   resolved "https://registry.yarnpkg.com/..."
//!   dependencies:
//!     left-pad "^1.3.0"
//! ```
//!
//! [`parse_yarn_lock`] flattens the blocks into one [`Package`] per
//! descriptor, all sharing the block's resolved version. Malformed input is a
//! hard [`ParseError`] with a 1-based line/column; the expression budget of
//! [`ParseOptions`] is honored and surfaces as the distinct budget error.

use super::{Meter, ParseError, ParseErrorKind, ParseOptions, Stats};
use crate::model::Package;

/// Name attached to positions in errors coming out of this grammar.
pub const SOURCE_NAME: &str = "yarn.lock";

/// Parses the full text of a yarn lockfile into a flat package list.
///
/// # Errors
///
/// Returns a [`ParseError`] on the first line that fits neither the
/// comment/header region nor a block, on a descriptor without a `name@range`
/// shape, on a block with no `version` line, and when the expression budget
/// runs out.
pub fn parse_yarn_lock(input: &str, opts: ParseOptions) -> Result<Vec<Package>, ParseError> {
    LockParser::new(input, opts, None).parse()
}

/// Like [`parse_yarn_lock`], collecting choice-point statistics into `stats`.
pub fn parse_yarn_lock_traced(
    input: &str,
    opts: ParseOptions,
    stats: &mut Stats,
) -> Result<Vec<Package>, ParseError> {
    LockParser::new(input, opts, Some(stats)).parse()
}

/// An open block: descriptor names waiting for the version line.
struct Block {
    names: Vec<String>,
    version: Option<String>,
    /// Position of the header, for errors when no version line shows up.
    line: usize,
    offset: usize,
}

struct LockParser<'a, 's> {
    input: &'a str,
    meter: Meter<'s>,
}

impl<'a, 's> LockParser<'a, 's> {
    fn new(input: &'a str, opts: ParseOptions, stats: Option<&'s mut Stats>) -> Self {
        Self {
            input,
            meter: Meter::new(&opts, stats),
        }
    }

    fn parse(mut self) -> Result<Vec<Package>, ParseError> {
        self.tick("input", 0, 1, 1)?;

        let mut packages = Vec::new();
        let mut block: Option<Block> = None;
        let mut offset = 0;

        let input = self.input;
        for (index, raw_line) in input.split('\n').enumerate() {
            let line_no = index + 1;
            let line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
            self.tick("line", offset, line_no, 1)?;

            if line.trim().is_empty() || line.trim_start().starts_with('#') {
                // Blank lines and comments are insignificant anywhere.
            } else if line.starts_with(' ') || line.starts_with('\t') {
                let Some(open) = block.as_mut() else {
                    return Err(self.err(
                        offset,
                        line_no,
                        1,
                        "a block header before indented entries",
                    ));
                };
                self.entry_line(line, line_no, offset, open)?;
            } else {
                // A new header closes the open block.
                if let Some(done) = block.take() {
                    self.close_block(done, &mut packages)?;
                }
                block = Some(self.header_line(line, line_no, offset)?);
            }

            offset += raw_line.len() + 1;
        }

        if let Some(done) = block.take() {
            self.close_block(done, &mut packages)?;
        }

        Ok(packages)
    }

    /// Emits one package per descriptor once a block is complete.
    fn close_block(&self, block: Block, packages: &mut Vec<Package>) -> Result<(), ParseError> {
        match block.version {
            Some(version) => {
                for name in block.names {
                    packages.push(Package::new(name, version.clone()));
                }
                Ok(())
            }
            None => Err(self.missing_version(&block)),
        }
    }

    /// Parses a non-indented block header: comma-separated descriptors with a
    /// trailing `:`.
    fn header_line(&mut self, line: &str, line_no: usize, offset: usize) -> Result<Block, ParseError> {
        self.tick("header", offset, line_no, 1)?;

        let trimmed = line.trim_end();
        let Some(descriptors) = trimmed.strip_suffix(':') else {
            return Err(self.err(
                offset,
                line_no,
                1,
                "a block header ending with \":\" or \"#\"",
            ));
        };

        let mut names = Vec::new();
        for (start, descriptor) in split_descriptors(descriptors) {
            self.tick("descriptor", offset + start, line_no, start + 1)?;
            let text = unquote(descriptor.trim());
            let name = match text.rfind('@') {
                // A leading `@` belongs to the scope, not the range split.
                Some(at) if at > 0 => &text[..at],
                _ => {
                    return Err(self.err(
                        offset + start,
                        line_no,
                        start + 1,
                        "a \"name@range\" descriptor",
                    ));
                }
            };
            if name.is_empty() {
                return Err(self.err(
                    offset + start,
                    line_no,
                    start + 1,
                    "a package name before \"@\"",
                ));
            }
            names.push(name.to_string());
        }
        if names.is_empty() {
            return Err(self.err(offset, line_no, 1, "at least one descriptor"));
        }

        Ok(Block {
            names,
            line: line_no,
            offset,
            version: None,
        })
    }

    /// Parses an indented line inside a block. Only the two-space key/value
    /// level matters; deeper indentation belongs to nested sub-blocks like
    /// `dependencies:` and is skipped.
    fn entry_line(
        &mut self,
        line: &str,
        line_no: usize,
        offset: usize,
        block: &mut Block,
    ) -> Result<(), ParseError> {
        self.tick("entry", offset, line_no, 1)?;

        let indent = line.len() - line.trim_start().len();
        let content = line.trim();
        if indent >= 4 || content.ends_with(':') {
            // Nested sub-block content.
            return Ok(());
        }

        let (key, value) = match content.split_once(char::is_whitespace) {
            Some((key, value)) => (key, value.trim()),
            None => (content, ""),
        };
        if key == "version" {
            let version = unquote(value);
            if version.is_empty() {
                let col = indent + "version".len() + 2;
                return Err(self.err(offset + col - 1, line_no, col, "a quoted version"));
            }
            block.version = Some(version.to_string());
        }
        Ok(())
    }

    fn missing_version(&self, block: &Block) -> ParseError {
        self.err(
            block.offset,
            block.line,
            1,
            "a \"version\" entry for the block",
        )
    }

    fn err(&self, offset: usize, line: usize, column: usize, expected: &str) -> ParseError {
        ParseError::new(
            offset,
            line,
            column,
            ParseErrorKind::Syntax {
                expected: expected.to_string(),
            },
        )
        .with_source_name(SOURCE_NAME)
    }

    fn tick(
        &mut self,
        rule: &'static str,
        offset: usize,
        line: usize,
        column: usize,
    ) -> Result<(), ParseError> {
        self.meter.tick(rule).map_err(|rule| {
            ParseError::new(offset, line, column, ParseErrorKind::BudgetExceeded { rule })
                .with_source_name(SOURCE_NAME)
        })
    }
}

/// Splits a header's descriptor list on commas outside double quotes,
/// yielding each descriptor with its starting column offset (0-based).
fn split_descriptors(text: &str) -> Vec<(usize, &str)> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                out.push((start, &text[start..i]));
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push((start, &text[start..]));
    out.retain(|(_, d)| !d.trim().is_empty());
    out
}

fn unquote(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = r#"# THIS IS AN AUTOGENERATED FILE. DO NOT EDIT THIS FILE DIRECTLY.
# yarn lockfile v1


bassmaster@^1.0.0:
  version "1.0.0"
  resolved "https://registry.yarnpkg.com/bassmaster/-/bassmaster-1.0.0.tgz#abc"
  dependencies:
    hoek "1.x.x"

hoek@1.x.x:
  version "1.5.2"
  resolved "https://registry.yarnpkg.com/hoek/-/hoek-1.5.2.tgz#def"
"#;

    #[test]
    fn test_simple_lockfile() {
        let packages = parse_yarn_lock(SIMPLE, ParseOptions::default()).unwrap();
        assert_eq!(
            packages,
            vec![
                Package::new("bassmaster", "1.0.0"),
                Package::new("hoek", "1.5.2"),
            ]
        );
    }

    #[test]
    fn test_comments_only_is_an_empty_list() {
        let input = "# yarn lockfile v1\n\n";
        let packages = parse_yarn_lock(input, ParseOptions::default()).unwrap();
        assert!(packages.is_empty());
    }

    #[test]
    fn test_empty_input_is_an_empty_list() {
        let packages = parse_yarn_lock("", ParseOptions::default()).unwrap();
        assert!(packages.is_empty());
    }

    #[test]
    fn test_grouped_descriptors_share_the_block_version() {
        let input = "\"left-pad@^1.0.0\", left-pad@^1.1.0:\n  version \"1.1.3\"\n";
        let packages = parse_yarn_lock(input, ParseOptions::default()).unwrap();
        assert_eq!(
            packages,
            vec![
                Package::new("left-pad", "1.1.3"),
                Package::new("left-pad", "1.1.3"),
            ]
        );
    }

    #[test]
    fn test_scoped_descriptor_keeps_the_scope() {
        let input = "\"@babel/code-frame@^7.0.0\":\n  version \"7.0.0\"\n";
        let packages = parse_yarn_lock(input, ParseOptions::default()).unwrap();
        assert_eq!(packages, vec![Package::new("@babel/code-frame", "7.0.0")]);
    }

    #[test]
    fn test_quoted_range_with_comma_stays_one_descriptor() {
        let input = "\"semver@>=1.0.0, <2.0.0\":\n  version \"1.3.0\"\n";
        let packages = parse_yarn_lock(input, ParseOptions::default()).unwrap();
        assert_eq!(packages, vec![Package::new("semver", "1.3.0")]);
    }

    #[test]
    fn test_json_input_is_a_syntax_error_at_line_one() {
        let err = parse_yarn_lock("{\n  \"name\": \"x\"\n}\n", ParseOptions::default())
            .unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::Syntax { .. }));
        assert_eq!(err.source_name.as_deref(), Some(SOURCE_NAME));
        assert_eq!((err.line, err.column), (1, 1));
    }

    #[test]
    fn test_block_without_version_is_an_error_at_the_header() {
        let input = "# header\n\nbassmaster@^1.0.0:\n  resolved \"https://x\"\n";
        let err = parse_yarn_lock(input, ParseOptions::default()).unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::Syntax { .. }));
        assert_eq!((err.line, err.column), (3, 1));
    }

    #[test]
    fn test_descriptor_without_range_is_an_error() {
        let input = "bassmaster:\n  version \"1.0.0\"\n";
        let err = parse_yarn_lock(input, ParseOptions::default()).unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::Syntax { .. }));
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_indented_entry_before_any_block_is_an_error() {
        let input = "  version \"1.0.0\"\n";
        let err = parse_yarn_lock(input, ParseOptions::default()).unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::Syntax { .. }));
    }

    #[test]
    fn test_budget_error_is_distinct_and_positioned_at_the_start() {
        let opts = ParseOptions {
            max_expressions: 1,
            ..Default::default()
        };
        let err = parse_yarn_lock(SIMPLE, opts).unwrap_err();
        assert!(err.is_budget_exceeded());
        assert_eq!((err.line, err.column, err.offset), (1, 1, 0));
        assert_eq!(err.source_name.as_deref(), Some(SOURCE_NAME));
    }

    #[test]
    fn test_crlf_lines_parse() {
        let input = "pkg@^1.0.0:\r\n  version \"1.0.1\"\r\n";
        let packages = parse_yarn_lock(input, ParseOptions::default()).unwrap();
        assert_eq!(packages, vec![Package::new("pkg", "1.0.1")]);
    }

    #[test]
    fn test_traced_collects_statistics() {
        let mut stats = Stats::default();
        let packages =
            parse_yarn_lock_traced(SIMPLE, ParseOptions::default(), &mut stats).unwrap();
        assert_eq!(packages.len(), 2);
        assert!(stats.rules.contains_key("header"));
    }
}
