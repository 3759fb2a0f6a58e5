//! Logical-line tokenizer (§4.2).
//!
//! Turns raw config text into a sequence of [`LogicalLine`]s, each a list of
//! argument strings, honoring quoting, escaping, backslash line-joining, `;`
//! line-splitting, and `#` comments. The scanning itself is a hand-rolled
//! character walk rather than a `winnow` grammar: line-joining is a stateful,
//! buffer-level concern (the historical implementation grows a line buffer
//! as it reads), not a context-free one, so it does not compose cleanly as
//! declarative combinators the way the importer's directive grammar does.

use crate::error::{Error, ParseDiagnostic};

/// Smallest initial size of the historical line buffer (§4.2). Rust's
/// growable `String` makes this purely documentary: buffer growth is no
/// longer something callers need to reason about.
pub const LINEBUF_MIN: usize = 32;

/// Hard ceiling on any single logical line's raw byte length (§4.2).
pub const LINEBUF_MAX: usize = 4096;

/// One logical line: a command keyword followed by its operands.
///
/// `args` is empty for blank lines and comment-only lines; callers that
/// only care about directives (the importer) skip those.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LogicalLine {
    /// 1-based physical line number on which this logical line began.
    pub line: usize,
    /// The logical line's whitespace/quote-delimited argument strings.
    pub args: Vec<String>,
}

/// Splits `input` into logical lines per §4.2's quoting and escaping rules.
pub fn tokenize(input: &str) -> Result<Vec<LogicalLine>, Error> {
    let mut scanner = Scanner::new(input);
    let mut lines = Vec::new();
    while let Some(line) = scanner.next_logical_line()? {
        lines.push(line);
    }
    Ok(lines)
}

/// A resumable token stream, for lenient-mode recovery (§4.6 "Error
/// recovery").
///
/// Unlike [`tokenize`], which aborts on the first malformed logical line,
/// this lets a caller (the importer) observe exactly where a line failed,
/// record a diagnostic, and resume scanning at the next physical line —
/// the same per-line exception boundary the importer applies to directive
/// errors, pushed down to the tokenizer level so an unterminated quote
/// does not take the rest of the file down with it.
#[derive(Debug)]
pub struct TokenStream<'a> {
    scanner: Scanner<'a>,
}

impl<'a> TokenStream<'a> {
    /// Creates a stream over `input`, positioned at its start.
    pub fn new(input: &'a str) -> Self {
        Self {
            scanner: Scanner::new(input),
        }
    }

    /// Returns the next logical line, `Ok(None)` at end of input, or `Err`
    /// if this logical line failed to tokenize.
    pub fn next_line(&mut self) -> Result<Option<LogicalLine>, Error> {
        self.scanner.next_logical_line()
    }

    /// Skips past the physical line on which the last error was detected,
    /// so scanning can resume. Returns `false` if there is no more input.
    pub fn recover(&mut self) -> bool {
        self.scanner.advance_line()
    }
}

struct Scanner<'a> {
    lines: Vec<&'a str>,
    line_idx: usize,
    col: usize,
    line_len: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            lines: input.lines().collect(),
            line_idx: 0,
            col: 0,
            line_len: 0,
        }
    }

    fn current_line_no(&self) -> usize {
        self.line_idx + 1
    }

    fn peek(&self) -> Option<char> {
        if self.line_idx >= self.lines.len() {
            return None;
        }
        self.lines[self.line_idx][self.col..].chars().next()
    }

    fn is_trailing_backslash(&self) -> bool {
        if self.line_idx >= self.lines.len() {
            return false;
        }
        self.lines[self.line_idx][self.col..].len() == 1
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.col += c.len_utf8();
        self.line_len += c.len_utf8();
        Some(c)
    }

    /// Moves to the start of the next physical line. Returns `false` (and
    /// parks the scanner at a past-the-end sentinel) if there is none.
    fn advance_line(&mut self) -> bool {
        if self.line_idx + 1 < self.lines.len() {
            self.line_idx += 1;
            self.col = 0;
            true
        } else {
            self.line_idx = self.lines.len();
            self.col = 0;
            false
        }
    }

    fn check_line_len(&self) -> Result<(), Error> {
        if self.line_len > LINEBUF_MAX {
            Err(Error::LineTooLong {
                line: self.current_line_no(),
                limit: LINEBUF_MAX,
            })
        } else {
            Ok(())
        }
    }

    fn parse_error(&self, reason: &str) -> Error {
        Error::Parse {
            diagnostic: ParseDiagnostic {
                line: self.current_line_no(),
                byte: self.col,
                reason: reason.to_string(),
            },
        }
    }

    /// Skips plain whitespace and top-level continuation backslashes (a
    /// trailing `\` with nothing to its right joins the next physical
    /// line without starting an argument).
    fn skip_spaces(&mut self) -> Result<(), Error> {
        loop {
            match self.peek() {
                Some(' ') | Some('\t') => {
                    self.advance();
                }
                Some('\\') if self.is_trailing_backslash() => {
                    self.advance();
                    if !self.advance_line() {
                        break;
                    }
                }
                _ => break,
            }
            self.check_line_len()?;
        }
        Ok(())
    }

    fn next_logical_line(&mut self) -> Result<Option<LogicalLine>, Error> {
        if self.line_idx >= self.lines.len() {
            return Ok(None);
        }
        let start_line = self.current_line_no();
        self.line_len = 0;
        let mut args = Vec::new();

        loop {
            self.skip_spaces()?;
            match self.peek() {
                None => {
                    self.advance_line();
                    break;
                }
                Some('#') => {
                    self.col = self.lines[self.line_idx].len();
                    self.advance_line();
                    break;
                }
                Some(';') => {
                    self.advance();
                    break;
                }
                _ => {
                    let arg = self.read_argument()?;
                    args.push(arg);
                }
            }
        }

        Ok(Some(LogicalLine {
            line: start_line,
            args,
        }))
    }

    fn read_argument(&mut self) -> Result<String, Error> {
        let mut buf = String::new();
        loop {
            match self.peek() {
                None | Some(' ') | Some('\t') | Some('#') | Some(';') => break,
                Some('\'') => self.read_single_quoted(&mut buf)?,
                Some('"') => self.read_double_quoted(&mut buf)?,
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        None => {
                            if !self.advance_line() {
                                break;
                            }
                        }
                        Some(_) => buf.push(self.advance().expect("peeked")),
                    }
                }
                Some(_) => buf.push(self.advance().expect("peeked")),
            }
            self.check_line_len()?;
        }
        Ok(buf)
    }

    fn read_single_quoted(&mut self, buf: &mut String) -> Result<(), Error> {
        self.advance();
        loop {
            match self.peek() {
                None => return Err(self.parse_error("unterminated '")),
                Some('\'') => {
                    self.advance();
                    break;
                }
                Some(_) => buf.push(self.advance().expect("peeked")),
            }
            self.check_line_len()?;
        }
        Ok(())
    }

    fn read_double_quoted(&mut self, buf: &mut String) -> Result<(), Error> {
        self.advance();
        loop {
            match self.peek() {
                None => return Err(self.parse_error("unterminated \"")),
                Some('"') => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        None => {
                            if !self.advance_line() {
                                return Err(self.parse_error("unterminated \""));
                            }
                        }
                        Some(_) => buf.push(self.advance().expect("peeked")),
                    }
                }
                Some(_) => buf.push(self.advance().expect("peeked")),
            }
            self.check_line_len()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn args(input: &str) -> Vec<Vec<String>> {
        tokenize(input)
            .unwrap()
            .into_iter()
            .map(|l| l.args)
            .filter(|a| !a.is_empty())
            .collect()
    }

    #[test]
    fn splits_on_whitespace_and_honors_quotes() {
        let lines = args("config interface 'lan'\n\toption proto static\n");
        assert_eq!(
            lines,
            vec![
                vec!["config", "interface", "lan"],
                vec!["option", "proto", "static"],
            ]
        );
    }

    #[test]
    fn comment_and_blank_lines_are_dropped() {
        let lines = args("# a comment\n\nconfig foo\n");
        assert_eq!(lines, vec![vec!["config", "foo"]]);
    }

    #[test]
    fn semicolon_splits_logical_lines() {
        let lines = args("option a 1; option b 2\n");
        assert_eq!(
            lines,
            vec![vec!["option", "a", "1"], vec!["option", "b", "2"]]
        );
    }

    #[test]
    fn backslash_newline_joins_physical_lines() {
        let lines = args("option a 'long \\\nvalue'\n");
        assert_eq!(lines, vec![vec!["option", "a", "long value"]]);
    }

    #[test]
    fn unterminated_single_quote_is_a_parse_error() {
        let err = tokenize("option a 'unterminated\n").unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn double_quote_escape_copies_next_byte_verbatim() {
        let lines = args("option a \"say \\\"hi\\\"\"\n");
        assert_eq!(lines, vec![vec!["option", "a", "say \"hi\""]]);
    }

    #[test]
    fn line_too_long_is_rejected() {
        let huge = "a".repeat(LINEBUF_MAX + 1);
        let input = format!("option a {huge}\n");
        let err = tokenize(&input).unwrap_err();
        assert!(matches!(err, Error::LineTooLong { .. }));
    }

    #[rstest]
    #[case::bare_word("option a plain", vec!["option", "a", "plain"])]
    #[case::single_quoted_opaque("option a 'no \\n escapes here'", vec!["option", "a", "no \\n escapes here"])]
    #[case::double_quoted_escape("option a \"a\\ b\"", vec!["option", "a", "a b"])]
    #[case::mixed_quoting("option a 'x'\"y\"z", vec!["option", "a", "xyz"])]
    #[case::hash_comment_ends_line("option a 1 # trailing comment", vec!["option", "a", "1"])]
    fn tokenizes_one_argument_style_per_case(#[case] input: &str, #[case] expected: Vec<&str>) {
        let lines = args(&format!("{input}\n"));
        assert_eq!(lines, vec![expected.into_iter().map(String::from).collect::<Vec<_>>()]);
    }
}
