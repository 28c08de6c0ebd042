//! Line tokenization under a separator/quote/escape triple.
//!
//! The tokenizer is a runtime-chosen strategy: `Delimited` splits on the
//! separator outside quoted spans, `Whitespace` additionally collapses runs
//! of whitespace into one delimiter. Quoted spans may contain the separator
//! and literal newlines; a physical line with an odd number of unescaped
//! quotes is incomplete and [`LogicalRows`] joins it with the following
//! physical line(s) before tokenization.

use std::io::{self, BufRead};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerMode {
    /// Split on every separator occurrence outside quotes.
    Delimited,
    /// Collapse runs of whitespace into a single delimiter.
    Whitespace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tokenizer {
    pub separator: char,
    pub quote: char,
    pub escape: char,
    pub mode: TokenizerMode,
}

impl Tokenizer {
    pub fn new(separator: char, quote: char, escape: char, merge_delimiters: bool) -> Self {
        let mode = if merge_delimiters {
            TokenizerMode::Whitespace
        } else {
            TokenizerMode::Delimited
        };
        Self {
            separator,
            quote,
            escape,
            mode,
        }
    }

    fn is_separator(&self, c: char) -> bool {
        c == self.separator || (self.mode == TokenizerMode::Whitespace && c.is_whitespace())
    }

    /// Split one logical line into ordered field strings.
    pub fn tokenize(&self, line: &str) -> Vec<String> {
        let mut fields = Vec::new();
        let mut field = String::new();
        let mut quoted = false;
        let mut in_quotes = false;
        let mut chars = line.chars().peekable();

        while let Some(c) = chars.next() {
            if in_quotes && c == self.escape && chars.peek() == Some(&self.quote) {
                field.push(self.quote);
                chars.next();
            } else if c == self.quote {
                if in_quotes && chars.peek() == Some(&self.quote) {
                    // Doubled quote inside a quoted span is a literal quote.
                    field.push(self.quote);
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                    quoted = true;
                }
            } else if !in_quotes && self.is_separator(c) {
                match self.mode {
                    TokenizerMode::Delimited => {
                        fields.push(std::mem::take(&mut field));
                        quoted = false;
                    }
                    TokenizerMode::Whitespace => {
                        if !field.is_empty() || quoted {
                            fields.push(std::mem::take(&mut field));
                            quoted = false;
                        }
                    }
                }
            } else {
                field.push(c);
            }
        }

        match self.mode {
            TokenizerMode::Delimited => fields.push(field),
            TokenizerMode::Whitespace => {
                if !field.is_empty() || quoted {
                    fields.push(field);
                }
            }
        }
        fields
    }

    /// True when `line` contains an odd number of unescaped quote
    /// characters, meaning a quoted field continues on the next line.
    pub fn unbalanced_quotes(&self, line: &str) -> bool {
        let mut count = 0usize;
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            if c == self.escape && chars.peek() == Some(&self.quote) {
                chars.next();
            } else if c == self.quote {
                count += 1;
            }
        }
        count % 2 == 1
    }
}

/// One logical row: joined physical lines, numbered by logical position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalRow {
    /// 0-based logical row index within the stream.
    pub index: usize,
    /// Row text without the trailing line terminator. Multi-line quoted
    /// fields keep their embedded newlines verbatim.
    pub text: String,
}

/// Iterator over logical rows of a byte stream.
pub struct LogicalRows<R> {
    reader: R,
    tokenizer: Tokenizer,
    next_index: usize,
}

impl<R: BufRead> LogicalRows<R> {
    pub fn new(reader: R, tokenizer: Tokenizer) -> Self {
        Self {
            reader,
            tokenizer,
            next_index: 0,
        }
    }
}

fn strip_line_ending(line: &mut String) {
    if line.ends_with('\n') {
        line.pop();
    }
    if line.ends_with('\r') {
        line.pop();
    }
}

impl<R: BufRead> Iterator for LogicalRows<R> {
    type Item = io::Result<LogicalRow>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut text = String::new();
        match self.reader.read_line(&mut text) {
            Ok(0) => return None,
            Ok(_) => {}
            Err(err) => return Some(Err(err)),
        }
        strip_line_ending(&mut text);

        while self.tokenizer.unbalanced_quotes(&text) {
            let mut cont = String::new();
            match self.reader.read_line(&mut cont) {
                Ok(0) => break,
                Ok(_) => {}
                Err(err) => return Some(Err(err)),
            }
            strip_line_ending(&mut cont);
            text.push('\n');
            text.push_str(&cont);
        }

        let row = LogicalRow {
            index: self.next_index,
            text,
        };
        self.next_index += 1;
        Some(Ok(row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn csv_tok() -> Tokenizer {
        Tokenizer::new(',', '"', '\\', false)
    }

    #[test]
    fn splits_on_separator() {
        assert_eq!(csv_tok().tokenize("a,b,c"), vec!["a", "b", "c"]);
        assert_eq!(csv_tok().tokenize("a,,c"), vec!["a", "", "c"]);
        assert_eq!(csv_tok().tokenize(",x,"), vec!["", "x", ""]);
    }

    #[test]
    fn quoted_separator_is_literal() {
        assert_eq!(
            csv_tok().tokenize("\"hello, world\",1"),
            vec!["hello, world", "1"]
        );
    }

    #[test]
    fn doubled_quote_folds_to_one() {
        assert_eq!(
            csv_tok().tokenize("\"10 \"\"quoted\"\" data\",x"),
            vec!["10 \"quoted\" data", "x"]
        );
    }

    #[test]
    fn escaped_quote_is_stripped() {
        assert_eq!(
            csv_tok().tokenize("\"say \\\"hi\\\"\",x"),
            vec!["say \"hi\"", "x"]
        );
    }

    #[test]
    fn whitespace_mode_collapses_runs() {
        let tok = Tokenizer::new(' ', '"', '\\', true);
        assert_eq!(tok.tokenize("Australia  male   10"), vec![
            "Australia",
            "male",
            "10"
        ]);
        assert_eq!(tok.tokenize("  lead and trail  "), vec!["lead", "and", "trail"]);
        // Tabs count as whitespace in this mode.
        assert_eq!(tok.tokenize("a \t b"), vec!["a", "b"]);
    }

    #[test]
    fn whitespace_mode_keeps_empty_quoted_field() {
        let tok = Tokenizer::new(' ', '"', '\\', true);
        assert_eq!(tok.tokenize("\"\" x"), vec!["", "x"]);
    }

    #[test]
    fn unbalanced_quotes_detection() {
        let tok = csv_tok();
        assert!(tok.unbalanced_quotes("\"open"));
        assert!(!tok.unbalanced_quotes("\"closed\""));
        assert!(!tok.unbalanced_quotes("\"a\"\"b\""));
        assert!(!tok.unbalanced_quotes("\"a\\\"b\""));
    }

    #[test]
    fn logical_rows_join_multiline_quoted_field() {
        let data = "a,\"first\nsecond\",c\nd,e,f\n";
        let rows: Vec<_> = LogicalRows::new(Cursor::new(data), csv_tok())
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].index, 0);
        assert_eq!(rows[0].text, "a,\"first\nsecond\",c");
        assert_eq!(csv_tok().tokenize(&rows[0].text), vec![
            "a",
            "first\nsecond",
            "c"
        ]);
        assert_eq!(rows[1].text, "d,e,f");
    }

    #[test]
    fn logical_rows_strip_crlf_on_continuations() {
        let data = "a,\"x\r\ny\",b\r\n";
        let rows: Vec<_> = LogicalRows::new(Cursor::new(data), csv_tok())
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text, "a,\"x\ny\",b");
    }
}
