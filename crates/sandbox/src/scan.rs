// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Source scanner collecting the string arguments of `require(...)` calls.
//!
//! A character-level pass that skips comments and string literals, so a
//! `require` inside either is never collected. Dynamic requires (non-string
//! arguments) are ignored: only statically resolvable requests become part
//! of the dependency dictionary.

use thiserror::Error;

/// Scanner failure; maps to a parse error carrying the offending file.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScanError {
    #[error("unterminated string literal starting on line {line}")]
    UnterminatedString { line: usize },
    #[error("unterminated block comment starting on line {line}")]
    UnterminatedComment { line: usize },
    #[error("unterminated template literal starting on line {line}")]
    UnterminatedTemplate { line: usize },
}

struct Cursor {
    chars: Vec<char>,
    pos: usize,
    line: usize,
}

impl Cursor {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        if c == '\n' {
            self.line += 1;
        }
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

/// Collect the string argument of every `require("...")` call in `source`,
/// in order of appearance.
pub fn scan_requires(source: &str) -> Result<Vec<String>, ScanError> {
    let mut cursor = Cursor {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
    };
    let mut requests = Vec::new();

    while let Some(c) = cursor.peek() {
        match c {
            '/' if cursor.peek_at(1) == Some('/') => skip_line_comment(&mut cursor),
            '/' if cursor.peek_at(1) == Some('*') => skip_block_comment(&mut cursor)?,
            '\'' | '"' => {
                skip_string(&mut cursor, c)?;
            }
            '`' => skip_template(&mut cursor)?,
            c if is_ident_start(c) => {
                let ident = read_ident(&mut cursor);
                if ident == "require" {
                    if let Some(request) = try_read_call_argument(&mut cursor)? {
                        requests.push(request);
                    }
                }
            }
            _ => {
                cursor.bump();
            }
        }
    }

    Ok(requests)
}

fn read_ident(cursor: &mut Cursor) -> String {
    let mut ident = String::new();
    while matches!(cursor.peek(), Some(c) if is_ident_continue(c)) {
        if let Some(c) = cursor.bump() {
            ident.push(c);
        }
    }
    ident
}

/// After the identifier `require`: collect the argument if the call form
/// is `require("literal")` or `require('literal')`.
fn try_read_call_argument(cursor: &mut Cursor) -> Result<Option<String>, ScanError> {
    let before = cursor.pos;
    cursor.skip_whitespace();
    if cursor.peek() != Some('(') {
        cursor.pos = before;
        return Ok(None);
    }
    cursor.bump();
    cursor.skip_whitespace();
    match cursor.peek() {
        Some(quote @ ('\'' | '"')) => {
            cursor.bump();
            let content = read_string_content(cursor, quote)?;
            Ok(Some(content))
        }
        // Dynamic argument: leave the rest for the main loop.
        _ => Ok(None),
    }
}

fn skip_line_comment(cursor: &mut Cursor) {
    while let Some(c) = cursor.bump() {
        if c == '\n' {
            break;
        }
    }
}

fn skip_block_comment(cursor: &mut Cursor) -> Result<(), ScanError> {
    let line = cursor.line;
    cursor.bump();
    cursor.bump();
    loop {
        match cursor.peek() {
            None => return Err(ScanError::UnterminatedComment { line }),
            Some('*') if cursor.peek_at(1) == Some('/') => {
                cursor.bump();
                cursor.bump();
                return Ok(());
            }
            _ => {
                cursor.bump();
            }
        }
    }
}

/// Skip over a quoted string whose opening quote is at the cursor.
fn skip_string(cursor: &mut Cursor, quote: char) -> Result<(), ScanError> {
    cursor.bump();
    read_string_content(cursor, quote).map(|_| ())
}

/// Read a string body up to the closing quote (already past the opener).
fn read_string_content(cursor: &mut Cursor, quote: char) -> Result<String, ScanError> {
    let line = cursor.line;
    let mut content = String::new();
    loop {
        match cursor.bump() {
            None => return Err(ScanError::UnterminatedString { line }),
            Some('\\') => {
                if let Some(escaped) = cursor.bump() {
                    content.push(escaped);
                } else {
                    return Err(ScanError::UnterminatedString { line });
                }
            }
            Some(c) if c == quote => return Ok(content),
            Some('\n') => return Err(ScanError::UnterminatedString { line }),
            Some(c) => content.push(c),
        }
    }
}

/// Skip a template literal, including `${}` interpolations.
fn skip_template(cursor: &mut Cursor) -> Result<(), ScanError> {
    let line = cursor.line;
    cursor.bump();
    let mut interp_depth = 0usize;
    loop {
        match cursor.peek() {
            None => return Err(ScanError::UnterminatedTemplate { line }),
            Some('\\') => {
                cursor.bump();
                cursor.bump();
            }
            Some('$') if cursor.peek_at(1) == Some('{') => {
                interp_depth += 1;
                cursor.bump();
                cursor.bump();
            }
            Some('}') if interp_depth > 0 => {
                interp_depth -= 1;
                cursor.bump();
            }
            Some(q @ ('\'' | '"')) if interp_depth > 0 => {
                skip_string(cursor, q)?;
            }
            Some('`') if interp_depth == 0 => {
                cursor.bump();
                return Ok(());
            }
            _ => {
                cursor.bump();
            }
        }
    }
}

#[cfg(test)]
#[path = "scan_tests.rs"]
mod tests;
