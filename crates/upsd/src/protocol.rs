// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Whitespace/quote-aware line tokenizer shared by the client wire protocol,
//! the driver ingress protocol, and the `upsd.conf`/`ups.conf`/`upsd.users`
//! config file readers.
//!
//! Tokens are separated by runs of spaces or tabs. A token may be quoted with
//! `"`, inside which whitespace is literal and `\` escapes the following
//! byte. A bare `\` outside quotes escapes the next byte. A bare `\n`
//! terminates the current line; a line with zero tokens is dropped silently.

/// Longest single token accepted before the stream is considered malformed.
const MAX_TOKEN_LEN: usize = 256;
/// Longest line (in tokens-plus-separators) accepted before the stream is
/// considered malformed.
const MAX_LINE_LEN: usize = 512;

/// Result of feeding one byte into a [`Tokenizer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No complete line yet; keep feeding bytes.
    Pending,
    /// A full, non-empty argument vector is ready.
    Complete(Vec<String>),
    /// The stream is malformed; the caller must drop the connection.
    Error(String),
}

/// Per-stream tokenizer state. One instance per driver connection or client
/// connection; config files build a throwaway instance per line (see
/// [`tokenize_line`]).
#[derive(Debug, Default)]
pub struct Tokenizer {
    token: Vec<u8>,
    vector: Vec<String>,
    in_quotes: bool,
    escape: bool,
    have_token: bool,
    line_len: usize,
    errored: bool,
}

impl Tokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(&mut self, msg: &str) -> Outcome {
        self.errored = true;
        Outcome::Error(msg.to_owned())
    }

    fn reset_line(&mut self) {
        self.token.clear();
        self.vector.clear();
        self.in_quotes = false;
        self.escape = false;
        self.have_token = false;
        self.line_len = 0;
    }

    /// Close out the current token, decoding its accumulated raw bytes as
    /// UTF-8. Bytes are kept raw (not widened to `char`) while accumulating
    /// so multi-byte sequences survive intact.
    fn finish_token(&mut self) -> Result<(), String> {
        if self.have_token {
            let bytes = std::mem::take(&mut self.token);
            let token = String::from_utf8(bytes).map_err(|_| "invalid utf-8 in token".to_owned())?;
            self.vector.push(token);
            self.have_token = false;
        }
        Ok(())
    }

    /// Feed one byte. Once [`Outcome::Error`] has been returned, further
    /// calls keep returning the same error — the caller is expected to drop
    /// the session rather than keep feeding.
    pub fn feed(&mut self, byte: u8) -> Outcome {
        if self.errored {
            return Outcome::Error("stream already errored".to_owned());
        }

        self.line_len += 1;
        if self.line_len > MAX_LINE_LEN {
            return self.fail("line too long");
        }

        if self.escape {
            self.escape = false;
            self.token.push(byte);
            self.have_token = true;
            if self.token.len() > MAX_TOKEN_LEN {
                return self.fail("token too long");
            }
            return Outcome::Pending;
        }

        match byte {
            b'\\' => {
                self.escape = true;
                Outcome::Pending
            }
            b'"' => {
                self.in_quotes = !self.in_quotes;
                self.have_token = true;
                Outcome::Pending
            }
            b' ' | b'\t' if !self.in_quotes => match self.finish_token() {
                Ok(()) => Outcome::Pending,
                Err(e) => self.fail(&e),
            },
            b'\n' if !self.in_quotes => {
                if let Err(e) = self.finish_token() {
                    return self.fail(&e);
                }
                let vector = std::mem::take(&mut self.vector);
                self.reset_line();
                if vector.is_empty() {
                    Outcome::Pending
                } else {
                    Outcome::Complete(vector)
                }
            }
            _ => {
                self.token.push(byte);
                self.have_token = true;
                if self.token.len() > MAX_TOKEN_LEN {
                    return self.fail("token too long");
                }
                Outcome::Pending
            }
        }
    }

    /// True if a quote is open with no closing `"` yet — used to report an
    /// unterminated quote when the underlying stream closes mid-line.
    pub fn in_quotes(&self) -> bool {
        self.in_quotes
    }
}

/// Tokenize a single line (without its trailing newline) to completion,
/// for use by the config-file readers which already operate on whole lines.
pub fn tokenize_line(line: &str) -> Result<Vec<String>, String> {
    let mut tok = Tokenizer::new();
    for byte in line.bytes() {
        match tok.feed(byte) {
            Outcome::Pending => {}
            Outcome::Error(e) => return Err(e),
            Outcome::Complete(_) => unreachable!("no newline fed yet"),
        }
    }
    match tok.feed(b'\n') {
        Outcome::Pending => Ok(vec![]),
        Outcome::Complete(v) => Ok(v),
        Outcome::Error(e) => {
            if tok.in_quotes() {
                Err("unterminated quote".to_owned())
            } else {
                Err(e)
            }
        }
    }
}

/// Quote `token` per the protocol's rules if it contains whitespace, quotes,
/// backslashes, or is empty. Round-tripping an unquoted token through
/// [`tokenize_line`] must reproduce it exactly.
pub fn quote_token(token: &str) -> String {
    let needs_quoting =
        token.is_empty() || token.chars().any(|c| c == ' ' || c == '\t' || c == '"' || c == '\\');

    if !needs_quoting {
        return token.to_owned();
    }

    let mut out = String::with_capacity(token.len() + 2);
    out.push('"');
    for c in token.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

/// Render a full argument vector as one protocol line (without the trailing
/// newline), quoting tokens as needed.
pub fn render_vector(args: &[impl AsRef<str>]) -> String {
    args.iter().map(|a| quote_token(a.as_ref())).collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
