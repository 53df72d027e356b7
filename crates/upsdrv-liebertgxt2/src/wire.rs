// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A standalone line-oriented reader/writer for the driver endpoint
//! protocol. `upsd`'s own tokenizer lives in its private `protocol`/`link`
//! modules and can't be linked against from here, so this is an
//! independent implementation of the same whitespace/quote grammar the
//! daemon speaks on the other end of the socket.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub struct LineLink<S> {
    stream: S,
}

#[derive(Debug)]
pub enum LineEvent {
    Line(Vec<String>),
    Eof,
}

impl<S> LineLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Read one line and split it on whitespace, honouring `"`-quoted
    /// tokens (with literal interior whitespace) and `\`-escapes, same as
    /// the client-facing protocol.
    pub async fn read_line(&mut self) -> std::io::Result<LineEvent> {
        let mut raw = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = self.stream.read(&mut byte).await?;
            if n == 0 {
                return Ok(LineEvent::Eof);
            }
            if byte[0] == b'\n' {
                break;
            }
            raw.push(byte[0]);
        }

        let line = String::from_utf8_lossy(&raw);
        let tokens = tokenize(&line);
        Ok(LineEvent::Line(tokens))
    }

    pub async fn write_line(&mut self, tokens: &[impl AsRef<str>]) -> std::io::Result<()> {
        let mut line = String::new();
        for (i, token) in tokens.iter().enumerate() {
            if i > 0 {
                line.push(' ');
            }
            line.push_str(&quote(token.as_ref()));
        }
        line.push('\n');
        self.stream.write_all(line.as_bytes()).await
    }
}

fn quote(token: &str) -> String {
    if token.is_empty() || token.chars().any(|c| c.is_whitespace() || c == '"' || c == '\\') {
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
    } else {
        token.to_owned()
    }
}

fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut have_token = false;
    let mut in_quotes = false;
    let mut escape = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        if escape {
            current.push(c);
            have_token = true;
            escape = false;
            continue;
        }
        match c {
            '\\' => escape = true,
            '"' => {
                in_quotes = !in_quotes;
                have_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if have_token {
                    tokens.push(std::mem::take(&mut current));
                    have_token = false;
                }
            }
            c => {
                current.push(c);
                have_token = true;
            }
        }
    }
    if have_token {
        tokens.push(current);
    }
    tokens
}
