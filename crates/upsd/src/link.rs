// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! A tokenized-line reader/writer over any async byte stream. Shared by the
//! driver endpoint and the client session handler, which otherwise speak the
//! identical wire syntax (spec.md §4.1) over different transports.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::{render_vector, Outcome, Tokenizer};

pub struct LineLink<S> {
    stream: S,
    tok: Tokenizer,
}

/// One line's worth of tokens, or the reason the link can no longer produce
/// one.
#[derive(Debug)]
pub enum LineEvent {
    Line(Vec<String>),
    Eof,
    Protocol(String),
}

impl<S> LineLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self { stream, tok: Tokenizer::new() }
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Read bytes until a complete, non-empty tokenized line arrives.
    pub async fn read_line(&mut self) -> std::io::Result<LineEvent> {
        let mut byte = [0u8; 1];
        loop {
            let n = self.stream.read(&mut byte).await?;
            if n == 0 {
                return Ok(if self.tok.in_quotes() {
                    LineEvent::Protocol("connection closed inside quoted token".to_owned())
                } else {
                    LineEvent::Eof
                });
            }
            match self.tok.feed(byte[0]) {
                Outcome::Pending => continue,
                Outcome::Complete(vector) => return Ok(LineEvent::Line(vector)),
                Outcome::Error(msg) => return Ok(LineEvent::Protocol(msg)),
            }
        }
    }

    pub async fn write_line(&mut self, tokens: &[impl AsRef<str>]) -> std::io::Result<()> {
        let mut line = render_vector(tokens);
        line.push('\n');
        self.stream.write_all(line.as_bytes()).await
    }

    pub async fn write_raw_line(&mut self, line: &str) -> std::io::Result<()> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\n").await
    }

    pub async fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush().await
    }
}
