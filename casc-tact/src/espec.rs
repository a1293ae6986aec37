//! Encoding-profile parser
//!
//! Profile strings in the encoding table's string block describe how a
//! file should be cut into chunks and which mode encodes each one:
//!
//! ```text
//! z
//! 256K*=z
//! 16384=n,1M*=z:9
//! b:{164=z,16K*=e:{237DAC,83F6,z}}
//! ```
//!
//! A profile is a comma-separated list of blocks. A block optionally opens
//! with a size (`K`/`M` multipliers, trailing `*` marks a wildcard), then a
//! single-character mode, then optional parameters after `:` — either a
//! bare parameter or a brace group, nested to any depth. The parser works
//! over a borrowed slice and returns an owned, order-preserving AST.

use std::fmt;

use crate::{Error, Result};

/// Chunk size in front of a block, e.g. `256K*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSize {
    /// Size in bytes.
    pub bytes: u64,
    /// `true` when the block repeats to cover the remaining input.
    pub wildcard: bool,
}

/// One parameter of a block: a bare value or a nested brace group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    Value(String),
    Group(Vec<Param>),
}

/// One block of an encoding profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingBlock {
    /// Optional size prefix.
    pub size: Option<BlockSize>,
    /// Single-character encoding mode tag.
    pub mode: u8,
    /// Parameters after `:`, in source order.
    pub params: Vec<Param>,
}

/// Parse a profile string into its blocks.
pub fn parse(input: &str) -> Result<Vec<EncodingBlock>> {
    let mut parser = Parser {
        input: input.as_bytes(),
        pos: 0,
    };

    let blocks = parser.parse_blocks()?;
    parser.skip_whitespace();
    if parser.pos != parser.input.len() {
        return Err(parser.error("trailing input"));
    }
    if blocks.is_empty() {
        return Err(parser.error("empty profile"));
    }

    Ok(blocks)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl Parser<'_> {
    fn error(&self, reason: &str) -> Error {
        Error::ProfileSyntax {
            position: self.pos,
            reason: reason.to_string(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(|b| b.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn parse_blocks(&mut self) -> Result<Vec<EncodingBlock>> {
        let mut blocks = Vec::new();

        loop {
            blocks.push(self.parse_block()?);
            self.skip_whitespace();

            if self.peek() == Some(b',') {
                self.pos += 1;
                continue;
            }
            break;
        }

        Ok(blocks)
    }

    fn parse_block(&mut self) -> Result<EncodingBlock> {
        self.skip_whitespace();

        let size = if self.peek().is_some_and(|b| b.is_ascii_digit()) {
            Some(self.parse_size()?)
        } else {
            None
        };

        let mode = self
            .bump()
            .ok_or_else(|| self.error("expected encoding mode"))?;
        if !mode.is_ascii_alphanumeric() {
            return Err(self.error("encoding mode must be alphanumeric"));
        }

        let mut params = Vec::new();
        if self.peek() == Some(b':') {
            self.pos += 1;
            self.skip_whitespace();

            if self.peek() == Some(b'{') {
                params = self.parse_group()?;
            } else {
                params.push(Param::Value(self.take_value()?));
            }
        }

        Ok(EncodingBlock { size, mode, params })
    }

    fn parse_size(&mut self) -> Result<BlockSize> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }

        let digits = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("size is not ASCII"))?;
        let mut bytes: u64 = digits
            .parse()
            .map_err(|_| self.error("size does not fit in 64 bits"))?;

        match self.peek() {
            Some(b'K') => {
                bytes *= 1024;
                self.pos += 1;
            }
            Some(b'M') => {
                bytes *= 1024 * 1024;
                self.pos += 1;
            }
            _ => {}
        }

        let wildcard = self.peek() == Some(b'*');
        if wildcard {
            self.pos += 1;
        }

        if self.bump() != Some(b'=') {
            return Err(self.error("expected '=' after block size"));
        }

        Ok(BlockSize { bytes, wildcard })
    }

    fn parse_group(&mut self) -> Result<Vec<Param>> {
        // Caller saw '{'.
        self.pos += 1;
        let mut params = Vec::new();

        loop {
            self.skip_whitespace();
            match self.peek() {
                Some(b'}') => {
                    self.pos += 1;
                    break;
                }
                Some(b'{') => params.push(Param::Group(self.parse_group()?)),
                Some(_) => params.push(Param::Value(self.take_value()?)),
                None => return Err(self.error("unterminated brace group")),
            }

            self.skip_whitespace();
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b'}') => {
                    self.pos += 1;
                    break;
                }
                Some(_) => return Err(self.error("expected ',' or '}' in group")),
                None => return Err(self.error("unterminated brace group")),
            }
        }

        Ok(params)
    }

    /// A bare parameter value: everything up to a top-level `,` or `}`,
    /// with interior brace groups kept balanced and verbatim.
    fn take_value(&mut self) -> Result<String> {
        let start = self.pos;
        let mut depth = 0usize;

        while let Some(byte) = self.peek() {
            match byte {
                b'{' => depth += 1,
                b'}' if depth > 0 => depth -= 1,
                b',' | b'}' if depth == 0 => break,
                _ => {}
            }
            self.pos += 1;
        }

        if depth != 0 {
            return Err(self.error("unbalanced braces in value"));
        }

        let value = std::str::from_utf8(&self.input[start..self.pos])
            .map_err(|_| self.error("value is not ASCII"))?
            .trim();
        if value.is_empty() {
            return Err(self.error("empty value"));
        }

        Ok(value.to_string())
    }
}

impl fmt::Display for BlockSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.bytes % (1024 * 1024) == 0 && self.bytes > 0 {
            write!(f, "{}M", self.bytes / (1024 * 1024))?;
        } else if self.bytes % 1024 == 0 && self.bytes > 0 {
            write!(f, "{}K", self.bytes / 1024)?;
        } else {
            write!(f, "{}", self.bytes)?;
        }
        if self.wildcard {
            write!(f, "*")?;
        }
        Ok(())
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v}"),
            Self::Group(params) => {
                write!(f, "{{")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl fmt::Display for EncodingBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(size) = &self.size {
            write!(f, "{size}=")?;
        }
        write!(f, "{}", self.mode as char)?;

        if !self.params.is_empty() {
            write!(f, ":")?;
            if self.params.len() == 1 && matches!(self.params[0], Param::Value(_)) {
                write!(f, "{}", self.params[0])?;
            } else {
                write!(f, "{{")?;
                for (i, param) in self.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, "}}")?;
            }
        }
        Ok(())
    }
}
