//! Per-device decoded keystroke stream

use crate::scancode::Token;
use std::fmt;

/// Append-only accumulation of decoded tokens for one device
///
/// Tokens are concatenated in report-arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedStream {
    text: String,
    tokens: usize,
}

impl DecodedStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append tokens, returning how many were added
    pub fn extend<I>(&mut self, tokens: I) -> usize
    where
        I: IntoIterator<Item = Token>,
    {
        let before = self.tokens;
        for token in tokens {
            self.text.push_str(token.as_str());
            self.tokens += 1;
        }
        self.tokens - before
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of tokens appended so far
    pub fn token_count(&self) -> usize {
        self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens == 0
    }
}

impl fmt::Display for DecodedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scancode::{decode, decode_report};

    #[test]
    fn test_stream_accumulates_in_order() {
        let mut stream = DecodedStream::new();
        assert!(stream.is_empty());

        assert_eq!(stream.extend(decode_report(&[0, 0, 0x0b, 0x08])), 2);
        assert_eq!(stream.extend(decode_report(&[0, 0, 0x0f, 0x0f, 0x12])), 3);
        assert_eq!(stream.as_str(), "hello");
        assert_eq!(stream.token_count(), 5);
    }

    #[test]
    fn test_stream_mixes_names_and_chars() {
        let mut stream = DecodedStream::new();
        stream.extend(decode(0x29));
        stream.extend(decode(0x04));
        stream.extend(decode(0x28));
        assert_eq!(stream.to_string(), "[ESC]a[ENTER]");
        assert_eq!(stream.token_count(), 3);
    }

    #[test]
    fn test_empty_batch_does_not_advance() {
        let mut stream = DecodedStream::new();
        assert_eq!(stream.extend(decode_report(&[0, 0, 0, 0, 0, 0, 0, 0])), 0);
        assert!(stream.is_empty());
    }
}
