//! Binary-patch engine: offset/length edit commands applied to a growable
//! byte buffer.
//!
//! Unlike the line engine (which numbers lines against their *original*
//! position and only renumbers once, at the end), binary patch offsets are
//! expressed against the buffer as it stands mid-patch. A running
//! adjustment accumulator translates each command's stated offset back to
//! where it actually falls in the buffer we've been mutating.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("invalid binary patch command: {0}")]
    InvalidCommand(String),

    #[error("command targets offset {offset} past the current buffer length {len}")]
    OutOfRange { offset: usize, len: usize },

    #[error("truncated binary patch: expected {want} more byte(s), found {have}")]
    Truncated { want: usize, have: usize },
}

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Add { offset: usize, content: &'a [u8] },
    Delete { offset: usize, len: usize },
}

/// Applies a binary patch to `base`, returning the patched buffer.
pub fn apply(base: &[u8], patch: &[u8]) -> Result<Vec<u8>, Error> {
    let mut buffer = base.to_vec();
    let mut adjust: isize = 0;
    let mut input = patch;

    while !input.is_empty() {
        let (command, rest) = parse_command(input)?;
        input = rest;

        match command {
            Command::Add { offset, content } => {
                let at = clamp(offset as isize - adjust, buffer.len());
                buffer.splice(at..at, content.iter().copied());
                adjust -= content.len() as isize;
            }
            Command::Delete { offset, len } => {
                let at = clamp(offset as isize - 1 + adjust, buffer.len());
                if at >= buffer.len() && len > 0 {
                    return Err(Error::OutOfRange {
                        offset,
                        len: buffer.len(),
                    });
                }
                let end = (at + len).min(buffer.len());
                buffer.drain(at..end);
                adjust += len as isize;
            }
        }
    }

    Ok(buffer)
}

fn clamp(at: isize, len: usize) -> usize {
    at.max(0).min(len as isize) as usize
}

fn parse_command(input: &[u8]) -> Result<(Command, &[u8]), Error> {
    let newline = input
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| invalid(input))?;
    let (header, rest) = (&input[..newline], &input[newline + 1..]);

    if header.is_empty() {
        return Err(invalid(header));
    }
    let (kind, fields) = (header[0], &header[1..]);
    let fields = std::str::from_utf8(fields).map_err(|_| invalid(header))?;
    let mut fields = fields.splitn(2, ' ');
    let offset: usize = fields
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| invalid(header))?;
    let len: usize = fields
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| invalid(header))?;

    match kind {
        b'a' => {
            if rest.len() < len {
                return Err(Error::Truncated {
                    want: len,
                    have: rest.len(),
                });
            }
            Ok((
                Command::Add {
                    offset,
                    content: &rest[..len],
                },
                &rest[len..],
            ))
        }
        b'd' => Ok((Command::Delete { offset, len }, rest)),
        _ => Err(invalid(header)),
    }
}

fn invalid(bytes: &[u8]) -> Error {
    Error::InvalidCommand(String::from_utf8_lossy(bytes).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_bytes() {
        let base = b"hello";
        let patch = b"a5 6\n world";
        assert_eq!(apply(base, patch).unwrap(), b"hello world".to_vec());
    }

    #[test]
    fn test_delete_bytes() {
        let base = b"hello world";
        let patch = b"d6 6\n";
        assert_eq!(apply(base, patch).unwrap(), b"hello".to_vec());
    }

    #[test]
    fn test_insert_at_start() {
        let base = b"world";
        let patch = b"a0 6\nhello ";
        assert_eq!(apply(base, patch).unwrap(), b"hello world".to_vec());
    }

    #[test]
    fn test_multiple_commands_adjust_offsets() {
        // Delete the first 6 bytes, then (in terms of the *original*
        // buffer) add 5 bytes at what was offset 11 (the end).
        let base = b"hello world";
        let patch = b"d1 6\na11 1\n!";
        assert_eq!(apply(base, patch).unwrap(), b"world!".to_vec());
    }

    #[test]
    fn test_truncated_payload() {
        assert!(matches!(
            apply(b"x", b"a1 5\nab"),
            Err(Error::Truncated { want: 5, have: 2 })
        ));
    }
}
