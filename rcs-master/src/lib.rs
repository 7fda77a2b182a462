use nom::Finish;

mod error;
mod parser;
pub mod revision;
mod types;

pub use error::Error;
pub use revision::Revision;
pub use types::*;

const ARCHIVE_HEADER: &[u8] = b"--MKS-Archive--";
const ENCRYPTED_MARKER: &[u8] = b"#!encrypt\n";

/// Parses a full RCS master, after stripping the optional MKSSI archive
/// header and rejecting encrypted masters outright.
pub fn parse(input: &[u8]) -> Result<File, Error> {
    let input = input.strip_prefix(ARCHIVE_HEADER).unwrap_or(input);

    if input.starts_with(ENCRYPTED_MARKER) {
        return Err(Error::Encrypted);
    }

    Ok(Finish::finish(parser::file(input))
        .map_err(|e| Error::ParseError {
            location: Vec::from(e.input),
            kind: e.code,
        })?
        .1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_encrypted() {
        assert!(matches!(parse(b"#!encrypt\nwhatever"), Err(Error::Encrypted)));
    }

    #[test]
    fn test_strips_archive_header() {
        // An archive header followed by an otherwise-empty master still
        // fails to parse (no admin section), but it must fail on grammar,
        // not on the header bytes being mistaken for grammar.
        let err = parse(b"--MKS-Archive--").unwrap_err();
        assert!(matches!(err, Error::ParseError { .. }));
    }
}
