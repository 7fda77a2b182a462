use std::{
    io::{BufRead, BufReader, Read, Split},
    iter::Enumerate,
};
use thiserror::Error;

use crate::command;

pub struct Script<R: Read> {
    reader: Enumerate<Split<BufReader<R>>>,
}

/// Strips a trailing `\r` left over from a `\r\n` terminator. `split`
/// already consumed the `\n`; a bare `\r` elsewhere in the line is left
/// alone, it is not a line terminator.
fn strip_trailing_cr(mut line: Vec<u8>) -> Vec<u8> {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    line
}

/// Command is the external representation of an ed command, including its
/// payload, if any.
#[derive(Debug)]
pub enum Command {
    Add {
        position: usize,
        content: Vec<Vec<u8>>,
    },
    Delete {
        position: usize,
        lines: usize,
    },
}

pub type CommandList = Vec<Command>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("command parsing error on line {line}: {error}")]
    Command {
        #[source]
        error: command::Error,
        line: usize,
    },

    #[error("unexpected end of file: wanted {want} line(s) and only got {have}")]
    EndOfFile { have: usize, want: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl<R: Read> Script<R> {
    pub fn parse(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader).split(b'\n').enumerate(),
        }
    }

    pub fn into_command_list(self) -> Result<CommandList, Error> {
        self.into_iter().collect()
    }
}

impl<R: Read> Iterator for Script<R> {
    type Item = Result<Command, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        // We need to get the next line, which should be a command line.
        match self.reader.next() {
            Some((line, Ok(raw))) => match command::Command::parse(&strip_trailing_cr(raw)) {
                // We got an Add command: this means that we need to read the
                // next chunk of lines to get the actual content to be added.
                Ok(command::Command::Add { position, lines }) => {
                    match (&mut self.reader)
                        .take(lines)
                        .map(|(_line, content)| content.map(strip_trailing_cr))
                        .collect::<Result<Vec<Vec<u8>>, std::io::Error>>()
                    {
                        Ok(content) if content.len() == lines => {
                            Some(Ok(Command::Add { position, content }))
                        }
                        Ok(content) if content.len() < lines => Some(Err(Error::EndOfFile {
                            have: content.len(),
                            want: lines,
                        })),
                        Ok(content) => panic!(
                            "read {} lines when only expected a maximum of {}",
                            content.len(),
                            lines
                        ),
                        Err(e) => Some(Err(Error::Io(e))),
                    }
                }
                // We got a Delete command, which is simpler: we just need to
                // return the position and lines to be deleted.
                Ok(command::Command::Delete { position, lines }) => {
                    Some(Ok(Command::Delete { position, lines }))
                }
                // The command couldn't be parsed, so let's return the command
                // error annotated with the 1-indexed line number.
                Err(e) => Some(Err(Error::Command {
                    error: e,
                    line: line + 1,
                })),
            },
            Some((_line, Err(e))) => Some(Err(e.into())),
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_content_strips_crlf() {
        let commands = Script::parse(b"a0 2\r\none\r\ntwo\r\n".as_ref())
            .into_command_list()
            .unwrap();
        match &commands[0] {
            Command::Add { content, .. } => {
                assert_eq!(content, &vec![b"one".to_vec(), b"two".to_vec()]);
            }
            other => panic!("expected an Add command, got {:?}", other),
        }
    }

    #[test]
    fn test_delete_command_crlf_terminated() {
        let commands = Script::parse(b"d1 2\r\n".as_ref()).into_command_list().unwrap();
        assert!(matches!(commands[0], Command::Delete { position: 1, lines: 2 }));
    }
}
