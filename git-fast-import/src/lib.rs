//! A writer for the [git-fast-import
//! format](https://git-scm.com/docs/git-fast-import).

use std::{fmt::Debug, io::Write};

mod blob;
pub use blob::Blob;

mod commit;
pub use commit::{Commit, CommitBuilder, FileCommand, Mode};

mod error;
pub use error::Error;

mod identity;
pub use identity::Identity;

mod mark;
pub use mark::Mark;

mod tag;
pub use tag::Tag;

/// A writer that writes data in the [git-fast-import command
/// format](https://git-scm.com/docs/git-fast-import).
///
/// Marks are assigned monotonically starting at 1, in command order, and
/// are never reused across a run. The stream must be finished explicitly
/// with [`Writer::finish`] once every command has been sent; a stream
/// that is dropped without `finish` is left incomplete on purpose, so a
/// downstream consumer can tell a truncated run from a clean one (see
/// the error-handling discussion of the `done` trailer).
#[derive(Debug)]
pub struct Writer<W>
where
    W: Write + Debug,
{
    writer: W,
    next_mark: usize,
}

impl<W> Writer<W>
where
    W: Write + Debug,
{
    /// Constructs a new git-fast-import writer, sending the `feature done`
    /// header immediately.
    pub fn new(mut writer: W) -> Result<Self, Error> {
        writeln!(writer, "feature done")?;
        Ok(Self { writer, next_mark: 1 })
    }

    /// Sends a command that returns a mark to fast-import.
    pub fn command<C>(&mut self, command: C) -> Result<Mark, Error>
    where
        C: Command,
    {
        let mark = Mark(self.next_mark);
        self.next_mark += 1;

        command.write(&mut self.writer, mark)?;
        Ok(mark)
    }

    /// Sends a `progress` command to fast-import.
    pub fn progress(&mut self, message: &str) -> Result<(), Error> {
        Ok(writeln!(self.writer, "progress {}", message)?)
    }

    /// Sends a `tag` command to fast-import. Tags are not markable, so
    /// this does not consume a mark (unlike [`Writer::command`]).
    pub fn tag(&mut self, tag: Tag) -> Result<(), Error> {
        tag.write(&mut self.writer)
    }

    /// Sends a `reset` command to fast-import.
    pub fn reset(&mut self, branch_ref: &str, from: Option<Mark>) -> Result<(), Error> {
        writeln!(self.writer, "reset {}", branch_ref)?;
        if let Some(from) = from {
            writeln!(self.writer, "from {}", from)?;
        }

        Ok(())
    }

    /// Returns the next mark that will be created.
    pub fn next_mark(&self) -> usize {
        self.next_mark
    }

    /// Terminates the stream with `done\n` and flushes the underlying
    /// writer. Must be the last call made on a successful run; a run
    /// that aborts early should simply drop the `Writer` instead, so
    /// the missing trailer signals the incomplete state.
    pub fn finish(mut self) -> Result<(), Error> {
        writeln!(self.writer, "done")?;
        self.writer.flush()?;
        Ok(())
    }
}

/// A mark-returning `git fast-import` command.
pub trait Command {
    /// A function that writes the command in wire format to the given writer.
    fn write(&self, writer: &mut impl Write, mark: Mark) -> Result<(), Error>;
}
