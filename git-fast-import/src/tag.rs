use crate::{Error, Identity};

/// A `tag` fast-import command: `tag <name>\nfrom <branch-ref>\ntagger
/// <tagger>\ndata <len>\n<msg>\n` (§6). Unlike `blob`/`commit`, a tag does
/// not receive a mark of its own.
#[derive(Debug)]
pub struct Tag {
    name: String,
    from_ref: String,
    tagger: Identity,
    message: String,
}

impl Tag {
    /// Constructs a new tag from the given source branch ref and metadata.
    pub fn new(name: String, from_ref: String, tagger: Identity, message: String) -> Self {
        Self {
            name,
            from_ref,
            tagger,
            message,
        }
    }

    pub(crate) fn write(&self, writer: &mut impl std::io::Write) -> Result<(), Error> {
        Ok(writeln!(
            writer,
            "tag {}\nfrom {}\ntagger {}\ndata {}\n{}",
            self.name,
            self.from_ref,
            self.tagger,
            self.message.len(),
            self.message
        )?)
    }
}
