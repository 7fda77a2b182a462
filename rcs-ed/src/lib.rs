use std::io::{BufRead, BufReader, Read};

mod command;
pub mod binary;

mod script;
pub use script::{Command, CommandList, Script};

/// A line-oriented buffer that an ed-style [`CommandList`] can be applied
/// against. Lines are kept in original order; a patch only ever refers to
/// positions in that original numbering, never to positions shifted by an
/// earlier command in the same patch.
#[derive(Debug, Clone)]
pub struct File {
    lines: Vec<Vec<u8>>,
}

#[derive(Debug, Clone)]
enum Line<'a> {
    Add(Vec<&'a Vec<Vec<u8>>>),
    Delete,
    Keep,
    Replace(Vec<&'a Vec<Vec<u8>>>),
}

impl File {
    pub fn new<R: Read>(reader: R) -> anyhow::Result<Self> {
        // In theory, you'd think BufReader::split() would be sufficient here,
        // but it doesn't allow you to distinguish between a file with a
        // trailing newline and one without. So, let's use read_until() to find
        // out what's really going on.

        let mut r = BufReader::new(reader);
        let mut lines = Vec::new();

        loop {
            let mut line = Vec::new();
            r.read_until(b'\n', &mut line)?;

            if line.is_empty() {
                // Special case: last line of the file, and it's empty.
                lines.push(b"".to_vec());
                break;
            }

            if line[line.len() - 1] != b'\n' {
                // Also the last line of the file, but it's not empty.
                lines.push(line);
                break;
            }

            line.pop();
            // A `\r\n` terminator normalizes to `\n`; a bare `\r` elsewhere
            // in the line is left alone, it is not a line terminator.
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(line);
        }

        Ok(Self { lines })
    }

    pub fn apply(&self, commands: &CommandList) -> anyhow::Result<Vec<Vec<u8>>> {
        let (prefix, line_commands) = calculate_line_commands(self.lines.len(), commands)?;

        let mut output = Vec::with_capacity(prefix.len() + line_commands.len());
        output.extend(prefix.iter().flat_map(|content| content.iter()).cloned());
        for (orig, line) in self.lines.iter().zip(line_commands.into_iter()) {
            match line {
                Line::Add(contents) => {
                    output.push(orig.clone());
                    output.extend(contents.iter().flat_map(|content| content.iter()).cloned());
                }
                Line::Delete => {}
                Line::Keep => {
                    output.push(orig.clone());
                }
                Line::Replace(contents) => {
                    output.extend(contents.iter().flat_map(|content| content.iter()).cloned());
                }
            }
        }

        Ok(output)
    }

    pub fn apply_in_place(&mut self, commands: &CommandList) -> anyhow::Result<()> {
        let (prefix, line_commands) = calculate_line_commands(self.lines.len(), commands)?;

        let mut output = Vec::with_capacity(prefix.len() + line_commands.len());
        output.extend(prefix.iter().flat_map(|content| content.iter()).cloned());
        for (orig, line) in self.lines.drain(..).zip(line_commands.into_iter()) {
            match line {
                Line::Add(contents) => {
                    output.push(orig);
                    output.extend(contents.iter().flat_map(|content| content.iter()).cloned());
                }
                Line::Delete => {}
                Line::Keep => {
                    output.push(orig);
                }
                Line::Replace(contents) => {
                    output.extend(contents.iter().flat_map(|content| content.iter()).cloned());
                }
            }
        }
        self.lines = output;

        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vec<u8>> {
        self.lines.iter()
    }

    pub fn as_bytes(&self) -> Vec<u8> {
        self.lines.join(&b'\n')
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.lines.join(&b'\n')
    }
}

/// Builds the per-original-line plan (the "reset" pass: deleted slots are
/// left in place as `Line::Delete` during accumulation, then dropped
/// entirely by the caller's iteration, which has the effect of renumbering
/// the survivors 1..N without any further bookkeeping).
fn calculate_line_commands<'a>(
    n: usize,
    commands: &'a CommandList,
) -> anyhow::Result<(Vec<&'a Vec<Vec<u8>>>, Vec<Line<'a>>)> {
    let mut prefix: Vec<&Vec<Vec<u8>>> = Vec::new();
    let mut line_commands = vec![Line::Keep; n];

    for command in commands {
        match command {
            Command::Add { position, content } if *position > 0 => {
                if *position > n {
                    anyhow::bail!(
                        "add command targets line {} but buffer only has {} lines",
                        position,
                        n
                    );
                }
                match &mut line_commands[position - 1] {
                    Line::Add(commands) => {
                        commands.push(content);
                    }
                    Line::Delete => {
                        line_commands[position - 1] = Line::Replace(vec![content]);
                    }
                    Line::Keep => {
                        line_commands[position - 1] = Line::Add(vec![content]);
                    }
                    Line::Replace(commands) => {
                        commands.push(content);
                    }
                }
            }
            Command::Add { content, .. } => {
                // position == 0: content is inserted before the first line.
                prefix.push(content);
            }
            Command::Delete { position, lines } => {
                if *position == 0 || position + lines - 1 > n {
                    anyhow::bail!(
                        "delete command targets lines {}..{} but buffer only has {} lines",
                        position,
                        position + lines - 1,
                        n
                    );
                }
                line_commands.splice(
                    position - 1..position + lines - 1,
                    vec![Line::Delete; *lines],
                );
            }
        }
    }

    Ok((prefix, line_commands))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAO: &[u8] = b"The Way that can be told of is not the eternal Way;\nThe name that can be named is not the eternal name.\nThe Nameless is the origin of Heaven and Earth;\nThe Named is the mother of all things.\n";
    const SCRIPT: &[u8] = b"d1 2\na0 1\nA form of the Tao gives rise to physical existence.\n";

    #[test]
    fn test_apply_insert_at_start() {
        let have = File::new(LAO)
            .unwrap()
            .apply(&Script::parse(SCRIPT).into_command_list().unwrap())
            .unwrap();

        assert_eq!(
            have[0],
            b"A form of the Tao gives rise to physical existence.".to_vec()
        );
        assert_eq!(have.len(), 3);
    }

    #[test]
    fn test_apply_preserves_missing_trailing_newline() {
        let input = b"one\ntwo\nthree".as_ref();
        let file = File::new(input).unwrap();
        assert_eq!(file.into_bytes(), b"one\ntwo\nthree".to_vec());
    }

    #[test]
    fn test_crlf_normalized() {
        let file = File::new(b"one\r\ntwo\r\n".as_ref()).unwrap();
        assert_eq!(file.iter().collect::<Vec<_>>(), vec![&b"one".to_vec(), &b"two".to_vec()]);
    }

    #[test]
    fn test_apply_delete_then_add() {
        let file = File::new(b"a\nb\nc\n".as_ref()).unwrap();
        let script = Script::parse(b"d2 1\na2 1\nB\n".as_ref())
            .into_command_list()
            .unwrap();
        let have = file.apply(&script).unwrap();
        assert_eq!(have, vec![b"a".to_vec(), b"B".to_vec(), b"c".to_vec()]);
    }
}
