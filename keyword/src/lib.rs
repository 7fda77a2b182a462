//! RCS keyword marker expansion.
//!
//! Unlike plain RCS, MKSSI keyword expansion can depend on which project
//! revision is doing the referencing (`$ProjectRevision$`, and any
//! revision whose canonical path moves around over time), so the caller
//! supplies a fully resolved [`Context`] per emission rather than this
//! crate reaching back into project state itself.

use std::time::SystemTime;

use chrono::{TimeZone, Utc};
use rcs_master::Revision;

const KEYWORDS: &[&str] = &[
    "ProjectRevision",
    "ProjectName",
    "RCSfile",
    "Revision",
    "Author",
    "Header",
    "Locker",
    "Source",
    "State",
    "Date",
    "Log",
    "Id",
];

/// Per-expansion context: everything a marker substitution might need,
/// already resolved by the caller (including `--source-dir`/`--pname-dir`
/// fallback and any resulting warning).
pub struct Context<'a> {
    pub basename: &'a str,
    pub path: &'a str,
    pub source_dir: &'a str,
    pub pname_dir: &'a str,
    pub projectpj_name: &'a str,
    pub revision: &'a Revision,
    pub date: SystemTime,
    pub author: &'a str,
    pub state: &'a str,
    pub locker: Option<&'a str>,
    pub project_revision: &'a Revision,
    pub log_message: &'a str,
    /// Set only when this revision is a duplicate-revision branch root;
    /// carries the immediately preceding revision's log entry so it can
    /// be appended to the `$Log$` block.
    pub duplicate_predecessor: Option<LogEntry<'a>>,
}

pub struct LogEntry<'a> {
    pub revision: &'a Revision,
    pub date: SystemTime,
    pub author: &'a str,
    pub log_message: &'a str,
}

/// Side effects an expansion had on the version it ran against.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Flags {
    /// Some marker consumed the file's basename (`$Id$`, `$RCSfile$`,
    /// `$Log$`).
    pub kw_name: bool,
    /// Some marker consumed the file's full path (`$Header$`,
    /// `$Source$`).
    pub kw_path: bool,
    /// `$ProjectRevision$` appeared; the caller must treat this revision
    /// as JIT (its blob is not reusable across project revisions).
    pub kw_projrev: bool,
}

/// Expands every recognized marker across a materialized line sequence,
/// returning the new lines and the flags any expansion set.
pub fn expand(lines: &[Vec<u8>], ctx: &Context) -> (Vec<Vec<u8>>, Flags) {
    let mut flags = Flags::default();
    let mut output = Vec::with_capacity(lines.len());

    for line in lines {
        let (expanded, log_insertion) = expand_line(line, ctx, &mut flags);
        output.push(expanded);
        if let Some(insertion) = log_insertion {
            output.extend(build_log_block(ctx, &insertion));
        }
    }

    (output, flags)
}

struct LogInsertion {
    prefix: Vec<u8>,
    suffix: Vec<u8>,
}

fn expand_line(line: &[u8], ctx: &Context, flags: &mut Flags) -> (Vec<u8>, Option<LogInsertion>) {
    let mut out = Vec::with_capacity(line.len());
    let mut log_insertion = None;
    let mut i = 0;

    while i < line.len() {
        if line[i] == b'$' {
            if let Some((keyword, after_name)) = match_keyword(&line[i + 1..]) {
                let name_end = i + 1 + after_name;
                if let Some(close_rel) = line[name_end..].iter().position(|&b| b == b'$') {
                    let close = name_end + close_rel;
                    let marker_end = close + 1;

                    out.push(b'$');
                    out.extend_from_slice(render(keyword, ctx, flags).as_bytes());

                    if keyword == "Log" {
                        log_insertion = Some(LogInsertion {
                            prefix: line[..i].to_vec(),
                            suffix: line[marker_end..].to_vec(),
                        });
                    }

                    i = marker_end;
                    continue;
                }
            }
        }

        out.push(line[i]);
        i += 1;
    }

    (out, log_insertion)
}

/// Matches a keyword name immediately following a `$`, provided it's
/// followed by `$` (bare marker) or `:` (marker with a value region to
/// replace). Returns the keyword and the byte length of its name.
fn match_keyword(rest: &[u8]) -> Option<(&'static str, usize)> {
    for &keyword in KEYWORDS {
        let bytes = keyword.as_bytes();
        if rest.len() > bytes.len() && rest.starts_with(bytes) {
            let boundary = rest[bytes.len()];
            if boundary == b'$' || boundary == b':' {
                return Some((keyword, bytes.len()));
            }
        }
    }
    None
}

/// Renders the text following the opening `$` for a matched keyword,
/// including the closing `$`.
fn render(keyword: &str, ctx: &Context, flags: &mut Flags) -> String {
    let rev_date = date_string(ctx.date);

    match keyword {
        "Author" => format!("Author: {} $", ctx.author),
        "Date" => format!("Date: {} $", rev_date),
        "Header" => {
            flags.kw_path = true;
            format!(
                "Header: {}/{} {} {} {} {} $",
                ctx.source_dir, ctx.path, ctx.revision, rev_date, ctx.author, ctx.state
            )
        }
        "Id" => {
            flags.kw_name = true;
            let mut s = format!(
                "Id: {} {} {} {} {}",
                ctx.basename, ctx.revision, rev_date, ctx.author, ctx.state
            );
            if let Some(locker) = ctx.locker {
                s.push(' ');
                s.push_str(locker);
            }
            s.push_str(" $");
            s
        }
        "Locker" => format!("Locker: {} $", ctx.locker.unwrap_or("")),
        "ProjectName" => format!("ProjectName: {}/{} $", ctx.pname_dir, ctx.projectpj_name),
        "ProjectRevision" => {
            flags.kw_projrev = true;
            format!("ProjectRevision: {} $", ctx.project_revision)
        }
        "RCSfile" => {
            flags.kw_name = true;
            format!("RCSfile: {} $", ctx.basename)
        }
        "Revision" => format!("Revision: {} $", ctx.revision),
        "Source" => {
            flags.kw_path = true;
            format!("Source: {}/{} $", ctx.source_dir, ctx.path)
        }
        "State" => format!("State: {} $", ctx.state),
        "Log" => {
            flags.kw_name = true;
            format!("Log: {} $", ctx.basename)
        }
        _ => unreachable!("match_keyword only returns recognized names"),
    }
}

fn build_log_block(ctx: &Context, insertion: &LogInsertion) -> Vec<Vec<u8>> {
    let mut lines =
        log_entry_lines(&insertion.prefix, &insertion.suffix, ctx.revision, ctx.date, ctx.author, ctx.log_message);

    if let Some(predecessor) = &ctx.duplicate_predecessor {
        lines.extend(log_entry_lines(
            &insertion.prefix,
            &insertion.suffix,
            predecessor.revision,
            predecessor.date,
            predecessor.author,
            predecessor.log_message,
        ));
    }

    lines
}

fn log_entry_lines(
    prefix: &[u8],
    suffix: &[u8],
    revision: &Revision,
    date: SystemTime,
    author: &str,
    log_message: &str,
) -> Vec<Vec<u8>> {
    let mut lines = Vec::new();
    let header = format!("Revision {}  {}  {}", revision, date_string(date), author);
    lines.push(wrap(prefix, header.as_bytes(), suffix));

    for entry_line in log_message.split('\n') {
        if entry_line.trim().is_empty() {
            continue;
        }
        let escaped = entry_line.replace('@', "@@");
        lines.push(wrap(prefix, escaped.as_bytes(), suffix));
    }

    lines
}

fn wrap(prefix: &[u8], body: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut v = Vec::with_capacity(prefix.len() + body.len() + suffix.len());
    v.extend_from_slice(prefix);
    v.extend_from_slice(body);
    v.extend_from_slice(suffix);
    v
}

/// RCS's own `$Date$`/`$Log$` rendering: `YYYY/MM/DD HH:MM:SS`, UTC.
fn date_string(date: SystemTime) -> String {
    let secs = date
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let dt = Utc
        .timestamp_opt(secs as i64, 0)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap());
    dt.format("%Y/%m/%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{str::FromStr, time::Duration};

    fn ctx<'a>(revision: &'a Revision, project_revision: &'a Revision) -> Context<'a> {
        Context {
            basename: "a.txt",
            path: "src/a.txt",
            source_dir: "/rcs",
            pname_dir: "/proj",
            projectpj_name: "project.pj",
            revision,
            date: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000_000),
            author: "alice",
            state: "Exp",
            locker: None,
            project_revision,
            log_message: "fixed a bug\n",
            duplicate_predecessor: None,
        }
    }

    fn lines(text: &[u8]) -> Vec<Vec<u8>> {
        text.split(|&b| b == b'\n').map(|l| l.to_vec()).collect()
    }

    #[test]
    fn test_revision_expansion() {
        let rev = Revision::from_str("1.7").unwrap();
        let projrev = Revision::from_str("1.9").unwrap();
        let c = ctx(&rev, &projrev);

        let (out, flags) = expand(&lines(b"text $Revision$ more"), &c);
        assert_eq!(out[0], b"text $Revision: 1.7 $ more".to_vec());
        assert_eq!(flags, Flags::default());
    }

    #[test]
    fn test_id_sets_kw_name() {
        let rev = Revision::from_str("1.1").unwrap();
        let projrev = Revision::from_str("1.1").unwrap();
        let c = ctx(&rev, &projrev);

        let (out, flags) = expand(&lines(b"$Id$"), &c);
        assert!(String::from_utf8_lossy(&out[0]).starts_with("$Id: a.txt 1.1 "));
        assert!(flags.kw_name);
        assert!(!flags.kw_path);
    }

    #[test]
    fn test_header_sets_kw_path() {
        let rev = Revision::from_str("1.1").unwrap();
        let projrev = Revision::from_str("1.1").unwrap();
        let c = ctx(&rev, &projrev);

        let (_out, flags) = expand(&lines(b"$Header$"), &c);
        assert!(flags.kw_path);
    }

    #[test]
    fn test_project_revision_sets_flag() {
        let rev = Revision::from_str("1.1").unwrap();
        let projrev = Revision::from_str("1.4").unwrap();
        let c = ctx(&rev, &projrev);

        let (out, flags) = expand(&lines(b"$ProjectRevision$"), &c);
        assert_eq!(out[0], b"$ProjectRevision: 1.4 $".to_vec());
        assert!(flags.kw_projrev);
    }

    #[test]
    fn test_log_block_inserts_prefixed_lines() {
        let rev = Revision::from_str("1.2").unwrap();
        let projrev = Revision::from_str("1.2").unwrap();
        let c = ctx(&rev, &projrev);

        let (out, _flags) = expand(&lines(b"// $Log$ trailer"), &c);
        assert_eq!(out[0], b"// $Log: a.txt $ trailer".to_vec());
        assert_eq!(out[1], b"// Revision 1.2  1970/01/12 13:46:40  alice trailer".to_vec());
        assert_eq!(out[2], b"// fixed a bug trailer".to_vec());
    }

    #[test]
    fn test_log_reescapes_at_signs() {
        let rev = Revision::from_str("1.1").unwrap();
        let projrev = Revision::from_str("1.1").unwrap();
        let mut c = ctx(&rev, &projrev);
        c.log_message = "see foo@bar\n";

        let (out, _flags) = expand(&lines(b"$Log$"), &c);
        assert_eq!(out[1], b"$Log: a.txt $".to_vec());
        assert!(String::from_utf8_lossy(&out[2]).contains("foo@@bar"));
    }

    #[test]
    fn test_duplicate_revision_appends_predecessor() {
        let rev = Revision::from_str("1.2.1.1").unwrap();
        let prev_rev = Revision::from_str("1.2").unwrap();
        let projrev = Revision::from_str("1.2.1.1").unwrap();
        let mut c = ctx(&rev, &projrev);
        c.log_message = "Duplicate revision\n";
        c.duplicate_predecessor = Some(LogEntry {
            revision: &prev_rev,
            date: SystemTime::UNIX_EPOCH + Duration::from_secs(900_000),
            author: "bob",
            log_message: "original change\n",
        });

        let (out, _flags) = expand(&lines(b"$Log$"), &c);
        // header+log for 1.2.1.1 ("Duplicate revision" is blank-filtered
        // away since it's the literal log message, not a real entry) then
        // header+log for the predecessor 1.2.
        assert!(String::from_utf8_lossy(&out[1]).contains("Revision 1.2.1.1"));
        assert!(String::from_utf8_lossy(&out[2]).contains("Revision 1.2 "));
        assert!(String::from_utf8_lossy(&out[3]).contains("original change"));
    }

    #[test]
    fn test_non_keyword_dollar_passed_through() {
        let rev = Revision::from_str("1.1").unwrap();
        let projrev = Revision::from_str("1.1").unwrap();
        let c = ctx(&rev, &projrev);

        let (out, flags) = expand(&lines(b"price is $5 today"), &c);
        assert_eq!(out[0], b"price is $5 today".to_vec());
        assert_eq!(flags, Flags::default());
    }
}
