//! Revision materializer (§4.6) and keyword-aware blob emission.
//!
//! The full patch chain for a file is walked once, on first reference,
//! producing every revision's raw (pre-keyword) content; blobs are then
//! emitted lazily as commits reference them, which satisfies the
//! up-front-materialization contract per file while avoiding doing the
//! work for files nothing ever touches (an explicitly permitted
//! strategy — see `DESIGN.md`).

use std::{collections::HashMap, fmt::Debug, io::Write};

use git_fast_import::{Blob, Mark, Writer};
use keyword::{Context as KeywordContext, LogEntry};
use rcs_master::Revision;
use state::{Manager, RcsFileId};

use crate::exec;

pub struct Options {
    pub source_dir: String,
    pub pname_dir: String,
    pub projectpj_name: String,
}

#[derive(Default)]
pub struct Materializer {
    /// Every revision's raw, pre-keyword-expansion bytes, populated the
    /// first time any revision of that file is needed. The third tuple
    /// element records whether the revision's content is unrecoverable
    /// (propagated from an ancestor's missing patch, §4.2).
    raw: HashMap<RcsFileId, HashMap<Revision, (Vec<u8>, bool, bool)>>,
    /// Marks for non-JIT revisions, reusable across checkpoints.
    marks: HashMap<(RcsFileId, Revision), Mark>,
    /// Marks for JIT revisions, one per (file, revision, referencing
    /// project revision) triple.
    jit_marks: HashMap<(RcsFileId, Revision, Revision), Mark>,
    /// Cached per-file path stability: `false` once we've observed the
    /// same file referenced at more than one canonical path.
    path_seen: HashMap<RcsFileId, String>,
    path_unstable: std::collections::HashSet<RcsFileId>,
}

impl Materializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a canonical path a checkpoint referenced this file at,
    /// so later blob emission can tell whether the file's path is
    /// stable (a precondition for treating it as non-JIT).
    pub fn note_path(&mut self, file: RcsFileId, path: &str) {
        match self.path_seen.get(&file) {
            Some(seen) if seen == path => {}
            Some(_) => {
                self.path_unstable.insert(file);
            }
            None => {
                self.path_seen.insert(file, path.to_string());
            }
        }
    }

    /// Emits (or reuses) the blob for `file`@`revision`, as referenced
    /// from project revision `project_revision` at canonical path
    /// `path`, returning its mark.
    pub fn blob_for<W: Write + Debug>(
        &mut self,
        manager: &mut Manager,
        writer: &mut Writer<W>,
        opts: &Options,
        file: RcsFileId,
        revision: &Revision,
        project_revision: &Revision,
        path: &str,
    ) -> anyhow::Result<Mark> {
        self.ensure_raw(manager, file)?;

        let is_jit = {
            let raw_marker_scan = self
                .raw
                .get(&file)
                .and_then(|m| m.get(revision))
                .map(|(data, _, _)| contains(data, b"$ProjectRevision"))
                .unwrap_or(false);
            raw_marker_scan || self.path_unstable.contains(&file)
        };

        if !is_jit {
            if let Some(mark) = self.marks.get(&(file, revision.clone())) {
                return Ok(*mark);
            }
        } else if let Some(mark) = self.jit_marks.get(&(file, revision.clone(), project_revision.clone())) {
            return Ok(*mark);
        }

        let (raw, binary, _missing) = self
            .raw
            .get(&file)
            .and_then(|m| m.get(revision))
            .cloned()
            .unwrap_or_default();

        let data = if binary {
            raw
        } else {
            self.expand_keywords(manager, opts, file, revision, project_revision, path, &raw)?
        };

        let mark = writer.command(Blob::new(&data))?;

        let rcs_file = manager.rcs_file_mut(file)?;
        rcs_file.derived_mut(revision).mark = Some(mark);
        rcs_file.derived_mut(revision).executable = exec::is_executable(path, &data);
        rcs_file.derived_mut(revision).jit = is_jit;

        if is_jit {
            self.jit_marks.insert((file, revision.clone(), project_revision.clone()), mark);
        } else {
            self.marks.insert((file, revision.clone()), mark);
        }

        Ok(mark)
    }

    fn expand_keywords(
        &self,
        manager: &Manager,
        opts: &Options,
        file: RcsFileId,
        revision: &Revision,
        project_revision: &Revision,
        path: &str,
        raw: &[u8],
    ) -> anyhow::Result<Vec<u8>> {
        let rcs_file = manager.rcs_file(file)?;
        let version = match rcs_file.versions.get(revision) {
            Some(v) => v,
            None => return Ok(raw.to_vec()),
        };
        let log_message = rcs_file
            .patches
            .get(revision)
            .map(|p| String::from_utf8_lossy(&p.log).into_owned())
            .unwrap_or_default();
        let basename = rcs_file
            .logical_name
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let state = version
            .state
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "Exp".to_string());
        let author = version.author.to_string();
        let locker = rcs_file
            .locks
            .iter()
            .find(|(_, rev)| rev == revision)
            .map(|(locker, _)| locker.to_string());

        let duplicate_predecessor = duplicate_predecessor_entry(rcs_file, revision, &log_message);

        let lines: Vec<Vec<u8>> = raw.split(|&b| b == b'\n').map(|l| l.to_vec()).collect();
        let ctx = KeywordContext {
            basename: &basename,
            path,
            source_dir: &opts.source_dir,
            pname_dir: &opts.pname_dir,
            projectpj_name: &opts.projectpj_name,
            revision,
            date: version.date,
            author: &author,
            state: &state,
            locker: locker.as_deref(),
            project_revision,
            log_message: &log_message,
            duplicate_predecessor: duplicate_predecessor.as_ref().map(|(rev, date, author, log)| LogEntry {
                revision: rev,
                date: *date,
                author,
                log_message: log,
            }),
        };

        let (expanded, _flags) = keyword::expand(&lines, &ctx);
        Ok(expanded.join(&b'\n'))
    }

    fn ensure_raw(&mut self, manager: &mut Manager, file: RcsFileId) -> anyhow::Result<()> {
        if self.raw.contains_key(&file) {
            return Ok(());
        }
        let (binary, table) = compute_raw_table(manager, file)?;
        self.install_table(manager, file, binary, table)?;
        Ok(())
    }

    fn install_table(
        &mut self,
        manager: &mut Manager,
        file: RcsFileId,
        binary: bool,
        table: HashMap<Revision, (Vec<u8>, bool, bool)>,
    ) -> anyhow::Result<()> {
        for (revision, (data, _, missing)) in &table {
            let has_keywords = !binary && has_keyword_markers(data);
            let derived = manager.rcs_file_mut(file)?.derived_mut(revision);
            derived.has_keywords = has_keywords;
            derived.missing = *missing;
        }
        self.raw.insert(file, table);
        Ok(())
    }

    /// Front-loads patch application for every file ahead of the
    /// single-threaded emission walk (`--jobs`, AMBIENT-2), using up to
    /// `jobs` worker threads. Each file's revision chain is independent
    /// of every other file's, so this is embarrassingly parallel; the
    /// commit-emission order itself (§5) is untouched, since callers
    /// still walk `process_chain` on one thread and this only warms
    /// `self.raw` ahead of time.
    pub fn prewarm(&mut self, manager: &mut Manager, jobs: usize) -> anyhow::Result<()> {
        let files: Vec<RcsFileId> = manager
            .rcs_file_ids()
            .filter(|f| !self.raw.contains_key(f))
            .collect();
        if files.is_empty() {
            return Ok(());
        }

        let computed: Vec<(RcsFileId, anyhow::Result<(bool, HashMap<Revision, (Vec<u8>, bool, bool)>)>)> =
            if jobs <= 1 || files.len() <= 1 {
                files
                    .iter()
                    .map(|&f| (f, compute_raw_table(manager, f)))
                    .collect()
            } else {
                let manager_ref: &Manager = manager;
                let chunk_size = std::cmp::max(1, (files.len() + jobs - 1) / jobs);
                std::thread::scope(|scope| {
                    let handles: Vec<_> = files
                        .chunks(chunk_size)
                        .map(|chunk| {
                            let chunk = chunk.to_vec();
                            scope.spawn(move || {
                                chunk
                                    .into_iter()
                                    .map(|f| (f, compute_raw_table(manager_ref, f)))
                                    .collect::<Vec<_>>()
                            })
                        })
                        .collect();
                    handles
                        .into_iter()
                        .flat_map(|h| h.join().expect("materialization worker panicked"))
                        .collect()
                })
            };

        for (file, result) in computed {
            let (binary, table) = result?;
            self.install_table(manager, file, binary, table)?;
        }
        Ok(())
    }
}

/// Computes one file's full raw-revision table (§4.6) purely from an
/// immutable manager reference, so it can run on a worker thread or
/// serially; the `missing` flag is carried in the table itself and
/// written back to the manager afterward by
/// [`Materializer::install_table`] on the calling thread, the only
/// place that ever needs `&mut Manager`.
fn compute_raw_table(
    manager: &Manager,
    file: RcsFileId,
) -> anyhow::Result<(bool, HashMap<Revision, (Vec<u8>, bool, bool)>)> {
    let (head, binary, is_dummy, corrupt) = {
        let rcs_file = manager.rcs_file(file)?;
        (rcs_file.head.clone(), rcs_file.binary, rcs_file.is_dummy(), rcs_file.corrupt)
    };

    let mut table = HashMap::new();
    if !is_dummy && !corrupt {
        if let Some(head) = head {
            walk(manager, file, &head, None, false, binary, &mut table)?;
        }
    }
    Ok((binary, table))
}

/// Walks the trunk/branch tree from `revision` (pre-order: this node,
/// then each branch root, then the chain continuation), recording raw
/// bytes and propagating the `missing` flag (§4.2: a Version whose
/// Patch could not be reconstructed taints every descendant revision).
pub(crate) fn walk(
    manager: &Manager,
    file: RcsFileId,
    revision: &Revision,
    prev_data: Option<&[u8]>,
    prev_missing: bool,
    binary: bool,
    out: &mut HashMap<Revision, (Vec<u8>, bool, bool)>,
) -> anyhow::Result<()> {
    let (version_next, version_branches, patch_text) = {
        let rcs_file = manager.rcs_file(file)?;
        let version = match rcs_file.versions.get(revision) {
            Some(v) => v.clone(),
            None => return Ok(()),
        };
        let patch_text = rcs_file.patches.get(revision).map(|p| p.text.to_vec());
        (version.next, version.branches, patch_text)
    };

    let missing = prev_missing || patch_text.is_none();
    let data: Vec<u8> = if missing {
        Vec::new()
    } else {
        let text = patch_text.expect("missing already accounts for None");
        match prev_data {
            None => text,
            Some(prev) => {
                if binary {
                    rcs_ed::binary::apply(prev, &text)?
                } else {
                    let base = rcs_ed::File::new(prev)?;
                    let commands = rcs_ed::Script::parse(text.as_slice()).into_command_list()?;
                    base.apply(&commands)?.join(&b'\n')
                }
            }
        }
    };

    out.insert(revision.clone(), (data.clone(), binary, missing));

    for branch_root in &version_branches {
        walk(manager, file, branch_root, Some(&data), missing, binary, out)?;
    }
    if let Some(next) = &version_next {
        walk(manager, file, next, Some(&data), missing, binary, out)?;
    }

    Ok(())
}

fn has_keyword_markers(data: &[u8]) -> bool {
    const MARKERS: &[&[u8]] = &[
        b"$Author", b"$Date", b"$Header", b"$Id", b"$Locker", b"$ProjectName",
        b"$ProjectRevision", b"$RCSfile", b"$Revision", b"$Source", b"$State", b"$Log",
    ];
    MARKERS.iter().any(|marker| contains(data, marker))
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// If `revision` is a duplicate-revision branch root (§4.5: log exactly
/// `Duplicate revision\n`, length >= 4, last component == 1), returns
/// the preceding revision's log entry to append to a `$Log$` block.
fn duplicate_predecessor_entry(
    rcs_file: &state::RcsFile,
    revision: &Revision,
    log_message: &str,
) -> Option<(Revision, std::time::SystemTime, String, String)> {
    if log_message != "Duplicate revision\n" || !revision.is_branch_root_first_commit() {
        return None;
    }
    let predecessor = revision.decrement()?;
    let version = rcs_file.versions.get(&predecessor)?;
    let log = rcs_file
        .patches
        .get(&predecessor)
        .map(|p| String::from_utf8_lossy(&p.log).into_owned())
        .unwrap_or_default();
    Some((predecessor, version.date, version.author.to_string(), log))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcs_master::{Id, Patch, Version};
    use std::{path::PathBuf, time::SystemTime};

    fn single_revision_file(content: &[u8]) -> state::RcsFile {
        let rev = Revision::new(vec![1, 1]).unwrap();
        let mut versions = HashMap::new();
        versions.insert(
            rev.clone(),
            Version {
                date: SystemTime::UNIX_EPOCH,
                author: Id(b"alice".to_vec()),
                state: None,
                branches: Vec::new(),
                next: None,
                commit_id: None,
            },
        );
        let mut patches = HashMap::new();
        patches.insert(
            rev.clone(),
            Patch {
                log: content.to_vec().into(),
                text: content.to_vec().into(),
            },
        );
        let mut file = state::RcsFile::dummy(PathBuf::from("f.txt"));
        file.head = Some(rev);
        file.versions = versions;
        file.patches = patches;
        file
    }

    #[test]
    fn prewarm_matches_serial_ensure_raw() {
        let mut manager = Manager::new();
        let a = manager.add_rcs_file(single_revision_file(b"hello"));
        let b = manager.add_rcs_file(single_revision_file(b"$Author$ world"));

        let mut parallel = Materializer::new();
        parallel.prewarm(&mut manager, 4).unwrap();

        let rev = Revision::new(vec![1, 1]).unwrap();
        assert_eq!(parallel.raw[&a][&rev].0, b"hello");
        assert_eq!(parallel.raw[&b][&rev].0, b"$Author$ world");
        assert!(!manager.rcs_file(a).unwrap().derived(&rev).unwrap().has_keywords);
        assert!(manager.rcs_file(b).unwrap().derived(&rev).unwrap().has_keywords);
    }

    #[test]
    fn prewarm_with_one_job_matches_parallel() {
        let mut manager = Manager::new();
        manager.add_rcs_file(single_revision_file(b"content"));

        let mut serial = Materializer::new();
        serial.prewarm(&mut manager, 1).unwrap();

        let rev = Revision::new(vec![1, 1]).unwrap();
        let id = manager.rcs_file_ids().next().unwrap();
        assert_eq!(serial.raw[&id][&rev].0, b"content");
    }

    #[test]
    fn missing_patch_propagates_to_descendants() {
        let rev1 = Revision::new(vec![1, 1]).unwrap();
        let rev2 = Revision::new(vec![1, 2]).unwrap();

        let mut versions = HashMap::new();
        versions.insert(
            rev1.clone(),
            rcs_master::Version {
                date: SystemTime::UNIX_EPOCH,
                author: rcs_master::Id(b"alice".to_vec()),
                state: None,
                branches: Vec::new(),
                next: None,
                commit_id: None,
            },
        );
        versions.insert(
            rev2.clone(),
            rcs_master::Version {
                date: SystemTime::UNIX_EPOCH,
                author: rcs_master::Id(b"alice".to_vec()),
                state: None,
                branches: Vec::new(),
                next: Some(rev1.clone()),
                commit_id: None,
            },
        );
        // rev1 has no patch entry at all: a missing-patch placeholder.
        let mut patches = HashMap::new();
        patches.insert(
            rev2.clone(),
            rcs_master::Patch { log: b"change\n".to_vec().into(), text: b"world\n".to_vec().into() },
        );

        let mut file = state::RcsFile::dummy(std::path::PathBuf::from("f.txt"));
        file.head = Some(rev2.clone());
        file.versions = versions;
        file.patches = patches;
        let mut manager = Manager::new();
        let id = manager.add_rcs_file(file);

        let mut materializer = Materializer::new();
        materializer.prewarm(&mut manager, 1).unwrap();

        assert!(!manager.rcs_file(id).unwrap().derived(&rev2).unwrap().missing);
        assert_eq!(materializer.raw[&id][&rev2].0, b"world\n");

        assert!(manager.rcs_file(id).unwrap().derived(&rev1).unwrap().missing);
        assert_eq!(materializer.raw[&id][&rev1].0, Vec::<u8>::new());
    }
}
