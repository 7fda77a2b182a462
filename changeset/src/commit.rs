//! Commit merging (§4.9): groups the per-file changes in a [`Changeset`]
//! into branch-scoped commits.

use std::{
    collections::HashSet,
    time::SystemTime,
};

use rcs_master::Revision;
use state::{Manager, RcsFileId};

use crate::types::{Changeset, FileChange, RenameTarget};

/// Appended to a commit's message for any file change whose target
/// revision's content could not be reconstructed (§4.2's `missing`
/// flag; scenario 3 of spec.md §8).
const CONTENT_LOST_NOTICE: &str = "This revision's contents have been lost: the RCS master was missing the patch needed to reconstruct it, so this file is checked in empty.\n";

/// A commit's author identity: either an MKSSI username to be resolved
/// against the author map at emission time, or a fixed identity that
/// bypasses the map entirely (the tool's own identity for rename
/// commits, or MKSSI's "Unknown" sentinel for reverts and deletes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Committer {
    Author(String),
    Fixed { name: String, email: String },
}

impl Committer {
    pub fn unknown() -> Self {
        Self::Fixed {
            name: "Unknown".into(),
            email: "unknown".into(),
        }
    }

    pub fn tool() -> Self {
        Self::Fixed {
            name: "MKSSI Import".into(),
            email: "mkssi-import@localhost".into(),
        }
    }
}

/// A single file operation within a merged commit, already resolved to
/// the level of detail the git-fast-import writer needs.
#[derive(Debug, Clone)]
pub enum CommitOp {
    RenameDir { old: String, new: String },
    RenameFile { old: String, new: String },
    Add { file: RcsFileId, path: String, revision: Revision },
    Update { file: RcsFileId, path: String, revision: Revision },
    Delete { path: String },
}

#[derive(Debug, Clone)]
pub struct Commit {
    pub committer: Committer,
    pub date: SystemTime,
    pub message: String,
    pub ops: Vec<CommitOp>,
}

/// Merges a changeset into branch-scoped commits, in the fixed ordering
/// §4.9 and §4.11 require: renames, then adds, then updates, then
/// deletes.
pub fn merge(manager: &Manager, changeset: &Changeset, checkpoint_date: SystemTime) -> Vec<Commit> {
    let mut commits = merge_renames(&changeset.renames, checkpoint_date);
    commits.extend(merge_adds(manager, &changeset.adds));
    commits.extend(merge_updates(manager, &changeset.updates));
    commits.extend(merge_deletes(&changeset.deletes, checkpoint_date));
    commits
}

fn merge_renames(renames: &[RenameTarget], checkpoint_date: SystemTime) -> Vec<Commit> {
    let mut commits = Vec::new();

    let dirs: Vec<(String, String)> = renames
        .iter()
        .filter_map(|r| match r {
            RenameTarget::Directory { old, new } => Some((old.clone(), new.clone())),
            RenameTarget::File { .. } => None,
        })
        .collect();
    let files: Vec<(String, String)> = renames
        .iter()
        .filter_map(|r| match r {
            RenameTarget::File { old, new, .. } => Some((old.clone(), new.clone())),
            RenameTarget::Directory { .. } => None,
        })
        .collect();

    if !dirs.is_empty() {
        commits.push(Commit {
            committer: Committer::tool(),
            date: checkpoint_date,
            message: "Renamed directory to match an MKSSI case change.\n".to_string(),
            ops: dirs
                .into_iter()
                .map(|(old, new)| CommitOp::RenameDir { old, new })
                .collect(),
        });
    }

    if !files.is_empty() {
        commits.push(Commit {
            committer: Committer::tool(),
            date: checkpoint_date,
            message: "Renamed file to match an MKSSI case change.\n".to_string(),
            ops: files
                .into_iter()
                .map(|(old, new)| CommitOp::RenameFile { old, new })
                .collect(),
        });
    }

    commits
}

fn merge_adds(manager: &Manager, adds: &[FileChange]) -> Vec<Commit> {
    let mut groups: Vec<(String, Vec<&FileChange>)> = Vec::new();

    'outer: for change in adds {
        let author = file_author(manager, change).unwrap_or_default();
        // An add whose content is unrecoverable stands alone rather
        // than joining another author's commit (§4.9).
        if !is_missing(manager, change) {
            for (existing_author, members) in groups.iter_mut() {
                if existing_author.eq_ignore_ascii_case(&author)
                    && !members.iter().any(|m| is_missing(manager, m))
                {
                    members.push(change);
                    continue 'outer;
                }
            }
        }
        groups.push((author, vec![change]));
    }

    let mut commits: Vec<Commit> = groups
        .into_iter()
        .map(|(author, members)| {
            let date = members
                .iter()
                .map(|c| change_date(manager, c))
                .max()
                .unwrap_or(SystemTime::UNIX_EPOCH);

            let mut message = if members.len() == 1 {
                format!("Add file {}\n", members[0].path())
            } else {
                format!("Add {} files\n", members.len())
            };
            for member in &members {
                message.push_str(&format!(
                    "#mkssi: add {} rev. {}\n",
                    member.path(),
                    revision_of(member)
                ));
            }
            if members.iter().any(|m| is_missing(manager, m)) {
                message.push_str(CONTENT_LOST_NOTICE);
            }

            let ops = members
                .iter()
                .map(|m| match m {
                    FileChange::Add { file, path, revision } => CommitOp::Add {
                        file: *file,
                        path: path.clone(),
                        revision: revision.clone(),
                    },
                    _ => unreachable!("merge_adds only ever groups FileChange::Add"),
                })
                .collect();

            Commit {
                committer: Committer::Author(author),
                date,
                message,
                ops,
            }
        })
        .collect();

    commits.sort_by_key(|c| c.date);
    commits
}

fn merge_updates(manager: &Manager, updates: &[FileChange]) -> Vec<Commit> {
    let mut used = vec![false; updates.len()];
    let mut commits = Vec::new();

    for i in 0..updates.len() {
        if used[i] {
            continue;
        }
        used[i] = true;
        let seed = &updates[i];

        if seed.is_revert() {
            commits.push(revert_commit(manager, seed));
            continue;
        }

        let mut members = vec![seed];
        let mut member_files: HashSet<RcsFileId> = HashSet::new();
        member_files.insert(seed.file());

        let seed_author = file_author(manager, seed).unwrap_or_default();
        let seed_log = file_log(manager, seed).unwrap_or_default();

        for j in (i + 1)..updates.len() {
            if used[j] {
                continue;
            }
            let candidate = &updates[j];

            if candidate.is_revert() || member_files.contains(&candidate.file()) {
                continue;
            }
            // An earlier, still-unmerged update of this same file must
            // get its own commit first.
            if (0..j).any(|k| !used[k] && updates[k].file() == candidate.file()) {
                continue;
            }

            let candidate_author = file_author(manager, candidate).unwrap_or_default();
            let candidate_log = file_log(manager, candidate).unwrap_or_default();
            if !candidate_author.eq_ignore_ascii_case(&seed_author) || candidate_log != seed_log {
                continue;
            }

            used[j] = true;
            member_files.insert(candidate.file());
            members.push(candidate);
        }

        commits.push(build_update_commit(manager, &members, &seed_author, &seed_log));
    }

    commits
}

fn revert_commit(manager: &Manager, change: &FileChange) -> Commit {
    let (file, path, new_revision) = match change {
        FileChange::Update { file, path, new_revision, .. } => (*file, path.clone(), new_revision.clone()),
        _ => unreachable!("revert_commit only handles FileChange::Update"),
    };

    let mut message = format!("Revert file {} to rev. {}\n", path, new_revision);
    if is_missing(manager, change) {
        message.push_str(CONTENT_LOST_NOTICE);
    }

    Commit {
        committer: Committer::unknown(),
        date: change_date(manager, change),
        message,
        ops: vec![CommitOp::Update { file, path, revision: new_revision }],
    }
}

fn build_update_commit(
    manager: &Manager,
    members: &[&FileChange],
    author: &str,
    log: &str,
) -> Commit {
    let date = members
        .iter()
        .map(|c| change_date(manager, c))
        .max()
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut message = if log.trim().is_empty() {
        if members.len() == 1 {
            format!("Update file {}\n", members[0].path())
        } else {
            format!("Update {} files\n", members.len())
        }
    } else {
        let mut m = log.to_string();
        if !m.ends_with('\n') {
            m.push('\n');
        }
        m
    };

    for member in members {
        if let FileChange::Update { file, path, old_revision, new_revision } = member {
            message.push_str(&format!("check-in {} rev. {} (was rev. {})", path, new_revision, old_revision));
            if let Some(label) = label_for(manager, *file, new_revision) {
                message.push_str(&format!(" labeled {}", label));
            }
            message.push('\n');
        }
    }
    if members.iter().any(|m| is_missing(manager, m)) {
        message.push_str(CONTENT_LOST_NOTICE);
    }

    let ops = members
        .iter()
        .map(|m| match m {
            FileChange::Update { file, path, new_revision, .. } => CommitOp::Update {
                file: *file,
                path: path.clone(),
                revision: new_revision.clone(),
            },
            _ => unreachable!("build_update_commit only handles FileChange::Update"),
        })
        .collect();

    Commit {
        committer: Committer::Author(author.to_string()),
        date,
        message,
        ops,
    }
}

fn merge_deletes(deletes: &[FileChange], checkpoint_date: SystemTime) -> Vec<Commit> {
    if deletes.is_empty() {
        return Vec::new();
    }

    let mut message = if deletes.len() == 1 {
        format!("Delete file {}\n", deletes[0].path())
    } else {
        format!("Delete {} files\n", deletes.len())
    };
    for delete in deletes {
        message.push_str(&format!("#mkssi: delete {} rev. {}\n", delete.path(), revision_of(delete)));
    }

    let ops = deletes
        .iter()
        .map(|d| CommitOp::Delete { path: d.path().to_string() })
        .collect();

    vec![Commit {
        committer: Committer::unknown(),
        date: checkpoint_date,
        message,
        ops,
    }]
}

fn revision_of(change: &FileChange) -> &Revision {
    match change {
        FileChange::Add { revision, .. } | FileChange::Delete { revision, .. } => revision,
        FileChange::Update { new_revision, .. } => new_revision,
    }
}

fn change_date(manager: &Manager, change: &FileChange) -> SystemTime {
    manager
        .rcs_file(change.file())
        .ok()
        .and_then(|file| file.versions.get(revision_of(change)))
        .map(|version| version.date)
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

fn file_author(manager: &Manager, change: &FileChange) -> Option<String> {
    let file = manager.rcs_file(change.file()).ok()?;
    let version = file.versions.get(revision_of(change))?;
    Some(version.author.to_string())
}

/// Whether `change`'s target revision content is unrecoverable (§4.2).
fn is_missing(manager: &Manager, change: &FileChange) -> bool {
    manager
        .rcs_file(change.file())
        .ok()
        .and_then(|file| file.derived(revision_of(change)))
        .map(|derived| derived.missing)
        .unwrap_or(false)
}

fn file_log(manager: &Manager, change: &FileChange) -> Option<String> {
    let file = manager.rcs_file(change.file()).ok()?;
    let patch = file.patches.get(revision_of(change))?;
    Some(String::from_utf8_lossy(&patch.log).into_owned())
}

fn label_for(manager: &Manager, file: RcsFileId, revision: &Revision) -> Option<String> {
    let file = manager.rcs_file(file).ok()?;
    file.symbols
        .iter()
        .find(|(_, rev)| rev == revision)
        .map(|(sym, _)| String::from_utf8_lossy(sym).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use state::RcsFile;
    use std::path::PathBuf;

    #[test]
    fn test_committer_helpers() {
        assert_eq!(
            Committer::unknown(),
            Committer::Fixed { name: "Unknown".into(), email: "unknown".into() }
        );
    }

    #[test]
    fn test_merge_adds_missing_content_stands_alone() {
        let mut manager = Manager::new();
        let file = manager.add_rcs_file(RcsFile::dummy(PathBuf::from("a.txt")));
        let rev = Revision::new(vec![1, 1]).unwrap();
        manager.rcs_file_mut(file).unwrap().derived_mut(&rev).missing = true;

        let other = manager.add_rcs_file(RcsFile::dummy(PathBuf::from("b.txt")));

        let adds = vec![
            FileChange::Add { file, path: "a.txt".into(), revision: rev.clone() },
            FileChange::Add { file: other, path: "b.txt".into(), revision: rev.clone() },
        ];

        let commits = merge_adds(&manager, &adds);
        // The missing-content add never joins the other file's commit.
        assert_eq!(commits.len(), 2);
        let lost = commits.iter().find(|c| c.message.contains(CONTENT_LOST_NOTICE)).unwrap();
        assert_eq!(lost.ops.len(), 1);
    }

    #[test]
    fn test_merge_deletes_single_commit() {
        let mut manager = Manager::new();
        let file = manager.add_rcs_file(RcsFile::dummy(PathBuf::from("a.txt")));
        let deletes = vec![FileChange::Delete {
            file,
            path: "a.txt".into(),
            revision: Revision::new(vec![1, 2]).unwrap(),
        }];

        let commits = merge_deletes(&deletes, SystemTime::UNIX_EPOCH);
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].committer, Committer::unknown());
        assert_eq!(commits[0].ops.len(), 1);
    }
}
