//! Changeset construction (§4.8): diffs two checkpoints' file lists and
//! adjusts the result for MKSSI's add/delete/update quirks.

use std::{
    collections::{HashMap, HashSet},
    time::SystemTime,
};

use rcs_master::Revision;
use state::{CheckpointEntry, Manager, RcsFile, RcsFileId};

use crate::types::{Changeset, FileChange, RenameTarget};

pub fn build(
    manager: &Manager,
    old_entries: &[CheckpointEntry],
    old_date: SystemTime,
    new_entries: &[CheckpointEntry],
    new_date: SystemTime,
) -> Changeset {
    let old_by_file: HashMap<RcsFileId, &CheckpointEntry> =
        old_entries.iter().map(|e| (e.file, e)).collect();
    let new_by_file: HashMap<RcsFileId, &CheckpointEntry> =
        new_entries.iter().map(|e| (e.file, e)).collect();

    let mut renames = Vec::new();
    let mut seen_dir_renames = HashSet::new();
    let mut adds = Vec::new();
    let mut updates = Vec::new();
    let mut deletes = Vec::new();

    for (file, new_entry) in new_by_file.iter() {
        match old_by_file.get(file) {
            None => adds.push(FileChange::Add {
                file: *file,
                path: new_entry.path.clone(),
                revision: new_entry.revision.clone(),
            }),
            Some(old_entry) => {
                if let Some(rename) =
                    detect_rename(*file, &old_entry.path, &new_entry.path, &mut seen_dir_renames)
                {
                    renames.push(rename);
                }

                if old_entry.revision != new_entry.revision {
                    updates.push(FileChange::Update {
                        file: *file,
                        path: new_entry.path.clone(),
                        old_revision: old_entry.revision.clone(),
                        new_revision: new_entry.revision.clone(),
                    });
                }
            }
        }
    }

    for (file, old_entry) in old_by_file.iter() {
        if !new_by_file.contains_key(file) {
            deletes.push(FileChange::Delete {
                file: *file,
                path: old_entry.path.clone(),
                revision: old_entry.revision.clone(),
            });
        }
    }

    let extra_updates_from_adds = adjust_adds(manager, &mut adds, old_date);
    let extra_updates_from_deletes = adjust_deletes(manager, &mut deletes, new_date);
    updates.extend(extra_updates_from_adds);
    updates.extend(extra_updates_from_deletes);
    updates = adjust_updates(manager, updates);

    drop_unrecoverable(manager, &mut adds);
    drop_unrecoverable(manager, &mut updates);
    drop_unrecoverable(manager, &mut deletes);

    sort_renames(manager, &mut renames);
    sort_adds_or_deletes(manager, &mut adds);
    sort_updates(manager, &mut updates);
    sort_adds_or_deletes(manager, &mut deletes);

    Changeset {
        renames,
        adds,
        updates,
        deletes,
    }
}

/// Detects a case-only rename of a file's directory or basename between
/// two checkpoints. Directory renames are deduplicated by their
/// lowercased old path so the same directory isn't re-emitted once per
/// file it contains.
fn detect_rename(
    file: RcsFileId,
    old_path: &str,
    new_path: &str,
    seen_dir_renames: &mut HashSet<String>,
) -> Option<RenameTarget> {
    if old_path == new_path || !old_path.eq_ignore_ascii_case(new_path) {
        return None;
    }

    let (old_dir, old_base) = split_path(old_path);
    let (new_dir, new_base) = split_path(new_path);

    if old_dir != new_dir && old_dir.eq_ignore_ascii_case(new_dir) {
        let key = old_dir.to_lowercase();
        if seen_dir_renames.insert(key) {
            return Some(RenameTarget::Directory {
                old: old_dir.to_string(),
                new: new_dir.to_string(),
            });
        }
        return None;
    }

    if old_base != new_base {
        return Some(RenameTarget::File {
            file,
            old: old_path.to_string(),
            new: new_path.to_string(),
        });
    }

    None
}

fn split_path(path: &str) -> (&str, &str) {
    match path.rsplit_once('/') {
        Some((dir, base)) => (dir, base),
        None => ("", path),
    }
}

/// For each add, climbs predecessors (the version chain's `next` links)
/// looking for a non-checkpointed ancestor dated after `old_date`. When
/// found, the add's revision is pulled back to the earliest such
/// ancestor and the climbed steps become intervening updates.
fn adjust_adds(manager: &Manager, adds: &mut [FileChange], old_date: SystemTime) -> Vec<FileChange> {
    let mut generated = Vec::new();

    for add in adds.iter_mut() {
        if let FileChange::Add { file, path, revision } = add {
            let rcs_file = match manager.rcs_file(*file) {
                Ok(f) => f,
                Err(_) => continue,
            };

            let chain = climb_backward(rcs_file, revision, old_date);
            if chain.is_empty() {
                continue;
            }

            let mut sequence: Vec<Revision> = chain.into_iter().rev().collect();
            sequence.push(revision.clone());

            for window in sequence.windows(2) {
                generated.push(FileChange::Update {
                    file: *file,
                    path: path.clone(),
                    old_revision: window[0].clone(),
                    new_revision: window[1].clone(),
                });
            }

            *revision = sequence[0].clone();
        }
    }

    generated
}

/// Symmetric to [`adjust_adds`]: climbs *successors* looking for a
/// non-checkpointed descendant dated before `new_date`.
fn adjust_deletes(manager: &Manager, deletes: &mut [FileChange], new_date: SystemTime) -> Vec<FileChange> {
    let mut generated = Vec::new();

    for delete in deletes.iter_mut() {
        if let FileChange::Delete { file, path, revision } = delete {
            let rcs_file = match manager.rcs_file(*file) {
                Ok(f) => f,
                Err(_) => continue,
            };

            let successors = build_successor_index(rcs_file);
            let chain = climb_forward(rcs_file, &successors, revision, new_date);
            if chain.is_empty() {
                continue;
            }

            let mut sequence: Vec<Revision> = vec![revision.clone()];
            sequence.extend(chain.iter().cloned());

            for window in sequence.windows(2) {
                generated.push(FileChange::Update {
                    file: *file,
                    path: path.clone(),
                    old_revision: window[0].clone(),
                    new_revision: window[1].clone(),
                });
            }

            *revision = sequence.last().unwrap().clone();
        }
    }

    generated
}

fn climb_backward(file: &RcsFile, from: &Revision, stop_date: SystemTime) -> Vec<Revision> {
    let mut chain = Vec::new();
    let mut current = from.clone();

    loop {
        let version = match file.versions.get(&current) {
            Some(v) => v,
            None => break,
        };
        let predecessor = match &version.next {
            Some(p) => p.clone(),
            None => break,
        };
        let predecessor_version = match file.versions.get(&predecessor) {
            Some(v) => v,
            None => break,
        };
        if predecessor_version.date <= stop_date {
            break;
        }

        let checkpointed = file
            .derived(&predecessor)
            .map(|d| d.checkpointed)
            .unwrap_or(false);
        if checkpointed {
            break;
        }

        chain.push(predecessor.clone());
        current = predecessor;
    }

    chain
}

fn climb_forward(
    file: &RcsFile,
    successors: &HashMap<Revision, Revision>,
    from: &Revision,
    stop_date: SystemTime,
) -> Vec<Revision> {
    let mut chain = Vec::new();
    let mut current = from.clone();

    loop {
        let successor = match successors.get(&current) {
            Some(s) => s.clone(),
            None => break,
        };
        let successor_version = match file.versions.get(&successor) {
            Some(v) => v,
            None => break,
        };
        if successor_version.date >= stop_date {
            break;
        }

        let checkpointed = file
            .derived(&successor)
            .map(|d| d.checkpointed)
            .unwrap_or(false);
        if checkpointed {
            break;
        }

        chain.push(successor.clone());
        current = successor;
    }

    chain
}

fn build_successor_index(file: &RcsFile) -> HashMap<Revision, Revision> {
    let mut index = HashMap::new();
    for (revision, version) in file.versions.iter() {
        if let Some(next) = &version.next {
            index.insert(next.clone(), revision.clone());
        }
    }
    index
}

/// Expands each non-revert update to cover every intermediate revision,
/// eliding steps onto a revision whose log is the literal
/// `Duplicate revision\n` auto-generated when a branch is cut.
fn adjust_updates(manager: &Manager, updates: Vec<FileChange>) -> Vec<FileChange> {
    let mut expanded = Vec::with_capacity(updates.len());

    for update in updates {
        let (file, path, old_revision, new_revision) = match &update {
            FileChange::Update { file, path, old_revision, new_revision } => {
                (*file, path.clone(), old_revision.clone(), new_revision.clone())
            }
            _ => {
                expanded.push(update);
                continue;
            }
        };

        if new_revision <= old_revision {
            // Reversions stay atomic.
            expanded.push(update);
            continue;
        }

        let rcs_file = match manager.rcs_file(file) {
            Ok(f) => f,
            Err(_) => {
                expanded.push(update);
                continue;
            }
        };

        let successors = build_successor_index(rcs_file);
        let mut sequence = vec![old_revision.clone()];
        let mut cursor = old_revision.clone();
        let mut found = false;
        for _ in 0..1_000_000 {
            if cursor == new_revision {
                found = true;
                break;
            }
            match successors.get(&cursor) {
                Some(next) => {
                    cursor = next.clone();
                    sequence.push(cursor.clone());
                }
                None => break,
            }
        }

        if !found {
            // No traceable path (corruption); keep the update atomic.
            expanded.push(update);
            continue;
        }

        let filtered: Vec<Revision> = std::iter::once(sequence[0].clone())
            .chain(sequence[1..sequence.len() - 1].iter().filter(|r| {
                !is_duplicate_revision(rcs_file, r)
            }).cloned())
            .chain(std::iter::once(sequence[sequence.len() - 1].clone()))
            .collect();

        for window in filtered.windows(2) {
            expanded.push(FileChange::Update {
                file,
                path: path.clone(),
                old_revision: window[0].clone(),
                new_revision: window[1].clone(),
            });
        }
    }

    expanded
}

fn is_duplicate_revision(file: &RcsFile, revision: &Revision) -> bool {
    if !revision.is_branch_root_first_commit() {
        return false;
    }
    file.patches
        .get(revision)
        .map(|patch| patch.log.as_slice() == b"Duplicate revision\n")
        .unwrap_or(false)
}

fn drop_unrecoverable(manager: &Manager, changes: &mut Vec<FileChange>) {
    changes.retain(|change| {
        let file = match manager.rcs_file(change.file()) {
            Ok(f) => f,
            Err(_) => return false,
        };

        let revisions: Vec<&Revision> = match change {
            FileChange::Add { revision, .. } | FileChange::Delete { revision, .. } => vec![revision],
            FileChange::Update { old_revision, new_revision, .. } => vec![old_revision, new_revision],
        };

        for revision in revisions {
            if !file.versions.contains_key(revision) || !file.patches.contains_key(revision) {
                log::warn!(
                    "{}: dropping change referencing unrecoverable revision {}",
                    file.logical_name.display(),
                    revision
                );
                return false;
            }
        }
        true
    });
}

fn sort_renames(manager: &Manager, renames: &mut [RenameTarget]) {
    renames.sort_by_cached_key(|rename| match rename {
        RenameTarget::Directory { old, .. } => old.to_lowercase(),
        RenameTarget::File { old, .. } => old.to_lowercase(),
    });
    let _ = manager;
}

fn sort_adds_or_deletes(manager: &Manager, changes: &mut [FileChange]) {
    changes.sort_by_cached_key(|change| {
        let date = change_date(manager, change);
        (date, change.path().to_string())
    });
}

fn sort_updates(manager: &Manager, updates: &mut [FileChange]) {
    updates.sort_by_cached_key(|change| {
        let date = change_date(manager, change);
        let new_revision = match change {
            FileChange::Update { new_revision, .. } => Some(new_revision.clone()),
            _ => None,
        };
        (date, change.file(), new_revision)
    });
}

fn change_date(manager: &Manager, change: &FileChange) -> SystemTime {
    let revision = match change {
        FileChange::Add { revision, .. } | FileChange::Delete { revision, .. } => revision,
        FileChange::Update { new_revision, .. } => new_revision,
    };

    manager
        .rcs_file(change.file())
        .ok()
        .and_then(|file| file.versions.get(revision))
        .map(|version| version.date)
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_path() {
        assert_eq!(split_path("a/b/c.txt"), ("a/b", "c.txt"));
        assert_eq!(split_path("c.txt"), ("", "c.txt"));
    }

    fn file_id(manager: &mut Manager, name: &str) -> RcsFileId {
        manager.add_rcs_file(RcsFile::dummy(std::path::PathBuf::from(name)))
    }

    #[test]
    fn test_detect_rename_directory_deduped() {
        let mut manager = Manager::new();
        let mut seen = HashSet::new();
        let a = detect_rename(file_id(&mut manager, "a"), "Foo/a.txt", "foo/a.txt", &mut seen);
        let b = detect_rename(file_id(&mut manager, "b"), "Foo/b.txt", "foo/b.txt", &mut seen);
        assert!(matches!(a, Some(RenameTarget::Directory { .. })));
        assert!(b.is_none(), "second file in the same directory shouldn't re-emit the rename");
    }

    #[test]
    fn test_detect_rename_basename_only() {
        let mut manager = Manager::new();
        let mut seen = HashSet::new();
        let r = detect_rename(file_id(&mut manager, "a"), "dir/Foo.txt", "dir/foo.txt", &mut seen);
        assert!(matches!(r, Some(RenameTarget::File { .. })));
    }

    #[test]
    fn test_detect_rename_none_when_identical() {
        let mut manager = Manager::new();
        let mut seen = HashSet::new();
        assert!(detect_rename(file_id(&mut manager, "a"), "dir/foo.txt", "dir/foo.txt", &mut seen).is_none());
    }

    #[test]
    fn test_is_duplicate_revision_requires_branch_root_shape() {
        let mut file = RcsFile::dummy(std::path::PathBuf::from("f.txt"));
        file.patches.insert(
            Revision::new(vec![1, 2, 1, 1]).unwrap(),
            rcs_master::Patch { log: b"Duplicate revision\n".to_vec().into(), text: Vec::new().into() },
        );
        file.patches.insert(
            Revision::new(vec![1, 2]).unwrap(),
            rcs_master::Patch { log: b"Duplicate revision\n".to_vec().into(), text: Vec::new().into() },
        );

        assert!(is_duplicate_revision(&file, &Revision::new(vec![1, 2, 1, 1]).unwrap()));
        // Same log text, but shape doesn't match a branch root: not a
        // duplicate revision.
        assert!(!is_duplicate_revision(&file, &Revision::new(vec![1, 2]).unwrap()));
    }
}
