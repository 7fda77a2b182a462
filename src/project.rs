//! Project manifest parser (§4.7): walks every revision of
//! `project.pj`, extracting each revision's file list (a
//! `CheckpointFileList`) and the `_mks_variant_projects` branch table.

use std::{collections::HashMap, str::FromStr};

use rcs_master::Revision;
use state::{BranchTableEntry, CheckpointEntry, CheckpointFileList, Manager, Project, RcsFileId};

use crate::sanitize;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("project.pj revision {0}: missing header (expected `--MKS Project--` or `--MKS Variant Project--`)")]
    BadHeader(Revision),

    #[error("project.pj revision {0}: unsupported member type {1:?} for {2}")]
    UnsupportedMemberType(Revision, char, String),
}

struct RawEntry {
    path: String,
    kind: char,
    revision: Revision,
}

/// Parses every revision of `project.pj`, populating the manager's
/// checkpoint table, marking referenced versions `checkpointed`, and
/// installing the deduplicated branch table.
pub fn parse_all(manager: &mut Manager, project_file: RcsFileId) -> anyhow::Result<()> {
    let (head, binary) = {
        let file = manager.rcs_file(project_file)?;
        (file.head.clone(), file.binary)
    };
    let head = match head {
        Some(h) => h,
        None => anyhow::bail!("project.pj has no head revision"),
    };

    let mut raw = HashMap::new();
    crate::materialize::walk(manager, project_file, &head, None, false, binary, &mut raw)?;

    let mut branch_rows: Vec<(Revision, String)> = Vec::new();

    let mut revisions: Vec<Revision> = raw.keys().cloned().collect();
    revisions.sort();

    for revision in &revisions {
        let (data, _, _) = &raw[revision];
        match parse_revision(manager, revision, data) {
            Ok((entries, names)) => {
                for entry in &entries {
                    if let Ok(file) = manager.rcs_file_mut(entry.file) {
                        file.derived_mut(&entry.revision).checkpointed = true;
                    }
                }
                manager.add_checkpoint(CheckpointFileList {
                    project_revision: revision.clone(),
                    entries,
                });
                for name in names {
                    branch_rows.push((revision.clone(), name));
                }
            }
            Err(e) => {
                log::warn!("project.pj revision {}: {}", revision, e);
            }
        }
    }

    let branch_table = dedupe_branch_rows(branch_rows);
    manager.set_project(Project { file: project_file, branch_table });

    Ok(())
}

fn parse_revision(
    manager: &mut Manager,
    revision: &Revision,
    data: &[u8],
) -> anyhow::Result<(Vec<CheckpointEntry>, Vec<String>)> {
    let text = String::from_utf8_lossy(data);

    let first_line = text.lines().next().unwrap_or_default();
    if first_line != "--MKS Project--" && first_line != "--MKS Variant Project--" {
        return Err(Error::BadHeader(revision.clone()).into());
    }

    let entries = parse_entries_from_body(manager, revision, &text)?;
    let names = parse_branch_names(&text);
    Ok((entries, names))
}

/// Parses the file-list entries out of a project manifest's text body
/// (the region between `EndOptions` and any `_mks_variant_projects`
/// block), shared between checkpoint parsing here and tip file-list
/// parsing in [`crate::tip`]. Registers a dummy [`state::RcsFile`] for any
/// referenced path with no corresponding RCS master (§3: a checkpoint may
/// legitimately reference a file that exists only in the project
/// directory) rather than aliasing the entry to an unrelated file.
pub(crate) fn parse_entries_from_body(
    manager: &mut Manager,
    revision: &Revision,
    text: &str,
) -> anyhow::Result<Vec<CheckpointEntry>> {
    let body_start = text
        .find("\nEndOptions\r\n")
        .map(|i| i + "\nEndOptions\r\n".len())
        .or_else(|| text.find("\nEndOptions\n").map(|i| i + "\nEndOptions\n".len()));

    let mut entries = Vec::new();
    let mut seen_dirs: HashMap<String, String> = HashMap::new();

    if let Some(start) = body_start {
        let branch_block_start = text[start..].find("block _mks_variant_projects");
        let body_end = branch_block_start.map(|i| start + i).unwrap_or(text.len());

        for line in text[start..body_end].lines() {
            if line.trim().is_empty() {
                continue;
            }
            let entry = match parse_file_line(line) {
                Some(e) => e,
                None => continue,
            };

            match entry.kind {
                'a' => {
                    let path = stabilize_case(&mut seen_dirs, &entry.path);
                    let file = match manager.rcs_file_id_by_path(&path) {
                        Some(id) => id,
                        None => {
                            log::warn!(
                                "project.pj revision {}: {} has no RCS master; registering as a dummy file",
                                revision,
                                path
                            );
                            manager.add_rcs_file(state::RcsFile::dummy(std::path::PathBuf::from(&path)))
                        }
                    };
                    entries.push(CheckpointEntry { file, revision: entry.revision, path });
                }
                'f' => {}
                other => {
                    return Err(Error::UnsupportedMemberType(revision.clone(), other, entry.path).into());
                }
            }
        }
    }

    Ok(entries)
}

fn parse_file_line(line: &str) -> Option<RawEntry> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (path_field, rest) = if let Some(stripped) = trimmed.strip_prefix('"') {
        let end = stripped.find('"')?;
        (&stripped[..end], stripped[end + 1..].trim_start())
    } else {
        let sp = trimmed.find(char::is_whitespace)?;
        (&trimmed[..sp], trimmed[sp..].trim_start())
    };

    let path = path_field.strip_prefix("$(projectdir)/")?.to_string();

    let mut fields = rest.split_whitespace();
    let kind = fields.next()?.chars().next()?;
    let revision_str = fields.next()?;
    let revision = Revision::from_str(revision_str).ok()?;

    Some(RawEntry { path, kind, revision })
}

/// Stabilizes a canonical path's directory components to the first
/// casing seen for each directory within this project revision.
fn stabilize_case(seen_dirs: &mut HashMap<String, String>, path: &str) -> String {
    let (dir, base) = match path.rsplit_once('/') {
        Some((d, b)) => (d, b),
        None => return path.to_string(),
    };

    let key = dir.to_lowercase();
    let canonical_dir = seen_dirs.entry(key).or_insert_with(|| dir.to_string());
    format!("{}/{}", canonical_dir, base)
}

fn parse_branch_names(text: &str) -> Vec<String> {
    let mut names = Vec::new();

    let start = match text.find("block _mks_variant_projects") {
        Some(i) => i,
        None => return names,
    };
    let block = &text[start..];
    let end = block.find("\nend").map(|i| i).unwrap_or(block.len());

    for line in block[..end].lines().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (_, rest) = match line.split_once(',') {
            Some(parts) => parts,
            None => continue,
        };
        let rest = rest.trim();
        let name = rest.trim_matches('"');
        if let Some(sanitized) = sanitize::sanitize(name) {
            names.push(sanitized);
        }
    }

    names
}

fn dedupe_branch_rows(rows: Vec<(Revision, String)>) -> Vec<BranchTableEntry> {
    let mut best: HashMap<String, Revision> = HashMap::new();
    for (revision, name) in &rows {
        match best.get(name) {
            Some(existing) if existing >= revision => {}
            _ => {
                best.insert(name.clone(), revision.clone());
            }
        }
    }

    best.into_iter()
        .map(|(name, revision)| BranchTableEntry { revision, name })
        .collect()
}
