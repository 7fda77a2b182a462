//! Working-project-directory tip ingestion (§6 `--proj-dir`, §4.11 step
//! 6): reads the uncheckpointed file list current on disk for `master`
//! and, if present, each variant branch under `project.vpj/`.

use std::{
    collections::HashMap,
    fs,
    path::Path,
    time::SystemTime,
};

use rcs_master::Revision;
use state::{CheckpointFileList, Manager};

use crate::{project, sanitize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}: missing `--MKS Project--` header (got {1:?})")]
    BadHeader(String, String),
}

/// A branch's uncheckpointed tip, plus the on-disk mtime of the
/// `project.pj` it was read from (used as the synthetic commit date for
/// any uncheckpointed changes emitted from it).
pub struct Tip {
    pub file_list: CheckpointFileList,
    pub mtime: SystemTime,
}

/// Reads `proj_dir`'s own `project.pj` as the tip file list for
/// `master`, plus one entry per subdirectory of `proj_dir/project.vpj`
/// whose own `project.pj` parses, keyed by its sanitized branch name.
pub fn read(manager: &mut Manager, proj_dir: &Path) -> anyhow::Result<HashMap<String, Tip>> {
    let mut tips = HashMap::new();

    if let Some(list) = read_one(manager, &proj_dir.join("project.pj"))? {
        tips.insert("master".to_string(), list);
    }

    let vpj_dir = proj_dir.join("project.vpj");
    if vpj_dir.is_dir() {
        for entry in fs::read_dir(&vpj_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let raw_name = entry.file_name().to_string_lossy().into_owned();
            let name = match sanitize::sanitize(&raw_name) {
                Some(n) => n,
                None => continue,
            };
            if let Some(list) = read_one(&mut *manager, &entry.path().join("project.pj"))? {
                tips.insert(name, list);
            }
        }
    }

    Ok(tips)
}

/// Parses one working-directory `project.pj`, validating the literal
/// `--MKS Project--` header (LF or CRLF terminated, per §6) rather than
/// the broader set of headers a checkpointed revision may carry.
fn read_one(manager: &mut Manager, path: &Path) -> anyhow::Result<Option<Tip>> {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
    let bytes = fs::read(path)?;

    let text = String::from_utf8_lossy(&bytes);
    let first_line_len = text.find('\n').map(|i| i + 1).unwrap_or(text.len());
    let first_line = text[..first_line_len].trim_end_matches(['\r', '\n']);
    if first_line != "--MKS Project--" {
        return Err(Error::BadHeader(path.display().to_string(), first_line.to_string()).into());
    }

    let entries = project::parse_entries_from_body(manager, &Revision::Tip, &text)?;
    Ok(Some(Tip {
        file_list: CheckpointFileList {
            project_revision: Revision::Tip,
            entries,
        },
        mtime,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const PJ_BODY: &str = "--MKS Project--\n\
10 \"project.pj\" 0\n\
Project\n\
TargetOptions\n\
EndOptions\n\
\"$(projectdir)/foo.txt\" a 1.1\n";

    fn manager_with_foo() -> Manager {
        let mut manager = Manager::new();
        manager.add_rcs_file(state::RcsFile::dummy(std::path::PathBuf::from("foo.txt")));
        manager
    }

    #[test]
    fn reads_master_project_pj() {
        let mut manager = manager_with_foo();
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("project.pj"), PJ_BODY).unwrap();

        let tips = read(&mut manager, dir.path()).unwrap();
        let tip = tips.get("master").expect("master tip present");
        assert_eq!(tip.file_list.entries.len(), 1);
        assert_eq!(tip.file_list.entries[0].path, "foo.txt");
    }

    #[test]
    fn reads_variant_branch_project_pj() {
        let mut manager = manager_with_foo();
        let dir = tempfile::tempdir().unwrap();
        let vpj = dir.path().join("project.vpj").join("Release 1");
        fs::create_dir_all(&vpj).unwrap();
        fs::write(vpj.join("project.pj"), PJ_BODY).unwrap();

        let tips = read(&mut manager, dir.path()).unwrap();
        assert!(tips.contains_key("Release_1"));
    }

    #[test]
    fn missing_proj_dir_yields_no_tips() {
        let mut manager = Manager::new();
        let dir = tempfile::tempdir().unwrap();

        let tips = read(&mut manager, dir.path()).unwrap();
        assert!(tips.is_empty());
    }

    #[test]
    fn bad_header_is_an_error() {
        let mut manager = Manager::new();
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("project.pj"), "not a project file\n").unwrap();

        assert!(read(&mut manager, dir.path()).is_err());
    }
}
