//! RCS master discovery (§4.11 step 1): walks `--rcs-dir`, parses every
//! RCS master it finds, and registers each as an `RcsFile` (real or
//! corrupt) in the `Manager`.

use std::path::{Path, PathBuf};

use state::Manager;
use walkdir::WalkDir;

/// `vc_XXXX.000`: 4 hex digits, then a numeric extension.
fn is_mks_temp_file(name: &str) -> bool {
    name.starts_with("vc_")
        && name
            .rsplit_once('.')
            .map(|(stem, ext)| {
                !ext.is_empty()
                    && ext.chars().all(|c| c.is_ascii_digit())
                    && stem.len() == "vc_".len() + 4
                    && stem["vc_".len()..].chars().all(|c| c.is_ascii_hexdigit())
            })
            .unwrap_or(false)
}

fn is_mks_revs_dir(name: &str) -> bool {
    name.starts_with("mks.") && name.ends_with(".revs")
}

/// True for the one `*.pj` file the walk lets through: `<rcs_dir>/project.pj`
/// itself, "explicitly ingested" per §4.11 step 1. Every other `.pj` file
/// (variant branch manifests such as `vpXXXX.pj`) is a historical revision
/// reached through `project.pj`'s own RCS chain, not a standalone master, so
/// the walk must not parse it a second time as regular content.
fn is_ingested_project_pj(rcs_dir: &Path, path: &Path, projectpj_name: &str) -> bool {
    path.parent() == Some(rcs_dir)
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.eq_ignore_ascii_case(projectpj_name))
            .unwrap_or(false)
}

fn should_skip(rcs_dir: &Path, path: &Path, projectpj_name: &str) -> bool {
    let name = match path.file_name().and_then(|n| n.to_str()) {
        Some(n) => n,
        None => return true,
    };

    if name == "." || name == ".." {
        return true;
    }
    if path.is_dir() {
        return is_mks_revs_dir(name);
    }
    if path.extension().and_then(|e| e.to_str()) == Some("pj") {
        return !is_ingested_project_pj(rcs_dir, path, projectpj_name);
    }
    is_mks_temp_file(name)
}

/// Walks `rcs_dir`, parsing every RCS master found (skipping variant
/// manifests other than `project.pj` itself, MKS temp files, and
/// `mks.*.revs` scratch directories) and registering each into `manager`.
///
/// Returns the number of masters successfully parsed and the number
/// registered as corrupt placeholders.
pub fn discover(manager: &mut Manager, rcs_dir: &Path, ignore_errors: bool) -> anyhow::Result<(usize, usize)> {
    discover_named(manager, rcs_dir, "project.pj", ignore_errors)
}

/// As [`discover`], but lets a caller-chosen `project.pj` name through the
/// `*.pj` skip rule (tests exercise this without hardcoding the name).
pub fn discover_named(
    manager: &mut Manager,
    rcs_dir: &Path,
    projectpj_name: &str,
    ignore_errors: bool,
) -> anyhow::Result<(usize, usize)> {
    let mut ok = 0;
    let mut corrupt = 0;

    for entry in WalkDir::new(rcs_dir)
        .into_iter()
        .filter_entry(|e| !should_skip(rcs_dir, e.path(), projectpj_name))
    {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let master_path = entry.path().to_path_buf();
        let logical_name = logical_name_for(rcs_dir, &master_path);

        let bytes = std::fs::read(&master_path)?;
        match rcs_master::parse(&bytes) {
            Ok(file) => {
                log::trace!("{}: parsed", master_path.display());
                manager.add_rcs_file(state::RcsFile::from_parsed(logical_name, master_path, file));
                ok += 1;
            }
            Err(e) => {
                log::warn!("{}: failed to parse RCS master: {}", master_path.display(), e);
                manager.add_rcs_file(state::RcsFile::corrupt(logical_name, master_path.clone()));
                corrupt += 1;
                if !ignore_errors {
                    anyhow::bail!("{}: failed to parse RCS master: {}", master_path.display(), e);
                }
            }
        }
    }

    Ok((ok, corrupt))
}

/// Derives a file's logical (checked-out) path from its on-disk master
/// path: strips the `--rcs-dir` prefix and the trailing `,v` suffix.
fn logical_name_for(rcs_dir: &Path, master_path: &Path) -> PathBuf {
    let relative = master_path.strip_prefix(rcs_dir).unwrap_or(master_path);
    match relative.to_str() {
        Some(s) => PathBuf::from(s.strip_suffix(",v").unwrap_or(s)),
        None => relative.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mks_temp_file_detection() {
        assert!(is_mks_temp_file("vc_a1b2.000"));
        assert!(is_mks_temp_file("vc_FFFF.123"));
        assert!(!is_mks_temp_file("vc_a1b2extra.000"));
        assert!(!is_mks_temp_file("foo.c,v"));
    }

    #[test]
    fn test_mks_revs_dir_detection() {
        assert!(is_mks_revs_dir("mks.foo.revs"));
        assert!(!is_mks_revs_dir("mks.foo"));
    }

    #[test]
    fn test_logical_name_strips_prefix_and_suffix() {
        let rcs_dir = Path::new("/repo/rcs");
        let master = Path::new("/repo/rcs/src/foo.c,v");
        assert_eq!(logical_name_for(rcs_dir, master), PathBuf::from("src/foo.c"));
    }

    #[test]
    fn test_root_project_pj_is_not_skipped() {
        let rcs_dir = Path::new("/repo/rcs");
        assert!(!should_skip(rcs_dir, &rcs_dir.join("project.pj"), "project.pj"));
        // Case-insensitive, matching MKSSI's own lookup rule (§3).
        assert!(!should_skip(rcs_dir, &rcs_dir.join("PROJECT.PJ"), "project.pj"));
    }

    #[test]
    fn test_other_pj_files_are_skipped() {
        let rcs_dir = Path::new("/repo/rcs");
        assert!(should_skip(rcs_dir, &rcs_dir.join("vp0001.pj"), "project.pj"));
        // A nested project.pj (e.g. under a subdirectory) isn't the root
        // manifest and stays skipped.
        assert!(should_skip(rcs_dir, &rcs_dir.join("sub/project.pj"), "project.pj"));
    }

    #[test]
    fn test_discover_ingests_root_project_pj() {
        use std::fs;

        let master = concat!(
            "head     1.1;\naccess;\nsymbols;\nlocks; strict;\ncomment @# @;\n\n",
            "1.1\ndate     2021.08.11.19.08.27;  author alice;  state Exp;\n",
            "branches;\nnext     ;\n\n",
            "desc\n@@\n\n",
            "1.1\nlog\n@first revision@\ntext\n@--MKS Project--\n@\n",
        );

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("project.pj"), master).unwrap();
        // A sibling variant manifest must stay invisible to the walk; it's
        // reached only through project.pj's own RCS history (§4.7).
        fs::write(dir.path().join("vp0001.pj"), master).unwrap();

        let mut manager = Manager::new();
        let (ok, corrupt) = discover(&mut manager, dir.path(), false).unwrap();
        assert_eq!((ok, corrupt), (1, 0));
        assert!(manager.rcs_file_id_by_path("project.pj").is_some());
    }
}
