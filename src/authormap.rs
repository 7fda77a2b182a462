//! `--authormap` side table (§6): a flat-text file mapping MKSSI
//! usernames to `Proper Name <email>` identities.

use std::{cell::RefCell, collections::HashMap, fs, path::Path};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("reading author map {path}: {source}")]
    Io { path: String, source: std::io::Error },

    #[error("author map {path} line {line}: conflicting mapping for {username:?}")]
    Conflict { path: String, line: usize, username: String },

    #[error("author map {path} line {line}: malformed identity {raw:?}")]
    Malformed { path: String, line: usize, raw: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

/// Resolves MKSSI usernames to git identities, and (in `--authorlist`
/// mode) collects every username seen that the map didn't cover.
#[derive(Debug, Default)]
pub struct AuthorMap {
    entries: HashMap<String, Identity>,
    unresolved: RefCell<std::collections::BTreeSet<String>>,
}

impl AuthorMap {
    pub fn load(path: &Path) -> Result<Self, Error> {
        let text = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;

        let mut map = Self::default();
        for (i, line) in text.lines().enumerate() {
            let line_no = i + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let (username, rest) = match trimmed.split_once('=') {
                Some(parts) => parts,
                None => continue,
            };
            let username = username.trim().to_lowercase();
            let identity = parse_identity(rest.trim()).ok_or_else(|| Error::Malformed {
                path: path.display().to_string(),
                line: line_no,
                raw: line.to_string(),
            })?;

            match map.entries.get(&username) {
                Some(existing) if *existing == identity => {}
                Some(_) => {
                    return Err(Error::Conflict {
                        path: path.display().to_string(),
                        line: line_no,
                        username,
                    });
                }
                None => {
                    map.entries.insert(username, identity);
                }
            }
        }

        Ok(map)
    }

    /// Resolves a username, recording it as unresolved (for
    /// `--authorlist`) when the map has no entry.
    pub fn resolve(&self, username: &str) -> Option<Identity> {
        let key = username.to_lowercase();
        match self.entries.get(&key) {
            Some(identity) => Some(identity.clone()),
            None => {
                self.unresolved.borrow_mut().insert(key);
                None
            }
        }
    }

    pub fn unresolved(&self) -> Vec<String> {
        self.unresolved.borrow().iter().cloned().collect()
    }
}

/// Parses `Proper Name <email>[ TZ]`; the trailing timezone, if
/// present, is ignored.
fn parse_identity(rest: &str) -> Option<Identity> {
    let open = rest.find('<')?;
    let close = rest[open..].find('>')? + open;
    let name = rest[..open].trim().to_string();
    let email = rest[open + 1..close].trim().to_string();

    if name.is_empty() || email.is_empty() {
        return None;
    }
    Some(Identity { name, email })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parses_basic_mapping() {
        let file = write_tmp("alice = Alice Example <alice@example.com>\n");
        let map = AuthorMap::load(file.path()).unwrap();
        assert_eq!(
            map.resolve("ALICE"),
            Some(Identity { name: "Alice Example".into(), email: "alice@example.com".into() })
        );
    }

    #[test]
    fn test_skips_comments_and_blank_lines() {
        let file = write_tmp("# comment\n\nalice = Alice <a@x.com>\n");
        let map = AuthorMap::load(file.path()).unwrap();
        assert!(map.resolve("alice").is_some());
    }

    #[test]
    fn test_ignores_lines_without_equals() {
        let file = write_tmp("not a mapping line\nbob = Bob <b@x.com>\n");
        let map = AuthorMap::load(file.path()).unwrap();
        assert!(map.resolve("bob").is_some());
    }

    #[test]
    fn test_identical_duplicate_tolerated() {
        let file = write_tmp("alice = Alice <a@x.com>\nalice = Alice <a@x.com>\n");
        assert!(AuthorMap::load(file.path()).is_ok());
    }

    #[test]
    fn test_conflicting_duplicate_fatal() {
        let file = write_tmp("alice = Alice <a@x.com>\nalice = Alice Two <a2@x.com>\n");
        assert!(matches!(AuthorMap::load(file.path()), Err(Error::Conflict { .. })));
    }

    #[test]
    fn test_unresolved_is_tracked() {
        let map = AuthorMap::default();
        assert!(map.resolve("carol").is_none());
        assert_eq!(map.unresolved(), vec!["carol".to_string()]);
    }
}
