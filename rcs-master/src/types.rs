use derive_more::{Deref, From, Into};
use eq_macro::EqU8;
use std::{collections::HashMap, fmt::Display, io::Cursor, time::SystemTime};

use crate::Revision;

/// The parsed contents of one RCS master (a `,v` file), before any patch
/// application, keyword expansion, or project-level interpretation.
#[derive(Debug, Clone)]
pub struct File {
    pub admin: Admin,
    pub versions: HashMap<Revision, Version>,
    pub desc: Desc,
    pub patches: HashMap<Revision, Patch>,
}

impl File {
    pub fn head_version(&self) -> Option<(&Revision, &Version)> {
        let head = self.admin.head.as_ref()?;
        self.versions.get(head).map(|version| (head, version))
    }

    pub fn head(&self) -> Option<&Revision> {
        self.admin.head.as_ref()
    }

    pub fn revision(&self, revision: &Revision) -> Option<(&Version, &Patch)> {
        let version = self.versions.get(revision)?;
        let patch = self.patches.get(revision)?;
        Some((version, patch))
    }

    /// True if the `expand` mode is RCS's binary marker (`b`); MKSSI
    /// masters for binary files are written this way.
    pub fn is_binary(&self) -> bool {
        matches!(&self.admin.expand, Some(mode) if mode.0 == b"b")
    }
}

/// The admin section of an RCS master: everything before the first
/// delta.
#[derive(Debug, Clone)]
pub struct Admin {
    pub head: Option<Revision>,
    pub branch: Option<Revision>,
    pub access: Vec<Id>,
    /// Ordered so that tag precedence (last-defined-wins, first-seen
    /// iteration) is reproducible; RCS symbol tables are small so a
    /// linear scan on lookup is not a concern.
    pub symbols: Vec<(Sym, Revision)>,
    pub locks: HashMap<Id, Revision>,
    pub strict: bool,
    pub integrity: Option<IntString>,
    pub comment: Option<VString>,
    pub expand: Option<VString>,
}

impl Admin {
    pub fn symbol(&self, sym: &Sym) -> Option<&Revision> {
        self.symbols
            .iter()
            .find(|(candidate, _)| candidate == sym)
            .map(|(_, revision)| revision)
    }
}

/// One revision's metadata node (RCS calls this a "delta"): date,
/// author, lineage pointers. Carries no content; see [`Patch`].
#[derive(Debug, Clone)]
pub struct Version {
    pub date: SystemTime,
    pub author: Id,
    pub state: Option<Id>,
    pub branches: Vec<Revision>,
    /// The next revision in the `,v` chain: numerically smaller on the
    /// trunk (we're walking backwards from HEAD), numerically larger on
    /// a branch (branches are stored forwards from their root).
    pub next: Option<Revision>,
    pub commit_id: Option<Sym>,
}

pub type Desc = VString;

/// One revision's content node (RCS calls this "deltatext"): the commit
/// log message plus either the head revision's literal content or an
/// edit script to apply against the previous revision in the chain.
#[derive(Debug, Clone)]
pub struct Patch {
    pub log: VString,
    pub text: VString,
}

#[derive(Debug, Clone, PartialEq, Eq, EqU8, Deref, From, Into, Hash)]
pub struct Id(pub Vec<u8>);

#[derive(Debug, Clone, PartialEq, Eq, EqU8, Deref, From, Into, Hash)]
pub struct Sym(pub Vec<u8>);

#[derive(Debug, Clone, PartialEq, Eq, EqU8, Deref, From, Into, Hash)]
pub struct VString(pub Vec<u8>);

impl VString {
    pub fn as_cursor(&self) -> Cursor<&Vec<u8>> {
        Cursor::new(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, EqU8, Deref, From, Into, Hash)]
pub struct IntString(pub Vec<u8>);

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}
