//! Revision-number algebra: ordering, parentage, and trunk/branch
//! classification on the dotted integer sequences RCS uses to name
//! revisions (`1.1`, `1.2.1.3`, ...).

use std::{fmt::Display, str::FromStr};

use thiserror::Error;

/// The implementation bound on the number of dotted components a
/// revision number may carry. MKSSI repositories occasionally carry
/// deeply nested branches-of-branches; this is generous enough to admit
/// any we've seen in the wild while still catching runaway parses.
pub const MAX_COMPONENTS: usize = 22;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("revision number has an odd number of components: {0}")]
    OddLength(String),

    #[error("revision number has too few components: {0}")]
    TooShort(String),

    #[error("revision number exceeds {MAX_COMPONENTS} components: {0}")]
    TooLong(String),

    #[error("revision number component is not a valid integer: {0}")]
    InvalidComponent(String),
}

/// A revision number, or the sentinel "tip" value used when a branch has
/// no on-disk checkpointed tip file list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Revision {
    Number(Vec<u32>),
    Tip,
}

impl Revision {
    pub fn new(components: Vec<u32>) -> Result<Self, Error> {
        let text = components
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(".");

        if components.len() % 2 != 0 {
            return Err(Error::OddLength(text));
        }
        if components.len() < 2 {
            return Err(Error::TooShort(text));
        }
        if components.len() > MAX_COMPONENTS {
            return Err(Error::TooLong(text));
        }

        Ok(Self::Number(components))
    }

    /// Parses a dotted-integer sequence without the even-length
    /// constraint `new`/`FromStr` enforce. RCS's admin `branch` field
    /// names a *branch number* (e.g. `1.2.1`), which is always odd
    /// length — distinct from a revision number, which never appears
    /// there.
    pub fn parse_branch_number(s: &str) -> Result<Self, Error> {
        let parts = s
            .split('.')
            .map(|part| part.parse::<u32>().map_err(|_| Error::InvalidComponent(s.to_string())))
            .collect::<Result<Vec<u32>, Error>>()?;

        if parts.is_empty() {
            return Err(Error::TooShort(s.to_string()));
        }
        if parts.len() > MAX_COMPONENTS {
            return Err(Error::TooLong(s.to_string()));
        }
        Ok(Self::Number(parts))
    }

    /// True if this is a two-component trunk revision (`N.M`).
    pub fn is_trunk(&self) -> bool {
        matches!(self, Self::Number(parts) if parts.len() == 2)
    }

    /// True if this revision's shape matches a duplicate-revision branch
    /// root: at least 4 components, the last of which is `1` (the first
    /// commit MKSSI auto-generates when cutting a new branch).
    pub fn is_branch_root_first_commit(&self) -> bool {
        match self.parts() {
            Some(parts) if parts.len() >= 4 => parts.last() == Some(&1),
            _ => false,
        }
    }

    fn parts(&self) -> Option<&[u32]> {
        match self {
            Self::Number(parts) => Some(parts),
            Self::Tip => None,
        }
    }

    /// The leading (major) component, e.g. `3` for `3.14` or `3.1.2.6`.
    pub fn major(&self) -> Option<u32> {
        self.parts()?.first().copied()
    }

    /// Bumps the last component, e.g. `1.2` -> `1.3`.
    pub fn increment(&self) -> Option<Self> {
        let parts = self.parts()?;
        let mut next = parts.to_vec();
        *next.last_mut()? += 1;
        Some(Self::Number(next))
    }

    /// The revision immediately before this one in the same chain.
    ///
    /// On the trunk, `1.1` has no predecessor. On a branch, decrementing
    /// the branch-point revision (last component `1`) pops back to the
    /// branch's parent revision.
    pub fn decrement(&self) -> Option<Self> {
        let parts = self.parts()?;
        let mut prev = parts.to_vec();
        let last = prev.last_mut()?;

        if *last == 0 {
            return None;
        }
        *last -= 1;

        if *last == 0 {
            if prev.len() >= 4 {
                prev.truncate(prev.len() - 2);
                Some(Self::Number(prev))
            } else {
                None
            }
        } else {
            Some(Self::Number(prev))
        }
    }

    /// True if `self`'s components are a prefix of `spec`'s (or vice
    /// versa when `spec` is longer); used to test "is this revision
    /// under this branch/prefix".
    pub fn partial_match(&self, spec: &Revision) -> bool {
        match (self.parts(), spec.parts()) {
            (Some(num), Some(spec)) if num.len() >= spec.len() => num[..spec.len()] == *spec,
            _ => false,
        }
    }

    /// True if `self` and `other` are on the same branch, per the RCS
    /// `N.M.0.P` magic-branch-number quirk: a trailing `0` standing in
    /// for the branch index is equal to any real branch index at that
    /// position.
    pub fn same_branch(&self, other: &Revision) -> bool {
        let (a, b) = match (self.parts(), other.parts()) {
            (Some(a), Some(b)) => (a, b),
            _ => return false,
        };

        let extend = |parts: &[u32]| -> Vec<u32> {
            if parts.len() % 2 == 1 {
                let mut v = parts.to_vec();
                v.push(0);
                v
            } else {
                parts.to_vec()
            }
        };

        let a = extend(a);
        let b = extend(b);

        if a.len() != b.len() || a.is_empty() {
            return false;
        }

        let n = a.len() - 1;
        for i in 0..n {
            let (av, bv) = (a[i], b[i]);
            // The second-to-last component's magic zero compares equal
            // to whatever the real branch index turns out to be.
            if i == n - 1 && (av == 0 || bv == 0) {
                continue;
            }
            if av != bv {
                return false;
            }
        }
        true
    }

    /// Returns the branch this revision lives on (itself, truncated to
    /// an even-length branch prefix, if it is already a branch number).
    pub fn to_branch(&self) -> Option<Self> {
        let parts = self.parts()?;
        if parts.len() < 2 {
            return None;
        }
        Some(Self::Number(parts[..parts.len() - 1].to_vec()))
    }

    /// Componentwise comparison over the shared length; ties are broken
    /// by preferring the shorter sequence (a branch root sorts before
    /// commits made on that branch).
    pub fn compare(&self, other: &Revision) -> std::cmp::Ordering {
        use std::cmp::Ordering;

        match (self.parts(), other.parts()) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.cmp(y) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
                a.len().cmp(&b.len())
            }
        }
    }
}

impl PartialOrd for Revision {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for Revision {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.compare(other)
    }
}

impl FromStr for Revision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "tip" {
            return Ok(Self::Tip);
        }

        let parts = s
            .split('.')
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| Error::InvalidComponent(s.to_string()))
            })
            .collect::<Result<Vec<u32>, Error>>()?;

        Self::new(parts)
    }
}

impl Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tip => write!(f, "tip"),
            Self::Number(parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{}", part)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rev(s: &str) -> Revision {
        Revision::from_str(s).unwrap()
    }

    #[test]
    fn test_is_trunk() {
        assert!(rev("1.1").is_trunk());
        assert!(rev("1.14").is_trunk());
        assert!(!rev("1.2.1.1").is_trunk());
        assert!(!Revision::Tip.is_trunk());
    }

    #[test]
    fn test_increment_decrement_roundtrip() {
        for s in ["1.1", "1.7", "1.2.1.1", "2.4.3.9"] {
            let n = rev(s);
            let incremented = n.increment().unwrap();
            assert_eq!(incremented.decrement().unwrap(), n);
        }
    }

    #[test]
    fn test_decrement_branch_root() {
        // Decrementing the first commit on a branch pops back to the
        // revision the branch was cut from.
        assert_eq!(rev("1.2.1.1").decrement(), Some(rev("1.2")));
        // There's nothing before 1.1.
        assert_eq!(rev("1.1").decrement(), None);
    }

    #[test]
    fn test_partial_match() {
        assert!(rev("1.2.1.1").partial_match(&rev("1.2.1.1")));
        assert!(rev("1.2.1.5").partial_match(&rev("1.2")));
        assert!(!rev("1.2").partial_match(&rev("1.2.1.5")));
        assert!(!rev("1.3").partial_match(&rev("1.2")));
    }

    #[test]
    fn test_compare_and_equal() {
        assert_eq!(rev("1.2").compare(&rev("1.2")), std::cmp::Ordering::Equal);
        assert_eq!(rev("1.2") == rev("1.2"), true);
        assert_eq!(rev("1.1") < rev("1.2"), true);
        // A branch root sorts before commits made on it. The branch number
        // itself (odd length) only ever arises via `to_branch`, never via
        // the validating `FromStr`/`new` path.
        let branch_root = rev("1.2.1.1").to_branch().unwrap();
        assert_eq!(branch_root < rev("1.2.1.1"), true);
    }

    #[test]
    fn test_is_branch_root_first_commit() {
        assert!(rev("1.2.1.1").is_branch_root_first_commit());
        assert!(!rev("1.2.1.2").is_branch_root_first_commit());
        assert!(!rev("1.1").is_branch_root_first_commit());
        assert!(!Revision::Tip.is_branch_root_first_commit());
    }

    #[test]
    fn test_major() {
        assert_eq!(rev("3.14").major(), Some(3));
        assert_eq!(rev("2.4.3.9").major(), Some(2));
        assert_eq!(Revision::Tip.major(), None);
    }

    #[test]
    fn test_same_branch_magic_zero() {
        assert!(rev("1.2.1.1").same_branch(&rev("1.2.1.4")));
        assert!(!rev("1.2.1.1").same_branch(&rev("1.2.2.1")));
    }

    #[test]
    fn test_display_roundtrip() {
        assert_eq!(rev("1.2.3.4").to_string(), "1.2.3.4");
        assert_eq!(Revision::Tip.to_string(), "tip");
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(matches!(Revision::from_str("1.2.3"), Err(Error::OddLength(_))));
        assert!(matches!(Revision::from_str("1"), Err(Error::OddLength(_))));
        assert!(matches!(Revision::from_str("a.b"), Err(Error::InvalidComponent(_))));
    }
}
