use std::collections::HashMap;

use nom::{
    branch::permutation,
    bytes::complete::tag,
    character::complete::{multispace0, multispace1},
    combinator::{map, opt},
    multi::{fold_many0, many0},
    sequence::{delimited, preceded, separated_pair, terminated, tuple},
    IResult,
};

use crate::types;

mod char;

mod scalar;
use self::scalar::*;

pub(crate) fn file(input: &[u8]) -> IResult<&[u8], types::File> {
    map(
        tuple((
            delimited(multispace0, admin, multispace0),
            many0(terminated(version, multispace0)),
            terminated(desc, multispace0),
            many0(terminated(patch, multispace0)),
        )),
        |(admin, versions, desc, patches)| types::File {
            admin,
            versions: versions.into_iter().collect(),
            desc,
            patches: patches.into_iter().collect(),
        },
    )(input)
}

fn admin(input: &[u8]) -> IResult<&[u8], types::Admin> {
    map(
        permutation((
            delimited(
                tuple((tag(b"head"), multispace1)),
                opt(num),
                tuple((multispace0, tag(b";"), multispace0)),
            ),
            map(
                opt(delimited(
                    tuple((tag(b"branch"), multispace1)),
                    opt(branch_num),
                    tuple((multispace0, tag(b";"), multispace0)),
                )),
                // `branch ;` (keyword present, no revision) is valid RCS
                // grammar meaning "no default branch"; flatten rather than
                // unwrap so that case parses to `None` instead of panicking.
                Option::flatten,
            ),
            delimited(
                tag(b"access"),
                many0(preceded(multispace1, id)),
                tuple((multispace0, tag(b";"), multispace0)),
            ),
            delimited(
                tag(b"symbols"),
                fold_many0(
                    separated_pair(
                        delimited(multispace0, sym, multispace0),
                        tag(b":"),
                        delimited(multispace0, num, multispace0),
                    ),
                    Vec::new,
                    |mut acc, pair| {
                        acc.push(pair);
                        acc
                    },
                ),
                tuple((multispace0, tag(b";"), multispace0)),
            ),
            delimited(
                tag(b"locks"),
                fold_many0(
                    separated_pair(
                        delimited(multispace0, id, multispace0),
                        tag(b":"),
                        delimited(multispace0, num, multispace0),
                    ),
                    HashMap::new,
                    |mut acc, (k, v)| {
                        acc.insert(k, v);
                        acc
                    },
                ),
                tuple((multispace0, tag(b";"), multispace0)),
            ),
            map(
                opt(tuple((tag(b"strict"), multispace0, tag(b";"), multispace0))),
                |strict| strict.is_some(),
            ),
            opt(delimited(
                tuple((tag(b"integrity"), multispace1)),
                integrity_string,
                tuple((multispace0, tag(b";"), multispace0)),
            )),
            opt(delimited(
                tuple((tag(b"comment"), multispace1)),
                string,
                tuple((multispace0, tag(b";"), multispace0)),
            )),
            opt(delimited(
                tuple((tag(b"expand"), multispace1)),
                string,
                tuple((multispace0, tag(b";"), multispace0)),
            )),
        )),
        |(head, branch, access, symbols, locks, strict, integrity, comment, expand)| types::Admin {
            head,
            branch,
            access,
            symbols,
            locks,
            strict,
            integrity,
            comment,
            expand,
        },
    )(input)
}

fn version(input: &[u8]) -> IResult<&[u8], (crate::Revision, types::Version)> {
    map(
        tuple((
            terminated(num, multispace1),
            permutation((
                delimited(
                    tuple((tag(b"date"), multispace1)),
                    date,
                    tuple((multispace0, tag(b";"), multispace0)),
                ),
                delimited(
                    tuple((tag(b"author"), multispace1)),
                    id,
                    tuple((multispace0, tag(b";"), multispace0)),
                ),
                delimited(
                    tuple((tag(b"state"), multispace1)),
                    opt(id),
                    tuple((multispace0, tag(b";"), multispace0)),
                ),
                delimited(
                    tag(b"branches"),
                    many0(preceded(multispace1, num)),
                    tuple((multispace0, tag(b";"), multispace0)),
                ),
                delimited(
                    tuple((tag(b"next"), multispace1)),
                    opt(num),
                    tuple((multispace0, tag(b";"), multispace0)),
                ),
                opt(delimited(
                    tuple((tag(b"commitid"), multispace1)),
                    sym,
                    tuple((multispace0, tag(b";"), multispace0)),
                )),
            )),
        )),
        |(revision, (date, author, state, branches, next, commit_id))| {
            (
                revision,
                types::Version {
                    date,
                    author,
                    state,
                    branches,
                    next,
                    commit_id,
                },
            )
        },
    )(input)
}

fn patch(input: &[u8]) -> IResult<&[u8], (crate::Revision, types::Patch)> {
    map(
        tuple((
            num,
            preceded(multispace1, tag(b"log")),
            delimited(multispace1, string, multispace1),
            tag(b"text"),
            preceded(multispace1, string),
        )),
        |(revision, _, log, _, text)| (revision, types::Patch { log, text }),
    )(input)
}

fn desc(input: &[u8]) -> IResult<&[u8], types::Desc> {
    preceded(tuple((tag(b"desc"), multispace1)), string)(input)
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use crate::Revision;

    use super::*;

    fn rev(s: &str) -> Revision {
        Revision::from_str(s).unwrap()
    }

    #[test]
    fn test_admin() {
        let input = b"head     1.1;\naccess;\nsymbols;\nlocks; strict;\ncomment @# @;\n\n";
        let have = admin(input).unwrap().1;
        assert_eq!(have.head.unwrap(), rev("1.1"));
        assert!(have.branch.is_none());
        assert_eq!(have.access.len(), 0);
        assert_eq!(have.symbols.len(), 0);
        assert_eq!(have.locks.len(), 0);
        assert!(have.strict);
        assert!(have.integrity.is_none());
        assert_eq!(*have.comment.unwrap(), b"# ");
        assert!(have.expand.is_none());
    }

    #[test]
    fn test_admin_bare_branch_keyword() {
        // `branch ;` (keyword present, no revision) means "no default
        // branch" and must not panic.
        let input = b"head     1.1;\nbranch  ;\naccess;\nsymbols;\nlocks; strict;\ncomment @# @;\n\n";
        let have = admin(input).unwrap().1;
        assert!(have.branch.is_none());
    }

    #[test]
    fn test_admin_branch_with_revision() {
        // The admin `branch` field names a branch *number* (odd length,
        // e.g. `1.1.1`), not a revision number.
        let input = b"head     1.1;\nbranch  1.1.1;\naccess;\nsymbols;\nlocks;\ncomment @# @;\n\n";
        let have = admin(input).unwrap().1;
        assert_eq!(have.branch, Some(Revision::parse_branch_number("1.1.1").unwrap()));
    }

    #[test]
    fn test_version() {
        let input =
            b"1.2\ndate    2021.08.20.17.34.26;  author adam;  state Exp;\nbranches\n  1.2.2.1\n  1.2.4.1;\nnext     1.1;\n\n";
        let (revision, have) = version(input).unwrap().1;
        assert_eq!(revision, rev("1.2"));
        assert_eq!(*have.author, b"adam");
        assert_eq!(*have.state.unwrap(), b"Exp");
        assert_eq!(have.branches, vec![rev("1.2.2.1"), rev("1.2.4.1")]);
        assert_eq!(have.next.unwrap(), rev("1.1"));
        assert!(have.commit_id.is_none());
    }

    #[test]
    fn test_patch() {
        let (revision, have) = patch(b"1.2 log @@ text @@").unwrap().1;
        assert_eq!(revision, rev("1.2"));
        assert_eq!(*have.log, b"");
        assert_eq!(*have.text, b"");

        let (revision, have) = patch(b"1.1\nlog\n@added line 3@\ntext\n@d5 3\n@").unwrap().1;
        assert_eq!(revision, rev("1.1"));
        assert_eq!(*have.log, b"added line 3");
        assert_eq!(*have.text, b"d5 3\n");
    }

    #[test]
    fn test_desc() {
        assert_eq!(*desc(b"desc @@").unwrap().1, b"");
        assert_eq!(*desc(b"desc @foo@@bar@").unwrap().1, b"foo@bar");
        assert_eq!(*desc(b"desc   @foo@@bar@").unwrap().1, b"foo@bar");
    }

    #[test]
    fn test_file() {
        let input = concat!(
            "head     1.2;\naccess;\nsymbols;\nlocks; strict;\ncomment @# @;\n\n",
            "1.2\ndate     2021.08.20.17.34.26;  author adam;  state Exp;\n",
            "branches;\nnext     1.1;\n\n",
            "1.1\ndate     2021.08.11.19.08.27;  author adam;  state Exp;\n",
            "branches;\nnext     ;\n\n",
            "desc\n@@\n\n",
            "1.2\nlog\n@second revision@\ntext\n@line one\nline two\n@\n\n",
            "1.1\nlog\n@first revision@\ntext\n@line one\n@\n",
        );
        let have = file(input.as_bytes()).unwrap().1;

        assert_eq!(have.admin.head.unwrap(), rev("1.2"));
        assert_eq!(have.versions.len(), 2);
        assert_eq!(
            have.versions.get(&rev("1.1")).unwrap().author,
            types::Id(b"adam".to_vec())
        );

        assert_eq!(*have.desc, b"");

        assert_eq!(have.patches.len(), 2);
        assert_eq!(*have.patches.get(&rev("1.1")).unwrap().text, b"line one\n");
    }
}
