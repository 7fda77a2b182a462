use std::{str::FromStr, time::Duration, time::SystemTime};

use chrono::{DateTime, NaiveDate, Utc};
use nom::{
    branch::alt,
    bytes::complete::{tag, take_till1, take_while, take_while1},
    combinator::{map, map_res, value},
    multi::fold_many0,
    sequence::delimited,
    IResult,
};

use super::char::*;
use crate::{types, Revision};

pub(super) fn integrity_string(input: &[u8]) -> IResult<&[u8], types::IntString> {
    // TODO: thirdp support
    map(
        delimited(tag(b"@"), take_while(is_intchar), tag(b"@")),
        |bytes| types::IntString(Vec::from(bytes)),
    )(input)
}

pub(super) fn id(input: &[u8]) -> IResult<&[u8], types::Id> {
    map(take_while(|c| is_idchar(c) || c == b'.'), |bytes| {
        types::Id(Vec::from(bytes))
    })(input)
}

pub(super) fn numlike(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(|c| c == b'.' || (c >= b'0' && c <= b'9'))(input)
}

/// RCS dates are `yy.mm.dd.hh.mm.ss` (pre-5.7) or `yyyy.mm.dd.hh.mm.ss`,
/// always UTC. A two-digit year is in the 1900s, per RCS convention.
pub(super) fn date(input: &[u8]) -> IResult<&[u8], SystemTime> {
    map_res(numlike, parse_rcs_date)(input)
}

fn parse_rcs_date(bytes: &[u8]) -> Result<SystemTime, String> {
    let s = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
    let mut parts = s.splitn(6, '.');
    let mut next = |what: &str| -> Result<i32, String> {
        parts
            .next()
            .ok_or_else(|| format!("date missing {what}: {s}"))?
            .parse::<i32>()
            .map_err(|_| format!("date has non-numeric {what}: {s}"))
    };

    let year = next("year")?;
    let year = if year < 100 { year + 1900 } else { year };
    let month = next("month")?;
    let day = next("day")?;
    let hour = next("hour")?;
    let minute = next("minute")?;
    let second = next("second")?;

    let naive = NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .and_then(|d| d.and_hms_opt(hour as u32, minute as u32, second as u32))
        .ok_or_else(|| format!("date out of range: {s}"))?;
    let timestamp = DateTime::<Utc>::from_utc(naive, Utc).timestamp();
    Ok(SystemTime::UNIX_EPOCH + Duration::from_secs(timestamp.max(0) as u64))
}

pub(super) fn num(input: &[u8]) -> IResult<&[u8], Revision> {
    map_res(numlike, |bytes| {
        std::str::from_utf8(bytes)
            .map_err(|e| e.to_string())
            .and_then(|s| Revision::from_str(s).map_err(|e| e.to_string()))
    })(input)
}

/// Like [`num`], but for the admin `branch` field, whose value is a
/// branch number (odd length) rather than a revision number.
pub(super) fn branch_num(input: &[u8]) -> IResult<&[u8], Revision> {
    map_res(numlike, |bytes| {
        std::str::from_utf8(bytes)
            .map_err(|e| e.to_string())
            .and_then(|s| Revision::parse_branch_number(s).map_err(|e| e.to_string()))
    })(input)
}

pub(super) fn string_literal(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_till1(|c| c == b'@')(input)
}

pub(super) fn string_escape(input: &[u8]) -> IResult<&[u8], &[u8]> {
    value(&b"@"[..], tag(b"@@"))(input)
}

pub(super) fn string(input: &[u8]) -> IResult<&[u8], types::VString> {
    map(
        delimited(
            tag(b"@"),
            fold_many0(
                alt((string_literal, string_escape)),
                Vec::new(),
                |mut v, fragment| {
                    v.extend_from_slice(fragment);
                    v
                },
            ),
            tag(b"@"),
        ),
        |bytes| types::VString(bytes),
    )(input)
}

pub(super) fn sym(input: &[u8]) -> IResult<&[u8], types::Sym> {
    map(take_while(is_idchar), |bytes| types::Sym(Vec::from(bytes)))(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test() {
        assert_eq!(*integrity_string(b"@@").unwrap().1, b"");
        assert_eq!(*integrity_string(b"@foo@").unwrap().1, b"foo");
        assert_eq!(*integrity_string(b"@foo\x0cbar@").unwrap().1, b"foo\x0cbar");

        assert_eq!(string(b"@foo bar@").unwrap().1 .0, b"foo bar");
        assert_eq!(string(b"@foo@@bar@").unwrap().1 .0, b"foo@bar");
    }

    #[test]
    fn test_num_parses_revision() {
        assert_eq!(num(b"1.2.3.4").unwrap().1, Revision::from_str("1.2.3.4").unwrap());
    }

    #[test]
    fn test_date_two_digit_year() {
        let got = date(b"2021.08.20.17.34.26").unwrap().1;
        let want = SystemTime::UNIX_EPOCH
            + Duration::from_secs(
                DateTime::<Utc>::from_utc(
                    NaiveDate::from_ymd_opt(2021, 8, 20)
                        .unwrap()
                        .and_hms_opt(17, 34, 26)
                        .unwrap(),
                    Utc,
                )
                .timestamp() as u64,
            );
        assert_eq!(got, want);

        // Pre-2000 masters store a bare two-digit year.
        let got = date(b"94.03.01.00.00.00").unwrap().1;
        let want = SystemTime::UNIX_EPOCH
            + Duration::from_secs(
                DateTime::<Utc>::from_utc(
                    NaiveDate::from_ymd_opt(1994, 3, 1)
                        .unwrap()
                        .and_hms_opt(0, 0, 0)
                        .unwrap(),
                    Utc,
                )
                .timestamp() as u64,
            );
        assert_eq!(got, want);
    }
}
