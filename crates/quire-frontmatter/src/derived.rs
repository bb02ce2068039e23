//! Variables derived from the source file and well-known keys.
//!
//! These are inserted before expansion so permalinks can use `%basename`,
//! `%year` and friends without declaring them. Declared keys always win.

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::FrontMatterError;
use crate::value::{FrontMatter, Value};

/// Insert `filename` and `basename` for the given source path.
///
/// `basename` strips every extension: `about.html.twig` becomes `about`.
pub fn insert_file_variables(block: &mut FrontMatter, source: &Path) {
    let Some(filename) = source.file_name().and_then(|f| f.to_str()) else {
        return;
    };

    let basename = filename.split('.').next().unwrap_or(filename);

    block.insert_if_absent("filename", filename);
    block.insert_if_absent("basename", basename);
}

/// Insert `year`, `month` and `day` derived from a `date` key.
pub fn insert_date_variables(block: &mut FrontMatter) -> Result<(), FrontMatterError> {
    let raw = match block.get("date") {
        None | Some(Value::Null) => return Ok(()),
        Some(Value::String(raw)) => raw.clone(),
        Some(other) => {
            return Err(FrontMatterError::InvalidDate {
                value: format!("{:?}", other),
                key_path: "date".to_string(),
            });
        }
    };

    let date = parse_date(&raw).ok_or_else(|| FrontMatterError::InvalidDate {
        value: raw.clone(),
        key_path: "date".to_string(),
    })?;

    block.insert_if_absent("year", date.format("%Y").to_string());
    block.insert_if_absent("month", date.format("%m").to_string());
    block.insert_if_absent("day", date.format("%d").to_string());

    Ok(())
}

/// Parse `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or RFC 3339.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn derives_file_variables() {
        let mut block = FrontMatter::new();

        insert_file_variables(&mut block, Path::new("_posts/2016-recap.html.twig"));

        assert_eq!(block.get_str("filename"), Some("2016-recap.html.twig"));
        assert_eq!(block.get_str("basename"), Some("2016-recap"));
    }

    #[test]
    fn declared_keys_win() {
        let mut block = FrontMatter::new();
        block.insert("basename", "custom");

        insert_file_variables(&mut block, Path::new("post.md"));

        assert_eq!(block.get_str("basename"), Some("custom"));
    }

    #[test]
    fn derives_date_parts() {
        let mut block = FrontMatter::new();
        block.insert("date", "2016-01-02");

        insert_date_variables(&mut block).unwrap();

        assert_eq!(block.get_str("year"), Some("2016"));
        assert_eq!(block.get_str("month"), Some("01"));
        assert_eq!(block.get_str("day"), Some("02"));
    }

    #[test]
    fn accepts_rfc3339_and_datetime() {
        assert_eq!(
            parse_date("2020-12-31T23:00:00+02:00"),
            NaiveDate::from_ymd_opt(2020, 12, 31)
        );
        assert_eq!(
            parse_date("2020-05-04 10:11:12"),
            NaiveDate::from_ymd_opt(2020, 5, 4)
        );
    }

    #[test]
    fn rejects_garbage_dates() {
        let mut block = FrontMatter::new();
        block.insert("date", "yesterday");

        let err = insert_date_variables(&mut block).unwrap_err();

        assert!(matches!(err, FrontMatterError::InvalidDate { .. }));
    }

    #[test]
    fn missing_date_is_fine() {
        let mut block = FrontMatter::new();

        insert_date_variables(&mut block).unwrap();

        assert!(block.is_empty());
    }
}
