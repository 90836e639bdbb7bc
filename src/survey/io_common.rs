// Primitives shared by the tabular readers (csv and xlsx).

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::survey::*;

pub fn simplify_file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(path)
        .to_string()
}

/// Responses without an id get one from the file name and the line number.
pub fn make_default_id(path: &str) -> impl Fn(usize) -> String {
    let simplified_file_name = simplify_file_name(path);
    move |lineno| format!("{}-{:08}", simplified_file_name, lineno)
}

/// Positions of the known columns in a header row.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ColumnLayout {
    pub id: Option<usize>,
    pub submitted_at: Option<usize>,
    pub complete: Option<usize>,
    pub year: Option<usize>,
    pub quarter: Option<usize>,
    pub semester: Option<usize>,
    /// Column index and question id, for every question found in the header.
    pub answers: Vec<(usize, String)>,
}

/// Given the header of a file (names of each of the columns), and the ids of the
/// scored questions, finds the position of each column.
///
/// Questions without a column are not an error: they were simply not exported.
pub fn get_col_index_mapping(
    header: &[Option<String>],
    cfs: &FileSource,
    question_ids: &[String],
) -> ColumnLayout {
    let col_names: HashMap<&str, usize> = header
        .iter()
        .enumerate()
        .filter_map(|(idx, x)| x.as_ref().map(|s| (s.trim(), idx)))
        .collect();
    debug!("get_col_index_mapping: col_names: {:?}", col_names);

    let mut answers: Vec<(usize, String)> = Vec::new();
    for qid in question_ids {
        match col_names.get(qid.as_str()) {
            Some(idx) => answers.push((*idx, qid.clone())),
            None => warn!("No column for question {:?}", qid),
        }
    }

    ColumnLayout {
        id: col_names.get(cfs.id_column()).cloned(),
        submitted_at: col_names.get(cfs.submitted_at_column()).cloned(),
        complete: col_names.get(cfs.complete_column()).cloned(),
        year: col_names.get(cfs.year_column()).cloned(),
        quarter: col_names.get(cfs.quarter_column()).cloned(),
        semester: col_names.get(cfs.semester_column()).cloned(),
        answers,
    }
}

pub fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Some(true),
        "false" | "0" | "no" | "n" => Some(false),
        _ => None,
    }
}

/// RFC 3339 timestamps, or naive ones that are taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&ndt));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| Utc.from_utc_datetime(&ndt))
}

/// The score in a cell. Empty cells are unanswered questions, and cells that
/// are not numbers become NaN so that they are counted as invalid.
pub fn parse_score(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.parse::<f64>().unwrap_or(f64::NAN))
    }
}

fn cell<'a>(cells: &'a [String], idx_o: Option<usize>) -> Option<&'a str> {
    idx_o
        .and_then(|idx| cells.get(idx))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}

fn parse_cell<T>(
    cells: &[String],
    idx_o: Option<usize>,
    lineno: usize,
    field: &str,
    f: impl Fn(&str) -> Option<T>,
) -> ScoreResult<Option<T>> {
    match cell(cells, idx_o) {
        None => Ok(None),
        Some(s) => f(s)
            .map(Some)
            .context(InvalidCellSnafu {
                lineno,
                field,
                content: s,
            }),
    }
}

/// Reads one row of a tabular file.
pub fn parse_row(
    layout: &ColumnLayout,
    cells: &[String],
    lineno: usize,
    default_id: &impl Fn(usize) -> String,
) -> ScoreResult<ParsedResponse> {
    let id = cell(cells, layout.id)
        .map(|s| s.to_string())
        .unwrap_or_else(|| default_id(lineno));

    let record = ResponseRecord {
        id,
        survey_id: None,
        submitted_at: parse_cell(cells, layout.submitted_at, lineno, "timestamp", parse_timestamp)?,
        is_complete: parse_cell(cells, layout.complete, lineno, "completion flag", parse_bool)?,
        year: parse_cell(cells, layout.year, lineno, "year", |s| s.parse::<i32>().ok())?,
        quarter: parse_cell(cells, layout.quarter, lineno, "quarter", |s| {
            s.parse::<u8>().ok().filter(|q| (1..=4).contains(q))
        })?,
        semester: parse_cell(cells, layout.semester, lineno, "semester", |s| {
            s.parse::<u8>().ok().filter(|q| (1..=2).contains(q))
        })?,
    };

    let mut answers: Vec<(String, f64)> = Vec::new();
    for (idx, qid) in layout.answers.iter() {
        if let Some(score) = cells.get(*idx).and_then(|s| parse_score(s)) {
            if score.is_nan() {
                warn!(
                    "Line {}: question {}: not a number: {:?}",
                    lineno, qid, cells[*idx]
                );
            }
            answers.push((qid.clone(), score));
        }
    }
    debug!("parse_row: lineno: {} record: {:?}", lineno, record);
    Ok(ParsedResponse { record, answers })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(names: &[&str]) -> Vec<Option<String>> {
        names.iter().map(|s| Some(s.to_string())).collect()
    }

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    fn qids() -> Vec<String> {
        vec!["q1".to_string(), "q2".to_string(), "q3".to_string()]
    }

    #[test]
    fn file_names() {
        assert_eq!(simplify_file_name("/data/2024/responses.csv"), "responses.csv");
        assert_eq!(make_default_id("a/b.csv")(12), "b.csv-00000012");
    }

    #[test]
    fn header_mapping() {
        let cfs = FileSource::for_input("x.csv", "csv".to_string());
        let layout = get_col_index_mapping(
            &header(&["q2", "id", "comment", "isComplete", "q1"]),
            &cfs,
            &qids(),
        );
        assert_eq!(layout.id, Some(1));
        assert_eq!(layout.complete, Some(3));
        assert_eq!(layout.submitted_at, None);
        assert_eq!(
            layout.answers,
            vec![(4, "q1".to_string()), (0, "q2".to_string())]
        );
    }

    #[test]
    fn reads_a_row() {
        let cfs = FileSource::for_input("x.csv", "csv".to_string());
        let layout = get_col_index_mapping(
            &header(&["id", "submittedAt", "isComplete", "q1", "q2", "q3"]),
            &cfs,
            &qids(),
        );
        let default_id = make_default_id("x.csv");
        let pr = parse_row(
            &layout,
            &row(&["r7", "2024-05-02 08:30:00", "false", "4", "", "abc"]),
            3,
            &default_id,
        )
        .unwrap();
        assert_eq!(pr.record.id, "r7");
        assert_eq!(pr.record.is_complete, Some(false));
        assert_eq!(
            pr.record.submitted_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 8, 30, 0).unwrap())
        );
        assert_eq!(pr.answers.len(), 2);
        assert_eq!(pr.answers[0], ("q1".to_string(), 4.0));
        assert_eq!(pr.answers[1].0, "q3");
        assert!(pr.answers[1].1.is_nan());
    }

    #[test]
    fn missing_id_and_short_rows() {
        let cfs = FileSource::for_input("x.csv", "csv".to_string());
        let layout = get_col_index_mapping(&header(&["q1", "q2", "q3"]), &cfs, &qids());
        let default_id = make_default_id("x.csv");
        let pr = parse_row(&layout, &row(&["5"]), 2, &default_id).unwrap();
        assert_eq!(pr.record.id, "x.csv-00000002");
        assert_eq!(pr.record.is_complete, None);
        assert_eq!(pr.answers, vec![("q1".to_string(), 5.0)]);
    }

    #[test]
    fn bad_cells_are_errors() {
        let cfs = FileSource::for_input("x.csv", "csv".to_string());
        let layout = get_col_index_mapping(&header(&["id", "quarter"]), &cfs, &qids());
        let default_id = make_default_id("x.csv");
        let res = parse_row(&layout, &row(&["r1", "5"]), 2, &default_id);
        assert!(matches!(
            res,
            Err(ScoreError::InvalidCell { lineno: 2, .. })
        ));
    }

    #[test]
    fn values() {
        assert_eq!(parse_bool(" TRUE "), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_score(""), None);
        assert_eq!(parse_score(" 3 "), Some(3.0));
        assert!(parse_score("x").unwrap().is_nan());
        assert_eq!(
            parse_timestamp("2024-02-01T09:12:00+07:00"),
            Some(Utc.with_ymd_and_hms(2024, 2, 1, 2, 12, 0).unwrap())
        );
        assert_eq!(
            parse_timestamp("2024-02-01"),
            Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }
}
