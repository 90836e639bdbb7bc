// Primitives for reading CSV files.

use crate::survey::{
    io_common::{get_col_index_mapping, make_default_id, parse_row},
    *,
};

pub fn read_csv_responses(
    path: String,
    cfs: &FileSource,
    question_ids: &[String],
) -> ScoreResult<Vec<ParsedResponse>> {
    let default_id = make_default_id(&path);

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(&path)
        .context(CsvOpenSnafu { path: &path })?;

    let header: Vec<Option<String>> = rdr
        .headers()
        .context(CsvLineParseSnafu {
            path: &path,
            lineno: 1usize,
        })?
        .iter()
        .map(|s| Some(s.to_string()))
        .collect();
    debug!("read_csv_responses: header: {:?}", header);
    let layout = get_col_index_mapping(&header, cfs, question_ids);

    let mut res: Vec<ParsedResponse> = Vec::new();
    for (idx, line_r) in rdr.records().enumerate() {
        // The header is on the first line
        let lineno = idx + 2;
        let line = line_r.context(CsvLineParseSnafu {
            path: &path,
            lineno,
        })?;
        let cells: Vec<String> = line.iter().map(|s| s.to_string()).collect();
        res.push(parse_row(&layout, &cells, lineno, &default_id)?);
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_the_sample_file() {
        let path = format!("{}/unweighted_basic/responses.csv", test_dir());
        let cfs = FileSource::for_input(&path, "csv".to_string());
        let qids: Vec<String> = ["q1", "q2", "q3"].iter().map(|s| s.to_string()).collect();
        let parsed = read_csv_responses(path, &cfs, &qids).unwrap();

        assert_eq!(parsed.len(), 5);
        assert_eq!(parsed[0].record.id, "r1");
        assert_eq!(parsed[4].record.is_complete, Some(false));
        // r2 did not answer q2
        let r2_questions: Vec<&str> = parsed[1].answers.iter().map(|(q, _)| q.as_str()).collect();
        assert_eq!(r2_questions, vec!["q1", "q3"]);
        assert_eq!(parsed[3].answers[2], ("q3".to_string(), 9.0));
    }

    #[test]
    fn missing_file() {
        let cfs = FileSource::for_input("nope.csv", "csv".to_string());
        let res = read_csv_responses("/nonexistent/nope.csv".to_string(), &cfs, &[]);
        assert!(matches!(res, Err(ScoreError::CsvOpen { .. })));
    }
}
