// Reads the JSON export of the response tables of the hosted database.

use std::collections::HashMap;

use serde::Deserialize;

use crate::survey::{io_common::parse_timestamp, *};

/// Ids are uuids or serial integers, depending on the table.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(untagged)]
enum RowId {
    Text(String),
    Number(i64),
}

impl RowId {
    fn as_string(&self) -> String {
        match self {
            RowId::Text(s) => s.clone(),
            RowId::Number(n) => n.to_string(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct ResponseRow {
    id: RowId,
    survey_id: Option<RowId>,
    created_at: Option<String>,
    submitted_at: Option<String>,
    is_complete: Option<bool>,
    year: Option<i32>,
    quarter: Option<u8>,
    semester: Option<u8>,
}

#[derive(Deserialize, Debug)]
struct AnswerRow {
    response_id: RowId,
    question_id: RowId,
    score: Option<JSValue>,
}

#[derive(Deserialize, Debug)]
struct Export {
    responses: Vec<ResponseRow>,
    #[serde(default)]
    answers: Vec<AnswerRow>,
}

fn score_value(js: &JSValue) -> Option<f64> {
    match js {
        JSValue::Null => None,
        JSValue::Number(n) => Some(n.as_f64().unwrap_or(f64::NAN)),
        JSValue::String(s) if s.trim().is_empty() => None,
        JSValue::String(s) => Some(s.trim().parse::<f64>().unwrap_or(f64::NAN)),
        _ => Some(f64::NAN),
    }
}

pub fn read_json_export(path: String) -> ScoreResult<Vec<ParsedResponse>> {
    let contents = fs::read_to_string(&path).context(OpeningFileSnafu { path: &path })?;
    let export: Export =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path: &path })?;
    debug!(
        "read_json_export: {} responses, {} answers",
        export.responses.len(),
        export.answers.len()
    );

    let mut answers: HashMap<String, Vec<(String, f64)>> = HashMap::new();
    for a in export.answers.iter() {
        let score_o = a.score.as_ref().and_then(score_value);
        if let Some(score) = score_o {
            answers
                .entry(a.response_id.as_string())
                .or_default()
                .push((a.question_id.as_string(), score));
        }
    }

    let mut res: Vec<ParsedResponse> = Vec::new();
    for r in export.responses.iter() {
        let id = r.id.as_string();
        let timestamp_s = r.submitted_at.as_ref().or(r.created_at.as_ref());
        let submitted_at = match timestamp_s {
            None => None,
            Some(s) => Some(parse_timestamp(s).context(InvalidCellSnafu {
                lineno: res.len() + 1,
                field: "timestamp",
                content: s,
            })?),
        };
        let record = ResponseRecord {
            id: id.clone(),
            survey_id: r.survey_id.as_ref().map(|x| x.as_string()),
            submitted_at,
            is_complete: r.is_complete,
            year: r.year,
            quarter: r.quarter,
            semester: r.semester,
        };
        res.push(ParsedResponse {
            record,
            answers: answers.remove(&id).unwrap_or_default(),
        });
    }

    // Whatever is left refers to responses that are not in the export.
    if let Some(orphan) = answers.keys().min() {
        return Err(ScoreError::Scoring {
            source: ScoringErrors::UnknownResponse(orphan.clone()),
        });
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_the_sample_export() {
        let path = format!("{}/weighted_json_export/export.json", test_dir());
        let parsed = read_json_export(path).unwrap();
        assert_eq!(parsed.len(), 5);
        assert_eq!(parsed[0].record.id, "a1");
        assert_eq!(parsed[0].record.year, Some(2023));
        // Null scores are unanswered questions.
        assert!(parsed[0].answers.iter().all(|(q, _)| q != "k3"));
        // Integer ids
        assert_eq!(parsed[4].record.id, "105");
        assert_eq!(parsed[4].record.is_complete, Some(false));
    }

    #[test]
    fn scores() {
        assert_eq!(score_value(&serde_json::json!(4)), Some(4.0));
        assert_eq!(score_value(&serde_json::json!("3")), Some(3.0));
        assert_eq!(score_value(&serde_json::json!(null)), None);
        assert!(score_value(&serde_json::json!("baik")).unwrap().is_nan());
        assert!(score_value(&serde_json::json!(true)).unwrap().is_nan());
    }

    #[test]
    fn orphan_answers() {
        let dir = std::env::temp_dir().join(format!("ikmscore-orphan-{}.json", std::process::id()));
        let js = r#"{
            "responses": [{"id": "r1"}],
            "answers": [
                {"response_id": "r1", "question_id": "q1", "score": 4},
                {"response_id": "r9", "question_id": "q1", "score": 2}
            ]
        }"#;
        fs::write(&dir, js).unwrap();
        let res = read_json_export(dir.display().to_string());
        let _ = fs::remove_file(&dir);
        match res {
            Err(ScoreError::Scoring {
                source: ScoringErrors::UnknownResponse(id),
            }) => assert_eq!(id, "r9"),
            x => panic!("unexpected result {:?}", x),
        }
    }
}
