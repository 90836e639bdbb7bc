use crate::survey::*;

use serde::{Deserialize, Serialize};
use serde_json::Value as JSValue;

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "surveyName")]
    pub survey_name: String,
    #[serde(rename = "outputPath")]
    pub output_path: Option<String>,
    #[serde(rename = "reportDate")]
    pub report_date: Option<String>,
    pub office: Option<String>,
}

/// The header of the summary.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub survey: String,
    pub office: Option<String>,
    pub date: Option<String>,
    #[serde(rename = "type")]
    pub survey_type: String,
    #[serde(rename = "scaleMax")]
    pub scale_max: u32,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SurveyHeader {
    pub id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub survey_type: String,
    #[serde(rename = "scaleMax")]
    pub scale_max: Option<u32>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct QuestionEntry {
    pub id: String,
    pub text: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub weight: Option<f64>,
}

impl QuestionEntry {
    /// Questions are on a scale unless stated otherwise.
    pub fn kind(&self) -> &str {
        self.kind.as_deref().unwrap_or("scale")
    }
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorEntry {
    pub id: String,
    pub title: Option<String>,
    pub weight: Option<f64>,
    #[serde(default)]
    pub questions: Vec<QuestionEntry>,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
    #[serde(rename = "excelWorksheetName")]
    pub excel_worksheet_name: Option<String>,
    #[serde(rename = "idColumn")]
    pub id_column: Option<String>,
    #[serde(rename = "submittedAtColumn")]
    pub submitted_at_column: Option<String>,
    #[serde(rename = "completeColumn")]
    pub complete_column: Option<String>,
    #[serde(rename = "yearColumn")]
    pub year_column: Option<String>,
    #[serde(rename = "quarterColumn")]
    pub quarter_column: Option<String>,
    #[serde(rename = "semesterColumn")]
    pub semester_column: Option<String>,
}

impl FileSource {
    /// A source given on the command line, with the default column names.
    pub fn for_input(path: &str, provider: String) -> FileSource {
        FileSource {
            provider,
            file_path: path.to_string(),
            ..Default::default()
        }
    }

    pub fn id_column(&self) -> &str {
        self.id_column.as_deref().unwrap_or("id")
    }

    pub fn submitted_at_column(&self) -> &str {
        self.submitted_at_column.as_deref().unwrap_or("submittedAt")
    }

    pub fn complete_column(&self) -> &str {
        self.complete_column.as_deref().unwrap_or("isComplete")
    }

    pub fn year_column(&self) -> &str {
        self.year_column.as_deref().unwrap_or("year")
    }

    pub fn quarter_column(&self) -> &str {
        self.quarter_column.as_deref().unwrap_or("quarter")
    }

    pub fn semester_column(&self) -> &str {
        self.semester_column.as_deref().unwrap_or("semester")
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(rename = "derivePeriodFromSubmission")]
    pub derive_period_from_submission: Option<bool>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct SurveyConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    pub survey: SurveyHeader,
    pub indicators: Vec<IndicatorEntry>,
    #[serde(rename = "responseSources", default)]
    pub response_sources: Vec<FileSource>,
    #[serde(default)]
    pub periods: Vec<String>,
    pub rules: Option<RulesConfig>,
}

impl SurveyConfig {
    pub fn derive_period_from_submission(&self) -> bool {
        self.rules
            .as_ref()
            .and_then(|r| r.derive_period_from_submission)
            .unwrap_or(false)
    }

    /// The ids of the questions that hold scores, in survey order.
    pub fn scored_question_ids(&self) -> Vec<String> {
        self.indicators
            .iter()
            .flat_map(|ind| ind.questions.iter())
            .filter(|q| QuestionKind::parse(q.kind()) == Ok(QuestionKind::Scale))
            .map(|q| q.id.clone())
            .collect()
    }
}

pub fn read_config(path: &str) -> ScoreResult<SurveyConfig> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    let config: SurveyConfig =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path })?;
    Ok(config)
}

/// Removes the fields that change from one run to the next.
pub fn without_volatile_fields(mut js: JSValue) -> JSValue {
    if let Some(results) = js.get_mut("results").and_then(|r| r.as_object_mut()) {
        results.remove("calculatedAt");
    }
    js
}

/// Reads a reference summary, for comparison with a computed one.
pub fn read_summary(path: String) -> ScoreResult<JSValue> {
    let contents = fs::read_to_string(&path).context(OpeningFileSnafu { path: &path })?;
    let js: JSValue =
        serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu { path: &path })?;
    Ok(without_volatile_fields(js))
}

/// Parses a period name: `2024`, `2024-S1` or `2024-Q3`.
pub fn parse_period(s: &str) -> ScoreResult<PeriodFilter> {
    let invalid = || InvalidPeriodSnafu { period: s }.build();
    let s_trim = s.trim();
    let (year_s, rest) = match s_trim.split_once('-') {
        Some((y, r)) => (y, Some(r)),
        None => (s_trim, None),
    };
    let year: i32 = year_s.parse().map_err(|_| invalid())?;
    match rest {
        None => Ok(PeriodFilter::Year(year)),
        Some(r) => {
            let mut chars = r.chars();
            let tag = chars.next().map(|c| c.to_ascii_uppercase());
            let num: u8 = chars.as_str().parse().map_err(|_| invalid())?;
            match (tag, num) {
                (Some('Q'), 1..=4) => Ok(PeriodFilter::Quarter(year, num)),
                (Some('S'), 1..=2) => Ok(PeriodFilter::Semester(year, num)),
                _ => Err(invalid()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_names() {
        assert_eq!(parse_period("2024").unwrap(), PeriodFilter::Year(2024));
        assert_eq!(
            parse_period("2024-Q3").unwrap(),
            PeriodFilter::Quarter(2024, 3)
        );
        assert_eq!(
            parse_period(" 2023-s2 ").unwrap(),
            PeriodFilter::Semester(2023, 2)
        );
        for bad in ["", "24x", "2024-Q5", "2024-S3", "2024-H1", "2024-Q"] {
            assert!(parse_period(bad).is_err(), "{:?} should not parse", bad);
        }
    }

    #[test]
    fn period_names_round_trip() {
        for name in ["2024", "2024-S1", "2024-Q4"] {
            assert_eq!(parse_period(name).unwrap().name(), name);
        }
    }

    #[test]
    fn minimal_config() {
        let js = r#"{
            "outputSettings": {"surveyName": "Pelayanan"},
            "survey": {"id": "s1", "title": "Pelayanan", "type": "weighted"},
            "indicators": [
                {"id": "i1", "questions": [
                    {"id": "q1"},
                    {"id": "q2", "type": "text"},
                    {"id": "q3", "type": " scale "}
                ]}
            ]
        }"#;
        let config: SurveyConfig = serde_json::from_str(js).unwrap();
        assert!(config.response_sources.is_empty());
        assert!(config.periods.is_empty());
        assert!(!config.derive_period_from_submission());
        assert_eq!(
            config.scored_question_ids(),
            vec!["q1".to_string(), "q3".to_string()]
        );
        assert_eq!(config.survey.scale_max, None);
    }

    #[test]
    fn default_column_names() {
        let fs = FileSource::for_input("data.csv", "csv".to_string());
        assert_eq!(fs.id_column(), "id");
        assert_eq!(fs.submitted_at_column(), "submittedAt");
        assert_eq!(fs.complete_column(), "isComplete");
        let custom = FileSource {
            id_column: Some("respondent".to_string()),
            ..fs
        };
        assert_eq!(custom.id_column(), "respondent");
    }

    #[test]
    fn calculated_at_is_ignored() {
        let js = serde_json::json!({
            "results": {"calculatedAt": "2024-01-01T00:00:00+00:00", "averageScore": 3.0}
        });
        let cleaned = without_volatile_fields(js);
        assert_eq!(cleaned, serde_json::json!({"results": {"averageScore": 3.0}}));
    }
}
