pub use crate::config::*;

use chrono::{DateTime, Datelike, Utc};
use log::debug;
use std::collections::{HashMap, HashSet};

/// A response row, as stored by the data layer.
///
/// All the fields except the id may be missing.
#[derive(PartialEq, Debug, Clone, Default)]
pub struct ResponseRecord {
    pub id: String,
    pub survey_id: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub is_complete: Option<bool>,
    pub year: Option<i32>,
    pub quarter: Option<u8>,
    pub semester: Option<u8>,
}

/// Normalizes loosely-typed stored rows into a [Survey] and its responses.
///
/// All the checks happen here, so that the scoring functions can assume
/// well-formed input.
///
/// ```
/// use survey_scoring::builder::{Builder, ResponseRecord};
/// # use survey_scoring::ScoringErrors;
///
/// let mut builder = Builder::new("s1", "Pelayanan KTP", "unweighted")?;
/// builder.add_indicator("i1", "Prosedur", None)?;
/// builder.add_question("i1", "q1", "Persyaratan mudah dipenuhi", "scale", None)?;
/// builder.add_response(ResponseRecord {
///     id: "r1".to_string(),
///     ..Default::default()
/// })?;
/// builder.add_answer("r1", "q1", 4.0)?;
///
/// let (survey, responses) = builder.build();
/// assert_eq!(survey.indicators[0].questions.len(), 1);
/// assert_eq!(responses[0].answers["q1"].score, 4.0);
///
/// # Ok::<(), ScoringErrors>(())
/// ```
pub struct Builder {
    _survey_id: String,
    _title: String,
    _survey_type: SurveyType,
    _derive_periods: bool,
    _indicators: Vec<Indicator>,
    _question_indicator: HashMap<String, usize>,
    _question_kinds: HashMap<String, QuestionKind>,
    _responses: Vec<Response>,
    _response_index: HashMap<String, usize>,
    _answered: HashSet<(String, String)>,
}

fn check_weight(id: &str, weight: Option<f64>) -> Result<f64, ScoringErrors> {
    match weight {
        None => Ok(1.0),
        Some(w) if w.is_finite() && w >= 0.0 => Ok(w),
        Some(w) => Err(ScoringErrors::InvalidWeight {
            id: id.to_string(),
            weight: w,
        }),
    }
}

fn check_period_part(
    response_id: &str,
    field: &str,
    value: Option<u8>,
    max: u8,
) -> Result<(), ScoringErrors> {
    match value {
        Some(v) if !(1..=max).contains(&v) => Err(ScoringErrors::InvalidPeriod {
            response_id: response_id.to_string(),
            field: field.to_string(),
            value: v,
        }),
        _ => Ok(()),
    }
}

/// The period a submission date falls in: quarters of three months, semesters of six.
pub fn period_of(date: &DateTime<Utc>) -> Period {
    let month = date.month();
    Period {
        year: date.year(),
        quarter: Some(((month - 1) / 3 + 1) as u8),
        semester: Some(if month <= 6 { 1 } else { 2 }),
    }
}

impl Builder {
    /// Starts a new survey. The survey type must be `weighted` or `unweighted`.
    pub fn new(survey_id: &str, title: &str, survey_type: &str) -> Result<Builder, ScoringErrors> {
        Ok(Builder {
            _survey_id: survey_id.to_string(),
            _title: title.to_string(),
            _survey_type: SurveyType::parse(survey_type)?,
            _derive_periods: false,
            _indicators: Vec::new(),
            _question_indicator: HashMap::new(),
            _question_kinds: HashMap::new(),
            _responses: Vec::new(),
            _response_index: HashMap::new(),
            _answered: HashSet::new(),
        })
    }

    /// When set, responses without an explicit year take their period from
    /// their submission date.
    pub fn derive_periods(self, derive: bool) -> Builder {
        Builder {
            _derive_periods: derive,
            ..self
        }
    }

    /// Adds an indicator. A missing weight counts as 1.
    pub fn add_indicator(
        &mut self,
        id: &str,
        title: &str,
        weight: Option<f64>,
    ) -> Result<(), ScoringErrors> {
        if self._indicators.iter().any(|ind| ind.id == id) {
            return Err(ScoringErrors::DuplicateIndicator(id.to_string()));
        }
        let weight = check_weight(id, weight)?;
        self._indicators.push(Indicator {
            id: id.to_string(),
            title: title.to_string(),
            weight,
            questions: Vec::new(),
        });
        Ok(())
    }

    /// Adds a question to a previously added indicator.
    ///
    /// The questions keep the order in which they were added.
    pub fn add_question(
        &mut self,
        indicator_id: &str,
        id: &str,
        text: &str,
        kind: &str,
        weight: Option<f64>,
    ) -> Result<(), ScoringErrors> {
        if self._question_indicator.contains_key(id) {
            return Err(ScoringErrors::DuplicateQuestion(id.to_string()));
        }
        let kind = QuestionKind::parse(kind)?;
        let weight = check_weight(id, weight)?;
        let idx = self
            ._indicators
            .iter()
            .position(|ind| ind.id == indicator_id)
            .ok_or_else(|| ScoringErrors::UnknownIndicator {
                question_id: id.to_string(),
                indicator_id: indicator_id.to_string(),
            })?;
        self._indicators[idx].questions.push(Question {
            id: id.to_string(),
            text: text.to_string(),
            kind,
            weight,
            indicator_id: indicator_id.to_string(),
        });
        self._question_indicator.insert(id.to_string(), idx);
        self._question_kinds.insert(id.to_string(), kind);
        Ok(())
    }

    /// Adds a response row. A missing completion flag counts as complete.
    ///
    /// Rows that name another survey, or carry a quarter outside 1..=4 or a
    /// semester outside 1..=2, are rejected.
    pub fn add_response(&mut self, record: ResponseRecord) -> Result<(), ScoringErrors> {
        if self._response_index.contains_key(&record.id) {
            return Err(ScoringErrors::DuplicateResponse(record.id));
        }
        if let Some(survey_id) = record.survey_id.as_ref() {
            if *survey_id != self._survey_id {
                return Err(ScoringErrors::ForeignResponse {
                    response_id: record.id,
                    survey_id: survey_id.clone(),
                });
            }
        }
        check_period_part(&record.id, "quarter", record.quarter, 4)?;
        check_period_part(&record.id, "semester", record.semester, 2)?;
        let period = match (record.year, record.submitted_at) {
            (Some(year), _) => Some(Period {
                year,
                quarter: record.quarter,
                semester: record.semester,
            }),
            (None, Some(date)) if self._derive_periods => Some(period_of(&date)),
            _ => None,
        };
        debug!("add_response: {} period: {:?}", record.id, period);
        self._response_index
            .insert(record.id.clone(), self._responses.len());
        self._responses.push(Response {
            id: record.id,
            survey_id: record
                .survey_id
                .unwrap_or_else(|| self._survey_id.clone()),
            answers: HashMap::new(),
            submitted_at: record.submitted_at,
            is_complete: record.is_complete.unwrap_or(true),
            period,
        });
        Ok(())
    }

    /// Attaches an answer to a response.
    ///
    /// The score is kept as given: out-of-range values are excluded later, when
    /// scoring, and reported as invalid. Answers to non-scale questions are
    /// accepted and dropped.
    pub fn add_answer(
        &mut self,
        response_id: &str,
        question_id: &str,
        score: f64,
    ) -> Result<(), ScoringErrors> {
        let r_idx = *self
            ._response_index
            .get(response_id)
            .ok_or_else(|| ScoringErrors::UnknownResponse(response_id.to_string()))?;
        let kind = *self._question_kinds.get(question_id).ok_or_else(|| {
            ScoringErrors::UnknownQuestion {
                response_id: response_id.to_string(),
                question_id: question_id.to_string(),
            }
        })?;
        let key = (response_id.to_string(), question_id.to_string());
        if self._answered.contains(&key) {
            return Err(ScoringErrors::DuplicateAnswer {
                response_id: response_id.to_string(),
                question_id: question_id.to_string(),
            });
        }
        self._answered.insert(key);
        if kind != QuestionKind::Scale {
            debug!(
                "add_answer: response {}: question {} is not scored, dropping answer",
                response_id, question_id
            );
            return Ok(());
        }
        self._responses[r_idx]
            .answers
            .insert(question_id.to_string(), Answer { score });
        Ok(())
    }

    /// The survey type chosen at construction.
    pub fn survey_type(&self) -> SurveyType {
        self._survey_type
    }

    pub fn build(self) -> (Survey, Vec<Response>) {
        debug!(
            "build: survey {}: {} indicators, {} questions, {} responses",
            self._survey_id,
            self._indicators.len(),
            self._question_indicator.len(),
            self._responses.len()
        );
        let survey = Survey {
            id: self._survey_id,
            title: self._title,
            survey_type: self._survey_type,
            indicators: self._indicators,
        };
        (survey, self._responses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: &str) -> ResponseRecord {
        ResponseRecord {
            id: id.to_string(),
            ..Default::default()
        }
    }

    fn base() -> Builder {
        let mut b = Builder::new("s1", "Survey", "weighted").unwrap();
        b.add_indicator("i1", "Speed", Some(2.0)).unwrap();
        b.add_question("i1", "q1", "Fast?", "scale", Some(3.0)).unwrap();
        b.add_question("i1", "q2", "Comments", "text", None).unwrap();
        b
    }

    #[test]
    fn unknown_survey_type_fails_fast() {
        let res = Builder::new("s1", "Survey", "scored");
        assert_eq!(
            res.err(),
            Some(ScoringErrors::UnknownSurveyType("scored".to_string()))
        );
    }

    #[test]
    fn builds_typed_survey() {
        let mut b = base();
        b.add_response(record("r1")).unwrap();
        b.add_answer("r1", "q1", 4.0).unwrap();
        b.add_answer("r1", "q2", 0.0).unwrap();
        let (survey, responses) = b.build();

        assert_eq!(survey.survey_type, SurveyType::Weighted);
        assert_eq!(survey.indicators[0].weight, 2.0);
        let qs = &survey.indicators[0].questions;
        assert_eq!(qs[0].weight, 3.0);
        assert_eq!(qs[1].weight, 1.0);
        assert_eq!(qs[1].kind, QuestionKind::Text);
        assert_eq!(qs[0].indicator_id, "i1");

        assert_eq!(responses.len(), 1);
        assert!(responses[0].is_complete);
        assert_eq!(responses[0].survey_id, "s1");
        // Text answers are not part of the scored model.
        assert_eq!(responses[0].answers.len(), 1);
    }

    #[test]
    fn empty_survey_is_valid() {
        let b = Builder::new("s1", "Survey", "unweighted").unwrap();
        let (survey, responses) = b.build();
        assert!(survey.indicators.is_empty());
        assert!(responses.is_empty());
    }

    #[test]
    fn rejects_malformed_records() {
        let mut b = base();
        assert_eq!(
            b.add_indicator("i1", "Again", None),
            Err(ScoringErrors::DuplicateIndicator("i1".to_string()))
        );
        assert_eq!(
            b.add_question("i9", "q3", "?", "scale", None),
            Err(ScoringErrors::UnknownIndicator {
                question_id: "q3".to_string(),
                indicator_id: "i9".to_string()
            })
        );
        assert_eq!(
            b.add_question("i1", "q1", "?", "scale", None),
            Err(ScoringErrors::DuplicateQuestion("q1".to_string()))
        );
        assert_eq!(
            b.add_question("i1", "q4", "?", "slider", None),
            Err(ScoringErrors::UnknownQuestionType("slider".to_string()))
        );
        assert_eq!(
            b.add_question("i1", "q5", "?", "scale", Some(-1.0)),
            Err(ScoringErrors::InvalidWeight {
                id: "q5".to_string(),
                weight: -1.0
            })
        );

        b.add_response(record("r1")).unwrap();
        assert_eq!(
            b.add_response(record("r1")),
            Err(ScoringErrors::DuplicateResponse("r1".to_string()))
        );
        assert_eq!(
            b.add_answer("r2", "q1", 3.0),
            Err(ScoringErrors::UnknownResponse("r2".to_string()))
        );
        assert_eq!(
            b.add_answer("r1", "q9", 3.0),
            Err(ScoringErrors::UnknownQuestion {
                response_id: "r1".to_string(),
                question_id: "q9".to_string()
            })
        );
        b.add_answer("r1", "q1", 3.0).unwrap();
        assert_eq!(
            b.add_answer("r1", "q1", 5.0),
            Err(ScoringErrors::DuplicateAnswer {
                response_id: "r1".to_string(),
                question_id: "q1".to_string()
            })
        );
    }

    #[test]
    fn out_of_range_scores_are_kept_for_scoring() {
        let mut b = base();
        b.add_response(record("r1")).unwrap();
        b.add_answer("r1", "q1", 9.0).unwrap();
        let (_, responses) = b.build();
        assert_eq!(responses[0].answers["q1"].score, 9.0);
    }

    #[test]
    fn rejects_responses_of_other_surveys() {
        let mut b = base();
        b.add_response(ResponseRecord {
            survey_id: Some("s1".to_string()),
            ..record("r1")
        })
        .unwrap();
        b.add_answer("r1", "q1", 5.0).unwrap();
        assert_eq!(
            b.add_response(ResponseRecord {
                survey_id: Some("other".to_string()),
                ..record("r2")
            }),
            Err(ScoringErrors::ForeignResponse {
                response_id: "r2".to_string(),
                survey_id: "other".to_string()
            })
        );
        assert_eq!(
            b.add_answer("r2", "q1", 1.0),
            Err(ScoringErrors::UnknownResponse("r2".to_string()))
        );
        let (survey, responses) = b.build();
        assert_eq!(responses.len(), 1);
        let res = crate::compute_survey_result(&survey, &responses, &ScoringRules::DEFAULT_RULES);
        assert_eq!(res.total_responses, 1);
        assert_eq!(res.average_score, 5.0);
    }

    #[test]
    fn rejects_out_of_range_periods() {
        let mut b = base();
        assert_eq!(
            b.add_response(ResponseRecord {
                year: Some(2024),
                quarter: Some(7),
                ..record("r1")
            }),
            Err(ScoringErrors::InvalidPeriod {
                response_id: "r1".to_string(),
                field: "quarter".to_string(),
                value: 7
            })
        );
        assert_eq!(
            b.add_response(ResponseRecord {
                year: Some(2024),
                semester: Some(0),
                ..record("r2")
            }),
            Err(ScoringErrors::InvalidPeriod {
                response_id: "r2".to_string(),
                field: "semester".to_string(),
                value: 0
            })
        );
        b.add_response(ResponseRecord {
            year: Some(2024),
            quarter: Some(4),
            semester: Some(2),
            ..record("r3")
        })
        .unwrap();
        let (_, responses) = b.build();
        assert_eq!(responses.len(), 1);
    }

    #[test]
    fn explicit_periods_are_kept() {
        let mut b = base();
        b.add_response(ResponseRecord {
            year: Some(2023),
            semester: Some(2),
            ..record("r1")
        })
        .unwrap();
        let (_, responses) = b.build();
        assert_eq!(
            responses[0].period,
            Some(Period {
                year: 2023,
                quarter: None,
                semester: Some(2)
            })
        );
    }

    #[test]
    fn periods_from_submission_dates() {
        let date = Utc.with_ymd_and_hms(2024, 8, 15, 10, 0, 0).unwrap();
        let mut b = base().derive_periods(true);
        b.add_response(ResponseRecord {
            submitted_at: Some(date),
            ..record("r1")
        })
        .unwrap();
        b.add_response(record("r2")).unwrap();
        let (_, responses) = b.build();
        assert_eq!(
            responses[0].period,
            Some(Period {
                year: 2024,
                quarter: Some(3),
                semester: Some(2)
            })
        );
        assert_eq!(responses[1].period, None);
    }

    #[test]
    fn no_period_without_derivation() {
        let date = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        let mut b = base();
        b.add_response(ResponseRecord {
            submitted_at: Some(date),
            is_complete: Some(false),
            ..record("r1")
        })
        .unwrap();
        let (_, responses) = b.build();
        assert_eq!(responses[0].period, None);
        assert!(!responses[0].is_complete);
    }

    #[test]
    fn quarter_boundaries() {
        let p = |m| period_of(&Utc.with_ymd_and_hms(2024, m, 1, 0, 0, 0).unwrap());
        assert_eq!(p(1).quarter, Some(1));
        assert_eq!(p(3).quarter, Some(1));
        assert_eq!(p(4).quarter, Some(2));
        assert_eq!(p(6).semester, Some(1));
        assert_eq!(p(7).semester, Some(2));
        assert_eq!(p(12).quarter, Some(4));
    }
}
