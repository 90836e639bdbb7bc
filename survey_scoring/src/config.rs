// ********* Input data structures ***********

use std::collections::HashMap;
use std::error::Error;
use std::fmt::Display;

use chrono::{DateTime, Utc};

/// The scoring mode of a survey.
///
/// This is the single switch that selects the aggregation formula for the
/// whole scoring pass.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum SurveyType {
    /// Indicators and questions carry relative weights.
    Weighted,
    /// Flat "points earned / points possible" scoring.
    Unweighted,
}

impl SurveyType {
    /// Parses the stored representation of the survey type.
    ///
    /// Anything other than `weighted` or `unweighted` is a configuration error.
    pub fn parse(s: &str) -> Result<SurveyType, ScoringErrors> {
        match s.trim() {
            "weighted" => Ok(SurveyType::Weighted),
            "unweighted" => Ok(SurveyType::Unweighted),
            x => Err(ScoringErrors::UnknownSurveyType(x.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SurveyType::Weighted => "weighted",
            SurveyType::Unweighted => "unweighted",
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum QuestionKind {
    /// A numeric answer on the configured scale. The only kind that is scored.
    Scale,
    Choice,
    Text,
}

impl QuestionKind {
    pub fn parse(s: &str) -> Result<QuestionKind, ScoringErrors> {
        match s.trim() {
            "scale" => Ok(QuestionKind::Scale),
            "choice" => Ok(QuestionKind::Choice),
            "text" => Ok(QuestionKind::Text),
            x => Err(ScoringErrors::UnknownQuestionType(x.to_string())),
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Question {
    pub id: String,
    pub text: String,
    pub kind: QuestionKind,
    /// Relative weight inside the indicator. Only read for weighted surveys.
    pub weight: f64,
    pub indicator_id: String,
}

#[derive(PartialEq, Debug, Clone)]
pub struct Indicator {
    pub id: String,
    pub title: String,
    /// Relative weight inside the survey. Only read for weighted surveys.
    pub weight: f64,
    pub questions: Vec<Question>,
}

impl Indicator {
    /// The questions that take part in scoring, in survey order.
    pub fn scored_questions(&self) -> impl Iterator<Item = &Question> {
        self.questions
            .iter()
            .filter(|q| q.kind == QuestionKind::Scale)
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct Survey {
    pub id: String,
    pub title: String,
    pub survey_type: SurveyType,
    pub indicators: Vec<Indicator>,
}

#[derive(PartialEq, Debug, Clone, Copy)]
pub struct Answer {
    pub score: f64,
}

/// The reporting period attached to a response.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub struct Period {
    pub year: i32,
    pub quarter: Option<u8>,
    pub semester: Option<u8>,
}

/// A submission from one respondent. Immutable once created.
#[derive(PartialEq, Debug, Clone)]
pub struct Response {
    pub id: String,
    pub survey_id: String,
    /// Keyed by question id. A missing key means the question was not answered.
    pub answers: HashMap<String, Answer>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub is_complete: bool,
    pub period: Option<Period>,
}

/// A period requested for a trend comparison.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum PeriodFilter {
    Year(i32),
    Semester(i32, u8),
    Quarter(i32, u8),
}

impl PeriodFilter {
    /// Exact match on the fields named by this filter.
    pub fn matches(&self, period: &Period) -> bool {
        match *self {
            PeriodFilter::Year(y) => period.year == y,
            PeriodFilter::Semester(y, s) => period.year == y && period.semester == Some(s),
            PeriodFilter::Quarter(y, q) => period.year == y && period.quarter == Some(q),
        }
    }

    pub fn name(&self) -> String {
        match self {
            PeriodFilter::Year(y) => format!("{}", y),
            PeriodFilter::Semester(y, s) => format!("{}-S{}", y, s),
            PeriodFilter::Quarter(y, q) => format!("{}-Q{}", y, q),
        }
    }
}

// ******** Output data structures *********

/// Whether a score was computed from at least one valid answer.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum DataState {
    Scored,
    NoData,
}

/// Quality category on the IKM scale.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, PartialOrd, Ord)]
pub enum QualityCategory {
    A,
    B,
    C,
    D,
}

impl QualityCategory {
    pub fn letter(&self) -> &'static str {
        match self {
            QualityCategory::A => "A",
            QualityCategory::B => "B",
            QualityCategory::C => "C",
            QualityCategory::D => "D",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            QualityCategory::A => "Sangat Baik",
            QualityCategory::B => "Baik",
            QualityCategory::C => "Kurang Baik",
            QualityCategory::D => "Tidak Baik",
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
pub struct ScoreBucket {
    pub value: u32,
    pub count: u64,
    pub percentage: f64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct QuestionDetail {
    pub question_id: String,
    pub text: String,
    pub average_score: f64,
    /// Number of valid answers.
    pub response_count: u64,
    /// Number of answers excluded because they were outside the scale.
    pub invalid_count: u64,
    /// One bucket per scale value, from 1 to the scale maximum.
    pub distribution: Vec<ScoreBucket>,
    pub weight: f64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct IndicatorScore {
    pub indicator_id: String,
    pub title: String,
    pub score: f64,
    pub weight: f64,
    /// Share of the survey score coming from this indicator.
    pub weighted_contribution: f64,
    pub data_state: DataState,
    pub questions: Vec<QuestionDetail>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct SurveyResult {
    pub survey_id: String,
    pub survey_type: SurveyType,
    pub total_responses: u64,
    pub average_score: f64,
    /// IKM value, between 1 and 4.
    pub satisfaction_index: f64,
    pub category: QualityCategory,
    pub data_state: DataState,
    pub invalid_answers: u64,
    pub indicator_scores: Vec<IndicatorScore>,
    pub calculated_at: DateTime<Utc>,
}

#[derive(PartialEq, Debug, Clone)]
pub struct TrendPoint {
    pub period: PeriodFilter,
    pub period_name: String,
    pub score: f64,
    pub ikm: f64,
    pub category: QualityCategory,
    pub respondent_count: u64,
    pub data_state: DataState,
    /// Difference with the previous point, when both have data.
    pub score_change: Option<f64>,
    pub indicator_scores: Vec<(String, f64)>,
}

/// Errors that prevent a scoring pass from starting.
///
/// They are all detected at the boundary, before any aggregation happens.
#[derive(PartialEq, Debug, Clone)]
pub enum ScoringErrors {
    UnknownSurveyType(String),
    UnknownQuestionType(String),
    InvalidScale(u32),
    InvalidWeight { id: String, weight: f64 },
    DuplicateIndicator(String),
    DuplicateQuestion(String),
    DuplicateResponse(String),
    ForeignResponse { response_id: String, survey_id: String },
    InvalidPeriod { response_id: String, field: String, value: u8 },
    DuplicateAnswer { response_id: String, question_id: String },
    UnknownIndicator { question_id: String, indicator_id: String },
    UnknownQuestion { response_id: String, question_id: String },
    UnknownResponse(String),
}

impl Error for ScoringErrors {}

impl Display for ScoringErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoringErrors::UnknownSurveyType(s) => {
                write!(f, "unknown survey type {:?} (expected weighted or unweighted)", s)
            }
            ScoringErrors::UnknownQuestionType(s) => {
                write!(f, "unknown question type {:?} (expected scale, choice or text)", s)
            }
            ScoringErrors::InvalidScale(m) => {
                write!(
                    f,
                    "invalid scale maximum {}: must be between 2 and {}",
                    m,
                    ScoringRules::MAX_SCALE
                )
            }
            ScoringErrors::InvalidWeight { id, weight } => {
                write!(f, "invalid weight {} for {}", weight, id)
            }
            ScoringErrors::DuplicateIndicator(id) => write!(f, "duplicate indicator id {}", id),
            ScoringErrors::DuplicateQuestion(id) => write!(f, "duplicate question id {}", id),
            ScoringErrors::DuplicateResponse(id) => write!(f, "duplicate response id {}", id),
            ScoringErrors::ForeignResponse {
                response_id,
                survey_id,
            } => write!(
                f,
                "response {} belongs to another survey ({})",
                response_id, survey_id
            ),
            ScoringErrors::InvalidPeriod {
                response_id,
                field,
                value,
            } => write!(f, "response {}: invalid {} {}", response_id, field, value),
            ScoringErrors::DuplicateAnswer {
                response_id,
                question_id,
            } => write!(
                f,
                "response {} answers question {} more than once",
                response_id, question_id
            ),
            ScoringErrors::UnknownIndicator {
                question_id,
                indicator_id,
            } => write!(
                f,
                "question {} refers to unknown indicator {}",
                question_id, indicator_id
            ),
            ScoringErrors::UnknownQuestion {
                response_id,
                question_id,
            } => write!(
                f,
                "response {} answers unknown question {}",
                response_id, question_id
            ),
            ScoringErrors::UnknownResponse(id) => {
                write!(f, "answer refers to unknown response {}", id)
            }
        }
    }
}

// ********* Configuration **********

/// Scale configuration. Only built through [ScoringRules::new] or [ScoringRules::DEFAULT_RULES].
#[derive(PartialEq, Debug, Clone, Copy)]
pub struct ScoringRules {
    // Largest valid answer on a scale question. The smallest is always 1.
    scale_max: u32,
}

impl ScoringRules {
    pub const DEFAULT_RULES: ScoringRules = ScoringRules { scale_max: 5 };

    /// Largest scale accepted by [ScoringRules::new].
    pub const MAX_SCALE: u32 = 100;

    pub fn new(scale_max: u32) -> Result<ScoringRules, ScoringErrors> {
        if !(2..=ScoringRules::MAX_SCALE).contains(&scale_max) {
            return Err(ScoringErrors::InvalidScale(scale_max));
        }
        Ok(ScoringRules { scale_max })
    }

    /// Largest valid answer on a scale question. The smallest is always 1.
    pub fn scale_max(&self) -> u32 {
        self.scale_max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_bounds() {
        assert_eq!(ScoringRules::DEFAULT_RULES.scale_max(), 5);
        assert_eq!(ScoringRules::new(4).map(|r| r.scale_max()), Ok(4));
        assert_eq!(ScoringRules::new(1), Err(ScoringErrors::InvalidScale(1)));
        assert_eq!(
            ScoringRules::new(100_000),
            Err(ScoringErrors::InvalidScale(100_000))
        );
        assert!(ScoringRules::new(ScoringRules::MAX_SCALE).is_ok());
    }
}
