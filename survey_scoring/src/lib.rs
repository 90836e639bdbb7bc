pub mod builder;
mod config;
pub mod manual;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use std::{
    iter::Sum,
    ops::{Add, AddAssign},
};

pub use crate::config::*;

/// Lowest value of the IKM scale.
pub const IKM_MIN: f64 = 1.0;
/// Highest value of the IKM scale.
pub const IKM_MAX: f64 = 4.0;

// **** Private structures ****

/// Running total of the valid answers seen so far.
#[derive(PartialEq, Debug, Clone, Copy)]
struct ScoreTally {
    sum: f64,
    count: u64,
}

impl ScoreTally {
    const EMPTY: ScoreTally = ScoreTally { sum: 0.0, count: 0 };

    fn single(score: f64) -> ScoreTally {
        ScoreTally {
            sum: score,
            count: 1,
        }
    }

    fn average(&self) -> f64 {
        safe_div(self.sum, self.count as f64)
    }
}

impl Sum for ScoreTally {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(ScoreTally::EMPTY, |acc, t| acc + t)
    }
}

impl AddAssign for ScoreTally {
    fn add_assign(&mut self, rhs: ScoreTally) {
        self.sum += rhs.sum;
        self.count += rhs.count;
    }
}

impl Add for ScoreTally {
    type Output = ScoreTally;
    fn add(self: ScoreTally, rhs: ScoreTally) -> ScoreTally {
        ScoreTally {
            sum: self.sum + rhs.sum,
            count: self.count + rhs.count,
        }
    }
}

#[derive(PartialEq, Debug, Clone)]
struct QuestionAggregate {
    detail: QuestionDetail,
    tally: ScoreTally,
}

#[derive(PartialEq, Debug, Clone)]
struct IndicatorAggregate {
    // The weighted contribution is not known at this level and is filled by the survey pass.
    score: IndicatorScore,
    tally: ScoreTally,
    // Number of scale questions in the indicator (the `p` of the flat formula).
    question_count: u64,
}

// The score of one set of complete responses, shared by the survey and the trend passes.
#[derive(PartialEq, Debug, Clone)]
struct ScoredSnapshot {
    respondents: u64,
    average_score: f64,
    data_state: DataState,
    invalid_answers: u64,
    indicator_scores: Vec<IndicatorScore>,
}

/// Division that returns 0 instead of NaN or infinity.
fn safe_div(num: f64, den: f64) -> f64 {
    if den == 0.0 || !den.is_finite() {
        return 0.0;
    }
    let res = num / den;
    if res.is_finite() {
        res
    } else {
        0.0
    }
}

fn weighted_average<I>(items: I) -> f64
where
    I: Iterator<Item = (f64, f64)>,
{
    let (num, den) = items.fold((0.0, 0.0), |(num, den), (value, weight)| {
        (num + value * weight, den + weight)
    });
    safe_div(num, den)
}

fn complete_responses(responses: &[Response]) -> Vec<&Response> {
    responses.iter().filter(|r| r.is_complete).collect()
}

/// True if the score is a whole number between 1 and the scale maximum.
pub fn is_valid_score(score: f64, scale_max: u32) -> bool {
    score.is_finite() && score.fract() == 0.0 && score >= 1.0 && score <= scale_max as f64
}

/// Converts a raw average on the `1..=scale_max` scale to the 1..4 IKM scale.
///
/// A NaN score means that there is no data, and maps to the floor of the
/// scale (1.0, the worst category). Results are clamped to `[1, 4]`: the flat
/// unweighted formula can produce averages below 1 when many answers are
/// missing.
pub fn convert_to_ikm(score: f64, scale_max: u32) -> f64 {
    if score.is_nan() {
        return IKM_MIN;
    }
    let span = scale_max as f64 - 1.0;
    let ikm = safe_div(score - 1.0, span) * 3.0 + 1.0;
    ikm.clamp(IKM_MIN, IKM_MAX)
}

/// Classifies an IKM value into a quality category.
///
/// A value sitting exactly on the 2.50 boundary goes to the category above
/// (B). The other boundaries (3.25, 1.75) belong to the category below.
pub fn classify(ikm: f64) -> QualityCategory {
    if ikm > 3.25 {
        QualityCategory::A
    } else if ikm >= 2.50 {
        QualityCategory::B
    } else if ikm > 1.75 {
        QualityCategory::C
    } else {
        QualityCategory::D
    }
}

fn aggregate_question(
    question: &Question,
    responses: &[&Response],
    rules: &ScoringRules,
) -> QuestionAggregate {
    let mut tally = ScoreTally::EMPTY;
    let mut invalid_count: u64 = 0;
    let mut counts: Vec<u64> = vec![0; rules.scale_max() as usize];

    for r in responses.iter() {
        match r.answers.get(&question.id) {
            Some(a) if is_valid_score(a.score, rules.scale_max()) => {
                tally += ScoreTally::single(a.score);
                // Valid scores are whole numbers starting at 1.
                counts[a.score as usize - 1] += 1;
            }
            Some(a) => {
                debug!(
                    "aggregate_question: response {} question {}: excluding score {:?}",
                    r.id, question.id, a.score
                );
                invalid_count += 1;
            }
            None => {}
        }
    }
    if invalid_count > 0 {
        warn!(
            "Question {}: {} answers outside of the scale 1..={} were excluded",
            question.id, invalid_count, rules.scale_max()
        );
    }

    let distribution: Vec<ScoreBucket> = counts
        .iter()
        .enumerate()
        .map(|(idx, &count)| ScoreBucket {
            value: (idx + 1) as u32,
            count,
            percentage: safe_div(count as f64, tally.count as f64) * 100.0,
        })
        .collect();

    let detail = QuestionDetail {
        question_id: question.id.clone(),
        text: question.text.clone(),
        average_score: tally.average(),
        response_count: tally.count,
        invalid_count,
        distribution,
        weight: question.weight,
    };
    debug!(
        "aggregate_question: {} average: {} valid: {} invalid: {}",
        question.id, detail.average_score, detail.response_count, detail.invalid_count
    );
    QuestionAggregate { detail, tally }
}

fn aggregate_indicator(
    indicator: &Indicator,
    survey_type: SurveyType,
    responses: &[&Response],
    rules: &ScoringRules,
) -> IndicatorAggregate {
    let questions: Vec<QuestionAggregate> = indicator
        .scored_questions()
        .map(|q| aggregate_question(q, responses, rules))
        .collect();

    let tally: ScoreTally = questions.iter().map(|q| q.tally).sum();
    let respondents = responses.len() as u64;
    let question_count = questions.len() as u64;

    let score = match survey_type {
        // Total points earned over total points possible. Missing answers add
        // nothing to the sum but still count in the denominator.
        SurveyType::Unweighted => safe_div(tally.sum, (respondents * question_count) as f64),
        // Unanswered questions average 0 and still carry their weight.
        SurveyType::Weighted => weighted_average(
            questions
                .iter()
                .map(|q| (q.detail.average_score, q.detail.weight)),
        ),
    };
    let data_state = if tally.count > 0 {
        DataState::Scored
    } else {
        DataState::NoData
    };
    debug!(
        "aggregate_indicator: {} ({:?}) score: {} sum: {} n: {} p: {}",
        indicator.id, survey_type, score, tally.sum, respondents, question_count
    );

    IndicatorAggregate {
        score: IndicatorScore {
            indicator_id: indicator.id.clone(),
            title: indicator.title.clone(),
            score,
            weight: indicator.weight,
            weighted_contribution: 0.0,
            data_state,
            questions: questions.into_iter().map(|q| q.detail).collect(),
        },
        tally,
        question_count,
    }
}

// Scores a set of complete responses against the survey.
fn score_snapshot(
    survey: &Survey,
    complete: &[&Response],
    rules: &ScoringRules,
) -> ScoredSnapshot {
    let respondents = complete.len() as u64;
    let survey_type = survey.survey_type;

    let aggregates: Vec<IndicatorAggregate> = survey
        .indicators
        .iter()
        .map(|ind| aggregate_indicator(ind, survey_type, complete, rules))
        .collect();

    let total_tally: ScoreTally = aggregates.iter().map(|a| a.tally).sum();
    let total_questions: u64 = aggregates.iter().map(|a| a.question_count).sum();
    let total_slots = (respondents * total_questions) as f64;
    let invalid_answers: u64 = aggregates
        .iter()
        .flat_map(|a| a.score.questions.iter())
        .map(|q| q.invalid_count)
        .sum();

    let total_weight: f64 = aggregates.iter().map(|a| a.score.weight).sum();

    let average_score = match survey_type {
        SurveyType::Unweighted => safe_div(total_tally.sum, total_slots),
        SurveyType::Weighted => weighted_average(
            aggregates
                .iter()
                .map(|a| (a.score.score, a.score.weight)),
        ),
    };

    let indicator_scores: Vec<IndicatorScore> = aggregates
        .into_iter()
        .map(|a| {
            let IndicatorAggregate {
                score: mut indicator_score,
                tally,
                ..
            } = a;
            indicator_score.weighted_contribution = match survey_type {
                SurveyType::Unweighted => safe_div(tally.sum, total_slots),
                SurveyType::Weighted => safe_div(
                    indicator_score.score * indicator_score.weight,
                    total_weight,
                ),
            };
            indicator_score
        })
        .collect();

    let data_state = if total_tally.count > 0 {
        DataState::Scored
    } else {
        DataState::NoData
    };

    ScoredSnapshot {
        respondents,
        average_score,
        data_state,
        invalid_answers,
        indicator_scores,
    }
}

fn snapshot_ikm(snapshot: &ScoredSnapshot, rules: &ScoringRules) -> f64 {
    match snapshot.data_state {
        DataState::Scored => convert_to_ikm(snapshot.average_score, rules.scale_max()),
        DataState::NoData => convert_to_ikm(f64::NAN, rules.scale_max()),
    }
}

/// Computes the aggregate of a single question over the complete responses.
pub fn compute_question_detail(
    question: &Question,
    responses: &[Response],
    rules: &ScoringRules,
) -> QuestionDetail {
    let complete = complete_responses(responses);
    aggregate_question(question, &complete, rules).detail
}

/// Computes the score of a single indicator over the complete responses.
///
/// The indicator is scored as if it were alone in its survey: its weighted
/// contribution is its own score.
pub fn compute_indicator_score(
    indicator: &Indicator,
    survey_type: SurveyType,
    responses: &[Response],
    rules: &ScoringRules,
) -> IndicatorScore {
    let complete = complete_responses(responses);
    let mut res = aggregate_indicator(indicator, survey_type, &complete, rules).score;
    res.weighted_contribution = res.score;
    res
}

/// Computes the full result of a survey, stamped with the current time.
///
/// Arguments:
/// * `survey` the normalized survey
/// * `responses` every response of the survey. Incomplete responses are ignored.
/// * `rules` the scale configuration
pub fn compute_survey_result(
    survey: &Survey,
    responses: &[Response],
    rules: &ScoringRules,
) -> SurveyResult {
    compute_survey_result_at(survey, responses, rules, Utc::now())
}

/// Same as [compute_survey_result], with an explicit calculation time.
pub fn compute_survey_result_at(
    survey: &Survey,
    responses: &[Response],
    rules: &ScoringRules,
    calculated_at: DateTime<Utc>,
) -> SurveyResult {
    let complete = complete_responses(responses);
    info!(
        "Scoring survey {}: {} responses ({} complete), type: {}, scale: 1..={}",
        survey.id,
        responses.len(),
        complete.len(),
        survey.survey_type.as_str(),
        rules.scale_max()
    );

    let snapshot = score_snapshot(survey, &complete, rules);
    let satisfaction_index = snapshot_ikm(&snapshot, rules);
    let category = classify(satisfaction_index);
    info!(
        "Survey {}: average score {} ikm {} category {} ({:?})",
        survey.id,
        snapshot.average_score,
        satisfaction_index,
        category.letter(),
        snapshot.data_state
    );

    SurveyResult {
        survey_id: survey.id.clone(),
        survey_type: survey.survey_type,
        total_responses: snapshot.respondents,
        average_score: snapshot.average_score,
        satisfaction_index,
        category,
        data_state: snapshot.data_state,
        invalid_answers: snapshot.invalid_answers,
        indicator_scores: snapshot.indicator_scores,
        calculated_at,
    }
}

fn compute_period_point(
    survey: &Survey,
    complete: &[&Response],
    period: &PeriodFilter,
    rules: &ScoringRules,
) -> TrendPoint {
    let in_period: Vec<&Response> = complete
        .iter()
        .filter(|r| r.period.map(|p| period.matches(&p)).unwrap_or(false))
        .cloned()
        .collect();
    debug!(
        "compute_period_point: {}: {} matching responses",
        period.name(),
        in_period.len()
    );

    let snapshot = score_snapshot(survey, &in_period, rules);
    let ikm = snapshot_ikm(&snapshot, rules);
    TrendPoint {
        period: *period,
        period_name: period.name(),
        score: snapshot.average_score,
        ikm,
        category: classify(ikm),
        respondent_count: snapshot.respondents,
        data_state: snapshot.data_state,
        score_change: None,
        indicator_scores: snapshot
            .indicator_scores
            .iter()
            .map(|s| (s.indicator_id.clone(), s.score))
            .collect(),
    }
}

/// Scores each period independently and returns the points in the order of `periods`.
///
/// The periods are not sorted: callers pass them in the order they want to
/// display them (chronological by convention).
pub fn compute_trend(
    survey: &Survey,
    responses: &[Response],
    periods: &[PeriodFilter],
    rules: &ScoringRules,
) -> Vec<TrendPoint> {
    let complete = complete_responses(responses);
    info!(
        "Trend for survey {}: {} periods, {} complete responses",
        survey.id,
        periods.len(),
        complete.len()
    );

    let mut points: Vec<TrendPoint> = periods
        .iter()
        .map(|p| compute_period_point(survey, &complete, p, rules))
        .collect();

    // The changes only read finished points.
    let mut previous: Option<(f64, DataState)> = None;
    for point in points.iter_mut() {
        point.score_change = match previous {
            Some((prev_score, DataState::Scored)) if point.data_state == DataState::Scored => {
                Some(point.score - prev_score)
            }
            _ => None,
        };
        previous = Some((point.score, point.data_state));
    }
    points
}
