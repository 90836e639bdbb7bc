use log::{debug, info, warn};

use snafu::{prelude::*, Snafu};
use survey_scoring::builder::{Builder, ResponseRecord};
use survey_scoring::*;

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

pub mod config_reader;
mod io_common;
mod io_csv;
mod io_json;
mod io_xlsx;

use crate::survey::config_reader::*;

#[derive(Debug, Snafu)]
pub enum ScoreError {
    #[snafu(display("Error opening file {path}"))]
    OpeningExcel {
        source: calamine::XlsxError,
        path: String,
    },
    #[snafu(display("Worksheet {name} not found in {path}"))]
    MissingWorksheet { name: String, path: String },
    #[snafu(display("{path} has several worksheets, excelWorksheetName must be provided"))]
    AmbiguousWorksheet { path: String },
    #[snafu(display("No header row in {path}"))]
    EmptyExcel { path: String },
    #[snafu(display("Error reading file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON in {path}"))]
    ParsingJson {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error serializing the summary"))]
    SerializingJson { source: serde_json::Error },
    #[snafu(display("Error opening CSV file {path}"))]
    CsvOpen { source: csv::Error, path: String },
    #[snafu(display("Error parsing line {lineno} of {path}"))]
    CsvLineParse {
        source: csv::Error,
        path: String,
        lineno: usize,
    },
    #[snafu(display("Line {lineno}: cannot read {content:?} as {field}"))]
    InvalidCell {
        lineno: usize,
        field: String,
        content: String,
    },
    #[snafu(display("Invalid period {period:?}: expected YYYY, YYYY-Qn or YYYY-Sn"))]
    InvalidPeriod { period: String },
    #[snafu(display("Invalid survey data: {source}"))]
    Scoring { source: ScoringErrors },
    #[snafu(display("The configuration file has no parent directory"))]
    MissingParentDir {},

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type ScoreResult<T> = Result<T, ScoreError>;

/// A response, as parsed by the readers.
/// This is before checking it against the survey.
#[derive(PartialEq, Debug, Clone)]
pub struct ParsedResponse {
    pub record: ResponseRecord,
    /// Pairs of question id and score. Cells that could not be read as a number are NaN.
    pub answers: Vec<(String, f64)>,
}

fn data_state_str(ds: DataState) -> &'static str {
    match ds {
        DataState::Scored => "scored",
        DataState::NoData => "noData",
    }
}

fn question_to_json(q: &QuestionDetail) -> JSValue {
    let distribution: Vec<JSValue> = q
        .distribution
        .iter()
        .map(|b| json!({"value": b.value, "count": b.count, "percentage": b.percentage}))
        .collect();
    json!({
        "questionId": q.question_id,
        "text": q.text,
        "averageScore": q.average_score,
        "responseCount": q.response_count,
        "invalidCount": q.invalid_count,
        "weight": q.weight,
        "distribution": distribution,
    })
}

fn result_to_json(res: &SurveyResult) -> JSValue {
    let indicators: Vec<JSValue> = res
        .indicator_scores
        .iter()
        .map(|ind| {
            let questions: Vec<JSValue> = ind.questions.iter().map(question_to_json).collect();
            json!({
                "indicatorId": ind.indicator_id,
                "title": ind.title,
                "score": ind.score,
                "weight": ind.weight,
                "weightedContribution": ind.weighted_contribution,
                "dataState": data_state_str(ind.data_state),
                "questions": questions,
            })
        })
        .collect();
    json!({
        "surveyId": res.survey_id,
        "totalResponses": res.total_responses,
        "averageScore": res.average_score,
        "satisfactionIndex": res.satisfaction_index,
        "category": res.category.letter(),
        "categoryLabel": res.category.label(),
        "dataState": data_state_str(res.data_state),
        "invalidAnswers": res.invalid_answers,
        "calculatedAt": res.calculated_at.to_rfc3339(),
        "indicators": indicators,
    })
}

fn trend_to_json(points: &[TrendPoint]) -> Vec<JSValue> {
    let mut l: Vec<JSValue> = Vec::new();
    for p in points.iter() {
        let mut indicators: JSMap<String, JSValue> = JSMap::new();
        for (id, score) in p.indicator_scores.iter() {
            indicators.insert(id.clone(), json!(score));
        }
        l.push(json!({
            "period": p.period_name,
            "score": p.score,
            "ikm": p.ikm,
            "category": p.category.letter(),
            "respondentCount": p.respondent_count,
            "dataState": data_state_str(p.data_state),
            "scoreChange": p.score_change,
            "indicators": indicators,
        }));
    }
    l
}

fn build_summary_js(
    config: &SurveyConfig,
    rules: &ScoringRules,
    result: &SurveyResult,
    trend: &[TrendPoint],
) -> JSValue {
    let c = OutputConfig {
        survey: config.output_settings.survey_name.clone(),
        office: config.output_settings.office.clone(),
        date: config.output_settings.report_date.clone(),
        survey_type: result.survey_type.as_str().to_string(),
        scale_max: rules.scale_max(),
    };
    json!({
        "config": c,
        "results": result_to_json(result),
        "trend": trend_to_json(trend),
    })
}

fn validate_rules(config: &SurveyConfig) -> ScoreResult<ScoringRules> {
    let scale_max = config
        .survey
        .scale_max
        .unwrap_or(ScoringRules::DEFAULT_RULES.scale_max());
    ScoringRules::new(scale_max).context(ScoringSnafu {})
}

fn build_survey(config: &SurveyConfig) -> ScoreResult<Builder> {
    let mut builder = Builder::new(
        &config.survey.id,
        &config.survey.title,
        &config.survey.survey_type,
    )
    .context(ScoringSnafu {})?
    .derive_periods(config.derive_period_from_submission());

    for ind in config.indicators.iter() {
        builder
            .add_indicator(&ind.id, ind.title.as_deref().unwrap_or(&ind.id), ind.weight)
            .context(ScoringSnafu {})?;
        for q in ind.questions.iter() {
            builder
                .add_question(
                    &ind.id,
                    &q.id,
                    q.text.as_deref().unwrap_or(""),
                    q.kind(),
                    q.weight,
                )
                .context(ScoringSnafu {})?;
        }
    }
    Ok(builder)
}

fn add_parsed_responses(builder: &mut Builder, parsed: Vec<ParsedResponse>) -> ScoreResult<()> {
    for pr in parsed {
        let id = pr.record.id.clone();
        builder.add_response(pr.record).context(ScoringSnafu {})?;
        for (question_id, score) in pr.answers.iter() {
            builder
                .add_answer(&id, question_id, *score)
                .context(ScoringSnafu {})?;
        }
    }
    Ok(())
}

fn read_response_data(
    path: String,
    cfs: &FileSource,
    question_ids: &[String],
) -> ScoreResult<Vec<ParsedResponse>> {
    info!("Attempting to read response file {:?}", path);
    let parsed = match cfs.provider.as_str() {
        "csv" => io_csv::read_csv_responses(path, cfs, question_ids),
        "xlsx" => io_xlsx::read_excel_responses(path, cfs, question_ids),
        "json" => io_json::read_json_export(path),
        x => whatever!("Provider not implemented {:?}", x),
    }?;
    info!("Read {} responses", parsed.len());
    Ok(parsed)
}

/// The type of an input file given on the command line, from its extension.
fn provider_for_input(path: &str, input_type: Option<String>) -> String {
    if let Some(t) = input_type {
        return t;
    }
    match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some("xlsx") => "xlsx".to_string(),
        Some("json") => "json".to_string(),
        _ => "csv".to_string(),
    }
}

fn write_output(contents: &str, out_path: Option<String>) -> ScoreResult<()> {
    match out_path.as_deref() {
        None | Some("stdout") | Some("") => {
            println!("{}", contents);
        }
        Some(p) => {
            info!("Writing summary to {:?}", p);
            fs::write(p, contents).context(WritingFileSnafu { path: p })?;
        }
    }
    Ok(())
}

/// Scores a survey as described by the configuration file.
///
/// Arguments:
/// * `config_path` the JSON configuration of the survey
/// * `check_summary_path` an expected summary. If provided, any difference is an error.
/// * `out_path` where to write the summary (a file or `stdout`). Overrides the configuration.
/// * `input` a response file and its optional type. Replaces the sources of the configuration.
/// * `periods` the periods to compare. Replaces the periods of the configuration.
pub fn run_scoring(
    config_path: String,
    check_summary_path: Option<String>,
    out_path: Option<String>,
    input: Option<(String, Option<String>)>,
    periods: Option<Vec<String>>,
) -> ScoreResult<()> {
    let config_p = Path::new(config_path.as_str());
    let config = read_config(&config_path)?;
    info!("config: {:?}", config);

    let rules = validate_rules(&config)?;
    let mut builder = build_survey(&config)?;
    let question_ids = config.scored_question_ids();

    match input {
        Some((path, input_type)) => {
            let cfs = FileSource::for_input(&path, provider_for_input(&path, input_type));
            let parsed = read_response_data(path, &cfs, &question_ids)?;
            add_parsed_responses(&mut builder, parsed)?;
        }
        None => {
            if config.response_sources.is_empty() {
                whatever!("No response source: add responseSources to the configuration or use --input");
            }
            let root_p = config_p.parent().context(MissingParentDirSnafu {})?;
            for cfs in config.response_sources.iter() {
                let p: PathBuf = root_p.join(&cfs.file_path);
                let parsed =
                    read_response_data(p.as_path().display().to_string(), cfs, &question_ids)?;
                add_parsed_responses(&mut builder, parsed)?;
            }
        }
    }

    let (survey, responses) = builder.build();
    debug!("survey: {:?}", survey);

    let period_specs = periods.unwrap_or_else(|| config.periods.clone());
    let mut period_filters: Vec<PeriodFilter> = Vec::new();
    for spec in period_specs.iter() {
        period_filters.push(parse_period(spec)?);
    }

    let result = compute_survey_result(&survey, &responses, &rules);
    let trend = compute_trend(&survey, &responses, &period_filters, &rules);
    if result.invalid_answers > 0 {
        warn!(
            "{} answers were outside of the scale 1..={} and were not counted",
            result.invalid_answers, rules.scale_max()
        );
    }

    // Assemble the final json
    let result_js = build_summary_js(&config, &rules, &result, &trend);
    let pretty_js_stats =
        serde_json::to_string_pretty(&result_js).context(SerializingJsonSnafu {})?;
    let out = out_path.or_else(|| config.output_settings.output_path.clone());
    write_output(&pretty_js_stats, out)?;

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(summary_p)?;
        let pretty_js_summary_ref =
            serde_json::to_string_pretty(&summary_ref).context(SerializingJsonSnafu {})?;
        let pretty_js_stats_cmp = serde_json::to_string_pretty(&without_volatile_fields(
            result_js,
        ))
        .context(SerializingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_stats_cmp {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_stats_cmp.as_ref(),
                "\n",
            );
            whatever!("Difference detected between calculated summary and reference summary")
        }
    }

    Ok(())
}

#[cfg(test)]
fn test_dir() -> String {
    format!("{}/tests/data", env!("CARGO_MANIFEST_DIR"))
}

#[cfg(test)]
fn run_scoring_test(test_name: &str, config_lpath: &str, summary_lpath: &str) -> ScoreResult<()> {
    info!("Running test {}", test_name);
    let test_dir = test_dir();
    run_scoring(
        format!("{}/{}/{}", test_dir, test_name, config_lpath),
        Some(format!("{}/{}/{}", test_dir, test_name, summary_lpath)),
        Some("stdout".to_string()),
        None,
        None,
    )
}

#[cfg(test)]
pub fn test_wrapper(test_name: &str) {
    let res = run_scoring_test(
        test_name,
        format!("{}_config.json", test_name).as_str(),
        format!("{}_expected_summary.json", test_name).as_str(),
    );
    if let Err(e) = &res {
        eprintln!("An error occured {}", e);
    }
    assert!(res.is_ok(), "test {} failed: {:?}", test_name, res);
}
