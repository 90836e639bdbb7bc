use clap::Parser;

/// Computes the satisfaction scores (IKM) of a public service survey.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The JSON file describing the survey: its indicators, questions and response sources.
    /// For more information about the file format, read the documentation of the survey_scoring crate.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path) A reference file containing the expected summary in JSON format. If provided, ikmscore will
    /// check that the computed summary matches the reference. The calculation time is not compared.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary will be written in JSON format to the given
    /// location. Setting this option overrides the path that may be specified in the configuration.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path or empty) If specified, the responses are read from this file instead of the sources
    /// listed in the configuration.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (csv, xlsx or json) The type of the input. By default, it is guessed from the extension of the file.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// (period names, repeatable) The periods of the trend, for example 2024, 2024-S1 or 2024-Q3.
    /// Setting this option overrides the periods of the configuration.
    #[clap(long, value_parser)]
    pub period: Option<Vec<String>>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
