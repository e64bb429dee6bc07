use clap::{ArgAction, Parser};
use std::path::PathBuf;
use zsev::{
    AlignmentMode, Dataset, DivByZeroStrat, EvaluationError, EvaluationMode, EvaluationResults,
    EvaluatorConfig, MentionsExtractorEvaluator, RecordedPipeline, TokenClassificationEvaluator,
    ZeroShotTokenClassificationEvaluator,
};

#[derive(Parser)]
#[command(name = "zsev")]
#[command(about = "Evaluates recorded token classification predictions against a gold dataset", long_about = None)]
#[command(version)]
struct Cli {
    /// Gold dataset, one JSON object per line
    #[arg(long, value_name = "GOLD.JSONL")]
    data: PathBuf,

    /// Recorded predictions, one {"text", "predictions"} object per line
    #[arg(long, value_name = "PREDS.JSONL")]
    predictions: PathBuf,

    /// Evaluation granularity: span or token
    #[arg(long, default_value_t = EvaluationMode::Span)]
    mode: EvaluationMode,

    /// How predicted spans are snapped to the words: expand, contract or strict
    #[arg(long, default_value_t = AlignmentMode::Expand)]
    alignment: AlignmentMode,

    /// Evaluate a mentions extractor: every gold entity type becomes MENTION
    #[arg(long)]
    mentions: bool,

    /// JSON object renaming the gold entity types
    #[arg(long, value_name = "MAPPER.JSON")]
    entity_mapper: Option<PathBuf>,

    /// Names of the classes when the label column holds integer ids
    #[arg(long, value_delimiter = ',', value_name = "B-PER,I-PER,...")]
    label_names: Option<Vec<String>>,

    #[arg(long, default_value = zsev::DEFAULT_INPUT_COLUMN)]
    input_column: String,

    #[arg(long, default_value = zsev::DEFAULT_LABEL_COLUMN)]
    label_column: String,

    /// String used to join the words into the text given to the model
    #[arg(long, default_value = zsev::DEFAULT_JOIN_BY)]
    join_by: String,

    /// Parse the entities with the strict IOB2 rules
    #[arg(long)]
    strict: bool,

    /// What to do when dividing by zero: replaceby0, replaceby1 or returnerror
    #[arg(long, default_value_t = DivByZeroStrat::ReplaceBy0)]
    division_by_zero: DivByZeroStrat,

    /// Print the results as JSON
    #[arg(long)]
    json: bool,

    /// Verbosity (-v for info, -vv for debug)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbosity: u8,
}

fn run(cli: Cli) -> Result<EvaluationResults, EvaluationError> {
    let mut builder = EvaluatorConfig::builder()
        .mode(cli.mode)
        .alignment_mode(cli.alignment)
        .input_column(cli.input_column)
        .label_column(cli.label_column)
        .join_by(cli.join_by)
        .strict(cli.strict)
        .division_by_zero(cli.division_by_zero);
    if let Some(path) = cli.entity_mapper {
        builder = builder.entity_mapper_file(path);
    }
    let config = builder.build()?;
    log::info!("Configuration:\n {}", config);

    let mut dataset = Dataset::from_json_lines(&cli.data)?;
    if let Some(names) = cli.label_names {
        dataset = dataset.with_class_labels(config.label_column.clone(), names);
    }
    let pipeline: RecordedPipeline = RecordedPipeline::from_json_lines(&cli.predictions)?;

    if cli.mentions {
        MentionsExtractorEvaluator::new(config).evaluate(pipeline, dataset)
    } else {
        ZeroShotTokenClassificationEvaluator::new(config).evaluate(pipeline, dataset)
    }
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .format_target(false)
        .init();

    let json = cli.json;
    match run(cli) {
        Ok(results) if json => match serde_json::to_string_pretty(&results) {
            Ok(s) => println!("{}", s),
            Err(e) => {
                log::error!("Could not serialize the results: {}", e);
                std::process::exit(1);
            }
        },
        Ok(results) => print!("{}", results),
        Err(e) => {
            log::error!("Evaluation failed: {}", e);
            std::process::exit(1);
        }
    }
}
