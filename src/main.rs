use anyhow::Result;
use askdb::agent_prompts::EXAMPLE_REQUESTS;
use askdb::config::{ConfigArgs, DEFAULT_SAMPLE_ROWS};
use askdb::pipeline::{Pipeline, PipelineResponse};
use askdb::schema::introspect_file;
use askdb::telemetry::init_tracing;
use clap::{Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

#[derive(Parser)]
#[command(name = "askdb")]
#[command(about = "Ask a relational database questions in plain language")]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,

    /// More log output (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer one question
    Ask {
        question: String,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Read questions from stdin, one per line
    Repl {
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
    /// Print the schema document sent to the model
    Schema,
    /// Print sample questions
    Examples,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
    Table,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.verbose);

    match args.command {
        Command::Examples => {
            for example in EXAMPLE_REQUESTS {
                println!("{}", example);
            }
            return Ok(());
        }
        // Local only: no oracle, so no API key needed
        Command::Schema => {
            let schema = introspect_file(&args.config.database, DEFAULT_SAMPLE_ROWS)?;
            println!("{}", serde_json::to_string_pretty(&schema)?);
            return Ok(());
        }
        _ => {}
    }

    let config = args.config.into_config()?;
    info!("askdb starting against {}", config.database.display());
    let pipeline = Pipeline::from_config(config)?;

    match args.command {
        Command::Ask { question, format } => {
            let response = pipeline.ask(&question).await;
            print_response(&response, format)?;
        }
        Command::Repl { format } => {
            eprintln!("Ask a question about the data (Ctrl-D to quit).");
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Some(line) = lines.next_line().await? {
                if line.trim().is_empty() {
                    continue;
                }
                let response = pipeline.ask(&line).await;
                print_response(&response, format)?;
                println!();
            }
        }
        Command::Schema | Command::Examples => {}
    }

    Ok(())
}

fn print_response(response: &PipelineResponse, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(response)?);
        }
        OutputFormat::Csv => {
            eprintln!("{}", response.summary);
            response.result.write_csv(std::io::stdout())?;
        }
        OutputFormat::Table => {
            println!("{}\n", response.summary);
            if let Some(sql) = &response.sql {
                println!("SQL: {}\n", sql);
            }
            println!("{}", response.result.to_table());
        }
    }
    Ok(())
}
