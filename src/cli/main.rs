use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use ems_risk::analytics::{
    analyze_risk_by_location, compute_kpis, write_delays_csv, write_location_csv,
};
use ems_risk::ingest::IncidentLoader;
use ems_risk::ml::extract_label;
use ems_risk::pipeline::names;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "ems-risk-cli")]
#[command(about = "EMS risk-scoring utilities", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a risk label from summary text (reads stdin when no text is given)
    Label {
        #[arg(value_name = "TEXT")]
        text: Option<String>,
    },

    /// Summarize HIGH-risk incidents by city and county
    Locations {
        /// Labeled incident file, or a run directory containing test_set.csv
        #[arg(short, long)]
        input: PathBuf,

        /// Directory for the CSV summaries
        #[arg(short, long, default_value = "outputs/location")]
        output: PathBuf,
    },

    /// Compute operational-efficiency KPIs over an incident file
    Kpis {
        #[arg(short, long)]
        input: PathBuf,

        /// Write JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn resolve_input(input: &Path) -> PathBuf {
    if input.is_dir() {
        input.join(names::TEST_SET)
    } else {
        input.to_path_buf()
    }
}

fn create_csv(dir: &Path, name: &str) -> anyhow::Result<BufWriter<File>> {
    let path = dir.join(name);
    let file = File::create(&path).with_context(|| format!("cannot create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Label { text } => {
            let text = match text {
                Some(text) => text,
                None => {
                    let mut buffer = String::new();
                    io::stdin()
                        .read_to_string(&mut buffer)
                        .context("failed to read stdin")?;
                    buffer
                }
            };
            println!("{}", extract_label(&text));
        }

        Commands::Locations { input, output } => {
            let path = resolve_input(&input);
            let (incidents, _) = IncidentLoader::new()
                .load(&path)
                .with_context(|| format!("failed to load {}", path.display()))?;
            if incidents.iter().all(|i| i.risk_label().is_none()) {
                bail!("{} has no risk_label values", path.display());
            }

            let summary = analyze_risk_by_location(&incidents);
            fs::create_dir_all(&output)
                .with_context(|| format!("cannot create {}", output.display()))?;

            let mut writer = create_csv(&output, "high_risk_by_city.csv")?;
            write_location_csv(&mut writer, "City", &summary.by_city)?;
            writer.flush()?;

            let mut writer = create_csv(&output, "high_risk_by_county.csv")?;
            write_location_csv(&mut writer, "County", &summary.by_county)?;
            writer.flush()?;

            let mut writer = create_csv(&output, "high_risk_delays_by_city.csv")?;
            write_delays_csv(&mut writer, &summary.delays_by_city)?;
            writer.flush()?;

            println!("Total cases: {}", summary.total_cases);
            println!(
                "HIGH-risk cases: {} ({:.1}%)",
                summary.high_risk_cases,
                summary.high_risk_percentage()
            );
            println!("Saved location summaries to {}", output.display());
        }

        Commands::Kpis { input, output } => {
            let (incidents, stats) = IncidentLoader::new()
                .load(&input)
                .with_context(|| format!("failed to load {}", input.display()))?;
            let kpis = compute_kpis(&incidents);
            let json = serde_json::to_string_pretty(&kpis)?;

            match output {
                Some(path) => {
                    fs::write(&path, &json)
                        .with_context(|| format!("cannot write {}", path.display()))?;
                    println!("Saved KPIs for {} incidents to {}", stats.rows, path.display());
                }
                None => println!("{}", json),
            }
        }
    }

    Ok(())
}
