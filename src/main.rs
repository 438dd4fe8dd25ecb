use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use image::ImageReader;
use time::Date;
use time::macros::format_description;
use tracing_subscriber::EnvFilter;

use tumorscan::analysis::{AnalysisConfig, AnalysisOutcome, Analyzer};
use tumorscan::core::db::{DEFAULT_DB_FILE, RecordRepository, RecordStore};
use tumorscan::detection::model::DEFAULT_MODEL_PATH;
use tumorscan::detection::steps::Enhancement;
use tumorscan::detection::{DetectorConfig, RtenDetector};
use tumorscan::history::{ClearRequest, HistoryFilter, HistoryStats};
use tumorscan::measure::Annotator;
use tumorscan::report::email::{self, DEFAULT_SMTP_HOST};
use tumorscan::report::{EmailConfig, EmailNotifier, ReportData, assemble_pdf};
use tumorscan::{Gender, PatientInfo, Pipeline, Severity};

#[derive(Parser)]
#[command(name = "tumorscan")]
#[command(about = "Detect brain tumors in MRI scans and keep a history of reports")]
struct Cli {
    /// Record store file
    #[arg(long, global = true, value_name = "FILE", default_value = DEFAULT_DB_FILE)]
    db: PathBuf,

    /// More log output (-v info, -vv debug). RUST_LOG takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run tumor detection on a scan, store the result and send the report
    Detect(DetectArgs),
    /// Apply image enhancement filters to a scan
    Enhance(EnhanceArgs),
    /// Inspect or clear past detections
    #[command(subcommand)]
    History(HistoryCommand),
}

#[derive(Args)]
struct DetectArgs {
    /// Path to input image file
    #[arg(value_name = "IMAGE")]
    image_path: PathBuf,

    #[arg(long)]
    name: String,

    #[arg(long)]
    age: i64,

    /// Male, Female or Other
    #[arg(long)]
    gender: Gender,

    /// Recipient of the report
    #[arg(long)]
    email: String,

    /// Also write the annotated image and PDF here
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    #[arg(long, value_name = "FILE", default_value = DEFAULT_MODEL_PATH)]
    model: PathBuf,

    #[arg(long, default_value_t = 0.25)]
    confidence: f32,

    #[arg(long, default_value_t = 0.45)]
    iou: f32,

    #[arg(long, default_value_t = 640)]
    input_size: u32,

    /// Seconds to wait for the detector
    #[arg(long, default_value_t = 120)]
    detector_timeout: u64,

    /// TTF/OTF font for the area labels (boxes only without it)
    #[arg(long, value_name = "FILE")]
    font: Option<PathBuf>,

    #[arg(long, env = "EMAIL_ADDRESS", hide_env_values = true)]
    sender: Option<String>,

    #[arg(long, env = "EMAIL_PASSWORD", hide_env_values = true)]
    sender_password: Option<String>,

    #[arg(long, env = "SMTP_HOST", default_value = DEFAULT_SMTP_HOST)]
    smtp_host: String,
}

#[derive(Args)]
struct EnhanceArgs {
    #[arg(value_name = "IMAGE")]
    image_path: PathBuf,

    /// Filters to apply in order
    #[arg(long = "filter", value_enum, required = true)]
    filters: Vec<Enhancement>,

    /// Where to write the result
    #[arg(long, value_name = "PNG")]
    out: PathBuf,

    /// Save debug outputs to directory (must be empty)
    #[arg(long, value_name = "DIR")]
    debug_out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum HistoryCommand {
    /// List stored detections, newest first
    List {
        /// First day to include (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        from: Option<Date>,

        /// Last day to include (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        to: Option<Date>,

        #[arg(long)]
        severity: Option<Severity>,

        /// Patient name contains
        #[arg(long)]
        name: Option<String>,

        /// Print summary statistics instead of rows
        #[arg(long)]
        stats: bool,
    },
    /// Delete every stored detection
    Clear {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Write a stored detection's image and a fresh PDF report
    Export {
        id: i64,

        #[arg(long, value_name = "DIR")]
        out_dir: PathBuf,
    },
}

fn parse_date(value: &str) -> Result<Date, String> {
    Date::parse(value, format_description!("[year]-[month]-[day]"))
        .map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,tumorscan={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Detect(args) => detect(&cli.db, args).await,
        Command::Enhance(args) => enhance(args),
        Command::History(cmd) => history(&cli.db, cmd).await,
    }
}

async fn detect(db: &Path, args: DetectArgs) -> anyhow::Result<()> {
    let patient = PatientInfo::new(&args.name, args.age, args.gender)?;

    let img = ImageReader::open(&args.image_path)
        .with_context(|| format!("Failed to open {}", args.image_path.display()))?
        .decode()
        .map_err(|e| anyhow::anyhow!("Failed to decode image: {}", e))?;
    tracing::info!(width = img.width(), height = img.height(), "image loaded");

    let detector = RtenDetector::load(
        &args.model,
        DetectorConfig {
            input_size: args.input_size,
            confidence_threshold: args.confidence,
            iou_threshold: args.iou,
        },
    )?;
    let annotator = match &args.font {
        Some(path) => Annotator::from_font_file(path)?,
        None => Annotator::boxes_only(),
    };
    let notifier = EmailNotifier::new(EmailConfig {
        sender_address: args.sender.filter(|s| !s.is_empty()),
        sender_password: args.sender_password.filter(|s| !s.is_empty()),
        smtp_host: args.smtp_host,
    });
    let store = RecordStore::open(db).await?;

    let analyzer = Analyzer::new(Arc::new(detector), store, Arc::new(notifier))
        .with_annotator(annotator)
        .with_config(AnalysisConfig {
            detector_timeout: Duration::from_secs(args.detector_timeout),
        });

    match analyzer.analyze(&img, &patient, &args.email).await? {
        AnalysisOutcome::NoTumorDetected { annotated } => {
            println!("No tumor detected.");
            if let Some(dir) = &args.out_dir {
                std::fs::create_dir_all(dir)?;
                let path = dir.join(format!(
                    "tumor_detection_{}.png",
                    email::safe_file_stem(&patient.name)
                ));
                annotated.save(&path)?;
                println!("Processed image: {}", path.display());
            }
        }
        AnalysisOutcome::Detected(result) => {
            let assessment = &result.assessment;
            println!("\n=== Brain Tumor Detection Results ===");
            println!("Record ID: {}", result.record_id);
            println!("Tumors detected: {}", assessment.tumor_count());
            for line in result.report.measurement_lines() {
                println!("  {}", line);
            }
            println!("Largest: {:.2} px, average: {:.2} px", assessment.largest(), assessment.average());
            println!(
                "Tumor area: {:.2}% of image - {}",
                assessment.percentage(),
                assessment.severity()
            );
            println!("Recommendation: {}", assessment.recommendation());
            println!("Email: {}", result.notification.message);

            if let Some(dir) = &args.out_dir {
                write_report_files(dir, &result.report, &result.annotated_png, &result.pdf)?;
            }
        }
    }

    Ok(())
}

fn enhance(args: EnhanceArgs) -> anyhow::Result<()> {
    let img = ImageReader::open(&args.image_path)
        .with_context(|| format!("Failed to open {}", args.image_path.display()))?
        .decode()
        .map_err(|e| anyhow::anyhow!("Failed to decode image: {}", e))?;

    let mut pipeline = Pipeline::new();
    if let Some(dir) = args.debug_out {
        pipeline = pipeline.with_debug(dir)?;
    }
    for filter in &args.filters {
        pipeline = pipeline.add_step(filter.step());
    }

    let result = pipeline.run(img)?;
    result
        .image
        .save(&args.out)
        .map_err(|e| anyhow::anyhow!("Failed to save {}: {}", args.out.display(), e))?;
    println!("Applied {} -> {}", pipeline.step_names().join(", "), args.out.display());
    Ok(())
}

async fn history(db: &Path, cmd: HistoryCommand) -> anyhow::Result<()> {
    let store = RecordStore::open(db).await?;

    match cmd {
        HistoryCommand::List {
            from,
            to,
            severity,
            name,
            stats,
        } => {
            let records = store.list_all().await?;
            let filter = HistoryFilter {
                from,
                to,
                severity,
                name_contains: name,
            };
            let selected = filter.apply(&records);

            if stats {
                let stats = HistoryStats::compute(selected.iter().copied());
                println!("Total records: {}", stats.total);
                println!("Average tumors per scan: {:.2}", stats.average_tumor_count);
                println!("High severity cases: {}", stats.high_severity);
                for (severity, count) in &stats.by_severity {
                    println!("  {}: {}", severity, count);
                }
                for (month, count) in &stats.by_month {
                    println!("  {}: {}", month, count);
                }
                return Ok(());
            }

            if selected.is_empty() {
                println!("No detection history available.");
                return Ok(());
            }
            for record in selected {
                let data = ReportData::from(record);
                println!(
                    "#{:<5} {:<20} {:<4} {:<7} {:<20} tumors: {:<3} {}",
                    record.id,
                    data.patient_name,
                    data.age_text(),
                    data.gender_text(),
                    data.date_text(),
                    data.tumor_count(),
                    data.severity_text(),
                );
            }
        }
        HistoryCommand::Clear { yes } => {
            let request = ClearRequest::new();
            if !yes {
                println!("{}", ClearRequest::WARNING);
                println!("Re-run with --yes to delete all records.");
                request.cancel();
                return Ok(());
            }
            let deleted = request.confirm(&store).await?;
            println!("Deleted {} records.", deleted);
        }
        HistoryCommand::Export { id, out_dir } => {
            let record = store
                .find(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("No detection record with id {}", id))?;
            let data = ReportData::from(&record);
            let png = record.processed_image.as_deref();
            let pdf = assemble_pdf(&data, png)?;
            write_report_files(&out_dir, &data, png.unwrap_or_default(), &pdf)?;
        }
    }

    Ok(())
}

fn write_report_files(dir: &Path, data: &ReportData, png: &[u8], pdf: &[u8]) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    if !png.is_empty() {
        let path = dir.join(email::image_attachment_name(data));
        std::fs::write(&path, png)?;
        println!("Processed image: {}", path.display());
    }
    let path = dir.join(email::pdf_attachment_name(data));
    std::fs::write(&path, pdf)?;
    println!("PDF report: {}", path.display());
    Ok(())
}
