use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use restage_contracts::catalog::{CheckCatalog, DesignStyle, RoomType};
use restage_engine::services::{
    DryrunFidelityChecker, DryrunTransformService, FidelityChecker, GeminiClient,
    GeminiFidelityChecker, GeminiTransformService, GenerativeTransformService, ImageStore,
    LocalImageStore,
};
use restage_engine::{
    CancellationToken, ImageInput, Pipeline, PipelineConfig, PipelineRequest, PipelineResult,
};
use serde_json::{json, Map, Value};

#[derive(Debug, Parser)]
#[command(
    name = "restage",
    version,
    about = "Quality-gated generative room restaging"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Restage one photo and keep the best verified candidate.
    Run(RunArgs),
    /// List supported room types.
    Rooms,
    /// List design style presets.
    Styles,
    /// Show the ordered fidelity checks for one or every room type.
    Checks(ChecksArgs),
}

#[derive(Debug, Parser)]
struct RunArgs {
    /// Local path or http(s) URL of the room photo.
    #[arg(long)]
    image: String,
    #[arg(long)]
    room: String,
    #[arg(long)]
    style: String,
    #[arg(long)]
    max_attempts: Option<u32>,
    /// Run artifacts go to `<out>/runs/<run_id>/`, the best image to `<out>/best/`.
    #[arg(long)]
    out: PathBuf,
    #[arg(long, default_value = "gemini")]
    provider: String,
    /// Dryrun only: check names the offline checker should reject.
    #[arg(long = "reject")]
    reject: Vec<String>,
    #[arg(long)]
    deadline_secs: Option<u64>,
    /// Print the run summary as JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
struct ChecksArgs {
    #[arg(long)]
    room: Option<String>,
}

const EXIT_WARNING: i32 = 2;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("restage error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run_restage(args),
        Command::Rooms => {
            for room in RoomType::ALL {
                println!("{room}\t{}", room.template().room_label);
            }
            Ok(0)
        }
        Command::Styles => {
            for style in DesignStyle::ALL {
                println!("{style}\t{}\t{}", style.display_name(), style.description());
            }
            Ok(0)
        }
        Command::Checks(args) => {
            print!("{}", render_checks(&CheckCatalog::default(), args.room.as_deref())?);
            Ok(0)
        }
    }
}

fn run_restage(args: RunArgs) -> Result<i32> {
    let room_type = parse_room(&args.room)?;
    let design_style = args
        .style
        .parse::<DesignStyle>()
        .map_err(anyhow::Error::msg)?;

    let config = PipelineConfig::from_env();
    let max_attempts = resolve_max_attempts(args.max_attempts, &config);
    let (transform, checker) = build_services(&args.provider, &args.reject, &config)?;

    let pipeline =
        Pipeline::new(transform, checker, config).with_runs_root(args.out.join("runs"));
    let request = PipelineRequest::new(ImageInput::parse(&args.image), room_type, design_style)
        .with_max_attempts(max_attempts);
    let cancel = match args.deadline_secs {
        Some(secs) => CancellationToken::with_timeout(Duration::from_secs(secs)),
        None => CancellationToken::new(),
    };
    let result = pipeline.run(&request, &cancel)?;
    for issue in &result.artifact_issues {
        eprintln!("restage warning: run artifact not written: {issue}");
    }

    let best_url = store_best(&LocalImageStore::new(args.out.join("best")), &result)?;
    if args.json {
        println!("{}", render_json(&result, best_url.as_deref())?);
    } else {
        print!("{}", render_result(&result, best_url.as_deref()));
    }

    if result.warning {
        eprintln!(
            "restage warning: no attempt passed every check; returning attempt {}",
            result.best_attempt.attempt_number
        );
        return Ok(EXIT_WARNING);
    }
    Ok(0)
}

/// An explicit `--max-attempts` is passed through untouched, so 0 is
/// rejected by the pipeline rather than silently raised.
fn resolve_max_attempts(flag: Option<u32>, config: &PipelineConfig) -> u32 {
    flag.unwrap_or(config.max_attempts)
}

fn parse_room(raw: &str) -> Result<RoomType> {
    raw.parse::<RoomType>().map_err(anyhow::Error::msg)
}

fn build_services(
    provider: &str,
    reject: &[String],
    config: &PipelineConfig,
) -> Result<(Box<dyn GenerativeTransformService>, Box<dyn FidelityChecker>)> {
    match provider.trim().to_ascii_lowercase().as_str() {
        "gemini" => {
            let client = GeminiClient::from_env(config)
                .context("gemini provider needs an API key (or use --provider dryrun)")?;
            Ok((
                Box::new(GeminiTransformService::new(
                    client.clone(),
                    config.transform_model.clone(),
                )),
                Box::new(GeminiFidelityChecker::new(
                    client,
                    config.checker_model.clone(),
                )),
            ))
        }
        "dryrun" => {
            let rejected = reject.iter().map(String::as_str).collect::<Vec<_>>();
            Ok((
                Box::new(DryrunTransformService),
                Box::new(DryrunFidelityChecker::rejecting(&rejected)),
            ))
        }
        other => anyhow::bail!("unknown provider '{other}' (expected gemini or dryrun)"),
    }
}

fn store_best(store: &dyn ImageStore, result: &PipelineResult) -> Result<Option<String>> {
    let Some(image) = result.best_attempt.edited_image.as_ref() else {
        return Ok(None);
    };
    let mut metadata = Map::new();
    metadata.insert("run_id".to_string(), json!(result.run_id));
    metadata.insert("room_type".to_string(), json!(result.room_type));
    metadata.insert("design_style".to_string(), json!(result.design_style));
    metadata.insert(
        "attempt_number".to_string(),
        json!(result.best_attempt.attempt_number),
    );
    metadata.insert("score".to_string(), json!(result.best_attempt.score));
    metadata.insert("total_checks".to_string(), json!(result.total_checks));
    metadata.insert(
        "fully_passed".to_string(),
        json!(result.best_attempt.fully_passed),
    );
    metadata.insert(
        "layout_description".to_string(),
        json!(result.best_attempt.layout_description),
    );
    let url = store
        .store(image, &metadata)
        .context("failed to store best image")?;
    Ok(Some(url))
}

fn render_result(result: &PipelineResult, best_url: Option<&str>) -> String {
    let mut out = format!(
        "Run {} ({} / {}): {} attempt(s), stopped: {}\n",
        result.run_id,
        result.room_type,
        result.design_style,
        result.total_attempts_made,
        result.stop_reason.as_str()
    );
    for attempt in &result.all_attempts {
        let detail = match (attempt.error.as_deref(), attempt.failed_check()) {
            (Some(error), _) => format!("error: {error}"),
            (None, Some(failed)) => format!(
                "failed '{}': {}",
                failed.name,
                failed.justification.as_deref().unwrap_or(&failed.outcome_label)
            ),
            (None, None) if attempt.fully_passed => "passed".to_string(),
            (None, None) => "stopped early".to_string(),
        };
        out.push_str(&format!(
            "  attempt {}: {}/{} {}\n",
            attempt.attempt_number, attempt.score, result.total_checks, detail
        ));
    }
    out.push_str(&format!(
        "Best: attempt {} with {}/{} checks ({:.0}%)\n",
        result.best_attempt.attempt_number,
        result.best_attempt.score,
        result.total_checks,
        result.to_run_summary().score_pct()
    ));
    if let Some(url) = best_url {
        out.push_str(&format!("Best image: {url}\n"));
    }
    out
}

fn render_json(result: &PipelineResult, best_url: Option<&str>) -> Result<String> {
    let mut extra = Map::new();
    extra.insert("best_image".to_string(), json!(best_url));
    extra.insert("artifact_issues".to_string(), json!(result.artifact_issues));
    let payload = result.to_run_summary().to_json(Some(&extra))?;
    Ok(serde_json::to_string_pretty(&Value::Object(payload))?)
}

fn render_checks(catalog: &CheckCatalog, room: Option<&str>) -> Result<String> {
    let rooms = match room {
        Some(raw) => vec![parse_room(raw)?],
        None => catalog.rooms().copied().collect(),
    };
    let mut out = String::new();
    for room in rooms {
        let Some(checks) = catalog.for_room(room) else {
            anyhow::bail!("no fidelity checks configured for {room}");
        };
        out.push_str(&format!("{room}:\n"));
        for check in checks {
            out.push_str(&format!(
                "  {}. {} [{} / {}]\n",
                check.id, check.name, check.positive_label, check.negative_label
            ));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use clap::Parser;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use restage_contracts::catalog::{CheckCatalog, DesignStyle, RoomType};
    use restage_engine::services::{DryrunFidelityChecker, DryrunTransformService, LocalImageStore};
    use restage_engine::{
        CancellationToken, ImageInput, Pipeline, PipelineConfig, PipelineError, PipelineRequest,
    };
    use serde_json::{json, Value};

    use super::{
        build_services, render_checks, render_json, render_result, resolve_max_attempts,
        store_best, Cli, Command,
    };

    fn photo_bytes() -> anyhow::Result<Vec<u8>> {
        let photo = RgbImage::from_pixel(40, 30, Rgb([120, 110, 100]));
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(photo).write_to(&mut bytes, ImageFormat::Png)?;
        Ok(bytes.into_inner())
    }

    #[test]
    fn run_arguments_parse_with_repeatable_rejects() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "restage",
            "run",
            "--image",
            "room.jpg",
            "--room",
            "living-room",
            "--style",
            "japandi",
            "--out",
            "/tmp/out",
            "--provider",
            "dryrun",
            "--reject",
            "Camera pose",
            "--reject",
            "Wall lengths",
        ])?;
        let Command::Run(args) = cli.command else {
            anyhow::bail!("expected run subcommand");
        };
        assert_eq!(args.reject.len(), 2);
        assert_eq!(args.provider, "dryrun");
        assert!(args.max_attempts.is_none());
        Ok(())
    }

    #[test]
    fn checks_listing_follows_catalog_order() -> anyhow::Result<()> {
        let rendered = render_checks(&CheckCatalog::default(), Some("kitchen"))?;
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "kitchen:");
        assert_eq!(lines.len(), 8);
        assert!(lines[1].starts_with("  1. Wall lengths"));
        assert!(lines[7].starts_with("  7. Plumbing and appliances"));
        assert!(render_checks(&CheckCatalog::default(), Some("garage")).is_err());
        Ok(())
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert!(build_services("dalle", &[], &PipelineConfig::default()).is_err());
        assert!(build_services("DryRun", &[], &PipelineConfig::default()).is_ok());
    }

    #[test]
    fn best_image_is_stored_and_reported() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let pipeline = Pipeline::new(
            Box::new(DryrunTransformService),
            Box::new(DryrunFidelityChecker::rejecting(&["Circulation clearance"])),
            PipelineConfig::default(),
        );
        let request = PipelineRequest::new(
            ImageInput::Bytes(photo_bytes()?),
            RoomType::KidsBedroom,
            DesignStyle::Coastal,
        )
        .with_max_attempts(1);
        let result = pipeline.run(&request, &CancellationToken::new())?;
        assert!(result.warning);

        let url = store_best(&LocalImageStore::new(temp.path()), &result)?;
        let rendered = render_result(&result, url.as_deref());
        assert!(rendered.contains("attempt 1: 3/5 failed 'Circulation clearance'"));
        assert!(rendered.contains("Best: attempt 1 with 3/5 checks (60%)"));
        assert!(rendered.contains("Best image: file://"));

        let parsed: Value = serde_json::from_str(&render_json(&result, url.as_deref())?)?;
        assert_eq!(parsed["score_pct"], json!(60.0));
        assert_eq!(parsed["best_image"], json!(url));
        assert_eq!(parsed["best_attempt_number"], json!(1));
        Ok(())
    }

    #[test]
    fn explicit_zero_max_attempts_reaches_the_pipeline() -> anyhow::Result<()> {
        let config = PipelineConfig::default();
        assert_eq!(resolve_max_attempts(None, &config), config.max_attempts);
        assert_eq!(resolve_max_attempts(Some(0), &config), 0);

        let pipeline = Pipeline::new(
            Box::new(DryrunTransformService),
            Box::new(DryrunFidelityChecker::rejecting(&[])),
            config.clone(),
        );
        let request = PipelineRequest::new(
            ImageInput::Bytes(photo_bytes()?),
            RoomType::Bedroom,
            DesignStyle::Japandi,
        )
        .with_max_attempts(resolve_max_attempts(Some(0), &config));
        assert!(matches!(
            pipeline.run(&request, &CancellationToken::new()),
            Err(PipelineError::Configuration(_))
        ));
        Ok(())
    }
}
