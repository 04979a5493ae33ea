//! markgrid CLI: grade bubble answer sheets from the command line.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use markgrid::debug_dump::ImageDebug;
use markgrid::render::parse_marks;
use markgrid::{
    render_sheet, DebugDump, DetectionStrategy, OmrConfig, OmrEngine, Outcome, PixelBuffer,
    ReconstructionMode, SheetLayout, TemplateRegistry, WeakMarkPolicy,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "markgrid")]
#[command(about = "Grade bubble answer sheets (optical mark recognition)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade a scanned or photographed sheet against an answer key.
    Grade(CliGradeArgs),

    /// List available templates.
    Templates {
        /// Extra templates (markgrid.templates.v1 JSON).
        #[arg(long)]
        templates: Option<PathBuf>,
    },

    /// Render a synthetic answer sheet.
    Render(CliRenderArgs),
}

#[derive(Debug, Clone, Args)]
struct CliGradeArgs {
    /// Path to the sheet image.
    #[arg(long)]
    image: PathBuf,

    /// Answer key as comma-separated labels, e.g. "A,B,C,D".
    #[arg(long, conflicts_with = "key_file", required_unless_present = "key_file")]
    key: Option<String>,

    /// Answer key as a JSON array of labels.
    #[arg(long)]
    key_file: Option<PathBuf>,

    /// Template id.
    #[arg(long, default_value = "standard_25")]
    template: String,

    /// Student identifier echoed in the result.
    #[arg(long)]
    student_id: Option<String>,

    /// Write the result JSON here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Path to write a versioned debug dump (JSON).
    #[arg(long)]
    debug_json: Option<PathBuf>,

    /// Engine configuration (JSON, partial documents allowed).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Extra templates (markgrid.templates.v1 JSON).
    #[arg(long)]
    templates: Option<PathBuf>,

    #[command(flatten)]
    overrides: CliOverrides,
}

#[derive(Debug, Clone, Default, Args)]
struct CliOverrides {
    /// Fill ratio above which a bubble counts as marked.
    #[arg(long)]
    mark_fill: Option<f32>,

    /// Fill ratio above which a lone maximum counts as a weak mark.
    #[arg(long)]
    weak_fill: Option<f32>,

    /// When weak marks are accepted.
    #[arg(long, value_enum)]
    weak_policy: Option<WeakPolicyArg>,

    /// Candidate detection strategy.
    #[arg(long, value_enum)]
    strategy: Option<StrategyArg>,

    /// Grid reconstruction mode.
    #[arg(long, value_enum)]
    reconstruction: Option<ReconstructionArg>,

    /// Drop overlapping fallback candidates.
    #[arg(long)]
    merge_overlaps: bool,

    /// Minimum distance between circle centers (px).
    #[arg(long)]
    min_center_distance: Option<f32>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WeakPolicyArg {
    Never,
    DegradedOnly,
    Always,
}

impl WeakPolicyArg {
    fn to_core(self) -> WeakMarkPolicy {
        match self {
            Self::Never => WeakMarkPolicy::Never,
            Self::DegradedOnly => WeakMarkPolicy::DegradedOnly,
            Self::Always => WeakMarkPolicy::Always,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum StrategyArg {
    CircleOnly,
    CircleWithFallback,
}

impl StrategyArg {
    fn to_core(self) -> DetectionStrategy {
        match self {
            Self::CircleOnly => DetectionStrategy::CircleOnly,
            Self::CircleWithFallback => DetectionStrategy::CircleWithContourFallback,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReconstructionArg {
    Auto,
    Banded,
}

impl ReconstructionArg {
    fn to_core(self) -> ReconstructionMode {
        match self {
            Self::Auto => ReconstructionMode::Auto,
            Self::Banded => ReconstructionMode::Banded,
        }
    }
}

impl CliOverrides {
    fn apply(&self, config: &mut OmrConfig) {
        if let Some(v) = self.mark_fill {
            config.thresholds.mark_fill = v;
        }
        if let Some(v) = self.weak_fill {
            config.thresholds.weak_mark_fill = v;
        }
        if let Some(v) = self.weak_policy {
            config.thresholds.weak_mark_policy = v.to_core();
        }
        if let Some(v) = self.strategy {
            config.detection.strategy = v.to_core();
        }
        if let Some(v) = self.reconstruction {
            config.reconstruction.mode = v.to_core();
        }
        if self.merge_overlaps {
            config.detection.merge_overlaps = true;
        }
        if let Some(v) = self.min_center_distance {
            config.detection.circle.min_center_distance_px = v;
        }
    }
}

#[derive(Debug, Clone, Args)]
struct CliRenderArgs {
    /// Template id.
    #[arg(long, default_value = "standard_25")]
    template: String,

    /// Output image path (format from extension).
    #[arg(long)]
    out: PathBuf,

    /// Marks per question, comma-separated; "A+C" marks two choices, "" none.
    #[arg(long)]
    answers: Option<String>,

    /// Page width (px).
    #[arg(long)]
    width: Option<u32>,

    /// Page height (px).
    #[arg(long)]
    height: Option<u32>,

    /// Extra templates (markgrid.templates.v1 JSON).
    #[arg(long)]
    templates: Option<PathBuf>,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Grade(args) => run_grade(&args),
        Commands::Templates { templates } => run_templates(templates.as_deref()),
        Commands::Render(args) => run_render(&args),
    }
}

fn load_registry(extra: Option<&Path>) -> CliResult<TemplateRegistry> {
    let mut registry = TemplateRegistry::builtin();
    if let Some(path) = extra {
        let added = registry.extend_from_json_file(path)?;
        tracing::info!("Loaded {} templates from {}", added, path.display());
    }
    Ok(registry)
}

fn parse_key(raw: &str) -> Vec<String> {
    raw.split(',').map(|s| s.trim().to_string()).collect()
}

fn load_key(args: &CliGradeArgs) -> CliResult<Vec<String>> {
    match (&args.key, &args.key_file) {
        (Some(raw), _) => Ok(parse_key(raw)),
        (None, Some(path)) => {
            let data = std::fs::read_to_string(path)?;
            let key: Vec<String> = serde_json::from_str(&data).map_err(|e| -> CliError {
                format!("invalid key file {}: {}", path.display(), e).into()
            })?;
            Ok(key)
        }
        (None, None) => Err("an answer key is required (--key or --key-file)".into()),
    }
}

// ── grade ──────────────────────────────────────────────────────────────

fn run_grade(args: &CliGradeArgs) -> CliResult<()> {
    let registry = load_registry(args.templates.as_deref())?;
    let mut config = match &args.config {
        Some(path) => OmrConfig::from_json_file(path)?,
        None => OmrConfig::default(),
    };
    args.overrides.apply(&mut config);
    let key = load_key(args)?;

    tracing::info!("Loading image: {}", args.image.display());
    let img = image::open(&args.image).map_err(|e| -> CliError {
        format!("Failed to open image {}: {}", args.image.display(), e).into()
    })?;
    let rgb = img.to_rgb8();
    let (w, h) = rgb.dimensions();
    tracing::info!("Image size: {}x{}", w, h);

    let engine = OmrEngine::with_registry(registry, config);
    let (outcome, analysis) = engine.process_with_analysis(
        PixelBuffer::from(&rgb),
        &key,
        &args.template,
        args.student_id.as_deref(),
    );

    let json = serde_json::to_string_pretty(&outcome)?;
    match &args.out {
        Some(path) => {
            std::fs::write(path, &json)?;
            tracing::info!("Result written to {}", path.display());
        }
        None => println!("{json}"),
    }

    if let Some(debug_path) = &args.debug_json {
        match engine.registry().get(&args.template) {
            Some(template) => {
                let image = ImageDebug {
                    path: Some(args.image.display().to_string()),
                    width: w,
                    height: h,
                };
                let dump =
                    DebugDump::new(image, template, engine.config(), analysis, outcome.clone());
                dump.write_json_file(debug_path)?;
                tracing::info!("Debug dump written to {}", debug_path.display());
            }
            None => tracing::warn!("No debug dump: unknown template {}", args.template),
        }
    }

    match outcome {
        Outcome::Success(r) => {
            tracing::info!(
                "Score {}/{} ({:.1}%)",
                r.score,
                r.total_questions,
                r.percentage
            );
            Ok(())
        }
        Outcome::Failure(e) => Err(format!("{:?}: {}", e.error_code, e.error).into()),
    }
}

// ── templates ──────────────────────────────────────────────────────────

fn run_templates(extra: Option<&Path>) -> CliResult<()> {
    let registry = load_registry(extra)?;
    for t in registry.iter() {
        println!("{}", t.id);
        if !t.name.is_empty() {
            println!("  name:         {}", t.name);
        }
        if !t.description.is_empty() {
            println!("  description:  {}", t.description);
        }
        println!("  questions:    {}", t.question_count);
        println!("  choices:      {}", t.choice_labels.join(" "));
        println!(
            "  radius:       {}-{} px",
            t.bubble_radius_min, t.bubble_radius_max
        );
        println!("  per row:      {} ({:?})", t.choices_per_row, t.layout_tag);
    }
    Ok(())
}

// ── render ─────────────────────────────────────────────────────────────

fn run_render(args: &CliRenderArgs) -> CliResult<()> {
    let registry = load_registry(args.templates.as_deref())?;
    let template = registry
        .get(&args.template)
        .ok_or_else(|| -> CliError { format!("unknown template '{}'", args.template).into() })?;

    let mut layout = SheetLayout::for_template(template);
    if args.width.is_some() || args.height.is_some() {
        layout = SheetLayout::with_size(
            template,
            args.width.unwrap_or(layout.width),
            args.height.unwrap_or(layout.height),
        );
    }
    let marks = match &args.answers {
        Some(raw) => parse_marks(template, raw)?,
        None => Vec::new(),
    };

    let img = render_sheet(template, &layout, &marks);
    img.save(&args.out)?;
    tracing::info!(
        "Rendered {}x{} sheet (bubble radius {} px) to {}",
        layout.width,
        layout.height,
        layout.radius,
        args.out.display()
    );
    Ok(())
}
