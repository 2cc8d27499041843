//! CLI binary for billai.
//!
//! A thin shim over the library crate: `serve` runs the gateway, `analyze`
//! reads one bill photo and prints the figures, `normalize` shows what the
//! image normalizer would send.

use anyhow::{Context, Result};
use base64::Engine;
use billai::config::{API_KEY_ENV, DEFAULT_BIND, DEFAULT_MODEL};
use billai::{
    normalize_file, serve, to_csv, write_csv, write_csv_to, Analyzer, Backend, BillData,
    GatewayConfig, NormalizeOptions,
};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the gateway on port 3000
  GEMINI_API_KEY=... billai serve

  # Analyze a photo through a running gateway
  billai analyze bolletta.jpg --server http://localhost:3000

  # Analyze directly against Gemini, save the CSV report next to the photo
  GEMINI_API_KEY=... billai analyze bolletta.jpg --csv .

  # Extracted figures as JSON (fields the bill omits are filled with 0 or "")
  billai analyze bolletta.jpg --server http://localhost:3000 --json

  # Check what the normalizer does to a photo
  billai normalize bolletta.jpg -o bolletta_small.jpg

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY   Google Gemini API key (gateway side only)
  BILLAI_MODEL     Override the model ID
  BILLAI_BIND      Gateway listen address (default 0.0.0.0:3000)
  BILLAI_SERVER    Gateway URL used by `analyze`
  RUST_LOG         Fine-grained log filter, overrides -v / -q
"#;

/// Extract structured data from photos of Italian energy bills.
#[derive(Parser, Debug)]
#[command(
    name = "billai",
    version,
    about = "Extract structured data from photos of Italian energy bills",
    long_about = "Upload a photo of an Italian electricity or gas bill and get back unit \
costs, annual consumption by time band (F1/F2/F3), a monthly history and an annual spend \
estimate. Extraction is done by Google Gemini behind a small HTTP gateway.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "BILLAI_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "BILLAI_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the extraction gateway.
    Serve(ServeArgs),
    /// Analyze one bill photo.
    Analyze(AnalyzeArgs),
    /// Downscale and re-encode a photo the way `analyze` does.
    Normalize(NormalizeArgs),
}

#[derive(Args, Debug)]
struct ProviderArgs {
    /// Gemini API key.
    #[arg(long, env = API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// Model ID.
    #[arg(long, env = "BILLAI_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Model temperature (0.0–2.0).
    #[arg(long, env = "BILLAI_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Timeout for the model call in seconds. No timeout when unset.
    #[arg(long, env = "BILLAI_API_TIMEOUT")]
    api_timeout: Option<u64>,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[command(flatten)]
    provider: ProviderArgs,

    /// Listen address.
    #[arg(long, env = "BILLAI_BIND", default_value = DEFAULT_BIND)]
    bind: SocketAddr,

    /// Largest accepted request body, in bytes.
    #[arg(long, env = "BILLAI_BODY_LIMIT", default_value_t = 10 * 1024 * 1024)]
    body_limit: usize,
}

#[derive(Args, Debug)]
struct NormalizeFlags {
    /// Longest edge after downscaling, in pixels.
    #[arg(long, env = "BILLAI_MAX_DIMENSION", default_value_t = 1600)]
    max_dimension: u32,

    /// JPEG quality (1–100).
    #[arg(long, env = "BILLAI_JPEG_QUALITY", default_value_t = 80,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    jpeg_quality: u8,
}

impl NormalizeFlags {
    fn options(&self) -> NormalizeOptions {
        NormalizeOptions::default()
            .with_max_dimension(self.max_dimension)
            .with_jpeg_quality(self.jpeg_quality)
    }
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Photo of the bill (JPEG, PNG, WebP, …).
    image: PathBuf,

    /// Gateway URL. When unset the model is called directly with --api-key.
    #[arg(long, env = "BILLAI_SERVER")]
    server: Option<String>,

    #[command(flatten)]
    provider: ProviderArgs,

    #[command(flatten)]
    normalize: NormalizeFlags,

    /// Print the extracted figures as JSON instead of a summary. Optional
    /// fields the model left out appear with their defaults.
    #[arg(long)]
    json: bool,

    /// Write the CSV report. A directory gets the default file name;
    /// `-` prints it to stdout.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Disable the spinner.
    #[arg(long, env = "BILLAI_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct NormalizeArgs {
    /// Photo to normalize.
    image: PathBuf,

    /// Write the re-encoded image here. Prints the data URI when unset.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    normalize: NormalizeFlags,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // `serve` always logs at INFO so request lines are visible; the spinner
    // covers feedback for `analyze`.
    let spinner_active = matches!(
        cli.command,
        Command::Analyze(ref a) if !a.no_progress && !a.json
    );
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || spinner_active {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::Analyze(args) => run_analyze(args, cli.quiet).await,
        Command::Normalize(args) => run_normalize(args, cli.quiet).await,
    }
}

// ── serve ────────────────────────────────────────────────────────────────────

async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = gateway_config(&args.provider)?
        .bind(args.bind)
        .body_limit_bytes(args.body_limit)
        .build()
        .context("Invalid configuration")?;
    serve(config).await.context("Gateway failed")?;
    Ok(())
}

/// Map provider flags to a config builder; the caller adds the rest.
fn gateway_config(args: &ProviderArgs) -> Result<billai::GatewayConfigBuilder> {
    let api_key = args
        .api_key
        .clone()
        .filter(|k| !k.trim().is_empty())
        .with_context(|| format!("{API_KEY_ENV} is not set (or pass --api-key)"))?;

    let mut builder = GatewayConfig::builder()
        .api_key(api_key)
        .model(args.model.clone())
        .temperature(args.temperature);
    if let Some(secs) = args.api_timeout {
        builder = builder.api_timeout_secs(secs);
    }
    Ok(builder)
}

// ── analyze ──────────────────────────────────────────────────────────────────

async fn run_analyze(args: AnalyzeArgs, quiet: bool) -> Result<()> {
    let backend = match args.server {
        Some(ref url) => Backend::remote(url.clone()),
        None => {
            let config = gateway_config(&args.provider)?
                .build()
                .context("Invalid configuration")?;
            Backend::local(config).context("Could not set up the model provider")?
        }
    };
    let analyzer = Analyzer::new(backend, args.normalize.options());

    let spinner = (!quiet && !args.no_progress && !args.json).then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.set_prefix("Analyzing");
        bar.set_message(args.image.display().to_string());
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let start = Instant::now();
    let result = analyzer.analyze_file(&args.image).await;

    if let Some(bar) = spinner {
        bar.finish_and_clear();
    }

    let bill = match result {
        Ok(bill) => bill,
        Err(e) => {
            if !quiet {
                eprintln!("{} {}", red("✘"), red(billai::prompts::USER_ERROR_MESSAGE));
            }
            return Err(e).context("Analysis failed");
        }
    };

    if args.json {
        let json = serde_json::to_string_pretty(&*bill).context("Failed to serialise result")?;
        println!("{json}");
    } else {
        print_summary(&bill).context("Failed to write to stdout")?;
    }

    if let Some(ref target) = args.csv {
        export(&bill, target).await?;
    }

    if !quiet && !args.json {
        eprintln!(
            "{} {} bill from {}  {}",
            green("✔"),
            bill.commodity(),
            bold(&bill.fornitore),
            dim(&format!("{:.1}s", start.elapsed().as_secs_f64())),
        );
    }
    Ok(())
}

async fn export(bill: &BillData, target: &Path) -> Result<()> {
    if target == Path::new("-") {
        let csv = to_csv(bill).context("Failed to build CSV")?;
        io::stdout()
            .write_all(csv.as_bytes())
            .context("Failed to write to stdout")?;
        return Ok(());
    }
    let path = if target.is_dir() {
        write_csv(bill, target).await?
    } else {
        write_csv_to(bill, target).await?;
        target.to_path_buf()
    };
    eprintln!("{} CSV → {}", green("✔"), bold(&path.display().to_string()));
    Ok(())
}

fn print_summary(bill: &BillData) -> io::Result<()> {
    let commodity = bill.commodity();
    let unit = commodity.unit();
    let price_unit = commodity.price_unit();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    writeln!(out, "Fornitore:        {}", bill.fornitore)?;
    if !bill.periodo_fatturazione.is_empty() {
        writeln!(out, "Periodo:          {}", bill.periodo_fatturazione)?;
    }
    writeln!(out, "Fornitura:        {commodity}")?;
    writeln!(out)?;
    writeln!(
        out,
        "Materia prima:    {:.4} {price_unit}",
        bill.prezzo_materia_prima_unitario
    )?;
    writeln!(
        out,
        "Oneri generali:   {:.4} {price_unit}",
        bill.oneri_generali_unitario
    )?;
    writeln!(
        out,
        "Spese rete:       {:.4} {price_unit}",
        bill.spese_rete_unitario
    )?;
    writeln!(out, "Quota fissa:      {:.2} €/mese", bill.quota_fissa_mensile)?;
    writeln!(out)?;
    writeln!(
        out,
        "Consumo annuo:    {:.0} {unit}",
        bill.consumo_annuo_totale
    )?;
    if !bill.is_gas {
        let b = &bill.consumo_annuo_fasce;
        writeln!(
            out,
            "  F1 / F2 / F3:   {:.0} / {:.0} / {:.0} {unit}",
            b.f1, b.f2, b.f3
        )?;
    }
    writeln!(
        out,
        "Spesa annua:      {:.2} €",
        bill.spesa_totale_annua_stima
    )?;

    if !bill.storico_consumi.is_empty() {
        writeln!(out)?;
        writeln!(out, "{:<12} {:>10}", "Mese", unit)?;
        for item in &bill.storico_consumi {
            writeln!(out, "{:<12} {:>10.0}", item.mese, item.valore)?;
        }
    }
    Ok(())
}

// ── normalize ────────────────────────────────────────────────────────────────

async fn run_normalize(args: NormalizeArgs, quiet: bool) -> Result<()> {
    let image = normalize_file(&args.image, &args.normalize.options())
        .await
        .context("Failed to read image")?;

    if !quiet {
        match (image.original_dimensions, image.dimensions) {
            (Some((ow, oh)), Some((w, h))) => eprintln!(
                "{} {}x{} → {}x{}  {} → {} bytes",
                green("✔"),
                ow,
                oh,
                w,
                h,
                image.original_len,
                image.payload.data.len() * 3 / 4
            ),
            _ => eprintln!(
                "{} not decodable, forwarded unchanged ({})",
                dim("•"),
                image.payload.mime_type
            ),
        }
    }

    match args.output {
        Some(ref path) => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(&image.payload.data)
                .context("Normalized payload is not valid base64")?;
            tokio::fs::write(path, bytes)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => println!("{}", image.data_uri()),
    }
    Ok(())
}
