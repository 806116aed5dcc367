use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use log::{LevelFilter, info};
use serde_json::json;
use simplelog::{Config, WriteLogger};

use pdf_render::backend::DocumentSource;
use pdf_render::backend::mupdf::MupdfBackend;
use pdf_render::channel::{self, MethodCall};
use pdf_render::engine::{Pixels, Reply};
use pdf_render::raster::{self, RenderRequest};
use pdf_render::viewport::Viewport;
use pdf_render::{BridgeConfig, BridgeError, Engine, Service, panic_handler};

#[derive(Parser, Debug)]
#[command(name = "pdf-render", version, about = "Render PDF pages through the method-call bridge")]
struct Cli {
    /// Config file (default: <config dir>/pdf-render/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides the configured log level
    #[arg(long, global = true)]
    log_level: Option<LevelFilter>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print document info and effective page sizes
    Info { file: PathBuf },

    /// Render one page region to a PNG file
    Render(RenderArgs),

    /// Serve JSON method calls, one per stdin line; frame signals follow
    /// each reply as `{"event": "frame", "texId": ...}` lines
    Channel,
}

#[derive(Args, Debug)]
struct RenderArgs {
    file: PathBuf,

    /// 1-based page number
    #[arg(long, default_value_t = 1)]
    page: i64,

    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    x: i32,

    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    y: i32,

    /// Output width (0 = effective page width)
    #[arg(long, default_value_t = 0)]
    width: u32,

    /// Output height (0 = effective page height)
    #[arg(long, default_value_t = 0)]
    height: u32,

    /// Width the whole page is scaled to (0 = output width)
    #[arg(long, default_value_t = 0.0)]
    full_width: f64,

    #[arg(long, default_value_t = 0.0)]
    full_height: f64,

    /// Leave the background transparent instead of white
    #[arg(long)]
    transparent: bool,

    #[arg(long)]
    no_antialias: bool,

    #[arg(short, long)]
    output: PathBuf,
}

fn main() -> Result<()> {
    panic_handler::initialize_panic_handler();

    let cli = Cli::parse();
    let config = BridgeConfig::load(cli.config.as_deref())?;
    init_logging(&config, cli.log_level)?;
    info!("Starting pdf-render {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Info { file } => print_info(config, file),
        Command::Render(args) => render(config, &args),
        Command::Channel => serve_channel(config),
    }
}

fn init_logging(config: &BridgeConfig, level: Option<LevelFilter>) -> Result<()> {
    let level = level.unwrap_or_else(|| config.level_filter());
    let sink: Box<dyn Write + Send> = match &config.log_file {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("failed to create log file {path:?}"))?,
        ),
        None => Box::new(io::stderr()),
    };
    WriteLogger::init(level, Config::default(), sink)?;
    Ok(())
}

fn print_info(config: BridgeConfig, file: PathBuf) -> Result<()> {
    let mut engine = Engine::new(MupdfBackend::new(), config);
    let info = engine.open(&DocumentSource::File(file))?;

    let mut pages = Vec::with_capacity(info.meta.page_count);
    for page_number in 1..=info.meta.page_count as i64 {
        let page = engine.page_info(info.doc_id, page_number)?;
        pages.push(json!({
            "pageNumber": page_number,
            "width": page.width,
            "height": page.height,
        }));
    }

    let report = json!({
        "document": channel::encode_reply(&Reply::Document(info)),
        "pages": pages,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn render(config: BridgeConfig, args: &RenderArgs) -> Result<()> {
    // keep every buffer inline; nothing here reads the handle table
    let config = BridgeConfig {
        inline_buffer_limit: usize::MAX,
        ..config
    };
    let mut engine = Engine::new(MupdfBackend::new(), config);
    let doc = engine.open(&DocumentSource::File(args.file.clone()))?;

    let request = RenderRequest {
        viewport: Viewport {
            x: args.x,
            y: args.y,
            width: args.width,
            height: args.height,
            full_width: args.full_width,
            full_height: args.full_height,
        },
        background_fill: !args.transparent,
        antialias: !args.no_antialias,
    };
    let output = engine.render(doc.doc_id, args.page, &request)?;
    let Pixels::Inline(mut pixels) = output.pixels else {
        bail!("render buffer was not returned inline");
    };

    raster::unpremultiply(&mut pixels);
    write_png(&args.output, output.width, output.height, &pixels)?;
    info!(
        "Wrote {}x{} render of page {} to {:?}",
        output.width, output.height, args.page, args.output
    );
    Ok(())
}

fn write_png(path: &Path, width: u32, height: u32, pixels: &[u8]) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {path:?}"))?;
    let mut encoder = png::Encoder::new(BufWriter::new(file), width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(pixels)?;
    writer.finish()?;
    Ok(())
}

fn serve_channel(config: BridgeConfig) -> Result<()> {
    let service = Service::spawn(MupdfBackend::new, config)?;
    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<MethodCall>(&line) {
            Ok(call) => service.handle(&call),
            Err(e) => channel::encode_error(&BridgeError::invalid(format!(
                "malformed method call: {e}"
            ))),
        };
        writeln!(stdout, "{reply}")?;
        for tex_id in service.frame_events().try_iter() {
            writeln!(stdout, "{}", json!({"event": "frame", "texId": tex_id.0.raw()}))?;
        }
        stdout.flush()?;
    }

    info!("Channel input closed");
    Ok(())
}
