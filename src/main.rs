use std::cell::Cell;
use std::fs::File;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use log::{error, info, warn};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode, WriteLogger};

use pdf_pageview::{
    Callbacks, DocumentHandle, DocumentState, MupdfEngine, PageHandle, Settings, Size, Source,
    SvgFileSink, Viewer, worker,
};

const EVENT_POLL: Duration = Duration::from_millis(100);
const SETTLE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Fit {
    Width,
    Container,
}

/// Render one page of a PDF to SVG
#[derive(Debug, Parser)]
#[command(name = "pdf-pageview", version)]
struct Cli {
    /// PDF file to open
    file: PathBuf,

    /// 1-based page to show
    #[arg(long)]
    page: Option<u32>,

    #[arg(long, default_value_t = 0)]
    rotate_cw: u32,

    #[arg(long, default_value_t = 0)]
    rotate_ccw: u32,

    #[arg(long, default_value_t = 0)]
    zoom_in: u32,

    #[arg(long, default_value_t = 0)]
    zoom_out: u32,

    #[arg(long, value_enum)]
    fit: Option<Fit>,

    /// Container size used by --fit, as WIDTHxHEIGHT
    #[arg(long, value_parser = parse_container)]
    container: Option<Size>,

    /// Device pixel ratio
    #[arg(long)]
    dpr: Option<f64>,

    /// Answer to the first password prompt
    #[arg(long)]
    password: Option<String>,

    /// Settings file; defaults to the per-user config.yaml
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "page.svg")]
    out: PathBuf,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// More logging; repeat for more detail
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_container(value: &str) -> Result<Size, String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {value:?}"))?;

    let width: f64 = width.trim().parse().map_err(|e| format!("bad width: {e}"))?;
    let height: f64 = height.trim().parse().map_err(|e| format!("bad height: {e}"))?;
    if width <= 0.0 || height <= 0.0 {
        return Err("container dimensions must be positive".to_string());
    }
    Ok(Size::new(width, height))
}

fn init_logging(cli: &Cli, settings: &Settings) -> Result<()> {
    let level = match cli.verbose {
        0 => settings.level_filter(),
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    match &cli.log_file {
        Some(path) => WriteLogger::init(
            level,
            Config::default(),
            File::create(path).with_context(|| format!("creating log file {}", path.display()))?,
        )?,
        None => TermLogger::init(
            level,
            Config::default(),
            TerminalMode::Stderr,
            ColorChoice::Auto,
        )?,
    }
    Ok(())
}

type PdfViewer = Viewer<MupdfEngine, SvgFileSink>;

/// Pump engine events until nothing is outstanding
fn settle(viewer: &mut PdfViewer, aborted: &Cell<bool>) -> Result<()> {
    let deadline = Instant::now() + SETTLE_TIMEOUT;

    while !viewer.is_idle() {
        if aborted.get() {
            bail!("password rejected");
        }
        if !viewer.wait_for_event(EVENT_POLL) && Instant::now() > deadline {
            bail!("timed out waiting for the renderer");
        }
    }
    viewer.poll_events();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).context("loading settings")?;
    init_logging(&cli, &settings)?;
    info!("Starting pdf-pageview on {}", cli.file.display());

    worker::configure(settings.worker.clone())?;
    let engine =
        MupdfEngine::new().map_err(|e| anyhow::anyhow!("starting render engine: {e}"))?;

    let mut sink = SvgFileSink::new(&cli.out);
    if let Some(container) = cli.container {
        sink = sink.with_container(container);
    }

    let mut options = settings.viewer_options();
    if let Some(dpr) = cli.dpr {
        if !dpr.is_finite() || dpr <= 0.0 {
            bail!("--dpr must be a positive number, got {dpr}");
        }
        options.device_pixel_ratio = dpr;
    }

    let failures = Rc::new(Cell::new(0u32));
    let aborted = Rc::new(Cell::new(false));
    let callbacks = {
        let doc_failures = failures.clone();
        let page_failures = failures.clone();
        let render_failures = failures.clone();
        let aborted = aborted.clone();
        let mut password = cli.password.clone();

        Callbacks::<MupdfEngine>::new()
            .on_document_load_success(|doc| info!("Document loaded: {} pages", doc.page_count()))
            .on_document_load_fail(move |e| {
                error!("{e}");
                eprintln!("error: {e}");
                doc_failures.set(doc_failures.get() + 1);
            })
            .on_page_load_fail(move |e| {
                error!("{e}");
                eprintln!("error: {e}");
                page_failures.set(page_failures.get() + 1);
            })
            .on_page_render_success(|page| info!("Rendered page {}", page.number()))
            .on_page_render_fail(move |e| {
                error!("{e}");
                eprintln!("error: {e}");
                render_failures.set(render_failures.get() + 1);
            })
            .on_password(move |resolver, reason| match password.take() {
                Some(password) => {
                    info!("Answering password prompt ({})", reason.as_str());
                    resolver.resolve(password);
                }
                None => {
                    warn!("Password prompt ({}) with no password left", reason.as_str());
                    aborted.set(true);
                }
            })
    };

    let mut viewer = Viewer::new(engine, sink)
        .with_options(options)
        .with_callbacks(callbacks);

    viewer.set_source(Some(Source::path(&cli.file)));
    settle(&mut viewer, &aborted)?;
    if viewer.document_state() != DocumentState::Loaded {
        bail!("could not open {}", cli.file.display());
    }

    if let Some(page) = cli.page {
        if !viewer.goto_page(page) && viewer.page() != page {
            warn!("Ignoring --page {page}");
        }
        settle(&mut viewer, &aborted)?;
    }

    for _ in 0..cli.rotate_cw {
        viewer.rotate_clockwise();
    }
    for _ in 0..cli.rotate_ccw {
        viewer.rotate_counterclockwise();
    }
    for _ in 0..cli.zoom_in {
        viewer.zoom_in();
    }
    for _ in 0..cli.zoom_out {
        viewer.zoom_out();
    }
    settle(&mut viewer, &aborted)?;

    if let Some(fit) = cli.fit {
        let applied = match fit {
            Fit::Width => viewer.fit_to_width(),
            Fit::Container => viewer.fit_to_container(),
        };
        if !applied && cli.container.is_none() {
            warn!("--fit needs --container");
        }
        settle(&mut viewer, &aborted)?;
    }

    if failures.get() > 0 {
        bail!("{} operation(s) failed", failures.get());
    }

    let viewport = viewer.viewport();
    println!(
        "page {} at {} scale {} ({}x{}) -> {}",
        viewer.page(),
        viewer.rotation(),
        viewer.scale(),
        viewport.width.round(),
        viewport.height.round(),
        viewer.sink().path().display()
    );
    info!("Shutting down pdf-pageview");
    Ok(())
}
