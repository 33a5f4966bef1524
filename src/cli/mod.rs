//! Command-line interface.
//!
//! Parses arguments, probes the OCR engine, opens the document, runs the
//! scheduler, and hands the finished script to the selected saver.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser, ValueEnum};
use tracing::{info, warn};

use crate::config::{RunConfig, Workspace};
use crate::djvu::{DjvuDocument, DocumentSource, RenderLayers};
use crate::engine::{self, OcrEngine};
use crate::pages::{self, PageId};
use crate::pipeline::OcrPipeline;
use crate::scheduler;
use crate::script::Saver;
use crate::zones::{TextDetails, WordSegmentation};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RenderArg {
    /// Bitonal stencil only (fastest, usually best for OCR).
    Mask,
    /// Foreground layer.
    Foreground,
    /// All layers.
    All,
}

impl From<RenderArg> for RenderLayers {
    fn from(arg: RenderArg) -> Self {
        match arg {
            RenderArg::Mask => RenderLayers::Mask,
            RenderArg::Foreground => RenderLayers::Foreground,
            RenderArg::All => RenderLayers::Color,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DetailsArg {
    Lines,
    Words,
    Chars,
}

impl From<DetailsArg> for TextDetails {
    fn from(arg: DetailsArg) -> Self {
        match arg {
            DetailsArg::Lines => TextDetails::Lines,
            DetailsArg::Words => TextDetails::Words,
            DetailsArg::Chars => TextDetails::Chars,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SegmentationArg {
    /// Split words on whitespace.
    Simple,
    /// Unicode word boundaries (UAX #29).
    Uax29,
}

impl From<SegmentationArg> for WordSegmentation {
    fn from(arg: SegmentationArg) -> Self {
        match arg {
            SegmentationArg::Simple => WordSegmentation::Simple,
            SegmentationArg::Uax29 => WordSegmentation::Uax29,
        }
    }
}

/// OCR a DjVu document and store the recognized text as its hidden text
/// layer.
#[derive(Debug, Parser)]
#[command(name = "djvuocr", version, about)]
#[command(group = ArgGroup::new("output").multiple(false))]
pub struct Cli {
    /// DjVu document to process.
    #[arg(value_name = "FILE", required_unless_present_any = ["list_engines", "list_languages"])]
    file: Option<PathBuf>,

    /// Save the result as a new bundled document.
    #[arg(short = 'o', long, value_name = "FILE", group = "output")]
    save_bundled: Option<PathBuf>,

    /// Save the result as a new indirect document with this index file.
    #[arg(short = 'i', long, value_name = "FILE", group = "output")]
    save_indirect: Option<PathBuf>,

    /// Save only the djvused edit script, leaving the document untouched.
    #[arg(long, value_name = "FILE", group = "output")]
    save_script: Option<PathBuf>,

    /// Modify the original document in place.
    #[arg(long, group = "output")]
    in_place: bool,

    /// Run OCR but do not modify anything.
    #[arg(long, group = "output")]
    dry_run: bool,

    /// OCR engine to use.
    #[arg(long, value_name = "NAME", default_value = engine::DEFAULT_ENGINE)]
    engine: String,

    /// Print available OCR engines and exit.
    #[arg(long)]
    list_engines: bool,

    /// Recognition language, in the engine's own naming.
    #[arg(short = 'l', long, value_name = "LANG")]
    language: Option<String>,

    /// Print languages available to the selected engine and exit.
    #[arg(long)]
    list_languages: bool,

    /// Remove all existing hidden text before adding new text.
    #[arg(long)]
    clear_text: bool,

    /// Document layers to render for recognition.
    #[arg(long, value_enum, value_name = "LAYERS", default_value = "mask")]
    render: RenderArg,

    /// Pages to process, e.g. `1-9,17`. All pages when omitted.
    #[arg(short = 'p', long, value_name = "RANGE")]
    pages: Option<String>,

    /// Granularity of recognized text zones.
    #[arg(short = 't', long, value_enum, value_name = "KIND", default_value = "words")]
    details: DetailsArg,

    /// Word segmentation, used when the engine gives none.
    #[arg(long, value_enum, value_name = "POLICY", default_value = "simple")]
    word_segmentation: SegmentationArg,

    /// Number of concurrent page workers; `-j` alone uses all CPUs.
    #[arg(
        short = 'j',
        long,
        value_name = "N",
        default_value = "1",
        default_missing_value = "auto",
        num_args = 0..=1
    )]
    jobs: String,

    /// Keep all intermediate files for inspection.
    #[arg(short = 'D', long)]
    debug: bool,

    /// More verbose logging.
    #[arg(short = 'v', long)]
    verbose: bool,
}

/// Peek at the raw arguments before parsing, so logging can be configured
/// first.
pub fn is_verbose() -> bool {
    std::env::args().any(|a| a == "-v" || a == "--verbose")
}

fn parse_jobs(spec: &str) -> Result<usize> {
    if spec == "auto" {
        return Ok(std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1));
    }
    let n: usize = spec
        .parse()
        .with_context(|| format!("invalid job count: {spec:?}"))?;
    if n == 0 {
        bail!("job count must be at least 1");
    }
    Ok(n)
}

impl Cli {
    fn saver(&self) -> Result<Saver> {
        if let Some(path) = &self.save_bundled {
            Ok(Saver::Bundled(path.clone()))
        } else if let Some(path) = &self.save_indirect {
            Ok(Saver::Indirect(path.clone()))
        } else if let Some(path) = &self.save_script {
            Ok(Saver::Script(path.clone()))
        } else if self.in_place {
            Ok(Saver::InPlace)
        } else if self.dry_run {
            Ok(Saver::DryRun)
        } else {
            bail!(
                "no output specified; use one of --save-bundled, --save-indirect, \
                 --save-script, --in-place, --dry-run"
            );
        }
    }

    /// Resolve the requested pages against the document, sorted and
    /// deduplicated.
    fn resolve_pages(&self, document: &dyn DocumentSource) -> Result<Vec<PageId>> {
        let mut pages = match &self.pages {
            Some(spec) => pages::parse_page_numbers(spec)?,
            None => (1..=document.page_count() as PageId).collect(),
        };
        pages.sort_unstable();
        pages.dedup();
        if let Some(&last) = pages.last() {
            if last as usize > document.page_count() {
                bail!(
                    "page {last} is out of range (document has {} pages)",
                    document.page_count()
                );
            }
        }
        Ok(pages)
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if cli.list_engines {
        for name in engine::ENGINE_NAMES {
            match engine::create(name) {
                Ok(_) => println!("{name}"),
                Err(e) => warn!("{name}: {e}"),
            }
        }
        return Ok(());
    }

    let ocr: Box<dyn OcrEngine> = engine::create(&cli.engine)?;

    if cli.list_languages {
        for language in ocr.list_languages()? {
            println!("{language}");
        }
        return Ok(());
    }

    let saver = cli.saver()?;
    let file = cli
        .file
        .as_deref()
        .context("no input document specified")?;

    let language = cli
        .language
        .clone()
        .unwrap_or_else(|| ocr.default_language());
    ocr.check_language(&language)?;

    let document =
        DjvuDocument::open(file).with_context(|| format!("cannot open {}", file.display()))?;
    let pages = cli.resolve_pages(&document)?;
    let page_ids: Vec<(PageId, String)> = pages
        .iter()
        .map(|&p| Ok((p, document.page_file_id(p)?)))
        .collect::<Result<_>>()?;

    let config = RunConfig {
        language,
        details: cli.details.into(),
        segmentation: cli.word_segmentation.into(),
        render_layers: cli.render.into(),
        workers: parse_jobs(&cli.jobs)?,
        clear_text: cli.clear_text,
        debug: cli.debug,
    };
    info!(
        document = %file.display(),
        engine = ocr.name(),
        language = %config.language,
        pages = pages.len(),
        jobs = config.workers,
        "starting OCR"
    );

    let mut workspace = Workspace::new().context("cannot create working directory")?;
    let script_path = workspace.script_path();

    let run_result = (|| -> Result<()> {
        let mut script = BufWriter::new(
            File::create(&script_path)
                .with_context(|| format!("cannot create {}", script_path.display()))?,
        );
        let pipeline = OcrPipeline {
            document: &document,
            engine: ocr.as_ref(),
            config: &config,
            workspace: &workspace,
        };
        scheduler::run(
            &pipeline,
            &page_ids,
            config.workers,
            config.clear_text,
            &mut script,
        )?;
        script.flush()?;
        Ok(())
    })();

    match run_result {
        Ok(()) => {
            saver.apply(file, &script_path)?;
            if config.debug {
                let kept = workspace.retain();
                info!("intermediate files were left in {}", kept.display());
            }
            Ok(())
        }
        Err(e) => {
            let kept = workspace.retain();
            info!("intermediate files were left in {}", kept.display());
            Err(e)
        }
    }
}
