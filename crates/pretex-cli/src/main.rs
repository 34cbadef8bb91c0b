mod tools;

use anyhow::Context;
use clap::{ArgAction, Parser};
use pretex::{Batch, BatchReport, Options};
use rand::seq::SliceRandom;
use rayon::prelude::*;
use std::path::PathBuf;
use tools::CommandToolchain;
use tracing_subscriber::prelude::*;

#[cfg(target_os = "macos")]
const DEFAULT_FONTFORGE: &str = "/Applications/FontForge.app/Contents/Resources/opt/local/bin/fontforge";
#[cfg(not(target_os = "macos"))]
const DEFAULT_FONTFORGE: &str = "fontforge";

/// Pre-render the LaTeX math in HTML files as SVG.
#[derive(Parser, Debug)]
#[command(name = "pretex")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// HTML files to process in place
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// LaTeX preamble inserted into every document
    #[arg(long, default_value = "preamble.tex")]
    preamble: PathBuf,

    /// Extra directory searched for LaTeX packages
    #[arg(long)]
    style_path: Option<PathBuf>,

    /// Directory of cached renderings and extracted images
    #[arg(long, default_value = "pretex-cache")]
    cache_dir: PathBuf,

    /// Directory of figures referenced by \includegraphics
    #[arg(long, default_value = "figure-images")]
    img_dir: PathBuf,

    /// Render everything again, ignoring the cache
    #[arg(long, action = ArgAction::SetTrue)]
    no_cache: bool,

    /// Files per toolchain run
    #[arg(long, default_value_t = 50, value_parser = clap::value_parser!(u64).range(1..))]
    chunk_size: u64,

    /// Chunks processed in parallel [default: CPUs - 1]
    #[arg(short, long)]
    jobs: Option<usize>,

    #[arg(long, default_value = "pdflatex")]
    latex: String,

    #[arg(long, default_value = "inkscape")]
    inkscape: String,

    #[arg(long, default_value = DEFAULT_FONTFORGE)]
    fontforge: String,

    /// Script that extracts the fonts of a PDF as .sfd files
    #[arg(long, default_value = "tounicode")]
    tounicode: String,

    /// Log debug output
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

impl Args {
    fn options(&self) -> anyhow::Result<Options> {
        let preamble = std::fs::read_to_string(&self.preamble)
            .with_context(|| format!("reading preamble {}", self.preamble.display()))?;
        Ok(Options {
            preamble,
            cache_dir: self.cache_dir.clone(),
            img_dir: self.img_dir.clone(),
            use_cache: !self.no_cache,
            style_path: self.style_path.clone(),
        })
    }

    fn jobs(&self) -> usize {
        self.jobs.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get().saturating_sub(1))
                .unwrap_or(1)
                .max(1)
        })
    }

    fn toolchain(&self, options: &Options, sfd_dir: PathBuf) -> CommandToolchain {
        CommandToolchain {
            latex: self.latex.clone(),
            tounicode: self.tounicode.clone(),
            fontforge: self.fontforge.clone(),
            inkscape: self.inkscape.clone(),
            texinputs: options.texinputs(),
            sfd_dir,
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "pretex=debug" } else { "pretex=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run_chunk(args: &Args, options: &Options, files: &[PathBuf]) -> anyhow::Result<BatchReport> {
    let work = tempfile::tempdir().context("creating work directory")?;
    let toolchain = args.toolchain(options, work.path().join("sfd"));
    let report = Batch::new(options, &toolchain, work.path()).run(files)?;
    Ok(report)
}

fn run(args: &Args) -> anyhow::Result<BatchReport> {
    let options = args.options()?;
    let mut files = args.files.clone();
    // Spreads expensive documents across chunks.
    files.shuffle(&mut rand::thread_rng());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.jobs())
        .build()
        .context("starting worker pool")?;
    let chunk_size = usize::try_from(args.chunk_size).unwrap_or(usize::MAX);
    let reports = pool.install(|| {
        files
            .par_chunks(chunk_size)
            .map(|chunk| run_chunk(args, &options, chunk))
            .collect::<anyhow::Result<Vec<_>>>()
    })?;

    Ok(reports
        .into_iter()
        .fold(BatchReport::default(), |acc, r| BatchReport {
            total: acc.total + r.total,
            skipped: acc.skipped + r.skipped,
            cached: acc.cached + r.cached,
            rendered: acc.rendered + r.rendered,
        }))
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);
    match run(&args) {
        Ok(report) => tracing::info!(
            total = report.total,
            rendered = report.rendered,
            cached = report.cached,
            skipped = report.skipped,
            "all files processed"
        ),
        Err(err) => {
            eprintln!("{err:#}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["pretex", "a.html", "b.html"]).unwrap();
        assert_eq!(args.files, [PathBuf::from("a.html"), PathBuf::from("b.html")]);
        assert_eq!(args.preamble, PathBuf::from("preamble.tex"));
        assert_eq!(args.cache_dir, PathBuf::from("pretex-cache"));
        assert_eq!(args.img_dir, PathBuf::from("figure-images"));
        assert_eq!(args.chunk_size, 50);
        assert!(!args.no_cache);
        assert_eq!(args.style_path, None);
        assert_eq!(args.latex, "pdflatex");
        assert_eq!(args.inkscape, "inkscape");
        assert!(args.jobs() >= 1);
    }

    #[test]
    fn overrides() {
        let args = Args::try_parse_from([
            "pretex",
            "--no-cache",
            "--style-path",
            "styles",
            "--chunk-size",
            "3",
            "-j",
            "2",
            "--latex",
            "/opt/tex/pdflatex",
            "-v",
            "x.html",
        ])
        .unwrap();
        assert!(args.no_cache);
        assert!(args.verbose);
        assert_eq!(args.style_path, Some(PathBuf::from("styles")));
        assert_eq!(args.chunk_size, 3);
        assert_eq!(args.jobs(), 2);
        assert_eq!(args.latex, "/opt/tex/pdflatex");
    }

    #[test]
    fn files_are_required() {
        assert!(Args::try_parse_from(["pretex"]).is_err());
        assert!(Args::try_parse_from(["pretex", "--chunk-size", "0", "a.html"]).is_err());
    }

    #[test]
    fn toolchain_gets_texinputs_from_the_style_path() {
        let tmp = tempfile::tempdir().unwrap();
        let preamble = tmp.path().join("preamble.tex");
        std::fs::write(&preamble, "\\usepackage{amssymb}\n").unwrap();
        let args = Args::try_parse_from([
            OsStr::new("pretex"),
            OsStr::new("--preamble"),
            preamble.as_os_str(),
            OsStr::new("--style-path"),
            OsStr::new("/styles"),
            OsStr::new("a.html"),
        ])
        .unwrap();
        let options = args.options().unwrap();
        assert_eq!(options.preamble, "\\usepackage{amssymb}\n");
        let toolchain = args.toolchain(&options, tmp.path().join("sfd"));
        assert_eq!(toolchain.texinputs.as_deref(), Some(".:/styles:"));
    }
}
