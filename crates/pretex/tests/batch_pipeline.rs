use pretex::extract::LATEX_NEWPAGE;
use pretex::{Batch, BatchReport, Error, Options, PageJob, Result, Toolchain, TypesetJob};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

const DOC: &str = r#"<!DOCTYPE html>
<html><head><style id="pretex-style"></style><style id="pretex-fonts"></style></head>
<body>
<p>First x(<script type="text/x-latex-inline">alpha</script>)y then <script type="text/x-latex-code-inline">beta</script> ends.</p>
<script type="text/x-latex-code-bare">\newcommand{\R}{R}</script>
<script type="text/x-latex-display">gamma \tag{2.1}</script>
<script type="text/x-latex-code">delta</script>
</body></html>"#;

/// Hand-written HTML: unclosed void tags, a named entity and a page script with `&&` and `<`.
const HTML_DOC: &str = "<!DOCTYPE html>
<html><head><meta charset=\"utf-8\"><style id=\"pretex-style\"></style><style id=\"pretex-fonts\"></style>
<script>if (a && b < c) { go(); }</script></head>
<body>
<p>Let&nbsp;x(<script type=\"text/x-latex-inline\">alpha</script>)y<br>
hold.</p>
</body></html>
";

const PLAIN: &str = "<!DOCTYPE html>\n<html><body><p>No math here.</p></body></html>\n";

/// Stands in for pdflatex, the font extractor and inkscape. Pages carry their site's source
/// text so tests can follow each site through the pipeline.
#[derive(Default)]
struct ScriptedToolchain {
    typeset_jobs: Mutex<Vec<usize>>,
    font_calls: AtomicUsize,
    vectorize_calls: AtomicUsize,
    sources: Mutex<HashMap<PathBuf, Vec<String>>>,
    fail_typeset: bool,
    drop_last_record: bool,
}

impl ScriptedToolchain {
    fn calls(&self) -> usize {
        self.typeset_jobs.lock().unwrap().len()
            + self.font_calls.load(Ordering::SeqCst)
            + self.vectorize_calls.load(Ordering::SeqCst)
    }
}

fn line_after<'a>(chunk: &'a str, marker: &str) -> Option<&'a str> {
    let mut lines = chunk.lines();
    lines.find(|l| *l == marker)?;
    lines.next()
}

impl Toolchain for ScriptedToolchain {
    fn typeset(&self, jobs: &[TypesetJob]) -> Result<()> {
        self.typeset_jobs.lock().unwrap().push(jobs.len());
        if self.fail_typeset {
            return Err(Error::Tool {
                tool: "pdflatex".to_string(),
                status: "exit status: 1".to_string(),
                context: format!("Failed to compile LaTeX in {}", jobs[0].document.display()),
                stdout: "! Undefined control sequence.".to_string(),
                stderr: String::new(),
                input: jobs[0].input.clone(),
            });
        }
        for job in jobs {
            let input = fs::read_to_string(&job.paths.tex).unwrap();
            let mut log = String::from("fontsize:12.0pt\n");
            let mut sources = Vec::new();
            for chunk in input.split(LATEX_NEWPAGE) {
                if let Some(code) = line_after(chunk, "\\sbox{\\measurebox}{%") {
                    log.push_str("inline:{10.0pt}{8.0pt}{2.0pt}\n");
                    sources.push(code.trim_matches(|c: char| c == '$' || c == '%').to_string());
                } else if let Some(code) = line_after(chunk, "\\begin{minipage}{7in}%") {
                    log.push_str("prepage:49152000\n");
                    let mut rest = code;
                    while let Some(at) = rest.find("\\postag{") {
                        let label = &rest[at + 8..];
                        let end = label.find('}').unwrap();
                        log.push_str(&format!("tag:{{{}}},47185920\n", &label[..end]));
                        rest = &label[end..];
                    }
                    log.push_str("display:\n");
                    sources.push(code.trim_end_matches('%').to_string());
                }
            }
            if self.drop_last_record {
                let trimmed = log.trim_end_matches('\n');
                let cut = trimmed.rfind('\n').unwrap();
                log.truncate(cut + 1);
            }
            fs::write(&job.paths.log, log).unwrap();
            fs::write(&job.paths.pdf, b"%PDF-1.5").unwrap();
            self.sources
                .lock()
                .unwrap()
                .insert(job.paths.pdf.clone(), sources);
        }
        Ok(())
    }

    fn extract_fonts(&self, jobs: &[TypesetJob], font_dir: &Path) -> Result<()> {
        self.font_calls.fetch_add(1, Ordering::SeqCst);
        for job in jobs {
            let font = font_dir.join(format!("[{}]CharterBT+Roman.woff", job.key));
            fs::write(font, b"wOFF").unwrap();
            let log = fs::read_to_string(&job.paths.log).unwrap();
            fs::write(&job.paths.log, log.replace("display:\n", "display:72,10,300,40\n")).unwrap();
        }
        Ok(())
    }

    fn vectorize(&self, pages: &[PageJob], img_dir: &Path) -> Result<()> {
        assert!(img_dir.is_dir());
        self.vectorize_calls.fetch_add(1, Ordering::SeqCst);
        let sources = self.sources.lock().unwrap();
        for page in pages {
            let source = &sources[&page.pdf][page.page - 1];
            let svg = format!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>
<svg xmlns="http://www.w3.org/2000/svg" version="1.1" id="svg2" width="40" height="20" viewBox="0 0 40 20"><metadata id="metadata8"/><defs id="defs6"/><g id="g10" transform="matrix(1.3333333,0,0,-1.3333333,0,20)"><g id="g12"><text transform="matrix(1,0,0,-1,0,5)" id="text14"><tspan style="font-variant:normal;font-size:11.95517px;font-family:'CharterBT Roman';fill:#000000" id="tspan16">{source}</tspan></text><path style="fill:none;stroke:#000000;stroke-width:0.398" d="M 0,0 H 10" id="path18"/></g></g></svg>"#
            );
            fs::write(&page.svg, svg).unwrap();
        }
        Ok(())
    }
}

struct Fixture {
    tmp: tempfile::TempDir,
    options: Options,
    runs: usize,
}

impl Fixture {
    fn new() -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let options = Options {
            cache_dir: tmp.path().join("cache"),
            img_dir: tmp.path().join("figures"),
            ..Options::default()
        };
        Self {
            tmp,
            options,
            runs: 0,
        }
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.tmp.path().join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    fn run(&mut self, toolchain: &ScriptedToolchain, files: &[PathBuf]) -> Result<BatchReport> {
        self.runs += 1;
        let work = self.tmp.path().join(format!("work{}", self.runs));
        Batch::new(&self.options, toolchain, work).run(files)
    }
}

#[test]
fn second_run_comes_from_cache_byte_for_byte() {
    let mut fx = Fixture::new();
    let doc = fx.write("doc.html", DOC);

    let first = ScriptedToolchain::default();
    let report = fx.run(&first, &[doc.clone()]).unwrap();
    assert_eq!(
        report,
        BatchReport {
            total: 1,
            skipped: 0,
            cached: 0,
            rendered: 1
        }
    );
    assert_eq!(*first.typeset_jobs.lock().unwrap(), vec![1]);
    assert_eq!(first.font_calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.vectorize_calls.load(Ordering::SeqCst), 1);
    let rendered = fs::read_to_string(&doc).unwrap();
    assert_eq!(fs::read_dir(&fx.options.cache_dir).unwrap().count(), 1);

    fx.write("doc.html", DOC);
    let second = ScriptedToolchain::default();
    let report = fx.run(&second, &[doc.clone()]).unwrap();
    assert_eq!(report.cached, 1);
    assert_eq!(second.calls(), 0);
    assert_eq!(fs::read_to_string(&doc).unwrap(), rendered);
}

#[test]
fn finished_output_is_left_alone() {
    let mut fx = Fixture::new();
    let doc = fx.write("doc.html", DOC);
    fx.run(&ScriptedToolchain::default(), &[doc.clone()]).unwrap();
    let rendered = fs::read_to_string(&doc).unwrap();

    let again = ScriptedToolchain::default();
    let report = fx.run(&again, &[doc.clone()]).unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(again.calls(), 0);
    assert_eq!(fs::read_to_string(&doc).unwrap(), rendered);
}

#[test]
fn rendered_page_has_every_site_in_order() {
    let mut fx = Fixture::new();
    let doc = fx.write("doc.html", DOC);
    fx.run(&ScriptedToolchain::default(), &[doc.clone()]).unwrap();
    let out = fs::read_to_string(&doc).unwrap();

    assert!(out.starts_with("<!DOCTYPE html>\n<html>"));
    assert!(!out.contains("<script"));
    assert!(!out.contains("newcommand"));
    assert!(!out.contains("id=\"tspan16\""));

    let at = |needle: &str| out.find(needle).unwrap_or_else(|| panic!("missing {needle}"));
    let sources = [">alpha<", ">beta<", ">gamma \\postag{2.1}<", ">delta<"];
    let positions: Vec<usize> = sources.iter().map(|&s| at(s)).collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{positions:?}");

    // Glued punctuation travels with the first graphic; the spaced one stays bare.
    assert!(at(r#"<span class="pretex-bind">x(<span class="pretex-inline""#) < positions[0]);
    assert!(out.contains("</span>)y</span> then <span class=\"pretex-inline\""));
    assert_eq!(out.matches(r#"<div class="pretex-display">"#).count(), 2);
    assert!(out.contains(r#"<span class="tag">(2.1)<span style="height:1.66354em"></span></span>"#));

    assert!(out.contains("@font-face"));
    assert!(out.contains("svg.pretex path {"));
    assert!(out.contains("svg.pretex path.c"));
}

#[test]
fn editing_one_site_re_renders_only_its_document() {
    let mut fx = Fixture::new();
    let a = fx.write("a.html", DOC);
    let b = fx.write("b.html", &DOC.replace("delta", "epsilon"));
    let first = ScriptedToolchain::default();
    let report = fx.run(&first, &[a.clone(), b.clone()]).unwrap();
    assert_eq!(report.rendered, 2);
    assert_eq!(*first.typeset_jobs.lock().unwrap(), vec![2]);

    fx.write("a.html", &DOC.replace("alpha", "alphb"));
    fx.write("b.html", &DOC.replace("delta", "epsilon"));
    let second = ScriptedToolchain::default();
    let report = fx.run(&second, &[a.clone(), b.clone()]).unwrap();
    assert_eq!(report.cached, 1);
    assert_eq!(report.rendered, 1);
    assert_eq!(*second.typeset_jobs.lock().unwrap(), vec![1]);
    let out = fs::read_to_string(&a).unwrap();
    assert!(out.contains(">alphb<"));
    assert!(out.contains(">delta<"));
    assert_eq!(fs::read_dir(&fx.options.cache_dir).unwrap().count(), 3);
}

#[test]
fn identical_documents_render_once() {
    let mut fx = Fixture::new();
    let a = fx.write("a.html", DOC);
    let b = fx.write("b.html", DOC);
    let toolchain = ScriptedToolchain::default();
    let report = fx.run(&toolchain, &[a.clone(), b.clone()]).unwrap();
    assert_eq!(report.rendered, 2);
    assert_eq!(*toolchain.typeset_jobs.lock().unwrap(), vec![1]);
    assert_eq!(fs::read_to_string(&a).unwrap(), fs::read_to_string(&b).unwrap());
}

#[test]
fn documents_without_math_are_not_touched() {
    let mut fx = Fixture::new();
    let plain = fx.write("plain.html", PLAIN);
    let toolchain = ScriptedToolchain::default();
    let report = fx.run(&toolchain, &[plain.clone()]).unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(toolchain.calls(), 0);
    assert_eq!(fs::read_to_string(&plain).unwrap(), PLAIN);
    assert!(!fx.options.cache_dir.exists());
}

#[test]
fn disabled_cache_renders_again() {
    let mut fx = Fixture::new();
    let doc = fx.write("doc.html", DOC);
    fx.run(&ScriptedToolchain::default(), &[doc.clone()]).unwrap();

    fx.write("doc.html", DOC);
    fx.options.use_cache = false;
    let toolchain = ScriptedToolchain::default();
    let report = fx.run(&toolchain, &[doc.clone()]).unwrap();
    assert_eq!(report.rendered, 1);
    assert_eq!(*toolchain.typeset_jobs.lock().unwrap(), vec![1]);
}

#[test]
fn toolchain_failure_aborts_the_batch() {
    let mut fx = Fixture::new();
    let doc = fx.write("doc.html", DOC);
    let toolchain = ScriptedToolchain {
        fail_typeset: true,
        ..Default::default()
    };
    let err = fx.run(&toolchain, &[doc.clone()]).unwrap_err();
    assert!(matches!(err, Error::Tool { ref tool, .. } if tool == "pdflatex"));
    assert!(err.to_string().contains("Undefined control sequence"));
    assert_eq!(toolchain.font_calls.load(Ordering::SeqCst), 0);
    assert_eq!(fs::read_to_string(&doc).unwrap(), DOC);
}

#[test]
fn missing_geometry_record_is_fatal() {
    let mut fx = Fixture::new();
    let doc = fx.write("doc.html", DOC);
    let toolchain = ScriptedToolchain {
        drop_last_record: true,
        ..Default::default()
    };
    let err = fx.run(&toolchain, &[doc.clone()]).unwrap_err();
    assert!(matches!(
        err,
        Error::SiteCountMismatch {
            expected: 4,
            found: 3,
            ..
        }
    ));
    assert_eq!(toolchain.vectorize_calls.load(Ordering::SeqCst), 0);
    assert_eq!(fs::read_to_string(&doc).unwrap(), DOC);
}

#[test]
fn html_pages_survive_repeated_runs() {
    let mut fx = Fixture::new();
    let doc = fx.write("page.html", HTML_DOC);
    let report = fx.run(&ScriptedToolchain::default(), &[doc.clone()]).unwrap();
    assert_eq!(report.rendered, 1);
    let rendered = fs::read_to_string(&doc).unwrap();
    assert!(rendered.starts_with("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"/>"));
    assert!(rendered.contains("<script>if (a && b < c) { go(); }</script>"));
    assert!(rendered.contains("<p>Let\u{a0}<span class=\"pretex-bind\">x("));
    assert!(rendered.contains(">alpha<"));
    assert!(rendered.contains(")y</span><br/>\nhold.</p>"));

    // The rewritten page parses again and is left as is.
    let again = ScriptedToolchain::default();
    let report = fx.run(&again, &[doc.clone()]).unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(again.calls(), 0);
    assert_eq!(fs::read_to_string(&doc).unwrap(), rendered);

    // The untouched source comes back from the cache unchanged.
    fx.write("page.html", HTML_DOC);
    let cached = ScriptedToolchain::default();
    let report = fx.run(&cached, &[doc.clone()]).unwrap();
    assert_eq!(report.cached, 1);
    assert_eq!(cached.calls(), 0);
    assert_eq!(fs::read_to_string(&doc).unwrap(), rendered);
}

#[test]
fn cache_hits_are_written_before_a_failing_render() {
    let mut fx = Fixture::new();
    let a = fx.write("a.html", DOC);
    fx.run(&ScriptedToolchain::default(), &[a.clone()]).unwrap();
    let finished = fs::read_to_string(&a).unwrap();

    fx.write("a.html", DOC);
    let fresh = DOC.replace("delta", "zeta");
    let b = fx.write("b.html", &fresh);
    let failing = ScriptedToolchain {
        fail_typeset: true,
        ..Default::default()
    };
    assert!(fx.run(&failing, &[a.clone(), b.clone()]).is_err());
    assert_eq!(fs::read_to_string(&a).unwrap(), finished);
    assert_eq!(fs::read_to_string(&b).unwrap(), fresh);
}
