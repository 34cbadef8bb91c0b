//! [`Toolchain`] backed by pdflatex, the font extraction script, FontForge and Inkscape.

use pretex::toolchain::font_files;
use pretex::{Error, PageJob, Result, Toolchain, TypesetJob};
use rayon::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// FontForge rejects some private dictionary entries the font extraction script leaves behind.
const FIX_PRIVATE_TABLE: &str = r#"  if(GetPrivateEntry("OtherBlues") == "[]")
     ClearPrivateEntry("OtherBlues")
  endif
  if(GetPrivateEntry("FamilyBlues") == "[]")
     ClearPrivateEntry("FamilyBlues")
  endif
  if(GetPrivateEntry("FamilyOtherBlues") == "[]")
     ClearPrivateEntry("FamilyOtherBlues")
  endif
  if(GetPrivateEntry("BlueShift") == "")
     ChangePrivateEntry("BlueShift", "7")
  endif
  if(GetPrivateEntry("BlueScale") == "")
     ChangePrivateEntry("BlueScale", ".039625")
  endif
  if(GetPrivateEntry("BlueFuzz") == "")
     ChangePrivateEntry("BlueFuzz", "1")
  endif
"#;

/// Fonts per FontForge invocation.
const FONTFORGE_BATCH: usize = 1000;

#[derive(Debug, Clone)]
pub struct CommandToolchain {
    pub latex: String,
    pub tounicode: String,
    pub fontforge: String,
    pub inkscape: String,
    /// Exported as `TEXINPUTS` when set.
    pub texinputs: Option<String>,
    /// Scratch directory for the intermediate `.sfd` fonts.
    pub sfd_dir: PathBuf,
}

impl Toolchain for CommandToolchain {
    fn typeset(&self, jobs: &[TypesetJob]) -> Result<()> {
        jobs.par_iter().try_for_each(|job| {
            let tex_name = format!("{}.tex", job.key);
            let mut cmd = Command::new(&self.latex);
            cmd.current_dir(&job.paths.pdf_dir)
                .arg("-interaction=nonstopmode")
                .arg(format!("\\input{{{tex_name}}}"));
            if let Some(texinputs) = &self.texinputs {
                cmd.env("TEXINPUTS", texinputs);
            }
            run(
                &mut cmd,
                &self.latex,
                &format!("Failed to compile LaTeX in {}", job.document.display()),
                None,
                &job.input,
            )
        })
    }

    fn extract_fonts(&self, jobs: &[TypesetJob], font_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(&self.sfd_dir).map_err(|e| Error::io(&self.sfd_dir, e))?;
        let mut cmd = Command::new(&self.tounicode);
        cmd.arg("--outdir").arg(&self.sfd_dir);
        cmd.args(jobs.iter().map(|job| &job.paths.pdf));
        let pdfs = jobs
            .iter()
            .map(|job| job.paths.pdf.display().to_string())
            .collect::<Vec<_>>()
            .join("\n");
        run(&mut cmd, &self.tounicode, "Failed to extract fonts", None, &pdfs)?;

        let sfds = sfd_files(&self.sfd_dir)?;
        for chunk in sfds.chunks(FONTFORGE_BATCH) {
            let script = fontforge_script(chunk, font_dir);
            let mut cmd = Command::new(&self.fontforge);
            cmd.args(["-lang=ff", "-script", "-"]);
            run(
                &mut cmd,
                &self.fontforge,
                "Failed to convert fonts",
                Some(&script),
                &script,
            )?;
        }
        let converted = font_files(font_dir)?.len();
        tracing::debug!(sfd = sfds.len(), woff = converted, "fonts converted");
        Ok(())
    }

    fn vectorize(&self, pages: &[PageJob], img_dir: &Path) -> Result<()> {
        if pages.is_empty() {
            return Ok(());
        }
        let script = inkscape_script(pages);
        let mut cmd = Command::new(&self.inkscape);
        cmd.current_dir(img_dir).arg("--shell");
        run(
            &mut cmd,
            &self.inkscape,
            "Failed to convert pages to SVG",
            Some(&script),
            &script,
        )
    }
}

fn sfd_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))?;
    let mut out = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| Error::io(dir, e))?.path();
        if path.extension().is_some_and(|ext| ext == "sfd") {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// Opens each `.sfd`, fixes its private table and generates `<font_dir>/<stem>.woff`.
pub fn fontforge_script(sfds: &[PathBuf], font_dir: &Path) -> String {
    let mut script = String::new();
    for sfd in sfds {
        let Some(stem) = sfd.file_stem() else {
            continue;
        };
        let woff = font_dir.join(format!("{}.woff", stem.to_string_lossy()));
        script.push_str(&format!("Open(\"{}\")\n", sfd.display()));
        script.push_str(FIX_PRIVATE_TABLE);
        script.push_str(&format!("Generate(\"{}\")\n", woff.display()));
    }
    script
}

/// One `--shell` command line per page.
pub fn inkscape_script(pages: &[PageJob]) -> String {
    pages
        .iter()
        .map(|page| {
            format!(
                "--file=\"{}\" --pdf-page={} --export-plain-svg=\"{}\"\n",
                page.pdf.display(),
                page.page,
                page.svg.display()
            )
        })
        .collect()
}

/// Runs `cmd` to completion, feeding `stdin` when given. Non-zero exit becomes
/// [`Error::Tool`] carrying the captured output and `input`.
fn run(
    cmd: &mut Command,
    tool: &str,
    context: &str,
    stdin: Option<&str>,
    input: &str,
) -> Result<()> {
    tracing::debug!(?cmd, "running");
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());
    let mut child = cmd.spawn().map_err(|e| Error::io(tool, e))?;
    if let Some(text) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(text.as_bytes())
                .map_err(|e| Error::io(tool, e))?;
        }
    }
    let output = child.wait_with_output().map_err(|e| Error::io(tool, e))?;
    if output.status.success() {
        return Ok(());
    }
    Err(Error::Tool {
        tool: tool.to_string(),
        status: output.status.to_string(),
        context: context.to_string(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        input: input.to_string(),
    })
}
