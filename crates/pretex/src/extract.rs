//! Site extraction and typesetting input generation.

use crate::dom::{NodeId, Tree};
use crate::hash::b64_hash;

const SITE_TYPE_PREFIX: &str = "text/x-latex-";

/// Fixed preamble; defines the measurement log and the macros the site blocks rely on.
pub const LATEX_PREAMBLE: &str = r"
\documentclass[12pt,reqno]{amsart}
\usepackage[margin=0pt]{geometry}
\usepackage[charter,sfscaled,ttscaled,cal=cmcal]{mathdesign}
\renewcommand{\sfdefault}{phv}
\usepackage{textcomp}

\newwrite\boxsize
\immediate\openout\boxsize=boxsize.txt
\def\writesize#1{\write\boxsize{#1}}
\newsavebox\measurebox

\newlength\emlength

\def\postag#1{\tag*{\phantom{#1}\pdfsavepos\write\boxsize{tag:{#1},\the\pdflastypos}}}

\pagestyle{empty}

\usepackage{graphicx}
\graphicspath{{figure-images/}{.}}
";

/// Opens the document and logs the ambient font size.
pub const LATEX_BEGIN: &str = r"
\begin{document}%
\topskip=0pt%
\parindent=0pt%
\parskip=0pt%
\thispagestyle{empty}%
\emlength=1em\writesize{fontsize:\the\emlength}%
";

pub const LATEX_NEWPAGE: &str = "\\newpage\\topskip=0pt%\n";

pub const LATEX_END: &str = r"\end{document}";

const INLINE_OPEN: &str = "%\n\\sbox{\\measurebox}{%\n";
const INLINE_CLOSE: &str = "%\n}%\n\\vbox to 0pt{\\vss\\usebox\\measurebox}%\n\
\\writesize{inline:{\\the\\wd\\measurebox}{\\the\\ht\\measurebox}{\\the\\dp\\measurebox}}%\n";

// The horizontal extents are filled in after typesetting, from the page's glyph boxes.
const DISPLAY_OPEN: &str =
    "%\n\\pdfsavepos\\write\\boxsize{prepage:\\the\\pdflastypos}\n\\begin{minipage}{7in}%\n";
const DISPLAY_CLOSE: &str = "%\n\\end{minipage}%\n\\writesize{display:}%\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiteKind {
    /// `text/x-latex-inline`: math mode, on the text baseline.
    Inline,
    /// `text/x-latex-code-inline`: text mode, on the text baseline.
    InlineCode,
    /// `text/x-latex-display`
    Display,
    /// `text/x-latex-code`
    DisplayCode,
    /// `text/x-latex-code-bare`: copied into the input verbatim and dropped from the page.
    RawCode,
}

impl SiteKind {
    pub fn from_script_type(ty: &str) -> Option<Self> {
        match ty.strip_prefix(SITE_TYPE_PREFIX)? {
            "inline" => Some(Self::Inline),
            "code-inline" => Some(Self::InlineCode),
            "display" => Some(Self::Display),
            "code" => Some(Self::DisplayCode),
            "code-bare" => Some(Self::RawCode),
            _ => None,
        }
    }

    /// Whether the site gets its own page, geometry record and graphic.
    pub fn renders(self) -> bool {
        self != Self::RawCode
    }

    pub fn is_display(self) -> bool {
        matches!(self, Self::Display | Self::DisplayCode)
    }

    fn block(self, code: &str) -> String {
        match self {
            Self::Inline => format!("{INLINE_OPEN}${code}${INLINE_CLOSE}"),
            Self::InlineCode => format!("{INLINE_OPEN}{code}{INLINE_CLOSE}"),
            Self::Display | Self::DisplayCode => {
                // Tagged lines report their position to the measurement log.
                let code = code.replace(r"\tag", r"\postag");
                format!("{DISPLAY_OPEN}{code}{DISPLAY_CLOSE}")
            }
            Self::RawCode => code.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MathSite {
    pub kind: SiteKind,
    /// Trimmed script text.
    pub source: String,
    pub node: NodeId,
}

/// Every site of a document in document order, raw code included.
pub fn find_sites(tree: &Tree) -> Vec<MathSite> {
    tree.descendants_named(tree.root(), "script")
        .into_iter()
        .filter_map(|node| {
            let kind = SiteKind::from_script_type(tree.attr(node, "type")?)?;
            let source = tree.text_content(node).trim().to_string();
            if source.is_empty() {
                return None;
            }
            Some(MathSite { kind, source, node })
        })
        .collect()
}

/// Expands `sites` into a complete typesetting input: fixed preamble, `preamble`, the
/// begin prologue, one page per rendered site and the document end.
pub fn typeset_input(sites: &[MathSite], preamble: &str) -> String {
    let mut pages: Vec<String> = Vec::new();
    for site in sites {
        pages.push(site.kind.block(&site.source));
        if site.kind.renders() {
            pages.push(LATEX_NEWPAGE.to_string());
        }
    }
    if pages.last().is_some_and(|p| p == LATEX_NEWPAGE) {
        pages.pop();
    }

    let mut input = String::with_capacity(
        LATEX_PREAMBLE.len() + preamble.len() + LATEX_BEGIN.len() + LATEX_END.len(),
    );
    input.push_str(LATEX_PREAMBLE);
    input.push_str(preamble);
    input.push_str(LATEX_BEGIN);
    input.extend(pages);
    input.push_str(LATEX_END);
    input
}

/// The extraction result for one document.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub sites: Vec<MathSite>,
    pub input: String,
    /// Content hash of `input`; names the cache entry and the work directory.
    pub key: String,
}

impl Extraction {
    /// Sites that receive a graphic, in page order.
    pub fn rendered(&self) -> impl Iterator<Item = &MathSite> {
        self.sites.iter().filter(|s| s.kind.renders())
    }

    pub fn page_count(&self) -> usize {
        self.rendered().count()
    }
}

/// Extracts the sites of `tree`. Returns `None` when nothing would be rendered.
pub fn extract(tree: &Tree, preamble: &str) -> Option<Extraction> {
    let sites = find_sites(tree);
    if !sites.iter().any(|s| s.kind.renders()) {
        return None;
    }
    let input = typeset_input(&sites, preamble);
    let key = b64_hash(&input);
    Some(Extraction { sites, input, key })
}
