use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Markup parse error ({context}): {source}")]
    Markup {
        context: String,
        #[source]
        source: roxmltree::Error,
    },

    #[error("Invalid vector graphic ({context}): {message}")]
    InvalidGraphic { context: String, message: String },

    #[error(
        "{tool} failed ({status}): {context}\nstdout:\n{stdout}\nstderr:\n{stderr}\ninput:\n{input}"
    )]
    Tool {
        tool: String,
        status: String,
        context: String,
        stdout: String,
        stderr: String,
        input: String,
    },

    #[error("Measurement log for {document} has {found} geometry records, expected {expected}")]
    SiteCountMismatch {
        document: String,
        expected: usize,
        found: usize,
    },

    #[error("Cache bundle error: {0}")]
    CacheBundle(#[from] serde_json::Error),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn markup(context: impl Into<String>, source: roxmltree::Error) -> Self {
        Self::Markup {
            context: context.into(),
            source,
        }
    }
}
