use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command '{command}' failed ({status}): {output}")]
    CommandFailed {
        command: String,
        status: String,
        output: String,
    },

    #[error("Command '{0}' not found. Is it installed?")]
    CommandNotFound(String),

    #[error("Pipe stage '{command}' ({stage}) failed ({status}): {output}")]
    PipeFailed {
        stage: &'static str,
        command: String,
        status: String,
        output: String,
    },

    #[error("Installation cancelled by user")]
    Cancelled,

    #[error("This installer must be run as root (sudo)")]
    NotRoot,

    #[error("Prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("DNS record creation failed: {0}")]
    Dns(String),

    #[error("Network detection failed: {0}")]
    Network(String),

    #[error("Unsupported OS: {0}")]
    UnsupportedOs(String),

    #[error("Unsupported architecture: {0}")]
    UnsupportedArch(String),

    #[error("Could not determine VERSION_CODENAME")]
    MissingCodename,

    #[error(
        "Completed steps on record belong to a '{recorded}' install; \
         rerun with --type {recorded}, or pass --fresh to start over as '{requested}'"
    )]
    ModeChanged {
        recorded: String,
        requested: &'static str,
    },

    #[error("Step '{step}' failed: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<InstallerError>,
    },
}

impl InstallerError {
    /// Wraps `self` with the name of the step that produced it.
    pub fn in_step(self, step: &str) -> Self {
        InstallerError::Step {
            step: step.to_string(),
            source: Box::new(self),
        }
    }
}
