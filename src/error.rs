use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("ffmpeg executable not found. Searched paths: {searched_paths:?}")]
    ExecutableNotFound {
        searched_paths: Vec<std::path::PathBuf>,
    },
    #[error("Invalid ffmpeg executable at '{path}': {reason}")]
    InvalidExecutable {
        path: std::path::PathBuf,
        reason: String,
    },
    #[error("Failed to launch ffmpeg process: {source}")]
    Launch {
        source: std::io::Error,
    },
    #[error("Input file not found <{path}>")]
    InputNotFound {
        path: std::path::PathBuf,
    },
    /// The probed source was rejected by ffmpeg; `message` is ffmpeg's own text.
    #[error("Unsupported input: {message}")]
    UnsupportedInput {
        message: String,
    },
    #[error("Failed to parse ffmpeg output: {reason}")]
    Parse {
        reason: String,
    },
    #[error("Invalid encoding configuration: {reason}")]
    Configuration {
        reason: String,
    },
    #[error("Exit code of ffmpeg encoding run is {exit_code}")]
    ProcessFailure {
        exit_code: i32,
        last_warning: Option<String>,
    },
    #[error("Conversion aborted")]
    Aborted,
    #[error("No ffmpeg process has been started")]
    NotStarted,
    #[error("I/O error while talking to ffmpeg: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub(crate) fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    /// The process exit code attached to this error, if it carries one.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ProcessFailure { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}
