use thiserror::Error;

/// Main player error type
#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl PlayerError {
    /// Get user-friendly error message with suggested solutions
    pub fn user_message(&self) -> String {
        match self {
            PlayerError::Stream(err) => err.user_message(),
            PlayerError::Output(err) => err.user_message(),
            PlayerError::File(err) => Self::format_file_error(err),
            PlayerError::Config(err) => err.user_message(),
        }
    }

    /// Get suggested recovery actions for the error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            PlayerError::Stream(err) => err.recovery_suggestions(),
            PlayerError::Output(err) => err.recovery_suggestions(),
            PlayerError::File(_) => vec![
                "Check that the file exists and is readable".to_string(),
                "Verify the path is spelled correctly".to_string(),
            ],
            PlayerError::Config(err) => err.recovery_suggestions(),
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            PlayerError::Stream(err) => err.severity(),
            PlayerError::Output(OutputError::StreamError(_)) => ErrorSeverity::Warning,
            PlayerError::Output(_) => ErrorSeverity::Error,
            PlayerError::File(_) => ErrorSeverity::Error,
            PlayerError::Config(_) => ErrorSeverity::Warning,
        }
    }

    /// Check if this error allows for automatic recovery
    pub fn is_recoverable(&self) -> bool {
        match self {
            PlayerError::Stream(err) => err.is_recoverable(),
            PlayerError::Output(err) => err.is_recoverable(),
            PlayerError::File(_) => false,
            PlayerError::Config(err) => err.is_recoverable(),
        }
    }

    fn format_file_error(err: &std::io::Error) -> String {
        match err.kind() {
            std::io::ErrorKind::NotFound => "File not found".to_string(),
            std::io::ErrorKind::PermissionDenied => "Permission denied while opening file".to_string(),
            _ => format!("File access error: {}", err),
        }
    }
}

/// Error severity levels for logging and user feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }

    pub fn log_level(&self) -> log::Level {
        match self {
            ErrorSeverity::Info => log::Level::Info,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Error => log::Level::Error,
            ErrorSeverity::Critical => log::Level::Error,
        }
    }
}

/// Errors raised while negotiating or decoding a bitstream.
///
/// Fatal variants are returned from `open` or from the decode task. The
/// non-fatal ones (`Desync`, `CorruptPage`, `CorruptPacket`, `MissingData`)
/// only ever reach the registered error handler.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Invalid stream: {0}")]
    InvalidStream(String),

    #[error("Truncated stream: byte source ended before all Vorbis headers were read")]
    TruncatedStream,

    #[error("Lost page sync: skipped {skipped} bytes")]
    Desync { skipped: usize },

    #[error("Corrupt page: {0}")]
    CorruptPage(String),

    #[error("Corrupt packet: {0}")]
    CorruptPacket(String),

    #[error("Missing data in page sequence")]
    MissingData,

    #[error("Decoder initialization failed: {0}")]
    DecodeInit(String),

    #[error("Decoder has already been closed")]
    AlreadyClosed,

    #[error("Invalid decoder configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Read error: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamError {
    /// Fatal errors terminate negotiation or the decode task.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            StreamError::Desync { .. }
                | StreamError::CorruptPage(_)
                | StreamError::CorruptPacket(_)
                | StreamError::MissingData
        )
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            StreamError::Desync { .. } | StreamError::MissingData => ErrorSeverity::Info,
            StreamError::CorruptPage(_) | StreamError::CorruptPacket(_) => ErrorSeverity::Warning,
            StreamError::AlreadyClosed => ErrorSeverity::Warning,
            StreamError::InvalidStream(_) | StreamError::TruncatedStream => ErrorSeverity::Error,
            StreamError::Io(_) => ErrorSeverity::Error,
            StreamError::DecodeInit(_) => ErrorSeverity::Critical,
            StreamError::InvalidConfig(_) => ErrorSeverity::Error,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            StreamError::InvalidStream(msg) => {
                format!("The input is not a playable Ogg Vorbis stream: {}", msg)
            }
            StreamError::TruncatedStream => {
                "The stream ended before playback could start".to_string()
            }
            StreamError::Desync { skipped } => {
                format!("Skipped {} bytes of damaged data", skipped)
            }
            StreamError::CorruptPage(msg) => {
                format!("A damaged page was skipped: {}", msg)
            }
            StreamError::CorruptPacket(msg) => {
                format!("A damaged audio packet was skipped: {}", msg)
            }
            StreamError::MissingData => {
                "Part of the stream is missing - playback may skip".to_string()
            }
            StreamError::DecodeInit(msg) => {
                format!("Failed to prepare the Vorbis decoder: {}", msg)
            }
            StreamError::AlreadyClosed => {
                "The decoder has already been shut down".to_string()
            }
            StreamError::Io(err) => {
                format!("Failed to read from the input: {}", err)
            }
            StreamError::InvalidConfig(err) => err.user_message(),
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            StreamError::InvalidStream(_) => vec![
                "Check that the input is an Ogg Vorbis file (.ogg/.oga)".to_string(),
                "Opus or FLAC inside Ogg are not supported".to_string(),
            ],
            StreamError::TruncatedStream => vec![
                "Check if the file is completely downloaded".to_string(),
                "Try re-copying the file".to_string(),
            ],
            StreamError::Desync { .. }
            | StreamError::CorruptPage(_)
            | StreamError::CorruptPacket(_)
            | StreamError::MissingData => vec![
                "Playback continues automatically".to_string(),
                "Verify file integrity if this happens often".to_string(),
            ],
            StreamError::DecodeInit(_) => vec![
                "Try re-encoding the file".to_string(),
                "Verify the file is not corrupted".to_string(),
            ],
            StreamError::AlreadyClosed => vec![
                "Open the stream again to restart playback".to_string(),
            ],
            StreamError::Io(_) => vec![
                "Check that the input is still reachable".to_string(),
                "Try the operation again".to_string(),
            ],
            StreamError::InvalidConfig(err) => err.recovery_suggestions(),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            StreamError::Desync { .. } => true,
            StreamError::CorruptPage(_) => true,
            StreamError::CorruptPacket(_) => true,
            StreamError::MissingData => true,
            StreamError::Io(_) => true, // The source can be reopened
            StreamError::InvalidStream(_) => false,
            StreamError::TruncatedStream => false,
            StreamError::DecodeInit(_) => false,
            StreamError::AlreadyClosed => false,
            StreamError::InvalidConfig(_) => false,
        }
    }
}

/// Errors reported by the codec engine layer (framing and synthesis).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Packet is not a Vorbis header")]
    NotVorbis,

    #[error("Header out of order: {0}")]
    HeaderOrder(&'static str),

    #[error("Malformed header: {0}")]
    MalformedHeader(&'static str),

    #[error("Page belongs to stream {found:#010x}, expected {expected:#010x}")]
    SerialMismatch { expected: u32, found: u32 },

    #[error("Unsupported page version: {0}")]
    PageVersion(u8),

    #[error("Synthesis not initialized")]
    NotInitialized,

    #[error("Synthesis setup failed: {0}")]
    SynthesisInit(String),

    #[error("Synthesis failed: {0}")]
    Synthesis(String),
}

/// Audio output errors
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Device not found: {device}")]
    DeviceNotFound { device: String },

    #[error("Unsupported channel count: {channels}")]
    UnsupportedChannels { channels: usize },

    #[error("Stream error: {0}")]
    StreamError(String),

    #[error("Audio initialization failed: {0}")]
    InitializationFailed(String),
}

impl OutputError {
    pub fn user_message(&self) -> String {
        match self {
            OutputError::DeviceNotFound { device } => {
                format!("Audio device '{}' is not available or has been disconnected", device)
            }
            OutputError::UnsupportedChannels { channels } => {
                format!("{} channel output is not supported by this player", channels)
            }
            OutputError::StreamError(msg) => {
                format!("Audio playback interrupted: {}", msg)
            }
            OutputError::InitializationFailed(msg) => {
                format!("Failed to initialize audio system: {}", msg)
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            OutputError::DeviceNotFound { .. } => vec![
                "Omit --device to use the default output device".to_string(),
                "Check that your audio device is connected and powered on".to_string(),
            ],
            OutputError::UnsupportedChannels { .. } => vec![
                "Use 'decode' to write raw PCM instead of playing".to_string(),
            ],
            OutputError::StreamError(_) => vec![
                "Check audio device connections".to_string(),
                "Restart playback".to_string(),
            ],
            OutputError::InitializationFailed(_) => vec![
                "Check that no other applications are using exclusive audio access".to_string(),
                "Verify audio drivers are properly installed".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            OutputError::DeviceNotFound { .. } => true, // Can fallback to default device
            OutputError::UnsupportedChannels { .. } => false,
            OutputError::StreamError(_) => true,
            OutputError::InitializationFailed(_) => true,
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::ConfigDirNotFound => {
                "Could not locate a home directory for the configuration file".to_string()
            }
            ConfigError::InvalidValue { field, reason } => {
                format!("Configuration value '{}' is invalid: {}", field, reason)
            }
            ConfigError::IoError(err) => {
                format!("Could not read or write the configuration file: {}", err)
            }
            ConfigError::SerializationError(err) => {
                format!("Could not save configuration: {}", err)
            }
            ConfigError::DeserializationError(err) => {
                format!("Configuration file is malformed: {}", err)
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ConfigError::ConfigDirNotFound => vec![
                "Set the HOME environment variable".to_string(),
            ],
            ConfigError::InvalidValue { .. } => vec![
                "Use a positive value".to_string(),
                "Delete the configuration file to restore defaults".to_string(),
            ],
            ConfigError::IoError(_) => vec![
                "Check permissions of ~/.config/vorbis-player".to_string(),
            ],
            ConfigError::SerializationError(_) | ConfigError::DeserializationError(_) => vec![
                "Fix the TOML syntax or delete the file to restore defaults".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            ConfigError::ConfigDirNotFound => true, // Defaults still work
            ConfigError::InvalidValue { .. } => false,
            ConfigError::IoError(_) => true,
            ConfigError::SerializationError(_) => true,
            ConfigError::DeserializationError(_) => true,
        }
    }
}
