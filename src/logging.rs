use log::{debug, info, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use chrono::{DateTime, Utc};

use crate::error::StreamError;

/// Environment variable overriding the configured log level
pub const LOG_LEVEL_ENV: &str = "VORBIS_PLAYER_LOG_LEVEL";

/// Initialize logging system with appropriate log level.
///
/// `VORBIS_PLAYER_LOG_LEVEL` wins over `default_level`.
pub fn init(default_level: &str) -> Result<(), log::SetLoggerError> {
    let log_level = std::env::var(LOG_LEVEL_ENV)
        .unwrap_or_else(|_| default_level.to_string());

    let mut builder = env_logger::Builder::new();

    builder.format(|buf, record| {
        use std::io::Write;
        writeln!(
            buf,
            "{} [{}] [{}:{}] {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.file().unwrap_or("unknown"),
            record.line().unwrap_or(0),
            record.args()
        )
    });

    builder.filter_level(parse_level(&log_level));
    builder.try_init()?;

    debug!("Logging initialized with level: {}", log_level);
    Ok(())
}

fn parse_level(level: &str) -> log::LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Warn,
    }
}

/// Kind of non-fatal stream damage observed during decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamEventKind {
    Desync,
    CorruptPage,
    CorruptPacket,
    MissingData,
    Fatal,
}

impl StreamEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamEventKind::Desync => "DESYNC",
            StreamEventKind::CorruptPage => "CORRUPT_PAGE",
            StreamEventKind::CorruptPacket => "CORRUPT_PACKET",
            StreamEventKind::MissingData => "MISSING_DATA",
            StreamEventKind::Fatal => "FATAL",
        }
    }

    fn of(err: &StreamError) -> Self {
        match err {
            StreamError::Desync { .. } => StreamEventKind::Desync,
            StreamError::CorruptPage(_) => StreamEventKind::CorruptPage,
            StreamError::CorruptPacket(_) => StreamEventKind::CorruptPacket,
            StreamError::MissingData => StreamEventKind::MissingData,
            _ => StreamEventKind::Fatal,
        }
    }
}

/// A reported stream event
#[derive(Debug, Clone)]
pub struct StreamEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: StreamEventKind,
    pub details: String,
}

/// Bounded history of errors routed through a decoder's error handler.
///
/// Cloning shares the same history, so one clone can be moved into the
/// handler while another is kept for reporting.
#[derive(Clone)]
pub struct StreamEventLog {
    events: Arc<Mutex<VecDeque<StreamEvent>>>,
    max_events: usize,
}

impl Default for StreamEventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamEventLog {
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            max_events: max_events.max(1),
        }
    }

    /// Record an error and forward it to the `log` facade at its severity
    pub fn record(&self, err: &StreamError) {
        let kind = StreamEventKind::of(err);
        let event = StreamEvent {
            timestamp: Utc::now(),
            kind,
            details: err.to_string(),
        };

        {
            let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
            events.push_back(event);
            while events.len() > self.max_events {
                events.pop_front();
            }
        }

        match kind {
            StreamEventKind::Desync | StreamEventKind::MissingData => {
                info!("[{}] {}", kind.as_str(), err);
            }
            StreamEventKind::CorruptPage | StreamEventKind::CorruptPacket => {
                warn!("[{}] {}", kind.as_str(), err);
            }
            StreamEventKind::Fatal => {
                log::log!(err.severity().log_level(), "[{}] {}", kind.as_str(), err);
            }
        }
    }

    /// Handler suitable for `Decoder::set_error_handler`
    pub fn handler(&self) -> impl Fn(&StreamError) + Send + Sync + 'static {
        let log = self.clone();
        move |err: &StreamError| log.record(err)
    }

    pub fn events(&self) -> Vec<StreamEvent> {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.iter().cloned().collect()
    }

    pub fn count(&self, kind: StreamEventKind) -> usize {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.iter().filter(|event| event.kind == kind).count()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One-line summary for the end of playback
    pub fn summary(&self) -> String {
        format!(
            "{} desync, {} corrupt pages, {} corrupt packets, {} gaps",
            self.count(StreamEventKind::Desync),
            self.count(StreamEventKind::CorruptPage),
            self.count(StreamEventKind::CorruptPacket),
            self.count(StreamEventKind::MissingData),
        )
    }
}
