use std::time::Duration;

use crate::error::{ErrorSeverity, PlayerError, StreamError};
use crate::logging::StreamEventLog;
use crate::models::StreamInfo;

/// Terminal formatting for stream information and errors
pub struct StatusDisplay;

impl StatusDisplay {
    /// Boxed FILE INFO table: one row per comment, then bitstream and vendor
    pub fn file_info_table(info: &StreamInfo) -> String {
        let mut rows: Vec<(String, String)> = info
            .comment_pairs()
            .into_iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        let separator_at = (!rows.is_empty()).then_some(rows.len());
        rows.push(("Bitstream".to_string(), info.format_description()));
        rows.push(("Encoded by".to_string(), info.vendor.clone()));

        let key_width = rows.iter().map(|(k, _)| k.chars().count()).max().unwrap_or(0);
        let mut value_width = rows.iter().map(|(_, v)| v.chars().count()).max().unwrap_or(0);

        const TITLE: &str = "FILE INFO";
        // "│ key │ value │" adds 5 columns around the cells
        let inner = key_width + value_width + 3;
        if inner < TITLE.len() {
            value_width += TITLE.len() - inner;
        }
        let inner = key_width + value_width + 3;

        let key_rule = "─".repeat(key_width + 2);
        let value_rule = "─".repeat(value_width + 2);

        let mut out = String::new();
        out.push_str(&format!("┌{}┐\n", "─".repeat(inner + 2)));
        out.push_str(&format!("│ {:^width$} │\n", TITLE, width = inner));
        out.push_str(&format!("├{}┬{}┤\n", key_rule, value_rule));
        for (i, (key, value)) in rows.iter().enumerate() {
            if Some(i) == separator_at {
                out.push_str(&format!("├{}┼{}┤\n", key_rule, value_rule));
            }
            out.push_str(&format!(
                "│ {} │ {} │\n",
                Self::pad(key, key_width),
                Self::pad(value, value_width)
            ));
        }
        out.push_str(&format!("└{}┴{}┘", key_rule, value_rule));
        out
    }

    pub fn display_file_info(info: &StreamInfo) {
        println!("{}", Self::file_info_table(info));
    }

    /// One-line summary printed when playback or decoding ends
    pub fn playback_summary(samples: u64, info: &StreamInfo, events: &StreamEventLog) -> String {
        let duration = if info.sample_rate > 0.0 {
            Duration::from_secs_f64(samples as f64 / info.sample_rate)
        } else {
            Duration::ZERO
        };
        let mut summary = format!(
            "Decoded {} samples per channel ({})",
            samples,
            Self::format_duration(duration)
        );
        if !events.is_empty() {
            summary.push_str(&format!(", stream damage: {}", events.summary()));
        }
        summary
    }

    /// Display error message with formatting and recovery suggestions
    pub fn display_error(error: &PlayerError) {
        let severity = error.severity();
        let severity_icon = match severity {
            ErrorSeverity::Info => "ℹ",
            ErrorSeverity::Warning => "⚠",
            ErrorSeverity::Error => "✗",
            ErrorSeverity::Critical => "🔥",
        };

        eprintln!("┌─ {} {} ─────────────────────────────────────────────────┐",
            severity_icon, severity.as_str());

        for line in Self::wrap_text(&error.user_message(), 55) {
            eprintln!("│ {}", line);
        }

        let suggestions = error.recovery_suggestions();
        if !suggestions.is_empty() {
            eprintln!("│");
            eprintln!("│ Suggestions:");
            for suggestion in suggestions.iter().take(3) {
                for line in Self::wrap_text(&format!("• {}", suggestion), 53) {
                    eprintln!("│   {}", line);
                }
            }
        }

        Self::display_error_context(error);

        eprintln!("└─────────────────────────────────────────────────────────┘");
    }

    fn display_error_context(error: &PlayerError) {
        match error {
            PlayerError::Stream(StreamError::InvalidStream(_)) => {
                eprintln!("│");
                eprintln!("│ Supported: Ogg Vorbis (.ogg, .oga)");
            }
            PlayerError::Stream(StreamError::TruncatedStream) => {
                eprintln!("│");
                eprintln!("│ File may need to be re-downloaded");
            }
            PlayerError::Config(_) => {
                eprintln!("│");
                eprintln!("│ Configuration will use default values");
            }
            _ => {}
        }
    }

    /// Display a simple error message for non-interactive contexts
    pub fn display_simple_error(error: &PlayerError) {
        eprintln!("[{}] {}", error.severity().as_str(), error.user_message());

        let suggestions = error.recovery_suggestions();
        if !suggestions.is_empty() {
            eprintln!("Suggestion: {}", suggestions[0]);
        }
    }

    /// Wrap text to fit within specified width
    fn wrap_text(text: &str, width: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let mut current_line = String::new();

        for word in text.split_whitespace() {
            if current_line.is_empty() {
                current_line = word.to_string();
            } else if current_line.len() + word.len() + 1 <= width {
                current_line.push(' ');
                current_line.push_str(word);
            } else {
                lines.push(current_line);
                current_line = word.to_string();
            }
        }

        if !current_line.is_empty() {
            lines.push(current_line);
        }

        lines
    }

    /// Format duration as MM:SS or HH:MM:SS for longer streams
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            format!("{:02}:{:02}", minutes, seconds)
        }
    }

    /// Get channel description from channel count
    pub fn channel_description(channels: usize) -> &'static str {
        match channels {
            1 => "Mono",
            2 => "Stereo",
            3 => "3.0",
            4 => "Quad",
            5 => "5.0 Surround",
            6 => "5.1 Surround",
            7 => "6.1 Surround",
            8 => "7.1 Surround",
            _ => "Multi-channel",
        }
    }

    fn pad(s: &str, width: usize) -> String {
        let len = s.chars().count();
        format!("{}{}", s, " ".repeat(width.saturating_sub(len)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_info() -> StreamInfo {
        StreamInfo {
            channels: 2,
            sample_rate: 44100.0,
            vendor: "Xiph.Org libVorbis I 20120203 (Omnipresent)".to_string(),
            comments: vec!["TITLE=Café".to_string(), "ARTIST=Someone".to_string()],
        }
    }

    #[test]
    fn test_file_info_table_layout() {
        let table = StatusDisplay::file_info_table(&create_test_info());
        let lines: Vec<&str> = table.lines().collect();

        assert!(lines[1].contains("FILE INFO"));
        assert!(lines[3].starts_with("│ TITLE "));
        assert!(lines[3].contains("Café"));
        assert!(lines[5].starts_with("├"));
        assert!(lines[6].contains("2 channel, 44100.0Hz"));
        assert!(lines[7].contains("Omnipresent"));
        assert!(lines[8].starts_with("└"));

        // Every line has the same display width
        let width = lines[0].chars().count();
        assert!(lines.iter().all(|line| line.chars().count() == width));
    }

    #[test]
    fn test_file_info_table_without_comments() {
        let info = StreamInfo {
            comments: Vec::new(),
            vendor: "v".to_string(),
            ..create_test_info()
        };
        let table = StatusDisplay::file_info_table(&info);

        assert_eq!(table.lines().filter(|line| line.starts_with("├")).count(), 1);
        assert!(table.contains("Bitstream"));
    }

    #[test]
    fn test_playback_summary() {
        let info = create_test_info();
        let events = StreamEventLog::new();
        assert_eq!(
            StatusDisplay::playback_summary(44100 * 61, &info, &events),
            "Decoded 2690100 samples per channel (01:01)"
        );

        events.record(&StreamError::MissingData);
        assert!(StatusDisplay::playback_summary(0, &info, &events).ends_with("1 gaps"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(StatusDisplay::format_duration(Duration::from_secs(0)), "00:00");
        assert_eq!(StatusDisplay::format_duration(Duration::from_secs(65)), "01:05");
        assert_eq!(StatusDisplay::format_duration(Duration::from_secs(3661)), "01:01:01");
    }

    #[test]
    fn test_channel_description() {
        assert_eq!(StatusDisplay::channel_description(1), "Mono");
        assert_eq!(StatusDisplay::channel_description(2), "Stereo");
        assert_eq!(StatusDisplay::channel_description(6), "5.1 Surround");
        assert_eq!(StatusDisplay::channel_description(32), "Multi-channel");
    }

    #[test]
    fn test_wrap_text() {
        let lines = StatusDisplay::wrap_text("one two three four", 9);
        assert_eq!(lines, vec!["one two", "three", "four"]);
    }

    #[test]
    fn test_display_functions_dont_panic() {
        StatusDisplay::display_file_info(&create_test_info());
        let error = PlayerError::Stream(StreamError::TruncatedStream);
        StatusDisplay::display_error(&error);
        StatusDisplay::display_simple_error(&error);
    }
}
