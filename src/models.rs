use serde::{Deserialize, Serialize};

/// Basic information about the audio in a Vorbis bitstream.
///
/// Captured once header negotiation completes and never modified afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamInfo {
    pub channels: usize,
    pub sample_rate: f64,
    pub vendor: String,
    /// Raw `KEY=value` user comments in stream order. Keys may repeat.
    pub comments: Vec<String>,
}

impl StreamInfo {
    /// Comments split on the first `=`. Entries without a separator get an empty value.
    pub fn comment_pairs(&self) -> Vec<(&str, &str)> {
        self.comments
            .iter()
            .map(|comment| match comment.split_once('=') {
                Some((key, value)) => (key, value),
                None => (comment.as_str(), ""),
            })
            .collect()
    }

    /// First value stored under `key`. Field names compare case-insensitively.
    pub fn comment(&self, key: &str) -> Option<&str> {
        self.comment_pairs()
            .into_iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    /// Get a short description of the bitstream format
    pub fn format_description(&self) -> String {
        format!("{} channel, {:.1}Hz", self.channels, self.sample_rate)
    }
}

/// A block of decoded PCM: one entry per sample, each holding one value per channel.
///
/// Every frame a decoder emits holds exactly `samples_per_channel` samples,
/// except the final one of a stream which may be shorter but never empty.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    samples: Vec<Vec<f32>>,
}

impl Frame {
    pub fn with_capacity(samples_per_channel: usize) -> Self {
        Self {
            samples: Vec::with_capacity(samples_per_channel),
        }
    }

    pub fn from_samples(samples: Vec<Vec<f32>>) -> Self {
        Self { samples }
    }

    pub(crate) fn push(&mut self, sample: Vec<f32>) {
        self.samples.push(sample);
    }

    pub fn samples(&self) -> &[Vec<f32>] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<Vec<f32>> {
        self.samples
    }

    /// Number of samples per channel in this frame
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn channels(&self) -> usize {
        self.samples.first().map_or(0, Vec::len)
    }

    /// Flatten into LRLR... order for output devices
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut interleaved = Vec::with_capacity(self.len() * self.channels());
        for sample in &self.samples {
            interleaved.extend_from_slice(sample);
        }
        interleaved
    }
}
