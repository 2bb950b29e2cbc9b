use serde::{Deserialize, Serialize};

/// Channel configuration negotiated between a host and a plugin.
///
/// Replug only brokers mono and stereo layouts; the input layout always
/// matches the output layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelLayout {
    Mono,
    Stereo,
}

impl ChannelLayout {
    pub fn channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }
}

/// Processing configuration handed to plugins during preparation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BufferConfig {
    pub sample_rate: f64,
    pub block_size: usize,
    pub layout: ChannelLayout,
}

impl BufferConfig {
    pub fn new(sample_rate: f64, block_size: usize, layout: ChannelLayout) -> Self {
        Self {
            sample_rate,
            block_size,
            layout,
        }
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self::new(44_100.0, 512, ChannelLayout::Stereo)
    }
}

/// Non-interleaved audio buffer shared between host and plugin.
#[derive(Debug, Clone, Default)]
pub struct AudioBuffer {
    channels: Vec<Vec<f32>>,
}

impl AudioBuffer {
    pub fn new(num_channels: usize, block_size: usize) -> Self {
        let channels = (0..num_channels).map(|_| vec![0.0; block_size]).collect();
        Self { channels }
    }

    pub fn from_config(config: &BufferConfig) -> Self {
        Self::new(config.layout.channels(), config.block_size)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames per channel.
    pub fn len(&self) -> usize {
        self.channels
            .first()
            .map(|channel| channel.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0.0);
        }
    }

    pub fn resize(&mut self, num_channels: usize, block_size: usize) {
        self.channels.resize_with(num_channels, Vec::new);
        for channel in &mut self.channels {
            channel.resize(block_size, 0.0);
        }
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        self.channels.iter().map(Vec::as_slice)
    }

    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut [f32]> {
        self.channels.iter_mut().map(Vec::as_mut_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_matches_config_shape() {
        let config = BufferConfig::new(48_000.0, 256, ChannelLayout::Stereo);
        let buffer = AudioBuffer::from_config(&config);
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.len(), 256);
    }

    #[test]
    fn resize_reshapes_existing_channels() {
        let mut buffer = AudioBuffer::new(1, 64);
        buffer.channel_mut(0).fill(1.0);
        buffer.resize(2, 128);
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.len(), 128);
        assert_eq!(buffer.channel(1)[0], 0.0);
    }

    #[test]
    fn clear_zeroes_all_channels() {
        let mut buffer = AudioBuffer::new(2, 8);
        for channel in buffer.channels_mut() {
            channel.fill(0.5);
        }
        buffer.clear();
        assert!(buffer.channels().all(|c| c.iter().all(|s| *s == 0.0)));
    }
}
