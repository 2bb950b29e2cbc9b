//! Minimal Replug module that applies a constant gain.

use replug_sdk::declare_replug_module;
use replug_sdk::prelude::*;

struct TestGain {
    gain: f32,
    layout: ChannelLayout,
}

impl TestGain {
    fn descriptor() -> PluginDescriptor {
        PluginDescriptor::new("dev.replug.testgain", "Test Gain", "Replug Project")
            .with_version("0.1.0")
            .with_description("A reference module that applies a constant gain")
    }
}

impl AudioProcessor for TestGain {
    fn descriptor(&self) -> PluginDescriptor {
        Self::descriptor()
    }

    fn prepare(&mut self, config: &BufferConfig) -> anyhow::Result<()> {
        self.layout = config.layout;
        Ok(())
    }

    fn process(&mut self, buffer: &mut AudioBuffer) -> anyhow::Result<()> {
        for channel in buffer.channels_mut() {
            for sample in channel {
                *sample *= self.gain;
            }
        }
        Ok(())
    }

    fn layout(&self) -> ChannelLayout {
        self.layout
    }
}

impl StateSerializable for TestGain {
    fn save_state(&self) -> anyhow::Result<Vec<u8>> {
        Ok(self.gain.to_le_bytes().to_vec())
    }

    fn load_state(&mut self, state: &[u8]) -> anyhow::Result<()> {
        let bytes: [u8; 4] = state
            .try_into()
            .map_err(|_| anyhow::anyhow!("gain state must be 4 bytes"))?;
        self.gain = f32::from_le_bytes(bytes);
        Ok(())
    }
}

impl ModulePlugin for TestGain {
    fn connect_host(&mut self, link: HostLink) {
        // Gain is zero-latency; say so explicitly.
        link.set_latency_samples(0);
    }
}

struct TestGainFactory;

impl PluginFactory for TestGainFactory {
    fn descriptor(&self) -> PluginDescriptor {
        TestGain::descriptor()
    }

    fn create(&self) -> Box<dyn ModulePlugin> {
        Box::new(TestGain {
            gain: 0.5,
            layout: ChannelLayout::Stereo,
        })
    }
}

declare_replug_module!(TestGainFactory);
