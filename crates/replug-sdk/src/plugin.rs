use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{AudioBuffer, BufferConfig, ChannelLayout};

/// Metadata describing a plugin exposed by a module.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PluginDescriptor {
    pub id: String,
    pub name: String,
    pub vendor: String,
    pub version: Option<String>,
    pub description: Option<String>,
}

impl PluginDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>, vendor: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            vendor: vendor.into(),
            version: None,
            description: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Display for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.vendor)
    }
}

/// Block-relative MIDI event forwarded to plugins alongside audio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiEvent {
    NoteOn {
        channel: u8,
        note: u8,
        velocity: u8,
        frame: u32,
    },
    NoteOff {
        channel: u8,
        note: u8,
        frame: u32,
    },
    ControlChange {
        channel: u8,
        control: u8,
        value: u8,
        frame: u32,
    },
    PitchBend {
        channel: u8,
        lsb: u8,
        msb: u8,
        frame: u32,
    },
}

impl MidiEvent {
    /// Sample offset of the event within the current audio block.
    pub fn frame(&self) -> u32 {
        match self {
            MidiEvent::NoteOn { frame, .. }
            | MidiEvent::NoteOff { frame, .. }
            | MidiEvent::ControlChange { frame, .. }
            | MidiEvent::PitchBend { frame, .. } => *frame,
        }
    }

    /// Construct an event from a raw three-byte MIDI message.
    pub fn from_raw(frame: u32, data: [u8; 3]) -> Self {
        let status = data[0] & 0xF0;
        let channel = data[0] & 0x0F;

        match status {
            0x90 => MidiEvent::NoteOn {
                channel,
                note: data[1],
                velocity: data[2],
                frame,
            },
            0xB0 => MidiEvent::ControlChange {
                channel,
                control: data[1],
                value: data[2],
                frame,
            },
            0xE0 => MidiEvent::PitchBend {
                channel,
                lsb: data[1],
                msb: data[2],
                frame,
            },
            _ => MidiEvent::NoteOff {
                channel,
                note: data[1],
                frame,
            },
        }
    }
}

/// Notification surface a host hands to the plugins it instantiates.
///
/// The link wraps shared atomics, so plugins may report from any thread
/// without blocking the caller. A host revokes a plugin's link by simply
/// creating a fresh one for the next plugin generation; writes through an old
/// link land in an orphaned slot.
#[derive(Debug, Clone, Default)]
pub struct HostLink {
    latency: Arc<AtomicU32>,
}

impl HostLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the plugin's current processing latency to the host.
    pub fn set_latency_samples(&self, samples: u32) {
        self.latency.store(samples, Ordering::SeqCst);
    }

    pub fn latency_samples(&self) -> u32 {
        self.latency.load(Ordering::SeqCst)
    }
}

/// Opaque editor component a plugin can expose.
///
/// Rendering is the embedding application's concern; the host only needs the
/// preferred size to lay the component out.
pub trait EditorUi: Send {
    fn size(&self) -> [u32; 2];
}

/// Real-time audio surface implemented by every plugin.
pub trait AudioProcessor: Send {
    fn descriptor(&self) -> PluginDescriptor;

    /// Prepare for processing with the given configuration. The layout in the
    /// config is a request; callers must re-read [`AudioProcessor::layout`]
    /// afterwards to learn what the plugin actually configured.
    fn prepare(&mut self, config: &BufferConfig) -> anyhow::Result<()>;

    fn process(&mut self, buffer: &mut AudioBuffer) -> anyhow::Result<()>;

    /// Consume queued MIDI events for the current block. The default ignores
    /// incoming data so effects need no extra code.
    fn process_midi(&mut self, _events: &[MidiEvent]) -> anyhow::Result<()> {
        Ok(())
    }

    /// The channel layout the plugin is currently configured for.
    fn layout(&self) -> ChannelLayout;

    fn supports_layout(&self, layout: ChannelLayout) -> bool {
        matches!(layout, ChannelLayout::Mono | ChannelLayout::Stereo)
    }

    /// Processing latency in samples. Plugins that change latency at runtime
    /// should additionally report through their [`HostLink`].
    fn latency_samples(&self) -> u32 {
        0
    }
}

/// Session persistence surface.
pub trait StateSerializable {
    fn save_state(&self) -> anyhow::Result<Vec<u8>>;
    fn load_state(&mut self, state: &[u8]) -> anyhow::Result<()>;
}

/// Full plugin surface instantiated from a module factory.
pub trait ModulePlugin: AudioProcessor + StateSerializable {
    /// Receive the host's notification link. Called once per instantiation,
    /// before the instance is published to the audio thread.
    fn connect_host(&mut self, _link: HostLink) {}

    fn create_editor(&mut self) -> Option<Box<dyn EditorUi>> {
        None
    }

    fn program_count(&self) -> usize {
        1
    }

    fn current_program(&self) -> usize {
        0
    }

    fn set_program(&mut self, _index: usize) {}

    fn program_name(&self, _index: usize) -> String {
        String::new()
    }
}
