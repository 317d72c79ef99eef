//! Audio subsystem: clip decoding, resampling, gain automation, voice mixing
//! and the output devices the mixer renders into.

pub mod automation;
pub mod decode;
pub mod headless;
pub mod mixer;
pub mod output;
pub mod resampler;
pub mod types;

pub use automation::GainAutomation;
pub use headless::HeadlessOutput;
pub use mixer::{Voice, VoiceMixer};
pub use output::{output_factory, CpalOutput, DeviceState, OutputDevice, OutputFactory};
pub use types::{AudioFrame, DecodedClip};
