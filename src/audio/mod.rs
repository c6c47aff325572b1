//! audio - Call audio routing over the audio server's module interface
//!
//! Bridges the modem's ALSA card and the default input/output with
//! `module-loopback` instances while a voice call is up. The audio server is
//! driven through an asynchronous request/reply channel (`AudioServer`);
//! everything here runs on a single-threaded `LocalSet`.

mod audio_system;
mod card_lookup;
mod connection;
mod direction;
mod find_loopback;
mod instantiate;
mod pactl;
mod props;
mod server;
mod teardown;

#[cfg(test)]
pub(crate) mod mock;

pub use audio_system::AudioSystem;
pub use direction::Direction;
pub use instantiate::LoopbackTuning;
pub use pactl::PactlServer;

/// Module type used for every call audio route.
pub const LOOPBACK_MODULE: &str = "module-loopback";
