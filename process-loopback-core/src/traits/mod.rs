pub mod audio_subsystem;
pub mod delivery;
