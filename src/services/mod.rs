pub mod plex;
pub mod sync;
