pub mod audio;
pub mod youtube;

pub use audio::*;
pub use youtube::*;
