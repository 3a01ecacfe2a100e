//! Engine-owned state: round and game data plus the pure reducer that
//! drives all transitions.

pub mod game;
pub mod machine;
pub mod phase;
pub mod round;
