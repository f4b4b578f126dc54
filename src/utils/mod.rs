pub mod coordinates;
pub mod time;

pub use coordinates::Coordinates;
pub use time::LocalClock;
