pub mod clock;

pub use clock::{Clock, FakeClock, SystemClock, days_before, hours_before};
