pub mod booking;
pub mod event;
pub mod field;
pub mod shift;
pub mod time;
pub mod user;

pub use booking::{Booking, BookingStatus, PaymentStatus};
pub use event::BookingEvent;
pub use field::{Field, FieldStatus};
pub use shift::{Shift, ShiftSlot};
pub use time::{TimeOfDay, TimeRange};
pub use user::{Actor, Role};
