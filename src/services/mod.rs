pub mod auth;
pub mod guard;
pub mod notify;
pub mod slots;
pub mod transitions;
