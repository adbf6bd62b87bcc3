pub mod context;
pub mod doctor;
pub mod events;
pub mod knowledge;
pub mod onboard;
