pub mod consultation;
pub mod fields;
pub mod session;
