pub mod session;
pub mod ws;
