pub mod pool;
pub mod session;
