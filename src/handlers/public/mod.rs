pub mod csrf;
pub mod dsr;
