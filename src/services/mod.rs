pub mod audit;
pub mod intake;
pub mod mailer;
pub mod processing;
pub mod tracking;
pub mod verification;
