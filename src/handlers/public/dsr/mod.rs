pub mod request;
pub mod track;
pub mod verify;
