pub mod dispatch;
pub mod scripts;
