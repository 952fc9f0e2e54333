pub mod chat;
pub mod error;
pub mod views;

pub use chat::*;
pub use error::*;
pub use views::*;
