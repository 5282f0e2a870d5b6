mod client;
mod phone;

pub use client::Client;
pub use phone::Phone;
