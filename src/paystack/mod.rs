pub mod client;

pub use client::PaystackClient;
