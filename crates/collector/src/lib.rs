pub mod client;

pub use client::{CollectorClient, CollectorError};
