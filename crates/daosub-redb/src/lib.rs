//! Redb storage for the subscription coordinator

#![doc = include_str!("../README.md")]

pub mod error;
mod store;

pub use store::OrderRedbDatabase;
