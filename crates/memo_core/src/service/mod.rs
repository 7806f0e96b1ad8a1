//! Use-case services over repository contracts.
//!
//! # Responsibility
//! - Keep memo editing flows storage-agnostic.

pub mod memo_service;
