//! Core domain types and logic.

pub mod table;
pub mod features;
pub mod portfolio;
pub mod valuation;
pub mod transfer;
pub mod action;
pub mod reward;
pub mod env;
pub mod error;
