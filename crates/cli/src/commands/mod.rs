//! CLI Commands

pub mod run;
