pub mod analyzer;
pub mod app;
pub mod catalog;
pub mod cli;
pub mod codegen;
pub mod config;
pub mod dispatcher;
pub mod findings;
pub mod identity;
pub mod mutation;
pub mod payload;
pub mod runner;

#[cfg(test)]
mod tests;
