pub mod app;
pub mod archive;
pub mod blastdb;
pub mod checksum;
pub mod config;
pub mod domain;
pub mod error;
pub mod fasta;
pub mod fetcher;
pub mod logging;
pub mod ncbi;
pub mod output;
pub mod store;
pub mod tools;
pub mod tui;
