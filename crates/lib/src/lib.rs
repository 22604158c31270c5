pub mod chain;
pub mod config;
pub mod context;
pub mod interceptors;
pub mod nexus;
pub mod partition;
pub mod search;
pub mod service;
