// =============================================================================
// API Module
// =============================================================================
//
// Read-only HTTP JSON surface over the snapshot store and the analysis
// engine, fronted by a per-client response cache.

pub mod cache;
pub mod rest;
