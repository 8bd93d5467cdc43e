// =============================================================================
// Indicators Module
// =============================================================================
//
// Pure, side-effect-free numeric building blocks used by the analytics
// engine. Nothing in here touches the store or holds state across calls.

pub mod ema;
pub mod savgol;
