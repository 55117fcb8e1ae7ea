//! # Architecture Abstraction Layer
//!
//! Hardware glue for the kernel. Currently implements the Cortex-M4 port
//! (STM32F401); other targets add sibling modules.

pub mod cortex_m4;
