//! Staged plan execution modules

pub mod filter;
pub mod aggregate;
pub mod project;
pub mod topk;
pub mod order_limit;
