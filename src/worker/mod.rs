pub mod consumer;
pub mod disposition;
pub mod failure;
pub mod processor;
pub mod router;
