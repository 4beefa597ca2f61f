pub mod circuit_breaker;
pub mod directory;
pub mod fcm;
pub mod health;
pub mod log_sink;
pub mod lookup;
pub mod rbmq;
pub mod redis;
pub mod template;
