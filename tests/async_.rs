#[path = "async_/pool.rs"]
mod pool;
