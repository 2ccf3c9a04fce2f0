// Competing-consumer client library
pub mod subscription;
