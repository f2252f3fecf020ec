pub mod adapter;
pub mod btle;
pub mod connection;
pub mod constants;
pub mod machine;
pub mod pairing;
pub mod platform;
pub mod types;
#[cfg(test)]
pub mod testing;
