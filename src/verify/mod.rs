pub mod serializability;

pub use serializability::SerializabilityChecker;
