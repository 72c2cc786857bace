pub mod upload;
pub mod validation;
pub mod cleanup;
pub mod extraction;
pub mod features;
pub mod analysis;
pub mod scoring; // Best-effort relay to the external scoring service
pub mod processor;
