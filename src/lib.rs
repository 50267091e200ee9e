// src/lib.rs

//! Face resolver library
//!
//! Resolves faces in uploaded images to identities held in a managed face
//! collection, registering unknown faces as new identities.

#[cfg(feature = "aws")]
pub mod aws;
pub mod config;
pub mod error;
pub mod handler;
#[cfg(feature = "lambda")]
pub mod lambda;
pub mod models;
pub mod pipeline;
pub mod recognition;
pub mod storage;

#[cfg(test)]
mod testing;
