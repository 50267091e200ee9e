// src/pipeline/mod.rs

pub mod crop;
pub mod resolve;

pub use crop::{crop, decode_image, pixel_box};
pub use resolve::{CollectionStatus, IdentityResolver, region_fingerprint};
