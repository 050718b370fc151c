pub mod crd;
pub mod image;

pub use crd::{RegistryKind, VersioningHandler, VersioningHandlerSpec};
pub use image::ImageRef;
