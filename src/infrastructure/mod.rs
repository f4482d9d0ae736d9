pub mod image_lease;

pub use image_lease::{BufferLedger, ImageBytes, ImageLease};
