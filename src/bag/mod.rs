pub mod assembler;
pub mod error;
pub mod info;
pub mod manifest;
mod tar_write;

pub use assembler::{Bag, SerializedBag};
pub use error::BagError;
pub use info::{Access, AptrustInfo, BagInfo};
