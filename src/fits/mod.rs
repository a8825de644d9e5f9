//! FITS-style container format
//!
//! Header cards, header/data units and the file-backed image store.

pub(crate) mod constants;
pub mod card;
pub mod hdu;
pub mod store;

pub use card::Card;
pub use hdu::{Hdu, Header};
pub use store::{FitsImageStore, ImageStore};
