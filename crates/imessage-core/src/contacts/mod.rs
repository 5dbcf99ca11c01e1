//! Contact-name resolution from the local address book.

mod model;
mod repository;

pub use model::{AddressBook, normalize_phone, phone_variants};
pub use repository::ContactResolver;
