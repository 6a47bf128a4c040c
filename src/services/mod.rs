pub mod orders;
pub mod thumbnails;
pub mod transactions;
