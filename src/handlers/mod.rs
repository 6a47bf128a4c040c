pub mod orders;
pub mod payments;
pub mod thumbnails;
pub mod transactions;
