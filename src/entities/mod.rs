pub mod checkout;
pub mod media_asset;
pub mod order;
pub mod order_discount;
pub mod order_line;
pub mod payment;
pub mod payment_transaction;
pub mod thumbnail;
pub mod transaction_event;
pub mod transaction_item;
