pub mod address;
pub mod cart;
pub mod cart_item;
pub mod coupon;
pub mod order;
pub mod order_item;
pub mod payment_callback;
pub mod payment_intent;
pub mod product;
pub mod wallet;
pub mod wallet_transaction;
