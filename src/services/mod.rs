pub mod addresses;
pub mod catalog;
pub mod checkout;
pub mod coupons;
pub mod invoices;
pub mod orders;
pub mod payments;
pub mod pricing;
pub mod wallet;
