// Storefront
pub mod catalog;
pub mod checkout;
pub mod pricing;

// Orders and their lifecycle
pub mod order_status;
pub mod orders;
pub mod payment_confirmation;

// Customer Management
pub mod accounts;

// Analytics and Reporting
pub mod dashboard;
