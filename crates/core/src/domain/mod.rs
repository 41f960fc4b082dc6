pub mod cart;
pub mod catalog;
pub mod order;
pub mod profile;
pub mod session;
pub mod turn;
