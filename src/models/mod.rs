pub mod principal;
pub mod scope;
pub mod token;
