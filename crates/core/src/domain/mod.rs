pub mod forecast;
pub mod records;
pub mod weather;
