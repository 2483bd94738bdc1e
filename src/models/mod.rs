pub mod activity;
pub mod geo_sample;
pub mod route;
