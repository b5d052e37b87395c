pub mod address;
pub mod batching;
pub mod config;
pub mod env_loader;
pub mod gazetteer;
pub mod geocoder;
pub mod models;
pub mod reconcile;
pub mod response;
pub mod similarity;
