//! HTTP API handlers

pub mod generate;
pub mod health;
pub mod images;
pub mod relay;

pub use generate::generate_routes;
pub use health::health_routes;
pub use images::image_routes;
pub use relay::relay_routes;
