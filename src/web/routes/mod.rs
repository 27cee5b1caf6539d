pub mod manager_routes;
pub mod tracking_routes;
