pub mod atmosphere;
pub mod solar_geometry;
pub mod clear_sky;
pub mod decomposition;
pub mod completion;
pub mod transposition;
pub mod pipeline;
pub mod mqtt_service;
