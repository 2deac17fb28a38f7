pub mod irradiance;
pub mod location;
pub mod message;
