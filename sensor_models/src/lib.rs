//! `sensor_models`: Coordinate transforms, the spherical observation model, sensor parameters.

pub mod coords;
pub mod observation;
pub mod sensor;

pub use coords::{to_cartesian, to_spherical, Cartesian, Spherical};
pub use observation::{MeasurementNoise, SphericalObservation};
pub use sensor::SensorParams;
