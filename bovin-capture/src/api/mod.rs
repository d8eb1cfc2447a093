//! HTTP API handlers for bovin-capture

pub mod cameras;
pub mod capture_workflow;
pub mod health;
pub mod sse;

pub use cameras::camera_routes;
pub use capture_workflow::workflow_routes;
pub use health::health_routes;
pub use sse::workflow_event_stream;
