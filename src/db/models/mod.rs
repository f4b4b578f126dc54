pub mod camera_models;

pub use camera_models::{
    Camera, CameraChanges, CameraStatus, CreateCameraRequest, NewCamera, UpdateCameraRequest,
};
