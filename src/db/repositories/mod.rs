use crate::db::models::{Camera, CameraChanges, CameraStatus, NewCamera};
use crate::error::Result;
use async_trait::async_trait;

pub mod cameras;
#[cfg(test)]
pub mod memory;

pub use cameras::CamerasRepository;

/// Persistence operations the camera service relies on.
///
/// Lookups that miss return `Ok(None)`; `ip_address` uniqueness violations
/// surface as `Error::AlreadyExists`.
#[async_trait]
pub trait CameraStore: Send + Sync {
    async fn get_by_id(&self, id: i32) -> Result<Option<Camera>>;

    async fn get_by_ip(&self, ip_address: &str) -> Result<Option<Camera>>;

    /// Cameras ordered by id, skipping `skip` rows and returning at most `limit`
    async fn list(&self, skip: i64, limit: i64) -> Result<Vec<Camera>>;

    async fn insert(&self, camera: &NewCamera) -> Result<Camera>;

    async fn update_fields(&self, id: i32, changes: &CameraChanges) -> Result<Option<Camera>>;

    async fn update_status(
        &self,
        id: i32,
        status: CameraStatus,
        last_update: &str,
    ) -> Result<Option<Camera>>;

    /// Remove a camera permanently, returning the deleted row
    async fn delete(&self, id: i32) -> Result<Option<Camera>>;

    async fn count(&self) -> Result<i64>;

    /// Fails with `Error::Database` when the backing store cannot be reached
    async fn health_check(&self) -> Result<()>;
}
