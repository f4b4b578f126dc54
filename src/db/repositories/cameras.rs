use crate::{
    db::models::{Camera, CameraChanges, CameraStatus, NewCamera},
    db::repositories::CameraStore,
    error::{Error, Result},
};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{debug, error, info};

const CAMERA_COLUMNS: &str = "id, name, location, ip_address, coordinates, brand, version, \
                              status, last_update, rtsp_url, created_at, updated_at";

/// Cameras repository backed by PostgreSQL
#[derive(Clone)]
pub struct CamerasRepository {
    pool: Arc<PgPool>,
}

impl CamerasRepository {
    /// Create a new cameras repository
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

/// Map a failed write, turning unique violations into a conflict on `ip_address`
fn map_write_error(e: sqlx::Error, ip_address: Option<&str>, action: &str) -> Error {
    if let sqlx::Error::Database(db_err) = &e {
        if db_err.is_unique_violation() {
            return Error::duplicate_ip(ip_address.unwrap_or("<unknown>"));
        }
    }
    Error::Database(format!("Failed to {}: {}", action, e))
}

#[async_trait]
impl CameraStore for CamerasRepository {
    async fn get_by_id(&self, id: i32) -> Result<Option<Camera>> {
        let result = sqlx::query_as::<_, Camera>(&format!(
            "SELECT {} FROM cameras WHERE id = $1",
            CAMERA_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get camera by ID: {}", e)))?;

        Ok(result)
    }

    async fn get_by_ip(&self, ip_address: &str) -> Result<Option<Camera>> {
        let result = sqlx::query_as::<_, Camera>(&format!(
            "SELECT {} FROM cameras WHERE ip_address = $1",
            CAMERA_COLUMNS
        ))
        .bind(ip_address)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get camera by IP: {}", e)))?;

        Ok(result)
    }

    async fn list(&self, skip: i64, limit: i64) -> Result<Vec<Camera>> {
        let result = sqlx::query_as::<_, Camera>(&format!(
            "SELECT {} FROM cameras ORDER BY id OFFSET $1 LIMIT $2",
            CAMERA_COLUMNS
        ))
        .bind(skip.max(0))
        .bind(limit.max(0))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to list cameras: {}", e)))?;

        Ok(result)
    }

    async fn insert(&self, camera: &NewCamera) -> Result<Camera> {
        info!("Creating new camera: {} ({})", camera.name, camera.ip_address);

        let result = sqlx::query_as::<_, Camera>(&format!(
            r#"
            INSERT INTO cameras (
                name, location, ip_address, coordinates, brand, version,
                status, last_update, rtsp_url, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NOW())
            RETURNING {}
            "#,
            CAMERA_COLUMNS
        ))
        .bind(&camera.name)
        .bind(&camera.location)
        .bind(&camera.ip_address)
        .bind(&camera.coordinates)
        .bind(&camera.brand)
        .bind(&camera.version)
        .bind(camera.status)
        .bind(&camera.last_update)
        .bind(&camera.rtsp_url)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_write_error(e, Some(&camera.ip_address), "create camera"))?;

        Ok(result)
    }

    async fn update_fields(&self, id: i32, changes: &CameraChanges) -> Result<Option<Camera>> {
        debug!("Updating fields of camera {}", id);

        // Nullable columns take a "was provided" flag so that NULL can be written
        let result = sqlx::query_as::<_, Camera>(&format!(
            r#"
            UPDATE cameras
            SET name = COALESCE($1, name),
                location = COALESCE($2, location),
                ip_address = COALESCE($3, ip_address),
                coordinates = COALESCE($4, coordinates),
                brand = CASE WHEN $5 THEN $6 ELSE brand END,
                version = CASE WHEN $7 THEN $8 ELSE version END,
                rtsp_url = CASE WHEN $9 THEN $10 ELSE rtsp_url END,
                last_update = COALESCE($11, last_update),
                updated_at = NOW()
            WHERE id = $12
            RETURNING {}
            "#,
            CAMERA_COLUMNS
        ))
        .bind(&changes.name)
        .bind(&changes.location)
        .bind(&changes.ip_address)
        .bind(&changes.coordinates)
        .bind(changes.brand.is_some())
        .bind(changes.brand.clone().flatten())
        .bind(changes.version.is_some())
        .bind(changes.version.clone().flatten())
        .bind(changes.rtsp_url.is_some())
        .bind(changes.rtsp_url.clone().flatten())
        .bind(&changes.last_update)
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_write_error(e, changes.ip_address.as_deref(), "update camera"))?;

        Ok(result)
    }

    async fn update_status(
        &self,
        id: i32,
        status: CameraStatus,
        last_update: &str,
    ) -> Result<Option<Camera>> {
        let result = sqlx::query_as::<_, Camera>(&format!(
            r#"
            UPDATE cameras
            SET status = $1, last_update = $2, updated_at = NOW()
            WHERE id = $3
            RETURNING {}
            "#,
            CAMERA_COLUMNS
        ))
        .bind(status)
        .bind(last_update)
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to update camera status: {}", e)))?;

        Ok(result)
    }

    async fn delete(&self, id: i32) -> Result<Option<Camera>> {
        let result = sqlx::query_as::<_, Camera>(&format!(
            "DELETE FROM cameras WHERE id = $1 RETURNING {}",
            CAMERA_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to delete camera: {}", e)))?;

        Ok(result)
    }

    async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cameras")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to count cameras: {}", e)))?;

        Ok(count)
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&*self.pool)
            .await
            .map_err(|e| {
                error!("Database health check failed: {}", e);
                Error::Database(format!("Database health check failed: {}", e))
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations;
    use sqlx::postgres::PgPoolOptions;

    // Runs against a real database only when TEST_DATABASE_URL is set
    async fn test_repository() -> anyhow::Result<Option<CamerasRepository>> {
        let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
            println!("Skipping PostgreSQL test. Set TEST_DATABASE_URL to run.");
            return Ok(None);
        };

        let pool = PgPoolOptions::new().max_connections(2).connect(&url).await?;
        migrations::run_migrations(&pool).await?;
        sqlx::query("DELETE FROM cameras WHERE ip_address LIKE '10.254.%'")
            .execute(&pool)
            .await?;

        Ok(Some(CamerasRepository::new(Arc::new(pool))))
    }

    fn new_camera(ip_address: &str) -> NewCamera {
        NewCamera {
            name: "Library".to_string(),
            location: "Central Library".to_string(),
            ip_address: ip_address.to_string(),
            coordinates: Some("20.0442, 99.8945".to_string()),
            brand: Some("Dahua".to_string()),
            version: None,
            status: CameraStatus::Up,
            last_update: Some("2025-01-01 00:00:00".to_string()),
            rtsp_url: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_ip_is_conflict() -> anyhow::Result<()> {
        let Some(repo) = test_repository().await? else {
            return Ok(());
        };

        let first = repo.insert(&new_camera("10.254.0.1")).await?;
        let second = repo.insert(&new_camera("10.254.0.1")).await;
        assert!(matches!(second, Err(Error::AlreadyExists(_))));
        assert!(repo.get_by_id(first.id).await?.is_some());

        repo.delete(first.id).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_update_and_clear() -> anyhow::Result<()> {
        let Some(repo) = test_repository().await? else {
            return Ok(());
        };

        let camera = repo.insert(&new_camera("10.254.0.2")).await?;
        let changes = CameraChanges {
            name: Some("Library North".to_string()),
            brand: Some(None),
            ..Default::default()
        };
        let updated = repo
            .update_fields(camera.id, &changes)
            .await?
            .expect("camera exists");

        assert_eq!(updated.name, "Library North");
        assert_eq!(updated.location, "Central Library");
        assert_eq!(updated.brand, None);
        assert_eq!(updated.coordinates, camera.coordinates);
        assert_eq!(updated.status, CameraStatus::Up);

        repo.health_check().await?;
        let deleted = repo.delete(camera.id).await?;
        assert!(deleted.is_some());
        assert!(repo.get_by_id(camera.id).await?.is_none());
        Ok(())
    }
}
