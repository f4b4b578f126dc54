use crate::config::MonitorConfig;
use crate::db::models::{Camera, CameraStatus, CreateCameraRequest, UpdateCameraRequest};
use crate::db::repositories::CameraStore;
use crate::error::{Error, Result};
use crate::services::network::Pinger;
use crate::utils::LocalClock;
use futures::FutureExt;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Result of reconciling one camera
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    Unchanged(CameraStatus),
    Changed { from: CameraStatus, to: CameraStatus },
    /// The camera disappeared between listing and writing
    Missing,
    Failed(Error),
}

/// Per-camera outcomes of one sweep, in the order cameras were checked
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub outcomes: Vec<(i32, CheckOutcome)>,
    pub listing_error: Option<Error>,
}

/// Counts reported by `POST /api/cameras/check`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub checked: usize,
    pub changed: usize,
    pub unchanged: usize,
    pub missing: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SweepReport {
    pub fn summary(&self) -> SweepSummary {
        let mut summary = SweepSummary {
            checked: self.outcomes.len(),
            error: self.listing_error.as_ref().map(|e| e.to_string()),
            ..Default::default()
        };
        for (_, outcome) in &self.outcomes {
            match outcome {
                CheckOutcome::Unchanged(_) => summary.unchanged += 1,
                CheckOutcome::Changed { .. } => summary.changed += 1,
                CheckOutcome::Missing => summary.missing += 1,
                CheckOutcome::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }

    pub fn log(&self) {
        if let Some(e) = &self.listing_error {
            error!("Status sweep could not list cameras: {}", e);
            return;
        }
        for (id, outcome) in &self.outcomes {
            if let CheckOutcome::Failed(e) = outcome {
                error!("Status check for camera {} failed: {}", id, e);
            }
        }
        let summary = self.summary();
        info!(
            "Status sweep finished: {} checked, {} changed, {} failed",
            summary.checked, summary.changed, summary.failed
        );
    }
}

/// Camera CRUD plus the reachability reconciler
pub struct CameraService {
    store: Arc<dyn CameraStore>,
    pinger: Arc<dyn Pinger>,
    clock: LocalClock,
    ping_timeout_secs: u64,
    sweep_limit: i64,
}

impl CameraService {
    pub fn new(
        store: Arc<dyn CameraStore>,
        pinger: Arc<dyn Pinger>,
        clock: LocalClock,
        monitor: &MonitorConfig,
    ) -> Self {
        Self {
            store,
            pinger,
            clock,
            ping_timeout_secs: monitor.ping_timeout_secs,
            sweep_limit: monitor.sweep_limit,
        }
    }

    pub async fn list(&self, skip: i64, limit: i64) -> Result<Vec<Camera>> {
        self.store.list(skip, limit).await
    }

    pub async fn get(&self, id: i32) -> Result<Camera> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::camera_not_found(id))
    }

    pub async fn count(&self) -> Result<i64> {
        self.store.count().await
    }

    pub async fn health_check(&self) -> Result<()> {
        self.store.health_check().await
    }

    pub async fn create(&self, request: CreateCameraRequest) -> Result<Camera> {
        let new_camera = request.into_new_camera(self.clock.timestamp())?;
        if self.store.get_by_ip(&new_camera.ip_address).await?.is_some() {
            return Err(Error::duplicate_ip(&new_camera.ip_address));
        }

        let camera = self.store.insert(&new_camera).await?;
        info!("Created camera {} ({})", camera.id, camera.ip_address);
        Ok(camera)
    }

    /// Apply a partial update. A `status` in the request is validated but never written.
    pub async fn update(&self, id: i32, request: UpdateCameraRequest) -> Result<Camera> {
        let existing = self.get(id).await?;
        request.validate()?;

        if let Some(ip_address) = request.ip_address.as_deref().map(str::trim) {
            if let Some(other) = self.store.get_by_ip(ip_address).await? {
                if other.id != id {
                    return Err(Error::duplicate_ip(ip_address));
                }
            }
        }

        let changes = request.into_changes(&existing, self.clock.timestamp());
        self.store
            .update_fields(id, &changes)
            .await?
            .ok_or_else(|| Error::camera_not_found(id))
    }

    pub async fn delete(&self, id: i32) -> Result<()> {
        let deleted = self
            .store
            .delete(id)
            .await?
            .ok_or_else(|| Error::camera_not_found(id))?;
        info!("Deleted camera {} ({})", deleted.id, deleted.ip_address);
        Ok(())
    }

    /// Ping one camera and persist its status if it changed
    pub async fn check_one(&self, id: i32) -> Result<Camera> {
        let camera = self.get(id).await?;
        let (camera, _) = self.reconcile(camera).await?;
        Ok(camera)
    }

    /// Ping every camera in id order; per-camera failures are recorded, not raised
    pub async fn check_all(&self) -> SweepReport {
        let cameras = match self.store.list(0, self.sweep_limit).await {
            Ok(cameras) => cameras,
            Err(e) => {
                return SweepReport {
                    outcomes: Vec::new(),
                    listing_error: Some(e),
                }
            }
        };

        let mut report = SweepReport::default();
        for camera in cameras {
            let id = camera.id;
            let outcome = match self.reconcile(camera).await {
                Ok((_, outcome)) => outcome,
                Err(Error::NotFound(_)) => CheckOutcome::Missing,
                Err(e) => CheckOutcome::Failed(e),
            };
            report.outcomes.push((id, outcome));
        }
        report
    }

    async fn reconcile(&self, camera: Camera) -> Result<(Camera, CheckOutcome)> {
        // A panicking pinger counts as unreachable
        let reachable = AssertUnwindSafe(
            self.pinger
                .is_reachable(&camera.ip_address, self.ping_timeout_secs),
        )
        .catch_unwind()
        .await
        .unwrap_or_else(|_| {
            warn!("Reachability check of {} panicked", camera.ip_address);
            false
        });
        let new_status = CameraStatus::from_reachable(reachable);

        if new_status == camera.status {
            debug!("Camera {} still {}", camera.id, new_status);
            return Ok((camera, CheckOutcome::Unchanged(new_status)));
        }

        let updated = self
            .store
            .update_status(camera.id, new_status, &self.clock.timestamp())
            .await?
            .ok_or_else(|| Error::camera_not_found(camera.id))?;
        info!(
            "Camera {} ({}) status changed: {} -> {}",
            updated.id, updated.ip_address, camera.status, new_status
        );

        Ok((
            updated,
            CheckOutcome::Changed {
                from: camera.status,
                to: new_status,
            },
        ))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::db::repositories::memory::MemoryCameraStore;
    use crate::services::network::testing::ScriptedPinger;
    use crate::utils::Coordinates;

    fn fixture() -> (Arc<MemoryCameraStore>, Arc<ScriptedPinger>, CameraService) {
        let store = Arc::new(MemoryCameraStore::new());
        let pinger = Arc::new(ScriptedPinger::new());
        let service = service_with(store.clone(), pinger.clone());
        (store, pinger, service)
    }

    #[tokio::test]
    async fn test_create_stores_coordinates_and_status() -> anyhow::Result<()> {
        let (_, _, service) = fixture();
        let camera = service
            .create(create_request("Main Gate", "192.168.1.100"))
            .await?;

        assert_eq!(camera.status, CameraStatus::Up);
        assert_eq!(camera.coordinates(), Coordinates::new(18.123, 98.456));
        assert_eq!(service.get(camera.id).await?, camera);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_ip_is_conflict() -> anyhow::Result<()> {
        let (_, _, service) = fixture();
        let first = service.create(create_request("A", "10.0.0.1")).await?;
        let second = service.create(create_request("B", "10.0.0.1")).await;

        assert!(matches!(second, Err(Error::AlreadyExists(_))));
        assert_eq!(service.get(first.id).await?.name, "A");
        assert_eq!(service.count().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_merges_latitude_only() -> anyhow::Result<()> {
        let (_, _, service) = fixture();
        let mut request = create_request("A", "10.0.0.1");
        request.latitude = 10.0;
        request.longitude = 20.0;
        let camera = service.create(request).await?;
        assert_eq!(camera.coordinates.as_deref(), Some("10, 20"));

        let update = UpdateCameraRequest {
            latitude: Some(15.0),
            ..Default::default()
        };
        let updated = service.update(camera.id, update).await?;

        assert_eq!(updated.coordinates(), Coordinates::new(15.0, 20.0));
        assert_eq!(updated.name, "A");
        Ok(())
    }

    #[tokio::test]
    async fn test_update_ignores_status() -> anyhow::Result<()> {
        let (_, _, service) = fixture();
        let camera = service.create(create_request("A", "10.0.0.1")).await?;

        let update = UpdateCameraRequest {
            name: Some("Renamed".to_string()),
            status: Some("maintenance".to_string()),
            ..Default::default()
        };
        let updated = service.update(camera.id, update).await?;

        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.status, CameraStatus::Up);
        Ok(())
    }

    #[tokio::test]
    async fn test_update_to_taken_ip_is_conflict() -> anyhow::Result<()> {
        let (_, _, service) = fixture();
        service.create(create_request("A", "10.0.0.1")).await?;
        let b = service.create(create_request("B", "10.0.0.2")).await?;

        let update = UpdateCameraRequest {
            ip_address: Some("10.0.0.1".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            service.update(b.id, update).await,
            Err(Error::AlreadyExists(_))
        ));

        // Re-submitting its own address is fine
        let update = UpdateCameraRequest {
            ip_address: Some("10.0.0.2".to_string()),
            ..Default::default()
        };
        assert_eq!(service.update(b.id, update).await?.ip_address, "10.0.0.2");
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_camera_is_not_found_everywhere() -> anyhow::Result<()> {
        let (_, _, service) = fixture();
        let camera = service.create(create_request("A", "10.0.0.1")).await?;
        service.delete(camera.id).await?;

        let expected = Error::camera_not_found(camera.id);
        assert_eq!(service.get(camera.id).await, Err(expected.clone()));
        assert_eq!(service.delete(camera.id).await, Err(expected.clone()));
        assert_eq!(service.check_one(camera.id).await, Err(expected.clone()));
        assert_eq!(
            service
                .update(camera.id, UpdateCameraRequest::default())
                .await,
            Err(expected)
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_check_one_unreachable_is_stable() -> anyhow::Result<()> {
        let (store, pinger, service) = fixture();
        let camera = service.create(create_request("A", "10.0.0.1")).await?;
        pinger.set("10.0.0.1", false);

        let first = service.check_one(camera.id).await?;
        assert_eq!(first.status, CameraStatus::Down);

        let second = service.check_one(camera.id).await?;
        assert_eq!(second.status, CameraStatus::Down);
        assert_eq!(second.last_update, first.last_update);
        assert_eq!(store.status_writes(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_check_one_brings_camera_back_up() -> anyhow::Result<()> {
        let (_, pinger, service) = fixture();
        let camera = service.create(create_request("A", "10.0.0.1")).await?;

        pinger.set("10.0.0.1", false);
        service.check_one(camera.id).await?;
        pinger.set("10.0.0.1", true);

        assert_eq!(service.check_one(camera.id).await?.status, CameraStatus::Up);
        Ok(())
    }

    #[tokio::test]
    async fn test_sweep_continues_past_failed_write() -> anyhow::Result<()> {
        let (store, pinger, service) = fixture();
        let mut ids = Vec::new();
        for (name, ip) in [("A", "10.0.0.1"), ("B", "10.0.0.2"), ("C", "10.0.0.3")] {
            ids.push(service.create(create_request(name, ip)).await?.id);
        }
        store.fail_status_writes_for(ids[1]);

        let report = service.check_all().await;

        assert_eq!(pinger.pings(), vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        assert_eq!(report.outcomes.len(), 3);
        assert!(matches!(report.outcomes[1].1, CheckOutcome::Failed(_)));
        assert_eq!(service.get(ids[0]).await?.status, CameraStatus::Down);
        assert_eq!(service.get(ids[1]).await?.status, CameraStatus::Up);
        assert_eq!(service.get(ids[2]).await?.status, CameraStatus::Down);

        let summary = report.summary();
        assert_eq!(summary.changed, 2);
        assert_eq!(summary.failed, 1);
        Ok(())
    }

    /// Panics for one address, reports every other one unreachable
    struct PanickingPinger {
        panics_for: &'static str,
    }

    #[async_trait::async_trait]
    impl Pinger for PanickingPinger {
        async fn is_reachable(&self, ip_address: &str, _timeout_secs: u64) -> bool {
            if ip_address == self.panics_for {
                panic!("ping failed for {}", ip_address);
            }
            false
        }
    }

    #[tokio::test]
    async fn test_sweep_continues_past_panicking_pinger() -> anyhow::Result<()> {
        let store = Arc::new(MemoryCameraStore::new());
        let service = Arc::new(CameraService::new(
            store,
            Arc::new(PanickingPinger {
                panics_for: "10.0.0.2",
            }),
            LocalClock::default(),
            &MonitorConfig::default(),
        ));
        let mut ids = Vec::new();
        for (name, ip) in [("A", "10.0.0.1"), ("B", "10.0.0.2"), ("C", "10.0.0.3")] {
            ids.push(service.create(create_request(name, ip)).await?.id);
        }

        let sweep_service = Arc::clone(&service);
        let report = tokio::spawn(async move { sweep_service.check_all().await }).await?;

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.summary().changed, 3);
        for id in ids {
            assert_eq!(service.get(id).await?.status, CameraStatus::Down);
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_check_one_survives_panicking_pinger() -> anyhow::Result<()> {
        let service = CameraService::new(
            Arc::new(MemoryCameraStore::new()),
            Arc::new(PanickingPinger {
                panics_for: "10.0.0.1",
            }),
            LocalClock::default(),
            &MonitorConfig::default(),
        );
        let camera = service.create(create_request("A", "10.0.0.1")).await?;

        assert_eq!(service.check_one(camera.id).await?.status, CameraStatus::Down);
        Ok(())
    }

    #[tokio::test]
    async fn test_sweep_records_listing_failure() -> anyhow::Result<()> {
        let (store, _, service) = fixture();
        store.fail_listing();

        let report = service.check_all().await;
        assert!(report.outcomes.is_empty());
        assert!(matches!(report.listing_error, Some(Error::Database(_))));
        assert!(report.summary().error.is_some());
        Ok(())
    }
}
