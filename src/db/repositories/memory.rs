//! In-memory `CameraStore` used by unit tests.

use super::CameraStore;
use crate::db::models::{Camera, CameraChanges, CameraStatus, NewCamera};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

#[derive(Default)]
struct Inner {
    rows: BTreeMap<i32, Camera>,
    next_id: i32,
    failing_status_writes: HashSet<i32>,
    fail_listing: bool,
    unhealthy: bool,
    status_writes: usize,
}

#[derive(Default)]
pub struct MemoryCameraStore {
    inner: Mutex<Inner>,
}

impl MemoryCameraStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every status write for `id` fail with a database error
    pub fn fail_status_writes_for(&self, id: i32) {
        self.inner.lock().unwrap().failing_status_writes.insert(id);
    }

    pub fn fail_listing(&self) {
        self.inner.lock().unwrap().fail_listing = true;
    }

    /// Make health checks fail as if the database were unreachable
    pub fn set_unhealthy(&self) {
        self.inner.lock().unwrap().unhealthy = true;
    }

    /// Number of successful status writes so far
    pub fn status_writes(&self) -> usize {
        self.inner.lock().unwrap().status_writes
    }
}

fn ip_taken(inner: &Inner, ip_address: &str, except: Option<i32>) -> bool {
    inner
        .rows
        .values()
        .any(|c| c.ip_address == ip_address && Some(c.id) != except)
}

#[async_trait]
impl CameraStore for MemoryCameraStore {
    async fn get_by_id(&self, id: i32) -> Result<Option<Camera>> {
        Ok(self.inner.lock().unwrap().rows.get(&id).cloned())
    }

    async fn get_by_ip(&self, ip_address: &str) -> Result<Option<Camera>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .rows
            .values()
            .find(|c| c.ip_address == ip_address)
            .cloned())
    }

    async fn list(&self, skip: i64, limit: i64) -> Result<Vec<Camera>> {
        let inner = self.inner.lock().unwrap();
        if inner.fail_listing {
            return Err(Error::Database("listing failed".to_string()));
        }
        Ok(inner
            .rows
            .values()
            .skip(skip.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn insert(&self, camera: &NewCamera) -> Result<Camera> {
        let mut inner = self.inner.lock().unwrap();
        if ip_taken(&inner, &camera.ip_address, None) {
            return Err(Error::duplicate_ip(&camera.ip_address));
        }

        inner.next_id += 1;
        let row = Camera {
            id: inner.next_id,
            name: camera.name.clone(),
            location: camera.location.clone(),
            ip_address: camera.ip_address.clone(),
            coordinates: camera.coordinates.clone(),
            brand: camera.brand.clone(),
            version: camera.version.clone(),
            status: camera.status,
            last_update: camera.last_update.clone(),
            rtsp_url: camera.rtsp_url.clone(),
            created_at: Utc::now(),
            updated_at: None,
        };
        inner.rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_fields(&self, id: i32, changes: &CameraChanges) -> Result<Option<Camera>> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(ip) = &changes.ip_address {
            if ip_taken(&inner, ip, Some(id)) {
                return Err(Error::duplicate_ip(ip));
            }
        }

        let Some(row) = inner.rows.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = &changes.name {
            row.name = name.clone();
        }
        if let Some(location) = &changes.location {
            row.location = location.clone();
        }
        if let Some(ip) = &changes.ip_address {
            row.ip_address = ip.clone();
        }
        if let Some(coordinates) = &changes.coordinates {
            row.coordinates = Some(coordinates.clone());
        }
        if let Some(brand) = &changes.brand {
            row.brand = brand.clone();
        }
        if let Some(version) = &changes.version {
            row.version = version.clone();
        }
        if let Some(rtsp_url) = &changes.rtsp_url {
            row.rtsp_url = rtsp_url.clone();
        }
        if let Some(last_update) = &changes.last_update {
            row.last_update = Some(last_update.clone());
        }
        row.updated_at = Some(Utc::now());
        Ok(Some(row.clone()))
    }

    async fn update_status(
        &self,
        id: i32,
        status: CameraStatus,
        last_update: &str,
    ) -> Result<Option<Camera>> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing_status_writes.contains(&id) {
            return Err(Error::Database(format!("status write for camera {} failed", id)));
        }

        let updated = inner.rows.get_mut(&id).map(|row| {
            row.status = status;
            row.last_update = Some(last_update.to_string());
            row.updated_at = Some(Utc::now());
            row.clone()
        });
        if updated.is_some() {
            inner.status_writes += 1;
        }
        Ok(updated)
    }

    async fn delete(&self, id: i32) -> Result<Option<Camera>> {
        Ok(self.inner.lock().unwrap().rows.remove(&id))
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.inner.lock().unwrap().rows.len() as i64)
    }

    async fn health_check(&self) -> Result<()> {
        if self.inner.lock().unwrap().unhealthy {
            return Err(Error::Database("database unreachable".to_string()));
        }
        Ok(())
    }
}
