//! Device registry queries.

use pifleet_core::VncAccount;
use pifleet_core::db::{DatabaseError, unix_timestamp};

use super::db::FleetDatabase;
use super::models::{Device, DeviceUpdate};

/// Registration write: insert a new row or refresh an existing one.
#[derive(Debug, Clone)]
pub struct DeviceUpsert<'a> {
    pub device_id: &'a str,
    pub hostname: &'a str,
    pub tunnel_id: &'a str,
    pub friendly_name: Option<&'a str>,
    pub location: Option<&'a str>,
    /// `None` preserves whatever is stored.
    pub vnc_account: Option<VncAccount>,
}

/// Trim and map empty strings to `NULL`.
fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl FleetDatabase {
    /// Insert or refresh a device after a successful registration.
    ///
    /// `hostname` and `created_at` are fixed by the first insert. `last_seen`
    /// is always refreshed; `vnc_account` is only overwritten by a non-null
    /// value.
    pub async fn upsert_device(&self, params: &DeviceUpsert<'_>) -> Result<Device, DatabaseError> {
        let now = unix_timestamp();

        sqlx::query(
            "INSERT INTO devices (device_id, hostname, tunnel_id, friendly_name, location, vnc_account, created_at, last_seen) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(device_id) DO UPDATE SET \
               tunnel_id = excluded.tunnel_id, \
               friendly_name = excluded.friendly_name, \
               location = excluded.location, \
               vnc_account = COALESCE(excluded.vnc_account, devices.vnc_account), \
               last_seen = excluded.last_seen",
        )
        .bind(params.device_id)
        .bind(params.hostname)
        .bind(params.tunnel_id)
        .bind(normalize(params.friendly_name))
        .bind(normalize(params.location))
        .bind(params.vnc_account.map(VncAccount::as_str))
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_device(params.device_id).await
    }

    /// Get a device by id.
    pub async fn get_device(&self, device_id: &str) -> Result<Device, DatabaseError> {
        self.find_device(device_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Device {device_id}")))
    }

    /// Get a device by id, `None` when unregistered.
    pub async fn find_device(&self, device_id: &str) -> Result<Option<Device>, DatabaseError> {
        let device = sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE device_id = ?")
            .bind(device_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(device)
    }

    /// All devices in registry order.
    ///
    /// `rowid` is assigned on first insert and kept by the upsert, so
    /// re-registration does not move a device.
    pub async fn list_devices(&self) -> Result<Vec<Device>, DatabaseError> {
        let devices = sqlx::query_as::<_, Device>("SELECT * FROM devices ORDER BY rowid")
            .fetch_all(self.pool())
            .await?;
        Ok(devices)
    }

    /// Apply a sparse metadata update; only provided fields change.
    pub async fn update_device_metadata(
        &self,
        device_id: &str,
        update: &DeviceUpdate,
    ) -> Result<Device, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let current = sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE device_id = ?")
            .bind(device_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Device {device_id}")))?;

        let friendly_name = match &update.friendly_name {
            Some(v) => normalize(Some(v.as_str())),
            None => current.friendly_name.clone(),
        };
        let location = match &update.location {
            Some(v) => normalize(Some(v.as_str())),
            None => current.location.clone(),
        };
        let vnc_account = update.vnc_account.apply(current.vnc_account());

        sqlx::query(
            "UPDATE devices SET friendly_name = ?, location = ?, vnc_account = ? WHERE device_id = ?",
        )
        .bind(friendly_name)
        .bind(location)
        .bind(vnc_account.map(VncAccount::as_str))
        .bind(device_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.get_device(device_id).await
    }

    /// Refresh `last_seen`. Returns `false` for an unknown device.
    pub async fn touch_device(&self, device_id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE devices SET last_seen = ? WHERE device_id = ?")
            .bind(unix_timestamp())
            .bind(device_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Remove a device row.
    pub async fn remove_device(&self, device_id: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM devices WHERE device_id = ?")
            .bind(device_id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Count registered devices.
    pub async fn count_devices(&self) -> Result<i64, DatabaseError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM devices")
            .fetch_one(self.pool())
            .await?;
        Ok(row.0)
    }
}
