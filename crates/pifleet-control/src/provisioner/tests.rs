//! Provisioner tests against the in-memory tunnel backend.

use std::sync::Arc;
use std::time::Duration;

use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Algorithm, Argon2, Params, PasswordHasher, Version};
use pifleet_core::{DeviceId, VncAccount};

use super::{ProvisionError, ProvisionSettings, Provisioner, RegistrationRequest, SagaStep};
use crate::auth::PasswordGate;
use crate::storage::{DeviceUpsert, FleetDatabase};
use crate::tunnel::ingress::{self, IngressPorts};
use crate::tunnel::{InMemoryTunnelApi, routing_target};

fn settings() -> ProvisionSettings {
    ProvisionSettings {
        domain: "example.com".into(),
        hostname_suffix: "fleet".into(),
        settle_delay: Duration::ZERO,
        ports: IngressPorts::default(),
    }
}

async fn setup() -> (Provisioner, Arc<InMemoryTunnelApi>, FleetDatabase) {
    let db = FleetDatabase::open_in_memory().await.unwrap();
    let api = Arc::new(InMemoryTunnelApi::new());
    let provisioner = Provisioner::new(db.clone(), api.clone(), PasswordGate::default(), settings());
    (provisioner, api, db)
}

fn request(id: &str) -> RegistrationRequest {
    RegistrationRequest::new(DeviceId::parse(id).unwrap())
}

fn cheap_hash(password: &str) -> String {
    let params = Params::new(1024, 1, 1, None).unwrap();
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let salt = SaltString::generate(&mut OsRng);
    argon2
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn registration_is_idempotent_without_reassign() {
    let (provisioner, api, _db) = setup().await;

    let first = provisioner.register(request("pi01")).await.unwrap();
    let second = provisioner.register(request("pi01")).await.unwrap();

    assert_eq!(first.hostname, "pi01-fleet.example.com");
    assert_eq!(first.hostname, second.hostname);
    assert_eq!(first.tunnel_id, second.tunnel_id);
    assert_eq!(api.create_count(), 1);
    assert_eq!(api.tunnels_named("fleet-pi01").await.len(), 1);
    // Fresh credential each call
    assert_eq!(api.token_count(), 2);
    assert_ne!(first.tunnel_token, second.tunnel_token);
}

#[tokio::test]
async fn reassign_replaces_the_tunnel() {
    let (provisioner, api, db) = setup().await;

    let first = provisioner.register(request("pi01")).await.unwrap();
    let mut req = request("pi01");
    req.reassign = true;
    let second = provisioner.register(req).await.unwrap();

    assert_ne!(first.tunnel_id, second.tunnel_id);
    assert_eq!(first.hostname, second.hostname);
    assert!(!api.tunnel_exists(&first.tunnel_id).await);

    let live = api.tunnels_named("fleet-pi01").await;
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].id, second.tunnel_id);

    let dns = api.dns_for(&second.hostname).await;
    assert_eq!(dns.len(), 1);
    assert_eq!(dns[0].content, routing_target(&second.tunnel_id));

    let stored = db.get_device("pi01").await.unwrap();
    assert_eq!(stored.tunnel_id.as_deref(), Some(second.tunnel_id.as_str()));
}

#[tokio::test]
async fn stale_same_name_tunnel_is_cleared_before_create() {
    let (provisioner, api, _db) = setup().await;
    let stale = api.insert_tunnel("fleet-pi02").await;

    let reg = provisioner.register(request("pi02")).await.unwrap();

    assert_ne!(reg.tunnel_id, stale.id);
    assert!(!api.tunnel_exists(&stale.id).await);
    assert_eq!(api.tunnels_named("fleet-pi02").await.len(), 1);
}

#[tokio::test]
async fn ingress_and_dns_are_bound_to_the_hostname() {
    let (provisioner, api, _db) = setup().await;
    let reg = provisioner.register(request("pi03")).await.unwrap();

    let rules = api.ingress_for(&reg.tunnel_id).await.unwrap();
    assert_eq!(rules, ingress::device_rules(&reg.hostname, IngressPorts::default()));

    // Re-registration rebinds rather than duplicating the record.
    provisioner.register(request("pi03")).await.unwrap();
    assert_eq!(api.dns_for(&reg.hostname).await.len(), 1);
}

#[tokio::test]
async fn retry_without_vnc_choice_keeps_stored_value() {
    let (provisioner, _api, db) = setup().await;

    let mut req = request("pi04");
    req.vnc_account = Some(VncAccount::Pi);
    provisioner.register(req).await.unwrap();
    provisioner.register(request("pi04")).await.unwrap();

    let stored = db.get_device("pi04").await.unwrap();
    assert_eq!(stored.vnc_account(), Some(VncAccount::Pi));
}

#[tokio::test]
async fn create_rejection_surfaces_and_persists_nothing() {
    let (provisioner, api, db) = setup().await;
    api.reject_creates(true);

    let err = provisioner.register(request("pi05")).await.unwrap_err();
    assert!(matches!(err, ProvisionError::TunnelCreateFailed(_)));
    assert!(db.find_device("pi05").await.unwrap().is_none());
}

#[tokio::test]
async fn persist_failure_reports_the_orphaned_tunnel() {
    let (provisioner, api, db) = setup().await;
    // Another row already owns the hostname pi06 will derive.
    db.upsert_device(&DeviceUpsert {
        device_id: "squatter",
        hostname: "pi06-fleet.example.com",
        tunnel_id: "t-squatter",
        friendly_name: None,
        location: None,
        vnc_account: None,
    })
    .await
    .unwrap();

    let err = provisioner.register(request("pi06")).await.unwrap_err();
    let ProvisionError::PersistFailed { tunnel_id, .. } = err else {
        panic!("expected PersistFailed, got {err:?}");
    };
    assert!(api.tunnel_exists(&tunnel_id).await);
    assert!(db.find_device("pi06").await.unwrap().is_none());
}

#[tokio::test]
async fn reused_tunnel_that_vanished_fails_at_credential_step() {
    let (provisioner, api, _db) = setup().await;
    let reg = provisioner.register(request("pi07")).await.unwrap();
    crate::tunnel::TunnelApi::delete_tunnel(api.as_ref(), &reg.tunnel_id)
        .await
        .unwrap();

    let err = provisioner.register(request("pi07")).await.unwrap_err();
    assert!(matches!(
        err,
        ProvisionError::Step {
            step: SagaStep::MintCredential,
            ..
        }
    ));

    // Reassignment recovers it.
    let mut req = request("pi07");
    req.reassign = true;
    let recovered = provisioner.register(req).await.unwrap();
    assert_ne!(recovered.tunnel_id, reg.tunnel_id);
}

#[tokio::test]
async fn concurrent_registrations_for_one_device_are_serialized() {
    let (provisioner, api, _db) = setup().await;
    let provisioner = Arc::new(provisioner);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let p = Arc::clone(&provisioner);
            tokio::spawn(async move { p.register(request("pi08")).await })
        })
        .collect();

    let mut ids = Vec::new();
    for h in handles {
        ids.push(h.await.unwrap().unwrap().tunnel_id);
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(api.create_count(), 1);
    assert_eq!(api.tunnels_named("fleet-pi08").await.len(), 1);
}

#[tokio::test]
async fn deprovision_removes_tunnel_dns_and_row() {
    let (provisioner, api, db) = setup().await;
    let reg = provisioner.register(request("pi09")).await.unwrap();
    let id = DeviceId::parse("pi09").unwrap();

    let removed = provisioner.deprovision(&id).await.unwrap();
    assert_eq!(removed.hostname, reg.hostname);
    assert!(!api.tunnel_exists(&reg.tunnel_id).await);
    assert!(api.dns_for(&reg.hostname).await.is_empty());
    assert!(db.find_device("pi09").await.unwrap().is_none());

    let err = provisioner.deprovision(&id).await.unwrap_err();
    assert!(matches!(err, ProvisionError::DeviceNotFound(_)));
}

#[tokio::test]
async fn authorize_checks_the_shared_password() {
    let db = FleetDatabase::open_in_memory().await.unwrap();
    let gate = PasswordGate::new(Some(cheap_hash("fleet-secret"))).unwrap();
    let provisioner = Provisioner::new(db, Arc::new(InMemoryTunnelApi::new()), gate, settings());

    assert!(provisioner.authorize("fleet-secret").is_ok());
    assert!(matches!(
        provisioner.authorize("wrong"),
        Err(ProvisionError::AuthFailed)
    ));
}

#[tokio::test]
async fn closed_gate_rejects_registration_password() {
    let (provisioner, _api, _db) = setup().await;
    assert!(matches!(
        provisioner.authorize("anything"),
        Err(ProvisionError::AuthFailed)
    ));
}
