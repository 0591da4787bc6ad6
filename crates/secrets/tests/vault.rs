use std::sync::Arc;

use rdssh_secrets::{CredentialService, CredentialVault, MemoryVault};

fn service() -> (MemoryVault, CredentialService) {
    let vault = MemoryVault::new();
    let service = CredentialService::new(Arc::new(vault.clone()));
    (vault, service)
}

#[test]
fn stores_and_resolves_credentials_by_id() {
    let (vault, service) = service();

    let summary = service
        .store("alice", Some("CORP"), "pw")
        .expect("store credential");

    let target = format!("RDSSH\\alice|{}", summary.id);
    assert!(vault.read(&target).expect("raw read").is_some());

    let record = service
        .resolve(summary.id)
        .expect("resolve")
        .expect("credential present");
    assert_eq!(record.username, "alice");
    assert_eq!(record.domain.as_deref(), Some("CORP"));
    assert_eq!(record.secret.as_str(), "pw");
}

#[test]
fn unknown_ids_resolve_to_none() {
    let (_, service) = service();
    assert!(service.resolve(uuid::Uuid::new_v4()).expect("resolve").is_none());
    assert!(!service.remove(uuid::Uuid::new_v4()).expect("remove"));
}

#[test]
fn lists_only_application_credentials() {
    let (vault, service) = service();
    vault
        .write("OtherApp\\bob", "bob", "x", None)
        .expect("foreign write");
    vault
        .write("RDSSH\\legacy-without-id", "carol", "x", None)
        .expect("legacy write");

    let stored = service.store("alice", None, "pw").expect("store");

    let listed = service.list().expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, stored.id);
    assert_eq!(listed[0].domain, None);
}

#[test]
fn update_renames_the_vault_entry() {
    let (vault, service) = service();
    let stored = service.store("alice", None, "pw").expect("store");

    service
        .update(stored.id, "alice2", Some("CORP"), "pw2")
        .expect("update");

    assert!(vault
        .read(&format!("RDSSH\\alice|{}", stored.id))
        .expect("old read")
        .is_none());
    let record = service
        .resolve(stored.id)
        .expect("resolve")
        .expect("credential present");
    assert_eq!(record.username, "alice2");
    assert_eq!(record.secret.as_str(), "pw2");
}

#[test]
fn remove_deletes_the_entry() {
    let (_, service) = service();
    let stored = service.store("alice", None, "pw").expect("store");

    assert!(service.remove(stored.id).expect("remove"));
    assert!(service.resolve(stored.id).expect("resolve").is_none());
    assert!(service.list().expect("list").is_empty());
}

#[test]
fn blank_usernames_are_rejected() {
    let (_, service) = service();
    assert!(service.store("  ", None, "pw").is_err());
}
