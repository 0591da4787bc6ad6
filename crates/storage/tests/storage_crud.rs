use rdssh_domain::{ConnectionIndexFile, ConnectionProfile, Protocol};
use rdssh_storage::ConnectionStore;

fn temp_dir() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("rdssh-store-{}", uuid::Uuid::new_v4()))
}

fn rdp_profile(host: &str, name: &str) -> ConnectionProfile {
    let mut profile = ConnectionProfile::new(Protocol::Rdp, host);
    profile.display_name = name.into();
    profile
}

#[tokio::test]
async fn upserts_and_reloads_in_order() {
    let dir = temp_dir();
    let store = ConnectionStore::open(&dir).await.expect("store open");
    assert!(store.list().await.is_empty());

    let first = rdp_profile("srv1", "First");
    let second = rdp_profile("srv2", "Second");
    store.upsert(first.clone()).await.expect("first upsert");
    store.upsert(second.clone()).await.expect("second upsert");

    let mut edited = first.clone();
    edited.display_name = "First (edited)".into();
    store.upsert(edited).await.expect("edit upsert");

    let reopened = ConnectionStore::open(&dir).await.expect("store reopen");
    let profiles = reopened.list().await;
    assert_eq!(profiles.len(), 2);
    assert_eq!(profiles[0].id, first.id);
    assert_eq!(profiles[0].display_name, "First (edited)");
    assert_eq!(profiles[1].id, second.id);

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn removes_profiles_and_reports_missing_ones() {
    let dir = temp_dir();
    let store = ConnectionStore::open(&dir).await.expect("store open");

    let profile = rdp_profile("srv1", "One");
    store.upsert(profile.clone()).await.expect("upsert");

    assert!(store.remove(profile.id).await.expect("remove"));
    assert!(!store.remove(profile.id).await.expect("second remove"));
    assert!(store.get(profile.id).await.is_none());

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn writes_secrets_free_search_index() {
    let dir = temp_dir();
    let store = ConnectionStore::open(&dir).await.expect("store open");

    let mut profile = rdp_profile("srv1", "");
    profile.credential_id = Some(uuid::Uuid::new_v4());
    profile.username = Some("alice".into());
    store.upsert(profile.clone()).await.expect("upsert");

    let raw = std::fs::read_to_string(store.index_path()).expect("index written");
    assert!(!raw.contains("alice"));
    assert!(!raw.contains("credentialId"));

    let index: ConnectionIndexFile = serde_json::from_str(&raw).expect("index parses");
    assert_eq!(index.version, 1);
    assert_eq!(index.connections.len(), 1);
    assert_eq!(index.connections[0].title, "srv1");
    assert_eq!(index.connections[0].port, 3389);

    let leftovers: Vec<_> = std::fs::read_dir(&dir)
        .expect("dir readable")
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn empty_file_loads_as_empty_list() {
    let dir = temp_dir();
    std::fs::create_dir_all(&dir).expect("dir created");
    std::fs::write(dir.join(rdssh_storage::CONNECTIONS_FILE), "  \n").expect("file written");

    let store = ConnectionStore::open(&dir).await.expect("store open");
    assert!(store.list().await.is_empty());

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn rejects_profiles_without_hostname() {
    let dir = temp_dir();
    let store = ConnectionStore::open(&dir).await.expect("store open");

    let result = store.upsert(rdp_profile("   ", "Blank")).await;
    assert!(result.is_err());

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn failed_writes_leave_the_list_untouched() {
    let dir = temp_dir();
    let store = ConnectionStore::open(&dir).await.expect("store open");
    let kept = rdp_profile("srv1", "Kept");
    store.upsert(kept.clone()).await.expect("upsert");

    // A regular file where the store directory was makes every write fail.
    std::fs::remove_dir_all(&dir).expect("drop store dir");
    std::fs::write(&dir, b"not a directory").expect("blocking file");

    assert!(store.upsert(rdp_profile("srv2", "Lost")).await.is_err());
    assert!(store.remove(kept.id).await.is_err());

    let profiles = store.list().await;
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].id, kept.id);
    assert_eq!(profiles[0].display_name, "Kept");

    let _ = std::fs::remove_file(dir);
}
