use fleetgate::registry::{
    FileStore, MemoryStore, NewTarget, TargetKind, TargetRegistry, TargetStore, TargetUpdate,
};
use fleetgate::vault::CredentialVault;
use fleetgate::RegistryError;
use std::sync::Arc;
use tempfile::TempDir;

fn vault() -> CredentialVault {
    CredentialVault::new(b"0123456789abcdef0123456789abcdef").unwrap()
}

fn registry() -> TargetRegistry {
    TargetRegistry::new(Arc::new(MemoryStore::new()), vault())
}

fn target(name: &str, password: Option<&str>) -> NewTarget {
    NewTarget {
        name: name.to_string(),
        address: "http://127.0.0.1:2379".to_string(),
        username: password.map(|_| "root".to_string()),
        password: password.map(str::to_string),
    }
}

#[tokio::test]
async fn test_duplicate_name_rejected() {
    let registry = registry();

    registry
        .register(TargetKind::KeyValue, target("prod-etcd", None))
        .await
        .unwrap();

    let err = registry
        .register(TargetKind::KeyValue, target("prod-etcd", None))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateName { ref name, .. } if name == "prod-etcd"));

    let listed = registry.list(TargetKind::KeyValue).await.unwrap();
    assert_eq!(listed.iter().filter(|t| t.name == "prod-etcd").count(), 1);
}

#[tokio::test]
async fn test_names_are_scoped_per_kind_and_case_sensitive() {
    let registry = registry();

    registry
        .register(TargetKind::KeyValue, target("shared", None))
        .await
        .unwrap();
    registry
        .register(TargetKind::JobServer, target("shared", Some("token")))
        .await
        .unwrap();
    registry
        .register(TargetKind::KeyValue, target("Shared", None))
        .await
        .unwrap();

    assert_eq!(registry.list(TargetKind::KeyValue).await.unwrap().len(), 2);
    assert_eq!(registry.list(TargetKind::JobServer).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_register_rejects_blank_fields() {
    let registry = registry();
    let mut blank = target("  ", None);
    assert!(matches!(
        registry.register(TargetKind::Mysql, blank.clone()).await,
        Err(RegistryError::InvalidTarget(_))
    ));

    blank.name = "db".into();
    blank.address = String::new();
    assert!(matches!(
        registry.register(TargetKind::Mysql, blank).await,
        Err(RegistryError::InvalidTarget(_))
    ));
}

#[tokio::test]
async fn test_padded_names_rejected_and_lookup_is_exact() {
    let registry = registry();

    for padded in ["prod-etcd ", " prod-etcd", "\tprod-etcd"] {
        let err = registry
            .register(TargetKind::KeyValue, target(padded, None))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidTarget(_)), "{padded:?}");
    }
    assert!(registry.list(TargetKind::KeyValue).await.unwrap().is_empty());

    registry
        .register(TargetKind::KeyValue, target("prod-etcd", None))
        .await
        .unwrap();
    let stored = registry.list(TargetKind::KeyValue).await.unwrap();
    assert_eq!(stored[0].name, "prod-etcd");

    assert!(registry
        .resolve_for_dispatch(TargetKind::KeyValue, "prod-etcd")
        .await
        .is_ok());
    assert!(matches!(
        registry
            .resolve_for_dispatch(TargetKind::KeyValue, "prod-etcd ")
            .await,
        Err(RegistryError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_password_encrypted_at_rest_and_resolved() {
    let registry = registry();
    let summary = registry
        .register(TargetKind::Mysql, target("orders-db", Some("p@ss")))
        .await
        .unwrap();
    assert!(summary.has_password);

    let stored = registry
        .stored_record(TargetKind::Mysql, summary.id)
        .await
        .unwrap()
        .unwrap();
    let sealed = stored.encrypted_password.unwrap();
    assert_ne!(sealed, "p@ss");
    assert_eq!(vault().decrypt(&sealed).unwrap(), "p@ss");

    let resolved = registry
        .resolve_for_dispatch(TargetKind::Mysql, "orders-db")
        .await
        .unwrap();
    assert_eq!(resolved.password(), "p@ss");
    assert_eq!(resolved.username(), "root");
    assert!(!format!("{:?}", resolved).contains("p@ss"));
}

#[tokio::test]
async fn test_empty_password_update_keeps_ciphertext() {
    let registry = registry();
    let summary = registry
        .register(TargetKind::Postgres, target("analytics", Some("first")))
        .await
        .unwrap();
    let before = registry
        .stored_record(TargetKind::Postgres, summary.id)
        .await
        .unwrap()
        .unwrap()
        .encrypted_password;

    for password in [None, Some(String::new())] {
        registry
            .update(
                TargetKind::Postgres,
                summary.id,
                TargetUpdate {
                    address: Some("10.0.0.5:5432".into()),
                    username: None,
                    password,
                },
            )
            .await
            .unwrap();

        let after = registry
            .stored_record(TargetKind::Postgres, summary.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(after.encrypted_password, before);
        assert_eq!(after.address, "10.0.0.5:5432");
    }
}

#[tokio::test]
async fn test_non_empty_password_update_replaces_ciphertext() {
    let registry = registry();
    let summary = registry
        .register(TargetKind::Postgres, target("analytics", Some("first")))
        .await
        .unwrap();
    let before = registry
        .stored_record(TargetKind::Postgres, summary.id)
        .await
        .unwrap()
        .unwrap()
        .encrypted_password;

    registry
        .update(
            TargetKind::Postgres,
            summary.id,
            TargetUpdate {
                password: Some("second".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let after = registry
        .stored_record(TargetKind::Postgres, summary.id)
        .await
        .unwrap()
        .unwrap()
        .encrypted_password;
    assert_ne!(after, before);

    let resolved = registry
        .resolve_for_dispatch(TargetKind::Postgres, "analytics")
        .await
        .unwrap();
    assert_eq!(resolved.password(), "second");
}

#[tokio::test]
async fn test_update_and_remove_missing_id() {
    let registry = registry();
    let id = uuid::Uuid::new_v4();

    assert!(matches!(
        registry
            .update(TargetKind::JobServer, id, TargetUpdate::default())
            .await,
        Err(RegistryError::NotFound { .. })
    ));
    assert!(matches!(
        registry.remove(TargetKind::JobServer, id).await,
        Err(RegistryError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_remove_then_resolve_is_not_found() {
    let registry = registry();
    let summary = registry
        .register(TargetKind::JobServer, target("ci", Some("token")))
        .await
        .unwrap();

    registry.remove(TargetKind::JobServer, summary.id).await.unwrap();

    assert!(matches!(
        registry.resolve_for_dispatch(TargetKind::JobServer, "ci").await,
        Err(RegistryError::NotFound { .. })
    ));
    assert!(matches!(
        registry.get(TargetKind::JobServer, summary.id).await,
        Err(RegistryError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_resolve_missing_never_touches_vault() {
    // A registry whose key can decrypt nothing would surface Decryption if the
    // vault were consulted; a miss must still be NotFound.
    let store = Arc::new(MemoryStore::new());
    let registry = TargetRegistry::new(store, CredentialVault::new(&[0u8; 32]).unwrap());

    let err = registry
        .resolve_for_dispatch(TargetKind::KeyValue, "missing")
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::NotFound { ref key, .. } if key == "missing"));
}

#[tokio::test]
async fn test_foreign_key_ciphertext_is_decryption_error() {
    let store: Arc<dyn TargetStore> = Arc::new(MemoryStore::new());
    let writer = TargetRegistry::new(store.clone(), vault());
    writer
        .register(TargetKind::Mysql, target("legacy", Some("secret")))
        .await
        .unwrap();

    let reader = TargetRegistry::new(store, CredentialVault::new(&[42u8; 32]).unwrap());
    let err = reader
        .resolve_for_dispatch(TargetKind::Mysql, "legacy")
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Decryption { ref name, .. } if name == "legacy"));
}

#[tokio::test]
async fn test_list_never_exposes_passwords() {
    let registry = registry();
    registry
        .register(TargetKind::Mysql, target("orders-db", Some("p@ss")))
        .await
        .unwrap();

    let listed = registry.list(TargetKind::Mysql).await.unwrap();
    let json = serde_json::to_string(&listed).unwrap();
    assert!(!json.contains("\"password\""));
    assert!(!json.contains("encrypted_password"));
    assert!(!json.contains("p@ss"));
    assert!(json.contains("\"has_password\":true"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_registration_single_winner() {
    let registry = registry();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            registry
                .register(TargetKind::ConfigCenter, target("race", None))
                .await
        }));
    }

    let mut ok = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(RegistryError::DuplicateName { .. }) => duplicates += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(ok, 1);
    assert_eq!(duplicates, 15);
}

#[tokio::test]
async fn test_file_store_persists_between_instances() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("targets.json");

    let first = TargetRegistry::new(Arc::new(FileStore::new(&path).unwrap()), vault());
    let summary = first
        .register(TargetKind::JobServer, target("ci", Some("api-token")))
        .await
        .unwrap();

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains("\"ci\""));
    assert!(!contents.contains("api-token"));

    let second = TargetRegistry::new(Arc::new(FileStore::new(&path).unwrap()), vault());
    let err = second
        .register(TargetKind::JobServer, target("ci", None))
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateName { .. }));

    let resolved = second
        .resolve_for_dispatch(TargetKind::JobServer, "ci")
        .await
        .unwrap();
    assert_eq!(resolved.id, summary.id);
    assert_eq!(resolved.password(), "api-token");

    second.remove(TargetKind::JobServer, summary.id).await.unwrap();
    assert!(first.list(TargetKind::JobServer).await.unwrap().is_empty());
}

#[test]
fn test_target_kind_parsing() {
    use std::str::FromStr;

    assert_eq!(TargetKind::from_str("etcd").unwrap(), TargetKind::KeyValue);
    assert_eq!(TargetKind::from_str("key-value").unwrap(), TargetKind::KeyValue);
    assert_eq!(TargetKind::from_str("Nacos").unwrap(), TargetKind::ConfigCenter);
    assert_eq!(TargetKind::from_str("jenkins").unwrap(), TargetKind::JobServer);
    assert_eq!(TargetKind::from_str("MYSQL").unwrap(), TargetKind::Mysql);
    assert_eq!(TargetKind::from_str("postgresql").unwrap(), TargetKind::Postgres);
    let err = TargetKind::from_str("redis").unwrap_err().to_string();
    assert!(err.contains("key_value") && err.contains("postgres"), "{err}");

    for kind in [TargetKind::KeyValue, TargetKind::JobServer, TargetKind::Postgres] {
        assert_eq!(TargetKind::from_str(kind.as_str()).unwrap(), kind);
    }
}
