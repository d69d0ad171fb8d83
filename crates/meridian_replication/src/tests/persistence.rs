use crate::config::{PersistConfig, TreeConfig};
use crate::persist::{encode_snapshot, PersistWorker, SNAPSHOT_MAGIC};
use crate::shutdown::ShutdownState;
use crate::store::{Entity, EntityTree};
use crate::types::{CreatorToken, EntityId, EntityKey, Vec3};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::RwLock;

fn shared_tree() -> Arc<RwLock<EntityTree>> {
    Arc::new(RwLock::new(EntityTree::new(TreeConfig::default())))
}

fn persist_config(dir: &TempDir, interval_ms: u64) -> PersistConfig {
    PersistConfig {
        path: dir.path().join("nested").join("world.mrdn"),
        interval_ms,
        enabled: true,
    }
}

#[tokio::test]
async fn test_save_then_load_restores_entities() {
    let dir = TempDir::new().unwrap();
    let source = shared_tree();
    {
        let mut tree = source.write().await;
        tree.store(Entity::with_id(EntityId(1), Vec3::splat(10.0), 1.0));
        tree.store(Entity::with_token(CreatorToken(2), Vec3::splat(900.0), 3.0));
    }
    let worker = PersistWorker::new(source.clone(), persist_config(&dir, 1_000));
    worker.save().await.unwrap();

    let bytes = std::fs::read(worker.path()).unwrap();
    assert_eq!(&bytes[..4], SNAPSHOT_MAGIC);
    assert!(!worker.path().with_extension("mrdn.tmp").exists());

    let restored = shared_tree();
    let loader = PersistWorker::new(restored.clone(), persist_config(&dir, 1_000));
    let report = loader.load().await.unwrap();
    assert!(report.found);
    assert_eq!(report.decode.entities, 2);
    assert!(!report.decode.truncated);

    let restored = restored.read().await;
    let source = source.read().await;
    for key in [EntityKey::Known(EntityId(1)), EntityKey::Pending(CreatorToken(2))] {
        assert_eq!(restored.find_by_key(key), source.find_by_key(key));
    }
}

#[tokio::test]
async fn test_crowded_node_survives_save_and_load() {
    const CROWD: u32 = u16::MAX as u32 + 5;
    let dir = TempDir::new().unwrap();
    let source = shared_tree();
    {
        let mut tree = source.write().await;
        for token in 0..CROWD {
            tree.store(Entity::with_token(CreatorToken(token), Vec3::splat(10.0), 0.0));
        }
    }
    let worker = PersistWorker::new(source.clone(), persist_config(&dir, 1_000));
    worker.save().await.unwrap();

    let restored = shared_tree();
    let loader = PersistWorker::new(restored.clone(), persist_config(&dir, 1_000));
    let report = loader.load().await.unwrap();
    assert!(!report.decode.truncated);
    assert_eq!(report.decode.elements, 2);
    assert_eq!(report.decode.entities, CROWD as usize);

    let restored = restored.read().await;
    assert_eq!(restored.entity_count(), CROWD as usize);
    assert!(restored
        .find_by_key(EntityKey::Pending(CreatorToken(CROWD - 1)))
        .is_some());
}

#[tokio::test]
async fn test_missing_file_loads_empty() {
    let dir = TempDir::new().unwrap();
    let worker = PersistWorker::new(shared_tree(), persist_config(&dir, 1_000));
    let report = worker.load().await.unwrap();
    assert!(!report.found);
    assert_eq!(report.decode.entities, 0);
}

#[tokio::test]
async fn test_truncated_snapshot_keeps_readable_prefix() {
    let dir = TempDir::new().unwrap();
    let config = persist_config(&dir, 1_000);
    let mut tree = EntityTree::new(TreeConfig::default());
    tree.store(Entity::with_id(EntityId(1), Vec3::splat(10.0), 1.0));
    tree.store(Entity::with_id(EntityId(2), Vec3::splat(9000.0), 1.0));
    let snapshot = encode_snapshot(&tree);

    std::fs::create_dir_all(config.path.parent().unwrap()).unwrap();
    std::fs::write(&config.path, &snapshot[..snapshot.len() - 4]).unwrap();

    let restored = shared_tree();
    let report = PersistWorker::new(restored.clone(), config).load().await.unwrap();
    assert!(report.decode.truncated);
    assert_eq!(restored.read().await.entity_count(), 1);
}

#[tokio::test]
async fn test_worker_saves_changes_and_on_shutdown() {
    let dir = TempDir::new().unwrap();
    let tree = shared_tree();
    let worker = PersistWorker::new(tree.clone(), persist_config(&dir, 20));
    let path = worker.path().to_path_buf();
    let shutdown = ShutdownState::new();
    let task = worker.clone().spawn(shutdown.clone());

    tokio::time::timeout(Duration::from_secs(2), async {
        while !worker.is_initial_load_complete() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    tree.write()
        .await
        .store(Entity::with_id(EntityId(5), Vec3::splat(20.0), 1.0));
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(path.exists());

    tree.write()
        .await
        .store(Entity::with_id(EntityId(6), Vec3::splat(30.0), 1.0));
    shutdown.initiate_shutdown();
    let saves = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
    assert!(saves >= 2);

    let reloaded = shared_tree();
    PersistWorker::new(reloaded.clone(), persist_config(&dir, 20))
        .load()
        .await
        .unwrap();
    assert_eq!(reloaded.read().await.entity_count(), 2);
}
