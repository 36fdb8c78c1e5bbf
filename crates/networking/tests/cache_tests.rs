//! Tests for the two-tier response cache.

mod common;

use bytes::Bytes;
use common::png_bytes;
use networking::http::{CACHE_NAMESPACE, Payload, TwoTierCache, destination_key};
use networking::{CachingLevel, ResponseType};
use tempfile::TempDir;

fn cache(dir: &TempDir) -> TwoTierCache {
    TwoTierCache::new(dir.path().join(CACHE_NAMESPACE))
}

fn bytes_of(payload: Option<Payload>) -> Option<Bytes> {
    payload.and_then(Payload::into_bytes)
}

#[test]
fn test_file_tier_survives_memory_clear() {
    let dir = TempDir::new().unwrap();
    let cache = cache(&dir);
    let key = destination_key("http://httpbin.org", "/bytes/4", None).unwrap();

    cache
        .write(
            &key,
            Payload::Bytes(Bytes::from_static(b"abcd")),
            CachingLevel::MemoryAndFile,
            ResponseType::Data,
        )
        .unwrap();
    assert!(cache.file_path(&key).exists());

    cache.clear_memory();
    let read = cache.read(&key, CachingLevel::MemoryAndFile, ResponseType::Data);
    assert_eq!(bytes_of(read).unwrap().as_ref(), b"abcd");

    // Promoted back into memory, so a memory-only read hits too.
    let read = cache.read(&key, CachingLevel::Memory, ResponseType::Data);
    assert_eq!(bytes_of(read).unwrap().as_ref(), b"abcd");
}

#[test]
fn test_memory_level_writes_no_file() {
    let dir = TempDir::new().unwrap();
    let cache = cache(&dir);

    cache
        .write(
            "memory-only",
            Payload::Bytes(Bytes::from_static(b"x")),
            CachingLevel::Memory,
            ResponseType::Data,
        )
        .unwrap();

    assert!(!cache.file_path("memory-only").exists());
    assert!(cache.read("memory-only", CachingLevel::Memory, ResponseType::Data).is_some());

    cache.clear_memory();
    assert!(
        cache
            .read("memory-only", CachingLevel::MemoryAndFile, ResponseType::Data)
            .is_none()
    );
}

#[test]
fn test_image_file_hit_is_decoded() {
    let dir = TempDir::new().unwrap();
    let cache = cache(&dir);

    cache
        .write(
            "avatar",
            Payload::Bytes(Bytes::from(png_bytes(3, 5))),
            CachingLevel::MemoryAndFile,
            ResponseType::Image,
        )
        .unwrap();
    cache.clear_memory();

    let image = cache
        .read("avatar", CachingLevel::MemoryAndFile, ResponseType::Image)
        .and_then(Payload::into_image)
        .unwrap();
    assert_eq!((image.width(), image.height()), (3, 5));
}

#[test]
fn test_none_level_and_empty_body_purge() {
    let dir = TempDir::new().unwrap();
    let cache = cache(&dir);
    let payload = Payload::Bytes(Bytes::from_static(b"data"));

    cache
        .write("a", payload.clone(), CachingLevel::MemoryAndFile, ResponseType::Data)
        .unwrap();
    assert!(cache.read("a", CachingLevel::None, ResponseType::Data).is_none());
    assert!(!cache.file_path("a").exists());
    assert!(cache.read("a", CachingLevel::MemoryAndFile, ResponseType::Data).is_none());

    cache
        .write("b", payload, CachingLevel::MemoryAndFile, ResponseType::Data)
        .unwrap();
    cache
        .write("b", Payload::Bytes(Bytes::new()), CachingLevel::MemoryAndFile, ResponseType::Data)
        .unwrap();
    assert!(!cache.file_path("b").exists());
    assert!(cache.read("b", CachingLevel::Memory, ResponseType::Data).is_none());
}

#[test]
fn test_purge_all_removes_namespace() {
    let dir = TempDir::new().unwrap();
    let cache = cache(&dir);

    for key in ["one", "two"] {
        cache
            .write(
                key,
                Payload::Bytes(Bytes::from_static(b"1")),
                CachingLevel::MemoryAndFile,
                ResponseType::Data,
            )
            .unwrap();
    }
    assert!(cache.root().is_dir());

    cache.purge_all().unwrap();
    assert!(!cache.root().exists());
    assert!(cache.read("one", CachingLevel::Memory, ResponseType::Data).is_none());

    // Purging an absent namespace is fine.
    cache.purge_all().unwrap();
}
