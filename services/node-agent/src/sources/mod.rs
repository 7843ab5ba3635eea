//! Manifest source adapters.
//!
//! Each adapter owns a "last seen" serialized snapshot and emits downstream
//! only when the newly observed bytes differ from it. Comparing serialized
//! bytes rather than parsed structures is deliberate: a re-ordered but
//! semantically equal payload still triggers a resync, which is harmless
//! because sync is idempotent.
//!
//! File and HTTP adapters emit a single manifest per change; the store
//! adapter emits whole manifest lists.

mod etcd;
mod file;
mod http;

pub use etcd::{relay_watch_responses, EtcdSource};
pub use file::FileSource;
pub use http::HttpSource;
