use std::{net::SocketAddr, path::PathBuf};

pub const DEFAULT_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_MAX_UPLOAD_MB: u64 = 50;

/// Settings for `serve`, shared with handlers through axum state.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    addr: SocketAddr,
    scratch_root: PathBuf,
    concurrency: usize,
    max_upload_bytes: u64,
}

impl ServerConfig {
    pub fn new(
        addr: SocketAddr,
        scratch_root: PathBuf,
        concurrency: Option<usize>,
        max_upload_mb: u64,
    ) -> Self {
        Self {
            addr,
            scratch_root,
            concurrency: concurrency
                .filter(|n| *n > 0)
                .unwrap_or_else(default_concurrency),
            max_upload_bytes: max_upload_mb.saturating_mul(1024 * 1024),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn scratch_root(&self) -> &PathBuf {
        &self.scratch_root
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn max_upload_bytes(&self) -> u64 {
        self.max_upload_bytes
    }
}

pub fn default_scratch_root() -> PathBuf {
    std::env::temp_dir().join("image-squeeze")
}

pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
