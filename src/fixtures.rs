//! Local fixture files: synthetic payloads going up, downloads coming back.

use crate::sim::SimulatedRng;
use std::io::Result as IoResult;
use std::path::{Path, PathBuf};

// Mixed into the identifier so payload streams differ from store RNG streams.
const PAYLOAD_SALT: u64 = 0x5241_5750_524f_4245;

/// Deterministic payload for `id`: the same identifier always yields the
/// same bytes.
pub fn synthetic_payload(id: u64, size: usize) -> Vec<u8> {
    let mut rng = SimulatedRng::new(id ^ PAYLOAD_SALT);
    let mut buf = vec![0u8; size];
    rng.fill_bytes(&mut buf);
    buf
}

/// Input and output directories for one run.
#[derive(Debug, Clone)]
pub struct FixtureDirs {
    input_dir: PathBuf,
    output_dir: PathBuf,
    payload_size: usize,
}

impl FixtureDirs {
    pub fn new(input_dir: PathBuf, output_dir: PathBuf, payload_size: usize) -> Self {
        FixtureDirs {
            input_dir,
            output_dir,
            payload_size,
        }
    }

    /// Create both directories if missing
    pub async fn ensure(&self) -> IoResult<()> {
        tokio::fs::create_dir_all(&self.input_dir).await?;
        tokio::fs::create_dir_all(&self.output_dir).await
    }

    pub fn input_dir(&self) -> &Path {
        &self.input_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn input_path(&self, id: u64) -> PathBuf {
        self.input_dir.join(format!("{}.bin", id))
    }

    pub fn output_path(&self, id: u64) -> PathBuf {
        self.output_dir.join(format!("{}.bin", id))
    }

    /// Write the synthetic payload for `id` and return its path
    pub async fn materialize(&self, id: u64) -> IoResult<PathBuf> {
        let path = self.input_path(id);
        tokio::fs::write(&path, synthetic_payload(id, self.payload_size)).await?;
        Ok(path)
    }

    pub async fn read_input(&self, id: u64) -> IoResult<Vec<u8>> {
        tokio::fs::read(self.input_path(id)).await
    }

    /// Store downloaded content for `id`
    pub async fn persist_download(&self, id: u64, body: &[u8]) -> IoResult<PathBuf> {
        let path = self.output_path(id);
        tokio::fs::write(&path, body).await?;
        Ok(path)
    }
}
