use crate::error::StorageError;
use parking_lot::Mutex;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use wasmvm_types::Checksum;

/// Name of the directory holding the bytecode files below the data directory.
pub const WASM_DIR: &str = "wasm";

/// File-system backed store of raw contract bytecode.
///
/// Layout: `<data_dir>/wasm/<hex checksum>`, one immutable file per contract.
pub struct CodeStore {
    wasm_dir: PathBuf,
    // Serializes writers so two threads saving the same code never race on the temp file
    write_lock: Mutex<()>,
}

impl CodeStore {
    /// Open (and create if missing) the store below `data_dir`.
    pub fn open(data_dir: &Path) -> Result<Self, StorageError> {
        let path_str = data_dir.to_string_lossy();
        if path_str.is_empty() {
            return Err(StorageError::InvalidPath("data directory is empty".to_string()));
        }

        let wasm_dir = data_dir.join(WASM_DIR);
        fs::create_dir_all(&wasm_dir)?;
        tracing::debug!(path = %wasm_dir.display(), "Opened code store");

        Ok(Self {
            wasm_dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.wasm_dir
    }

    fn file_path(&self, checksum: &Checksum) -> PathBuf {
        self.wasm_dir.join(checksum.to_hex())
    }

    /// Persist bytecode and return its checksum. Saving the same code twice is a no-op.
    pub fn save(&self, wasm: &[u8]) -> Result<Checksum, StorageError> {
        let checksum = Checksum::generate(wasm);
        let path = self.file_path(&checksum);

        let _guard = self.write_lock.lock();
        if path.exists() {
            tracing::trace!(%checksum, "Code already stored");
            return Ok(checksum);
        }

        let tmp = self.wasm_dir.join(format!("{}.tmp", checksum.to_hex()));
        write_atomically(&tmp, &path, wasm)?;

        tracing::debug!(%checksum, size = wasm.len(), "Stored code");
        Ok(checksum)
    }

    /// Load bytecode, verifying that the file still hashes to its name.
    pub fn load(&self, checksum: &Checksum) -> Result<Vec<u8>, StorageError> {
        let wasm = match fs::read(self.file_path(checksum)) {
            Ok(wasm) => wasm,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(*checksum))
            }
            Err(e) => return Err(e.into()),
        };

        let actual = Checksum::generate(&wasm);
        if actual != *checksum {
            tracing::warn!(expected = %checksum, %actual, "Stored code does not match its checksum");
            return Err(StorageError::Corrupted {
                expected: *checksum,
                actual,
            });
        }
        Ok(wasm)
    }

    pub fn contains(&self, checksum: &Checksum) -> bool {
        self.file_path(checksum).is_file()
    }

    /// Delete stored bytecode. Fails with `NotFound` if nothing is stored.
    pub fn remove(&self, checksum: &Checksum) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock();
        match fs::remove_file(self.file_path(checksum)) {
            Ok(()) => {
                tracing::debug!(%checksum, "Removed code");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(*checksum)),
            Err(e) => Err(e.into()),
        }
    }

    /// All checksums currently stored, in no particular order.
    pub fn checksums(&self) -> Result<Vec<Checksum>, StorageError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.wasm_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            // Leftover temp files and foreign files are skipped
            if let Some(checksum) = name.to_str().and_then(|n| Checksum::from_hex(n).ok()) {
                out.push(checksum);
            }
        }
        Ok(out)
    }
}

/// Write through a temp file and rename into place. The temp file is removed
/// when either step fails.
fn write_atomically(tmp: &Path, path: &Path, data: &[u8]) -> Result<(), StorageError> {
    let result = fs::write(tmp, data).and_then(|()| fs::rename(tmp, path));
    if let Err(e) = result {
        if let Err(cleanup) = fs::remove_file(tmp) {
            if cleanup.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %tmp.display(), error = %cleanup, "Failed to remove temp file");
            }
        }
        return Err(e.into());
    }
    Ok(())
}
