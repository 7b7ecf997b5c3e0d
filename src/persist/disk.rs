//! On-disk gateway: one LZ4-compressed JSON file per cell

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::world::CellCoord;
use super::gateway::{FetchResult, GatewayError, PersistenceGateway};
use super::protocol::StoredCell;

/// File extension for stored cells
pub const CELL_EXTENSION: &str = "orc";

/// Serialize and compress a stored cell
pub fn encode_cell(stored: &StoredCell) -> Result<Vec<u8>, GatewayError> {
    let json = serde_json::to_vec(stored)?;
    Ok(lz4_flex::compress_prepend_size(&json))
}

/// Decompress and deserialize a stored cell
pub fn decode_cell(data: &[u8]) -> Result<StoredCell, GatewayError> {
    let json = lz4_flex::decompress_size_prepended(data)
        .map_err(|e| GatewayError::Compression(format!("LZ4 decompression failed: {e}")))?;
    Ok(serde_json::from_slice(&json)?)
}

/// Per-process counter giving every save its own temporary file
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Unique `cell_{x}_{z}.orc.{pid}.{n}.tmp` path next to the cell file
fn temp_path(path: &Path) -> PathBuf {
    let n = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_extension(format!("{CELL_EXTENSION}.{}.{n}.tmp", std::process::id()))
}

/// Get the file path for a cell
pub fn cell_path(base_dir: &Path, cell: CellCoord) -> PathBuf {
    base_dir.join(format!("cell_{}_{}.{}", cell.x, cell.z, CELL_EXTENSION))
}

/// Gateway storing each cell as `cell_{x}_{z}.orc` under a base directory
#[derive(Clone, Debug)]
pub struct DiskGateway {
    base_dir: PathBuf,
}

impl DiskGateway {
    /// Open (and create if needed) a cell directory
    pub fn open(base_dir: impl Into<PathBuf>) -> Result<Self, GatewayError> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Load one cell. A missing file is a miss; an unreadable one is logged
    /// and also treated as a miss so the cell gets regenerated.
    pub fn load(&self, cell: CellCoord) -> Result<Option<StoredCell>, GatewayError> {
        let path = cell_path(&self.base_dir, cell);
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match decode_cell(&data) {
            Ok(stored) => Ok(Some(stored)),
            Err(e) => {
                log::warn!("Corrupt cell file {}: {e}", path.display());
                Ok(None)
            }
        }
    }

    pub fn exists(&self, cell: CellCoord) -> bool {
        cell_path(&self.base_dir, cell).exists()
    }

    /// Coordinates of every stored cell
    pub fn stored_cells(&self) -> Result<Vec<CellCoord>, GatewayError> {
        let mut cells = Vec::new();
        for entry in fs::read_dir(&self.base_dir)? {
            let path = entry?.path();
            if let Some(cell) = parse_cell_file(&path) {
                cells.push(cell);
            }
        }
        cells.sort_unstable();
        Ok(cells)
    }
}

fn parse_cell_file(path: &Path) -> Option<CellCoord> {
    if path.extension()? != CELL_EXTENSION {
        return None;
    }
    let stem = path.file_stem()?.to_str()?.strip_prefix("cell_")?;
    let (x, z) = stem.split_once('_')?;
    Some(CellCoord::new(x.parse().ok()?, z.parse().ok()?))
}

impl PersistenceGateway for DiskGateway {
    fn fetch_batch(&self, cells: &[CellCoord]) -> Result<FetchResult, GatewayError> {
        cells.iter().map(|c| Ok((*c, self.load(*c)?))).collect()
    }

    fn save(&self, cell: CellCoord, stored: &StoredCell) -> Result<(), GatewayError> {
        let path = cell_path(&self.base_dir, cell);
        let tmp = temp_path(&path);
        let data = encode_cell(stored)?;
        // Rename so readers never see a half-written file
        let written = fs::write(&tmp, data).and_then(|()| fs::rename(&tmp, &path));
        if written.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        Ok(written?)
    }

    fn delete_all(&self) -> Result<(), GatewayError> {
        for cell in self.stored_cells()? {
            match fs::remove_file(cell_path(&self.base_dir, cell)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "disk"
    }
}
