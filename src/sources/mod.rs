pub mod load;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::OnceCell;

use types::ReferenceSource;

/// The session-scoped bundle of loaded reference sources. Read-only after
/// construction and shared across all concurrent queries.
pub struct ReferenceLibrary {
    sources: Vec<ReferenceSource>,
}

impl ReferenceLibrary {
    pub fn new(sources: Vec<ReferenceSource>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &[ReferenceSource] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Lazily loaded, memoized library handle: the first caller triggers the
/// load and every concurrent caller awaits that same in-flight result.
pub struct SharedLibrary {
    data_dir: PathBuf,
    row_cap: usize,
    fetch_catalog: bool,
    cell: OnceCell<Arc<ReferenceLibrary>>,
}

impl SharedLibrary {
    pub fn new(data_dir: PathBuf, row_cap: usize, fetch_catalog: bool) -> Self {
        Self {
            data_dir,
            row_cap,
            fetch_catalog,
            cell: OnceCell::new(),
        }
    }

    pub async fn get_or_load(&self) -> Result<Arc<ReferenceLibrary>> {
        self.cell
            .get_or_try_init(|| async {
                load::load_library(&self.data_dir, self.row_cap, self.fetch_catalog)
                    .await
                    .map(Arc::new)
            })
            .await
            .cloned()
    }
}
