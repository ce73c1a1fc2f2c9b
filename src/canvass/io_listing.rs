use std::fs;
use std::path::Path;
use std::sync::Arc;

use canvass_core::territory::{TerritoryCache, TerritoryIndex};

use crate::canvass::io_common::decode_text;
use crate::canvass::*;

pub fn read_listing_text(path: &Path) -> CanvassResult<String> {
    let p = path.display().to_string();
    let bytes = fs::read(path).context(OpeningFileSnafu { path: p })?;
    Ok(decode_text(bytes))
}

/// Loads the territory listing, reusing the index of `cache` when the file
/// did not change since the last load.
pub fn load_listing(path: &Path, cache: &mut TerritoryCache) -> CanvassResult<Arc<TerritoryIndex>> {
    info!("Attempting to read territory listing {:?}", path);
    let raw = read_listing_text(path)?;
    let index = cache.get_or_load(&raw);
    if index.is_empty() {
        warn!("The territory listing {:?} has no usable row", path);
    }
    Ok(index)
}
