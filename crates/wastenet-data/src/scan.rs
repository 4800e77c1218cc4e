//! Parallel scan of the palette colours used by a set of colour masks.

use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::Mutex,
};

use rayon::prelude::*;

use crate::{
    error::{DataError, DataResult},
    palette::{Bgr, Palette},
};

/// Distinct colours of a single mask.
pub fn mask_colors(path: &Path) -> DataResult<BTreeSet<Bgr>> {
    let mask = image::open(path)
        .map_err(|source| DataError::ImageOpenFailed {
            path: path.to_path_buf(),
            source,
        })?
        .to_rgb8();
    Ok(mask.pixels().map(|p| Bgr::from_rgb(*p)).collect())
}

/// Add the palette colours of the mask at `path` to `seen`, logging the ones
/// seen for the first time.
fn record_colors(
    seen: &Mutex<BTreeSet<Bgr>>,
    colors: BTreeSet<Bgr>,
    palette: &Palette,
    path: &Path,
) -> DataResult<()> {
    let mut seen = seen.lock().map_err(|_| DataError::ScanStatePoisoned)?;
    for color in colors {
        if palette.index_of(color).is_some() && seen.insert(color) {
            let [b, g, r] = color.0;
            tracing::info!(b, g, r, path = %path.display(), "new colour");
        }
    }
    Ok(())
}

/// Collect the palette colours present in `paths` using a pool of `threads`
/// workers. Colours outside the palette are ignored.
///
/// Each colour is logged the first time any worker sees it. Masks that cannot
/// be read are skipped with a warning.
///
/// # Errors
///
/// Fails if the thread pool cannot be created or the shared colour set was
/// poisoned.
pub fn scan_colors(paths: &[PathBuf], palette: &Palette, threads: usize) -> DataResult<BTreeSet<Bgr>> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .map_err(|source| DataError::ThreadPool { source })?;

    let seen = Mutex::new(BTreeSet::new());

    pool.install(|| {
        paths.par_iter().try_for_each(|path| match mask_colors(path) {
            Ok(colors) => record_colors(&seen, colors, palette, path),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable mask");
                Ok(())
            }
        })
    })?;

    let colors = seen.into_inner().map_err(|_| DataError::ScanStatePoisoned)?;
    tracing::info!(masks = paths.len(), colors = colors.len(), "colour scan finished");
    Ok(colors)
}
