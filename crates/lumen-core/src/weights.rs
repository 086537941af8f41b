//! Weight database operations that keep the inference selection consistent.

use crate::error::CoreResult;
use crate::state::InferenceState;
use lumen_training::weights::refers_to;
use lumen_training::{WeightDatabase, WeightSelection};
use std::path::{Path, PathBuf};

/// Rename the selected entry. A selected checkpoint (or cached one) that
/// pointed at the old directory is moved to the new one.
pub fn rename_weight(
    db: &WeightDatabase,
    state: &mut InferenceState,
    selection: &WeightSelection,
    new_name: &str,
) -> CoreResult<PathBuf> {
    let (old_dir, new_dir) = db.rename(selection, new_name)?;
    for path in [&mut state.checkpoint_path, &mut state.cache_checkpoint] {
        if let Some(current) = path.as_mut() {
            relocate(current, &old_dir, &new_dir);
        }
    }
    Ok(new_dir)
}

/// Delete the selected entry. Deleting the selected checkpoint clears the
/// selection and the inference cache computed with it.
pub fn delete_weight(db: &WeightDatabase, state: &mut InferenceState, selection: &WeightSelection) -> CoreResult<PathBuf> {
    let removed = db.delete(selection)?;
    let selected = state.checkpoint_path.as_deref().is_some_and(|p| refers_to(p, &removed));
    let cached = state.cache_checkpoint.as_deref().is_some_and(|p| refers_to(p, &removed));
    if selected {
        state.checkpoint_path = None;
    }
    if selected || cached {
        state.invalidate_cache();
    }
    Ok(removed)
}

/// Every pipeline's entry names, for refreshing weight lists.
pub fn list_all(db: &WeightDatabase) -> CoreResult<Vec<(String, Vec<String>)>> {
    let mut out = Vec::new();
    for pipeline in db.pipelines()? {
        let names = db.list(&pipeline)?;
        out.push((pipeline, names));
    }
    Ok(out)
}

fn relocate(path: &mut PathBuf, old_dir: &Path, new_dir: &Path) {
    if path.as_path() == old_dir {
        *path = new_dir.to_path_buf();
    } else if let Ok(rest) = path.strip_prefix(old_dir)
        && rest.components().count() == 1
    {
        *path = new_dir.join(rest);
    }
}
