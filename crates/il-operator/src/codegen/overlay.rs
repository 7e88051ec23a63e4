//! Team-supplied files copied over generated terraform.

use std::path::{Path, PathBuf};

use super::GenerationContext;
use crate::error::Result;
use crate::resource::{Environment, EnvironmentComponent};
use crate::tracker::TrackerKey;

/// Copies every overlay of `component` into `dir`, in declaration order.
///
/// An overlay may name a file or a directory; same-named generated files are
/// replaced. Returns the written paths.
pub async fn apply(
    ctx: &GenerationContext<'_>,
    environment: &Environment,
    component: &EnvironmentComponent,
    dir: &Path,
) -> Result<Vec<PathBuf>> {
    let object = environment.key();
    let mut written = Vec::new();

    for overlay in &component.overlay_files {
        let key = TrackerKey::new(object.clone(), &overlay.source, &overlay.path);
        let source = ctx.sources.locate_path(&key).await?;
        let copied = ctx.storage.copy_into(&source, dir)?;
        log::debug!(
            "Applied overlay {}:{} to component {} ({} files)",
            overlay.source,
            overlay.path,
            component.name,
            copied.len()
        );
        written.extend(copied);
    }

    Ok(written)
}
