//! TypeScript bindings for GUI clients.

use crate::ipc::Event;
use crate::settings_models::{ChatSourceSettings, VersionedPayload};
use std::path::Path;
use ts_rs::{ExportError, TS};

/// Write a `.ts` declaration for every wire type into `out_dir`.
///
/// [`Event`] pulls in every type it carries; the settings payload is
/// exported separately because no event references it.
pub fn export_bindings(out_dir: &Path) -> Result<(), ExportError> {
    Event::export_all_to(out_dir)?;
    ChatSourceSettings::export_all_to(out_dir)?;
    VersionedPayload::<ChatSourceSettings>::export_all_to(out_dir)?;
    Ok(())
}
