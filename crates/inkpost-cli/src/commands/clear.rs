use inkpost_core::OfflineFacade;

use crate::error::CliError;

pub fn run_clear(facade: &OfflineFacade, confirmed: bool) -> Result<(), CliError> {
    let status = facade.sync_status()?;
    if status.total() > 0 && !confirmed {
        return Err(CliError::ConfirmationRequired);
    }

    let cached = facade.cached_blogs()?.len();
    facade.clear_offline_data()?;
    println!(
        "Removed {} draft(s) and {cached} cached blog post(s)",
        status.total()
    );
    Ok(())
}
