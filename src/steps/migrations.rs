use crate::{context::InstallationContext, error::InstallerError};

use super::{arg, set_mode, Toolkit, SERVICE_USER};

/// Runs the application's post-install composer hook (which creates and
/// migrates the SQLite database) and opens the database to the web group.
pub fn run(kit: &Toolkit<'_>, _ctx: &mut InstallationContext) -> Result<(), InstallerError> {
    let app_dir = &kit.config.layout.app_dir;
    let db_dir = app_dir.join("database");
    let db = db_dir.join("database.sqlite");

    kit.report.update_status("Updating app");
    kit.exec.run(
        "sudo",
        &[
            "-u",
            SERVICE_USER,
            "composer",
            "-d",
            arg(app_dir).as_str(),
            "run",
            "post-create-project-cmd",
        ],
    )?;

    kit.exec.run("chown", &["dployr:www-data", arg(&db).as_str()])?;
    kit.exec.run("chown", &["dployr:www-data", arg(&db_dir).as_str()])?;
    set_mode(&db, 0o664)?;
    set_mode(&db_dir, 0o775)?;

    kit.report.update_status("App setup completed");
    Ok(())
}
