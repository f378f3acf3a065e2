pub mod check;
pub mod init;
pub mod run;
pub mod save;

use std::path::Path;

use colored::Colorize;
use kl_simulation::{World, WorldFile};

/// Read a world description and build the world from it.
/// Sections the loader skipped are reported on stderr.
fn load_world(file: &Path, output: Option<&Path>) -> Result<World, String> {
    let mut description =
        WorldFile::load(file).map_err(|e| format!("cannot load {}: {e}", file.display()))?;
    if let Some(output) = output {
        description.set_path(output);
    }
    let world = World::from_source(Box::new(description))
        .map_err(|e| format!("cannot build world from {}: {e}", file.display()))?;
    print_rejections(&world);
    Ok(world)
}

/// Print every skipped section to stderr.
fn print_rejections(world: &World) {
    let rejected = world.rejected_sections();
    if rejected.is_empty() {
        return;
    }
    for section in rejected {
        eprintln!(
            "  {} section {} ({}): {}",
            "skipped".yellow().bold(),
            section.index,
            section.kind,
            section.error
        );
    }
    eprintln!(
        "  {} section{} skipped",
        rejected.len(),
        if rejected.len() == 1 { "" } else { "s" },
    );
}
