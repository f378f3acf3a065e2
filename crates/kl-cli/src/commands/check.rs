use std::path::Path;

pub fn run(file: &Path) -> Result<(), String> {
    let world = super::load_world(file, None)?;
    let rejected = world.rejected_sections().len();

    if rejected == 0 {
        println!("  All checks passed for '{}'.", world.name());
    } else {
        println!("  '{}' loaded with {rejected} skipped section(s).", world.name());
    }
    println!("  {} models", world.registry().len());
    if let Some((lo, hi)) = world.dimensions() {
        println!(
            "  occupied extent ({:.2}, {:.2}) to ({:.2}, {:.2})",
            lo.x, lo.y, hi.x, hi.y
        );
    }

    Ok(())
}
