use std::path::Path;

use kl_simulation::WorldFile;

pub fn run(path: &Path) -> Result<(), String> {
    if path.exists() {
        return Err(format!("'{}' already exists", path.display()));
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| format!("cannot create directory: {e}"))?;
    }

    let example = WorldFile::example();
    example
        .write(path)
        .map_err(|e| format!("cannot write {}: {e}", path.display()))?;

    println!("Created world file {}", path.display());
    println!(
        "  {} sections: walls, beacons, and a robot with every sensor type",
        example.sections.len()
    );
    println!();
    println!("Get started:");
    println!("  kulisse check {}   # Validate the description", path.display());
    println!("  kulisse run {}     # Run ten update cycles", path.display());

    Ok(())
}
