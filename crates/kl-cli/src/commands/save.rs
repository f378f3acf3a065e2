use std::path::Path;

pub fn run(file: &Path, output: Option<&Path>) -> Result<(), String> {
    let mut world = super::load_world(file, output)?;
    world
        .save()
        .map_err(|e| format!("cannot save world: {e}"))?;

    let target = output.unwrap_or(file);
    println!(
        "  Saved '{}' ({} models) to {}",
        world.name(),
        world.registry().len(),
        target.display()
    );
    world.destroy();
    Ok(())
}
