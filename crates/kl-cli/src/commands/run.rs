use std::path::Path;
use std::time::Duration;

use colored::Colorize;
use comfy_table::{ContentArrangement, Table};
use kl_core::SimEventKind;

pub fn run(file: &Path, cycles: u64, fast: bool, verbose: bool) -> Result<(), String> {
    let mut world = super::load_world(file, None)?;
    if fast {
        world.set_wall_interval(Duration::ZERO);
    }
    world.resume();
    let completed = world.run_cycles(cycles);

    // Header
    println!(
        "  {} '{}' {}",
        "Run".bold(),
        world.name(),
        format!(
            "({completed} cycles, {} ms/cycle, seed={})",
            world.clock().sim_interval(),
            world.config().seed
        )
        .dimmed()
    );
    print!(
        "  {} models, t = {:.1} s",
        world.registry().len(),
        world.sim_time() as f64 / 1000.0
    );
    match world.clock().speed_ratio() {
        Some(ratio) => println!(", {ratio:.1}x real time"),
        None => println!(),
    }
    println!();

    // Events
    if verbose {
        println!("  {}", "Event Log".bold().underline());
        println!();
        for event in world.events().events() {
            let time_label = format!("[t {:>6} ms]", event.time).dimmed();
            let desc = colorize_event(&event.kind, &event.description);
            println!("  {time_label} {desc}");
        }
        if world.events().is_empty() {
            println!("  {}", "(no events)".dimmed());
        }
        println!();
    } else {
        let notable: Vec<_> = world
            .events()
            .events()
            .iter()
            .filter(|e| {
                matches!(
                    e.kind,
                    SimEventKind::Stalled { .. }
                        | SimEventKind::MissingReference { .. }
                        | SimEventKind::UpdateFailed { .. }
                )
            })
            .collect();
        if !notable.is_empty() {
            println!("  {}", "Notable Events".bold().underline());
            for event in &notable {
                println!("  {}  {}", "WARN".yellow().bold(), event.description);
            }
            println!();
        }
    }

    // Model table
    println!("  {}", "Models".bold().underline());
    println!();

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Id", "Name", "Type", "Pose", "Reading"]);
    for model in world.registry().iter() {
        let pose = world
            .registry()
            .global_pose(model.id())
            .map(|p| p.to_string())
            .unwrap_or_else(|| "--".to_string());
        let reading = model.device().describe();
        table.add_row(vec![
            model.id().to_string(),
            model.name().to_string(),
            model.kind().to_string(),
            pose,
            if reading.is_empty() {
                "--".to_string()
            } else {
                reading
            },
        ]);
    }
    println!("{table}");
    println!();

    world.destroy();
    Ok(())
}

fn colorize_event(kind: &SimEventKind, description: &str) -> colored::ColoredString {
    match kind {
        SimEventKind::ModelCreated { .. } => description.green(),
        SimEventKind::ModelDestroyed { .. } => description.blue(),
        SimEventKind::Stalled { .. } => description.yellow(),
        SimEventKind::MissingReference { .. } => description.yellow().bold(),
        SimEventKind::UpdateFailed { .. } => description.red().bold(),
        SimEventKind::ConfigRejected { .. } => description.red(),
    }
}
