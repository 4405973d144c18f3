//! Basic demonstration of the Gridwatch simulation.
//!
//! Run with: cargo run --example basic_demo
//! Set RUST_LOG=gridwatch_sim=debug to watch the index and tracker work.

use gridwatch_sim::SimWorld;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_target(false)
        .without_time()
        .init();

    println!("=== Gridwatch - Simulation Demo ===\n");

    let mut sim = SimWorld::new_demo_world()?;

    println!("Initial state:");
    print_snapshot(&mut sim);

    // Run for 3 seconds at 30 Hz
    println!("\nRunning simulation for 90 ticks...\n");
    for _ in 0..90 {
        sim.step(1.0 / 30.0);
        report_events(&sim);
        if sim.current_tick() % 30 == 0 {
            println!("--- Tick {} (t={:.1}s) ---", sim.current_tick(), sim.current_time());
            print_snapshot(&mut sim);
        }
    }

    // Close the room's door; the monitored spot inside becomes unreachable
    println!("\n--- Closing the door at (16, 13) ---\n");
    sim.set_solid(16, 13, true)?;
    sim.run_ticks(1);
    report_events(&sim);

    println!("\n--- Opening it again ---\n");
    sim.set_solid(16, 13, false)?;
    sim.run_ticks(1);
    report_events(&sim);

    // Save, reload, and confirm the reload recomputes from scratch
    let save = sim.save()?;
    let mut reloaded = SimWorld::load(&save)?;
    reloaded.run_ticks(1);
    println!("\nReloaded at tick {}:", reloaded.current_tick());
    print_snapshot(&mut reloaded);

    println!("\n=== Final State (JSON) ===\n");
    println!("{}", sim.snapshot().to_json_pretty()?);
    Ok(())
}

fn report_events(sim: &SimWorld) {
    for event in sim.collision_events() {
        println!(
            "  radbolt {:?} at ({}, {}): {}",
            event.radbolt,
            event.cell.x,
            event.cell.y,
            event.kind.name()
        );
    }
    for event in sim.reachability_events() {
        let state = if event.reachable { "reachable" } else { "unreachable" };
        println!("  {:?} is now {}", event.entity, state);
    }
}

fn print_snapshot(sim: &mut SimWorld) {
    let snapshot = sim.snapshot();

    println!("  Radbolts:");
    for bolt in &snapshot.radbolts {
        println!(
            "    {}: pos=({:.1}, {:.1}) payload={:.2} heading={:?}",
            bolt.id, bolt.x, bolt.y, bolt.payload, bolt.heading
        );
    }

    println!("  Living:");
    for living in &snapshot.living {
        println!(
            "    {}: pos=({:.1}, {:.1}) hp={:.0}/{:.0} dose={:.2}{}",
            living.id,
            living.x,
            living.y,
            living.health,
            living.health_max,
            living.dose,
            if living.navigator { " [navigator]" } else { "" }
        );
    }

    println!("  Monitors:");
    for monitor in &snapshot.monitors {
        println!("    {}: ({:.1}, {:.1}) {:?}", monitor.id, monitor.x, monitor.y, monitor.state);
    }

    println!(
        "  Index: {} entries in {} buckets, {} notifications; {} reachable cells",
        snapshot.index.entries,
        snapshot.index.buckets,
        snapshot.index.notifications_sent,
        snapshot.reachable_cells
    );
}
